//! Abstract environment: the frontend's model of local state, an ordered
//! vector of value slots (parameters, locals, expression stack).
//!
//! Environments flow along control-flow edges during lowering. On most edges
//! the successor can observe its predecessor's final environment directly, so
//! the tracker shares a single environment through `Rc<RefCell<_>>` and only
//! pays for a deep copy where sharing would let a later block see writes it
//! must not.

use std::cell::RefCell;
use std::rc::Rc;

use super::ValueId;

/// Ordered slot vector mapping environment positions to IR values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    slots: Vec<ValueId>,
}

/// Shared handle to an environment. Blocks connected by a sharing edge
/// observe each other's writes through the same cell.
pub type SharedEnvironment = Rc<RefCell<Environment>>;

pub fn share(env: Environment) -> SharedEnvironment {
    Rc::new(RefCell::new(env))
}

impl Environment {
    pub fn new(slots: Vec<ValueId>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn value_at(&self, slot: usize) -> Option<ValueId> {
        self.slots.get(slot).copied()
    }

    pub fn set_value_at(&mut self, slot: usize, value: ValueId) -> bool {
        match self.slots.get_mut(slot) {
            Some(v) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    /// Deep copy with independent storage.
    pub fn copy(&self) -> Environment {
        self.clone()
    }

    pub fn slots(&self) -> &[ValueId] {
        &self.slots
    }
}
