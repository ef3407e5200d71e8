//! Environment propagation along control-flow edges.
//!
//! Each block is lowered against the abstract environment its predecessors
//! left behind. [`FlowState`] records every block's final environment and
//! outgoing argument count, and derives the entry state for the next block:
//! share the predecessor's storage where that is safe, deep-copy where a
//! later-numbered successor could otherwise observe writes, and at join
//! points replace the merged slots with the join's phis.

use hashbrown::HashMap;

use crate::error::{LowerError, LowerResult};
use crate::hir::{share, BlockId, Environment, Graph, InstrKind, SharedEnvironment};

/// Per-build environment and argument-count tracking.
#[derive(Default)]
pub struct FlowState {
    last_environment: HashMap<BlockId, SharedEnvironment>,
    outgoing_arguments: HashMap<BlockId, i32>,
    argument_count: i32,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending outgoing-argument count of the block currently being lowered.
    pub fn argument_count(&self) -> i32 {
        self.argument_count
    }

    pub fn push_arguments(&mut self, count: i32) {
        self.argument_count += count;
    }

    pub fn pop_arguments(&mut self, count: i32) {
        self.argument_count -= count;
    }

    /// Final environment a block was left with, if it has been lowered.
    pub fn last_environment(&self, block: BlockId) -> Option<&SharedEnvironment> {
        self.last_environment.get(&block)
    }

    /// Compute the environment `block` starts in and reset the running
    /// argument count to what its predecessor left pending.
    pub fn enter_block(&mut self, graph: &Graph, block: BlockId) -> LowerResult<SharedEnvironment> {
        let data = graph.block(block);
        if data.is_start {
            self.argument_count = 0;
            return Ok(share(Environment::new(graph.start_environment().to_vec())));
        }

        let pred = *data
            .predecessors
            .first()
            .ok_or(LowerError::MissingEnvironment(block))?;
        let pred_env = self
            .last_environment
            .get(&pred)
            .ok_or(LowerError::MissingEnvironment(pred))?;

        let env = if data.predecessors.len() == 1 {
            // A two-way terminator whose other arm is later-numbered may
            // still mutate the shared environment after we read it, so take
            // an independent copy on such edges.
            if branches_forward(graph, pred, block) {
                share(pred_env.borrow().copy())
            } else {
                SharedEnvironment::clone(pred_env)
            }
        } else {
            let env = SharedEnvironment::clone(pred_env);
            merge_join_state(graph, block, &env)?;
            env
        };

        let incoming = *self
            .outgoing_arguments
            .get(&pred)
            .ok_or(LowerError::MissingEnvironment(pred))?;
        if incoming < 0 {
            return Err(LowerError::NegativeArgumentCount { block });
        }
        self.argument_count = incoming;
        Ok(env)
    }

    /// Record the state `block` finished with.
    pub fn leave_block(&mut self, block: BlockId, env: SharedEnvironment) {
        self.last_environment.insert(block, env);
        self.outgoing_arguments.insert(block, self.argument_count);
    }
}

/// Does the edge `pred -> block` need an independent environment copy?
/// True when `pred` ends in a two-way branch and either arm is numbered
/// after `block`, i.e. lowered later and able to observe shared writes.
fn branches_forward(graph: &Graph, pred: BlockId, block: BlockId) -> bool {
    let successors = graph.block_successors(pred);
    successors.len() > 1 && successors.iter().any(|&s| s > block)
}

/// Overwrite the join block's merged slots in the adopted environment:
/// phi-bearing slots take the phi value, deleted-phi slots in range fall
/// back to the canonical undefined constant.
fn merge_join_state(graph: &Graph, block: BlockId, env: &SharedEnvironment) -> LowerResult<()> {
    let data = graph.block(block);
    let mut env = env.borrow_mut();
    for &phi in &data.phis {
        let InstrKind::Phi { merged_index } = graph.value(phi).kind else {
            continue;
        };
        let Some(slot) = merged_index else { continue };
        if !env.set_value_at(slot, phi) {
            return Err(LowerError::EnvironmentSlotOutOfRange {
                slot,
                len: env.len(),
            });
        }
    }
    for &slot in &data.deleted_phis {
        // Out-of-range deleted slots belong to an outer frame and are
        // ignored, matching the frontend's contract.
        env.set_value_at(slot, graph.undefined());
    }
    Ok(())
}
