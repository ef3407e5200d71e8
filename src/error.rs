//! Error types for lowering and session management.
//!
//! Unimplemented opcodes surface as explicit `Unsupported*` variants rather
//! than a hard process abort, so a caller can fall back to a different
//! compilation tier. The remaining variants describe frontend/backend
//! contract breaches; they indicate a malformed graph rather than an
//! unsupported feature and there is nothing to fall back to.

use thiserror::Error;

use crate::hir::{BlockId, Opcode, ValueId};
use crate::repr::Representation;
use crate::session::UnitId;

/// Main error type for lowering a graph into a compilation unit.
#[derive(Error, Debug)]
pub enum LowerError {
    #[error("unsupported opcode: {opcode:?}")]
    UnsupportedOpcode { opcode: Opcode },

    #[error("unsupported: {feature}")]
    Unsupported { feature: &'static str },

    #[error("unimplemented representation change: {from:?} -> {to:?}")]
    UnsupportedChange {
        from: Representation,
        to: Representation,
    },

    #[error("{opcode:?} operand {value} has representation {found:?}, expected {expected:?}")]
    RepresentationMismatch {
        opcode: Opcode,
        value: ValueId,
        expected: Representation,
        found: Representation,
    },

    #[error("value {value} read before materialization")]
    MissingValue { value: ValueId },

    #[error("cyclic emit-at-use chain through value {value}")]
    MaterializationCycle { value: ValueId },

    #[error("negative outgoing argument count entering block {block}")]
    NegativeArgumentCount { block: BlockId },

    #[error("environment slot {slot} out of range for environment of length {len}")]
    EnvironmentSlotOutOfRange { slot: usize, len: usize },

    #[error("predecessor block {0} has no recorded environment")]
    MissingEnvironment(BlockId),

    #[error("parameter instruction outside the entry block")]
    ParameterOutsideEntry,

    #[error("parameter index {index} exceeds declared parameter count {declared}")]
    ParameterIndexOutOfRange { index: usize, declared: usize },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result type alias for lowering operations.
pub type LowerResult<T> = Result<T, LowerError>;

/// Error type for code-generation session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to construct native code-generation target: {0}")]
    Isa(String),

    #[error("code-generation module error: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("unit {0} is not registered with the session")]
    UnitNotRegistered(UnitId),
}
