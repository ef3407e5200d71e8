//! hirlift lowers a speculative SSA control-flow graph of a dynamically
//! typed language onto Cranelift and materializes installable code objects.
//!
//! The pipeline is: the frontend hands over a [`hir::Graph`] with
//! representation-annotated values, [`build_chunk`] lowers it into a
//! compilation unit registered with an explicit [`CodegenSession`], and
//! [`Chunk::codegen`] resolves the native entry address and copies the
//! compiled buffer into a [`CodeObject`].
//!
//! Lowering covers the integer-shaped core of the instruction set; every
//! other opcode fails the build with an explicit
//! [`LowerError::UnsupportedOpcode`] so callers can fall back to another
//! compilation tier. A failed build registers nothing with the session.

pub mod chunk;
pub mod error;
pub mod hir;
pub mod lower;
pub mod repr;
pub mod session;

pub use chunk::{Chunk, ChunkStatus, CodeObject};
pub use error::{LowerError, LowerResult, SessionError};
pub use lower::{build_chunk, ChunkBuilder, LowerStats};
pub use session::{CodegenSession, SessionStats, UnitId};
