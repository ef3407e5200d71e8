//! Compilation unit handle and the bridge onto an installable code object.

use log::debug;

use crate::error::SessionError;
use crate::hir::CodeFlags;
use crate::session::{CodegenSession, UnitId};

/// Lifecycle of one lowering run. Transitions are monotonic:
/// `Building` moves to exactly one of `Done` or `Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
    Building,
    Aborted,
    Done,
}

/// A successfully lowered function, registered with its session and ready
/// for code materialization.
#[derive(Debug)]
pub struct Chunk {
    unit_id: UnitId,
    flags: CodeFlags,
    status: ChunkStatus,
}

impl Chunk {
    pub(crate) fn new(unit_id: UnitId, flags: CodeFlags) -> Self {
        Self {
            unit_id,
            flags,
            status: ChunkStatus::Done,
        }
    }

    pub fn unit_id(&self) -> UnitId {
        self.unit_id
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    /// Materialize the executable artifact: resolve the native entry
    /// address, copy the captured code buffer, and account for the object's
    /// size in the session.
    pub fn codegen(&self, session: &mut CodegenSession) -> Result<CodeObject, SessionError> {
        let entry_address = session.function_address(self.unit_id)?;
        // The session keeps its buffer; the object carries its own copy.
        let instructions = session.code_buffer(self.unit_id)?.to_vec();
        let object = CodeObject {
            flags: self.flags,
            instructions,
            entry_address,
        };
        session.record_code_object(object.instruction_size());
        debug!(
            "materialized {}: {} bytes at {:#x}",
            self.unit_id,
            object.instruction_size(),
            entry_address
        );
        Ok(object)
    }
}

/// The installable result of compiling one function.
#[derive(Clone, Debug)]
pub struct CodeObject {
    pub flags: CodeFlags,
    pub instructions: Vec<u8>,
    pub entry_address: usize,
}

impl CodeObject {
    pub fn instruction_size(&self) -> usize {
        self.instructions.len()
    }
}
