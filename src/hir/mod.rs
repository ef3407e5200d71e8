//! High-level SSA IR consumed by the lowering.
//!
//! The frontend optimizer hands us a control-flow graph of basic blocks whose
//! instructions double as SSA values. The graph is stored index-based: blocks
//! and values live in flat vectors and refer to each other through [`BlockId`]
//! and [`ValueId`]. The lowering never mutates a graph; all per-build state
//! (materialized handles, environments, argument counts) lives on the builder
//! side.
//!
//! [`GraphBuilder`] is the construction interface the frontend (and the test
//! suite) uses: create blocks, append instructions, wire control-flow edges
//! and phis, and mark the speculative flags type inference derived
//! (`can_overflow`, `is_uint32`, proven-smi types, emit-at-use policy).

use std::fmt;

use crate::repr::{Representation, Token};

pub mod env;

pub use env::{share, Environment, SharedEnvironment};

/// Reference to an IR value (equivalently, the instruction producing it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Reference to a basic block. Ids follow the frontend's block numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Constant payloads. Only integer-shaped constants can be materialized by
/// the current lowering; the rest are kept so the dispatch surface matches
/// the full instruction set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstantPayload {
    Integer32(i32),
    /// Untagged small-integer representation.
    Smi(i32),
    /// Tagged word whose payload is a small integer.
    TaggedSmi(i32),
    /// The canonical undefined singleton, a non-smi heap object.
    Undefined,
    Double(f64),
    External(u64),
}

/// Fieldless opcode mirror of [`InstrKind`], used for dispatch reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    BlockEntry,
    Parameter,
    Constant,
    Phi,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Bitwise,
    Shl,
    Shr,
    Sar,
    MathMinMax,
    Power,
    UnaryMathOperation,
    CompareNumericAndBranch,
    CompareGeneric,
    Branch,
    Change,
    Return,
    Goto,
    Context,
    ArgumentsObject,
    StackCheck,
    Simulate,
    Typeof,
    Allocate,
    CallRuntime,
    LoadNamedField,
    StoreNamedField,
    LoadKeyed,
    StoreKeyed,
    StringAdd,
    Deoptimize,
    OsrEntry,
    DummyUse,
}

/// Closed sum over the IR instruction set.
///
/// The variants past `Simulate` have no lowering yet; they exist so the
/// dispatcher covers the whole instruction set with explicit unsupported
/// outcomes instead of an open-ended escape hatch.
#[derive(Clone, Debug, PartialEq)]
pub enum InstrKind {
    BlockEntry {
        block: BlockId,
    },
    Parameter {
        index: usize,
    },
    Constant(ConstantPayload),
    Phi {
        merged_index: Option<usize>,
    },
    Add {
        left: ValueId,
        right: ValueId,
    },
    Sub {
        left: ValueId,
        right: ValueId,
    },
    Mul {
        left: ValueId,
        right: ValueId,
    },
    CompareNumericAndBranch {
        token: Token,
        left: ValueId,
        right: ValueId,
        true_block: BlockId,
        false_block: BlockId,
    },
    Change {
        value: ValueId,
        from: Representation,
        to: Representation,
    },
    Return {
        value: ValueId,
        parameter_count: ValueId,
    },
    Goto {
        target: BlockId,
    },
    Context,
    ArgumentsObject,
    StackCheck,
    Simulate {
        assignments: Vec<(usize, ValueId)>,
    },
    // Not yet implemented.
    Div {
        left: ValueId,
        right: ValueId,
    },
    Mod {
        left: ValueId,
        right: ValueId,
    },
    Bitwise {
        left: ValueId,
        right: ValueId,
    },
    Shl {
        left: ValueId,
        right: ValueId,
    },
    Shr {
        left: ValueId,
        right: ValueId,
    },
    Sar {
        left: ValueId,
        right: ValueId,
    },
    MathMinMax {
        left: ValueId,
        right: ValueId,
    },
    Power {
        left: ValueId,
        right: ValueId,
    },
    UnaryMathOperation {
        value: ValueId,
    },
    CompareGeneric {
        token: Token,
        left: ValueId,
        right: ValueId,
    },
    Branch {
        value: ValueId,
        true_block: BlockId,
        false_block: BlockId,
    },
    Typeof {
        value: ValueId,
    },
    Allocate {
        size: ValueId,
    },
    CallRuntime {
        arguments: Vec<ValueId>,
    },
    LoadNamedField {
        object: ValueId,
    },
    StoreNamedField {
        object: ValueId,
        value: ValueId,
    },
    LoadKeyed {
        object: ValueId,
        key: ValueId,
    },
    StoreKeyed {
        object: ValueId,
        key: ValueId,
        value: ValueId,
    },
    StringAdd {
        left: ValueId,
        right: ValueId,
    },
    Deoptimize,
    OsrEntry,
    DummyUse {
        value: ValueId,
    },
}

impl InstrKind {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstrKind::BlockEntry { .. } => Opcode::BlockEntry,
            InstrKind::Parameter { .. } => Opcode::Parameter,
            InstrKind::Constant(_) => Opcode::Constant,
            InstrKind::Phi { .. } => Opcode::Phi,
            InstrKind::Add { .. } => Opcode::Add,
            InstrKind::Sub { .. } => Opcode::Sub,
            InstrKind::Mul { .. } => Opcode::Mul,
            InstrKind::Div { .. } => Opcode::Div,
            InstrKind::Mod { .. } => Opcode::Mod,
            InstrKind::Bitwise { .. } => Opcode::Bitwise,
            InstrKind::Shl { .. } => Opcode::Shl,
            InstrKind::Shr { .. } => Opcode::Shr,
            InstrKind::Sar { .. } => Opcode::Sar,
            InstrKind::MathMinMax { .. } => Opcode::MathMinMax,
            InstrKind::Power { .. } => Opcode::Power,
            InstrKind::UnaryMathOperation { .. } => Opcode::UnaryMathOperation,
            InstrKind::CompareNumericAndBranch { .. } => Opcode::CompareNumericAndBranch,
            InstrKind::CompareGeneric { .. } => Opcode::CompareGeneric,
            InstrKind::Branch { .. } => Opcode::Branch,
            InstrKind::Change { .. } => Opcode::Change,
            InstrKind::Return { .. } => Opcode::Return,
            InstrKind::Goto { .. } => Opcode::Goto,
            InstrKind::Context => Opcode::Context,
            InstrKind::ArgumentsObject => Opcode::ArgumentsObject,
            InstrKind::StackCheck => Opcode::StackCheck,
            InstrKind::Simulate { .. } => Opcode::Simulate,
            InstrKind::Typeof { .. } => Opcode::Typeof,
            InstrKind::Allocate { .. } => Opcode::Allocate,
            InstrKind::CallRuntime { .. } => Opcode::CallRuntime,
            InstrKind::LoadNamedField { .. } => Opcode::LoadNamedField,
            InstrKind::StoreNamedField { .. } => Opcode::StoreNamedField,
            InstrKind::LoadKeyed { .. } => Opcode::LoadKeyed,
            InstrKind::StoreKeyed { .. } => Opcode::StoreKeyed,
            InstrKind::StringAdd { .. } => Opcode::StringAdd,
            InstrKind::Deoptimize => Opcode::Deoptimize,
            InstrKind::OsrEntry => Opcode::OsrEntry,
            InstrKind::DummyUse { .. } => Opcode::DummyUse,
        }
    }

    /// Is this a control instruction ending a block?
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            InstrKind::Goto { .. }
                | InstrKind::CompareNumericAndBranch { .. }
                | InstrKind::Branch { .. }
                | InstrKind::Return { .. }
                | InstrKind::Deoptimize
        )
    }

    /// The statically known single successor, if this control instruction
    /// has one. Such instructions lower to an unconditional branch without
    /// going through opcode dispatch.
    pub fn known_successor(&self) -> Option<BlockId> {
        match self {
            InstrKind::Goto { target } => Some(*target),
            _ => None,
        }
    }
}

/// One IR value: its defining instruction plus the speculative flags the
/// frontend's type inference attached to it.
#[derive(Clone, Debug)]
pub struct ValueData {
    pub kind: InstrKind,
    pub representation: Representation,
    /// Code for this value is generated lazily, at its first use.
    pub emit_at_uses: bool,
    /// The producer could not be proven to stay within the small-integer
    /// range.
    pub can_overflow: bool,
    /// Operand is known to hold an unsigned 32-bit quantity.
    pub is_uint32: bool,
    /// The value's inferred type is small integer.
    pub type_is_smi: bool,
    /// The instruction has no real computed effect; its operands must still
    /// be recorded as used.
    pub can_replace_with_dummy_uses: bool,
    pub use_count: usize,
    /// Block holding the defining instruction, if any. Graph-level constants
    /// are detached.
    pub block: Option<BlockId>,
}

/// One basic block: instruction list, predecessors and the phi bookkeeping
/// needed at join points.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub instructions: Vec<ValueId>,
    pub predecessors: Vec<BlockId>,
    pub phis: Vec<ValueId>,
    /// Environment slots whose phi was deleted by the frontend; they read as
    /// undefined from the join on.
    pub deleted_phis: Vec<usize>,
    pub is_start: bool,
}

/// Code-object flags propagated verbatim from compilation metadata onto the
/// finished executable artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeFlags(pub u32);

/// Per-function compilation metadata supplied by the frontend.
#[derive(Clone, Debug)]
pub struct CompilationInfo {
    parameter_count: usize,
    is_stub: bool,
    saves_caller_doubles: bool,
    flags: CodeFlags,
}

impl CompilationInfo {
    pub fn new(parameter_count: usize) -> Self {
        Self {
            parameter_count,
            is_stub: false,
            saves_caller_doubles: false,
            flags: CodeFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: CodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn mark_stub(mut self) -> Self {
        self.is_stub = true;
        self
    }

    pub fn mark_saves_caller_doubles(mut self) -> Self {
        self.saves_caller_doubles = true;
        self
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn is_stub(&self) -> bool {
        self.is_stub
    }

    pub fn saves_caller_doubles(&self) -> bool {
        self.saves_caller_doubles
    }

    pub fn flags(&self) -> CodeFlags {
        self.flags
    }
}

/// The frontend's finished control-flow graph for one function.
#[derive(Clone, Debug)]
pub struct Graph {
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
    start_environment: Vec<ValueId>,
    undefined: ValueId,
    info: CompilationInfo,
}

impl Graph {
    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.0 as usize]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Blocks in the order the frontend laid them out.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// The canonical environment the function starts in.
    pub fn start_environment(&self) -> &[ValueId] {
        &self.start_environment
    }

    /// The canonical undefined constant singleton.
    pub fn undefined(&self) -> ValueId {
        self.undefined
    }

    pub fn info(&self) -> &CompilationInfo {
        &self.info
    }

    /// The block's terminating control instruction, if the block has one.
    pub fn terminator(&self, block: BlockId) -> Option<ValueId> {
        let last = *self.block(block).instructions.last()?;
        self.value(last).kind.is_control().then_some(last)
    }

    /// Successor blocks, derived from the terminator.
    pub fn block_successors(&self, block: BlockId) -> Vec<BlockId> {
        let Some(end) = self.terminator(block) else {
            return Vec::new();
        };
        match self.value(end).kind {
            InstrKind::Goto { target } => vec![target],
            InstrKind::CompareNumericAndBranch {
                true_block,
                false_block,
                ..
            }
            | InstrKind::Branch {
                true_block,
                false_block,
                ..
            } => vec![true_block, false_block],
            _ => Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.0 as usize]
    }
}

/// Construction interface for [`Graph`].
pub struct GraphBuilder {
    values: Vec<ValueData>,
    blocks: Vec<BlockData>,
    start_environment: Vec<ValueId>,
    undefined: ValueId,
    info: CompilationInfo,
}

impl GraphBuilder {
    pub fn new(info: CompilationInfo) -> Self {
        let mut builder = Self {
            values: Vec::new(),
            blocks: Vec::new(),
            start_environment: Vec::new(),
            undefined: ValueId(0),
            info,
        };
        // The undefined singleton exists from the start, detached from any
        // block and materialized lazily if ever consumed.
        builder.undefined = builder.push_detached(
            InstrKind::Constant(ConstantPayload::Undefined),
            Representation::Tagged,
            true,
        );
        builder
    }

    fn push(
        &mut self,
        block: Option<BlockId>,
        kind: InstrKind,
        representation: Representation,
        emit_at_uses: bool,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            kind,
            representation,
            emit_at_uses,
            can_overflow: false,
            is_uint32: false,
            type_is_smi: false,
            can_replace_with_dummy_uses: false,
            use_count: 0,
            block,
        });
        if let Some(b) = block {
            self.blocks[b.0 as usize].instructions.push(id);
        }
        id
    }

    fn push_detached(
        &mut self,
        kind: InstrKind,
        representation: Representation,
        emit_at_uses: bool,
    ) -> ValueId {
        self.push(None, kind, representation, emit_at_uses)
    }

    fn note_use(&mut self, value: ValueId) {
        self.values[value.0 as usize].use_count += 1;
    }

    /// Create a new block. The first block created is the start block. Each
    /// block begins with its block-entry instruction.
    pub fn block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            is_start: id.0 == 0,
            ..BlockData::default()
        });
        self.push(
            Some(id),
            InstrKind::BlockEntry { block: id },
            Representation::Tagged,
            false,
        );
        id
    }

    pub fn parameter(
        &mut self,
        block: BlockId,
        index: usize,
        representation: Representation,
    ) -> ValueId {
        self.push(
            Some(block),
            InstrKind::Parameter { index },
            representation,
            false,
        )
    }

    pub fn int32_constant(&mut self, block: BlockId, value: i32) -> ValueId {
        // Constants are materialized lazily, at their first use.
        self.push(
            Some(block),
            InstrKind::Constant(ConstantPayload::Integer32(value)),
            Representation::Integer32,
            true,
        )
    }

    pub fn smi_constant(&mut self, block: BlockId, value: i32) -> ValueId {
        self.push(
            Some(block),
            InstrKind::Constant(ConstantPayload::Smi(value)),
            Representation::Smi,
            true,
        )
    }

    pub fn tagged_smi_constant(&mut self, block: BlockId, value: i32) -> ValueId {
        self.push(
            Some(block),
            InstrKind::Constant(ConstantPayload::TaggedSmi(value)),
            Representation::Tagged,
            true,
        )
    }

    pub fn double_constant(&mut self, block: BlockId, value: f64) -> ValueId {
        self.push(
            Some(block),
            InstrKind::Constant(ConstantPayload::Double(value)),
            Representation::Double,
            true,
        )
    }

    fn binary(
        &mut self,
        block: BlockId,
        representation: Representation,
        left: ValueId,
        right: ValueId,
        make: impl FnOnce(ValueId, ValueId) -> InstrKind,
    ) -> ValueId {
        self.note_use(left);
        self.note_use(right);
        self.push(Some(block), make(left, right), representation, false)
    }

    pub fn add(
        &mut self,
        block: BlockId,
        representation: Representation,
        left: ValueId,
        right: ValueId,
    ) -> ValueId {
        self.binary(block, representation, left, right, |left, right| {
            InstrKind::Add { left, right }
        })
    }

    pub fn sub(
        &mut self,
        block: BlockId,
        representation: Representation,
        left: ValueId,
        right: ValueId,
    ) -> ValueId {
        self.binary(block, representation, left, right, |left, right| {
            InstrKind::Sub { left, right }
        })
    }

    pub fn mul(
        &mut self,
        block: BlockId,
        representation: Representation,
        left: ValueId,
        right: ValueId,
    ) -> ValueId {
        self.binary(block, representation, left, right, |left, right| {
            InstrKind::Mul { left, right }
        })
    }

    pub fn div(
        &mut self,
        block: BlockId,
        representation: Representation,
        left: ValueId,
        right: ValueId,
    ) -> ValueId {
        self.binary(block, representation, left, right, |left, right| {
            InstrKind::Div { left, right }
        })
    }

    /// Convert `value` to representation `to`. The source representation is
    /// the operand's current one.
    pub fn change(&mut self, block: BlockId, value: ValueId, to: Representation) -> ValueId {
        let from = self.values[value.0 as usize].representation;
        self.note_use(value);
        self.push(Some(block), InstrKind::Change { value, from, to }, to, false)
    }

    /// Append a numeric compare-and-branch ending `block`, wiring the edges
    /// to both successors.
    #[allow(clippy::too_many_arguments)]
    pub fn compare_numeric_and_branch(
        &mut self,
        block: BlockId,
        token: Token,
        representation: Representation,
        left: ValueId,
        right: ValueId,
        true_block: BlockId,
        false_block: BlockId,
    ) -> ValueId {
        self.note_use(left);
        self.note_use(right);
        let id = self.push(
            Some(block),
            InstrKind::CompareNumericAndBranch {
                token,
                left,
                right,
                true_block,
                false_block,
            },
            representation,
            false,
        );
        self.blocks[true_block.0 as usize].predecessors.push(block);
        self.blocks[false_block.0 as usize].predecessors.push(block);
        id
    }

    /// Append an unconditional branch ending `block`.
    pub fn goto(&mut self, block: BlockId, target: BlockId) -> ValueId {
        let id = self.push(
            Some(block),
            InstrKind::Goto { target },
            Representation::Tagged,
            false,
        );
        self.blocks[target.0 as usize].predecessors.push(block);
        id
    }

    /// Append a return of `value`. The parameter-count operand is the usual
    /// integer constant derived from the compilation metadata.
    pub fn ret(&mut self, block: BlockId, value: ValueId) -> ValueId {
        let parameter_count = self.push_detached(
            InstrKind::Constant(ConstantPayload::Integer32(
                self.info.parameter_count() as i32
            )),
            Representation::Integer32,
            true,
        );
        self.note_use(value);
        self.push(
            Some(block),
            InstrKind::Return {
                value,
                parameter_count,
            },
            Representation::Tagged,
            false,
        )
    }

    pub fn context(&mut self, block: BlockId) -> ValueId {
        self.push(Some(block), InstrKind::Context, Representation::Tagged, false)
    }

    pub fn arguments_object(&mut self, block: BlockId) -> ValueId {
        self.push(
            Some(block),
            InstrKind::ArgumentsObject,
            Representation::Tagged,
            false,
        )
    }

    pub fn stack_check(&mut self, block: BlockId) -> ValueId {
        self.push(
            Some(block),
            InstrKind::StackCheck,
            Representation::Tagged,
            false,
        )
    }

    pub fn simulate(&mut self, block: BlockId, assignments: Vec<(usize, ValueId)>) -> ValueId {
        self.push(
            Some(block),
            InstrKind::Simulate { assignments },
            Representation::Tagged,
            false,
        )
    }

    pub fn typeof_(&mut self, block: BlockId, value: ValueId) -> ValueId {
        self.note_use(value);
        self.push(
            Some(block),
            InstrKind::Typeof { value },
            Representation::Tagged,
            false,
        )
    }

    /// Declare a phi merging into `merged_index` of the join environment.
    /// Phis are block metadata, not part of the instruction stream.
    pub fn phi(&mut self, block: BlockId, merged_index: Option<usize>) -> ValueId {
        let id = self.push_detached(
            InstrKind::Phi { merged_index },
            Representation::Tagged,
            false,
        );
        self.values[id.0 as usize].block = Some(block);
        self.blocks[block.0 as usize].phis.push(id);
        id
    }

    pub fn deleted_phi(&mut self, block: BlockId, slot: usize) {
        self.blocks[block.0 as usize].deleted_phis.push(slot);
    }

    pub fn set_start_environment(&mut self, slots: Vec<ValueId>) {
        self.start_environment = slots;
    }

    pub fn mark_can_overflow(&mut self, value: ValueId) {
        self.values[value.0 as usize].can_overflow = true;
    }

    pub fn mark_uint32(&mut self, value: ValueId) {
        self.values[value.0 as usize].is_uint32 = true;
    }

    pub fn mark_smi_type(&mut self, value: ValueId) {
        self.values[value.0 as usize].type_is_smi = true;
    }

    pub fn mark_dummy_uses(&mut self, value: ValueId) {
        self.values[value.0 as usize].can_replace_with_dummy_uses = true;
    }

    pub fn mark_emit_at_uses(&mut self, value: ValueId) {
        self.values[value.0 as usize].emit_at_uses = true;
    }

    pub fn finish(self) -> Graph {
        Graph {
            values: self.values,
            blocks: self.blocks,
            start_environment: self.start_environment,
            undefined: self.undefined,
            info: self.info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_block_is_start() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let b1 = builder.block();
        let graph = builder.finish();
        assert!(graph.block(b0).is_start);
        assert!(!graph.block(b1).is_start);
    }

    #[test]
    fn test_blocks_open_with_block_entry() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let graph = builder.finish();
        let first = graph.block(b0).instructions[0];
        assert_eq!(graph.value(first).kind, InstrKind::BlockEntry { block: b0 });
    }

    #[test]
    fn test_branch_wires_predecessors_and_successors() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let b1 = builder.block();
        let b2 = builder.block();
        let left = builder.int32_constant(b0, 1);
        let right = builder.int32_constant(b0, 2);
        builder.compare_numeric_and_branch(
            b0,
            Token::Lt,
            Representation::Integer32,
            left,
            right,
            b1,
            b2,
        );
        let graph = builder.finish();
        assert_eq!(graph.block_successors(b0), vec![b1, b2]);
        assert_eq!(graph.block(b1).predecessors, vec![b0]);
        assert_eq!(graph.block(b2).predecessors, vec![b0]);
    }

    #[test]
    fn test_goto_has_known_successor() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let b1 = builder.block();
        let goto = builder.goto(b0, b1);
        let graph = builder.finish();
        assert_eq!(graph.value(goto).kind.known_successor(), Some(b1));
        assert!(graph.value(goto).kind.is_control());
    }

    #[test]
    fn test_constants_emit_at_uses() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let c = builder.int32_constant(b0, 7);
        let graph = builder.finish();
        assert!(graph.value(c).emit_at_uses);
        assert!(graph.value(graph.undefined()).emit_at_uses);
    }

    #[test]
    fn test_phis_are_block_metadata() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let phi = builder.phi(b0, Some(1));
        let graph = builder.finish();
        assert_eq!(graph.block(b0).phis, vec![phi]);
        // Only the block-entry instruction is in the stream.
        assert_eq!(graph.block(b0).instructions.len(), 1);
    }

    #[test]
    fn test_use_counts() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let a = builder.int32_constant(b0, 1);
        let sum = builder.add(b0, Representation::Integer32, a, a);
        builder.ret(b0, sum);
        let graph = builder.finish();
        assert_eq!(graph.value(a).use_count, 2);
        assert_eq!(graph.value(sum).use_count, 1);
    }
}
