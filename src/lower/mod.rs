//! Lowering of one IR graph into a native compilation unit.
//!
//! [`ChunkBuilder`] walks the blocks in frontend order and dispatches every
//! instruction to a per-opcode handler. Handlers assert their representation
//! preconditions, resolve operands through the materialization cache, emit
//! the native instructions, and memoize the result. Values flagged
//! emit-at-uses are skipped by the block walk and materialized recursively
//! at their first use.
//!
//! A build is all-or-nothing: the first handler error aborts the whole unit
//! and nothing is registered with the session.

use cranelift_codegen::ir::{types, Block, Inst, InstBuilder, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use crate::chunk::{Chunk, ChunkStatus};
use crate::error::{LowerError, LowerResult};
use crate::hir::{
    BlockId, ConstantPayload, Graph, InstrKind, Opcode, SharedEnvironment, ValueId,
};
use crate::repr::{smi_from_int32, token_to_predicate, Representation, TaggingMode, Token};
use crate::session::{CodegenSession, HIDDEN_PARAMETERS};

pub mod flow;

use flow::FlowState;

/// Memoized native artifact of one IR value.
#[derive(Clone, Copy, Debug)]
enum NativeHandle {
    Value(Value),
    Branch(Inst),
}

/// Counters for one lowering run.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowerStats {
    pub blocks_created: usize,
    pub values_materialized: usize,
    pub instructions_visited: usize,
}

/// Per-build lowering state over a borrowed function builder.
pub struct ChunkBuilder<'a, 'f> {
    graph: &'a Graph,
    bcx: &'a mut FunctionBuilder<'f>,
    tagging: TaggingMode,
    status: ChunkStatus,
    native_blocks: HashMap<BlockId, Block>,
    native_values: HashMap<ValueId, NativeHandle>,
    in_flight: HashSet<ValueId>,
    flow: FlowState,
    entry_block: Option<Block>,
    current_env: Option<SharedEnvironment>,
    stats: LowerStats,
}

impl<'a, 'f> ChunkBuilder<'a, 'f> {
    pub fn new(graph: &'a Graph, bcx: &'a mut FunctionBuilder<'f>, tagging: TaggingMode) -> Self {
        Self {
            graph,
            bcx,
            tagging,
            status: ChunkStatus::Building,
            native_blocks: HashMap::new(),
            native_values: HashMap::new(),
            in_flight: HashSet::new(),
            flow: FlowState::new(),
            entry_block: None,
            current_env: None,
            stats: LowerStats::default(),
        }
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn stats(&self) -> LowerStats {
        self.stats
    }

    /// Lower the whole graph. The status moves from `Building` to `Done`,
    /// or to `Aborted` on the first handler error.
    pub fn run(&mut self) -> LowerResult<()> {
        debug_assert_eq!(self.status, ChunkStatus::Building);
        match self.lower_graph() {
            Ok(()) => {
                self.status = ChunkStatus::Done;
                Ok(())
            }
            Err(error) => {
                self.status = ChunkStatus::Aborted;
                Err(error)
            }
        }
    }

    fn lower_graph(&mut self) -> LowerResult<()> {
        for block in self.graph.block_ids() {
            self.do_basic_block(block)?;
        }
        debug!(
            "lowered {} blocks, {} values, {} instructions visited",
            self.stats.blocks_created, self.stats.values_materialized, self.stats.instructions_visited
        );
        Ok(())
    }

    fn do_basic_block(&mut self, block: BlockId) -> LowerResult<()> {
        trace!("lowering {block}");
        let native = self.use_block(block);
        if self.graph.block(block).is_start {
            self.bcx.append_block_params_for_function_params(native);
            self.entry_block = Some(native);
        }
        self.bcx.switch_to_block(native);

        let env = self.flow.enter_block(self.graph, block)?;
        self.current_env = Some(SharedEnvironment::clone(&env));
        for &instr in &self.graph.block(block).instructions {
            if self.graph.value(instr).emit_at_uses {
                continue;
            }
            self.visit_instruction(instr)?;
        }
        self.current_env = None;
        self.flow.leave_block(block, env);
        Ok(())
    }

    /// Lazily create the native block for `block`, exactly once.
    fn use_block(&mut self, block: BlockId) -> Block {
        if let Some(&native) = self.native_blocks.get(&block) {
            return native;
        }
        let native = self.bcx.create_block();
        self.native_blocks.insert(block, native);
        self.stats.blocks_created += 1;
        native
    }

    /// Resolve the native value for `value`, materializing emit-at-use
    /// producers on first demand.
    fn use_value(&mut self, value: ValueId) -> LowerResult<Value> {
        if let Some(handle) = self.native_values.get(&value) {
            return match *handle {
                NativeHandle::Value(v) => Ok(v),
                NativeHandle::Branch(_) => Err(LowerError::MissingValue { value }),
            };
        }
        if self.graph.value(value).emit_at_uses {
            if !self.in_flight.insert(value) {
                return Err(LowerError::MaterializationCycle { value });
            }
            let outcome = self.visit_instruction(value);
            self.in_flight.remove(&value);
            outcome?;
            if let Some(NativeHandle::Value(v)) = self.native_values.get(&value) {
                return Ok(*v);
            }
        }
        Err(LowerError::MissingValue { value })
    }

    fn set_value(&mut self, value: ValueId, native: Value) {
        debug_assert!(!self.native_values.contains_key(&value));
        self.native_values.insert(value, NativeHandle::Value(native));
        self.stats.values_materialized += 1;
    }

    fn set_branch(&mut self, value: ValueId, inst: Inst) {
        debug_assert!(!self.native_values.contains_key(&value));
        self.native_values.insert(value, NativeHandle::Branch(inst));
    }

    fn visit_instruction(&mut self, value: ValueId) -> LowerResult<()> {
        self.stats.instructions_visited += 1;
        let data = self.graph.value(value);
        if data.can_replace_with_dummy_uses {
            return Err(LowerError::Unsupported {
                feature: "dummy-use replacement",
            });
        }
        if let Some(target) = data.kind.known_successor() {
            let native = self.use_block(target);
            let inst = self.bcx.ins().jump(native, &[]);
            self.set_branch(value, inst);
            return Ok(());
        }
        let kind = data.kind.clone();
        match kind {
            InstrKind::BlockEntry { .. } | InstrKind::StackCheck | InstrKind::ArgumentsObject => {
                Ok(())
            }
            InstrKind::Parameter { index } => self.do_parameter(value, index),
            InstrKind::Constant(payload) => self.do_constant(value, payload),
            InstrKind::Add { left, right }
            | InstrKind::Sub { left, right }
            | InstrKind::Mul { left, right } => self.do_arithmetic(value, left, right),
            InstrKind::CompareNumericAndBranch {
                token,
                left,
                right,
                true_block,
                false_block,
            } => self.do_compare_numeric_and_branch(value, token, left, right, true_block, false_block),
            InstrKind::Change { value: operand, from, to } => {
                self.do_change(value, operand, from, to)
            }
            InstrKind::Return {
                value: result,
                parameter_count,
            } => self.do_return(value, result, parameter_count),
            InstrKind::Context => self.do_context(value),
            InstrKind::Simulate { assignments } => self.do_simulate(&assignments),
            InstrKind::Goto { .. } => unreachable!("handled by the known-successor path"),
            other => Err(LowerError::UnsupportedOpcode {
                opcode: other.opcode(),
            }),
        }
    }

    /// Bind the declared parameter at `index` to its native argument. The
    /// hidden leading words come first and the declared parameters follow
    /// in reverse declaration order, so parameter `index` is found walking
    /// the native argument list from the end.
    fn do_parameter(&mut self, value: ValueId, index: usize) -> LowerResult<()> {
        let entry = self.entry_block.ok_or(LowerError::ParameterOutsideEntry)?;
        if self.graph.value(value).block != Some(BlockId(0)) {
            return Err(LowerError::ParameterOutsideEntry);
        }
        let declared = self.graph.info().parameter_count();
        if index >= declared {
            return Err(LowerError::ParameterIndexOutOfRange { index, declared });
        }
        let position = declared + HIDDEN_PARAMETERS - 1 - index;
        let native = self.bcx.block_params(entry)[position];
        trace!("parameter {index} of {declared} bound at position {position}");
        self.set_value(value, native);
        Ok(())
    }

    fn do_constant(&mut self, value: ValueId, payload: ConstantPayload) -> LowerResult<()> {
        let native = match payload {
            ConstantPayload::Integer32(v) => self.bcx.ins().iconst(types::I64, v as i64),
            ConstantPayload::Smi(v) | ConstantPayload::TaggedSmi(v) => self
                .bcx
                .ins()
                .iconst(types::I64, smi_from_int32(v, self.tagging)),
            ConstantPayload::Undefined => {
                return Err(LowerError::Unsupported {
                    feature: "non-smi tagged constants",
                })
            }
            ConstantPayload::Double(_) => {
                return Err(LowerError::Unsupported {
                    feature: "double constants",
                })
            }
            ConstantPayload::External(_) => {
                return Err(LowerError::Unsupported {
                    feature: "external constants",
                })
            }
        };
        self.set_value(value, native);
        Ok(())
    }

    fn check_operand_representation(
        &self,
        opcode: Opcode,
        operand: ValueId,
        expected: Representation,
    ) -> LowerResult<()> {
        let found = self.graph.value(operand).representation;
        if found != expected {
            return Err(LowerError::RepresentationMismatch {
                opcode,
                value: operand,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn do_arithmetic(&mut self, value: ValueId, left: ValueId, right: ValueId) -> LowerResult<()> {
        let data = self.graph.value(value);
        let opcode = data.kind.opcode();
        let rep = data.representation;
        if !matches!(rep, Representation::Smi | Representation::Integer32) {
            return Err(LowerError::Unsupported {
                feature: "non-integer arithmetic",
            });
        }
        self.check_operand_representation(opcode, left, rep)?;
        self.check_operand_representation(opcode, right, rep)?;
        let lv = self.use_value(left)?;
        let rv = self.use_value(right)?;
        let native = match opcode {
            Opcode::Add => self.bcx.ins().iadd(lv, rv),
            Opcode::Sub => self.bcx.ins().isub(lv, rv),
            Opcode::Mul => {
                // Smi payloads live in the high half; strip one operand's
                // tag so the product is tagged once, not twice.
                let rv = if rep == Representation::Smi {
                    self.bcx.ins().ushr_imm(rv, self.tagging.shift())
                } else {
                    rv
                };
                self.bcx.ins().imul(lv, rv)
            }
            _ => unreachable!("non-arithmetic opcode in arithmetic handler"),
        };
        self.set_value(value, native);
        Ok(())
    }

    fn do_compare_numeric_and_branch(
        &mut self,
        value: ValueId,
        token: Token,
        left: ValueId,
        right: ValueId,
        true_block: BlockId,
        false_block: BlockId,
    ) -> LowerResult<()> {
        let rep = self.graph.value(value).representation;
        match rep {
            Representation::Integer32 => {}
            Representation::Smi | Representation::Double => {
                return Err(LowerError::Unsupported {
                    feature: "non-int32 numeric comparison",
                })
            }
            _ => {
                return Err(LowerError::Unsupported {
                    feature: "non-numeric comparison",
                })
            }
        }
        self.check_operand_representation(Opcode::CompareNumericAndBranch, left, rep)?;
        self.check_operand_representation(Opcode::CompareNumericAndBranch, right, rep)?;
        let is_unsigned =
            self.graph.value(left).is_uint32 || self.graph.value(right).is_uint32;
        let cc = token_to_predicate(token, is_unsigned);
        let lv = self.use_value(left)?;
        let rv = self.use_value(right)?;
        let cond = self.bcx.ins().icmp(cc, lv, rv);
        let on_true = self.use_block(true_block);
        let on_false = self.use_block(false_block);
        let inst = self.bcx.ins().brif(cond, on_true, &[], on_false, &[]);
        self.set_branch(value, inst);
        Ok(())
    }

    fn do_change(
        &mut self,
        value: ValueId,
        operand: ValueId,
        from: Representation,
        to: Representation,
    ) -> LowerResult<()> {
        use Representation::{Integer32, Smi, Tagged};

        let can_overflow =
            self.graph.value(value).can_overflow || self.graph.value(operand).can_overflow;
        let native = match (from, to) {
            (Representation::Double, _) | (_, Representation::Double) => {
                return Err(LowerError::UnsupportedChange { from, to })
            }
            // Tagged smi words and smi words share an encoding; non-smi
            // tagged inputs are not checked for here.
            (f, t) if f == t => self.use_value(operand)?,
            (Tagged, Smi) | (Smi, Tagged) => self.use_value(operand)?,
            (Tagged, Integer32) | (Smi, Integer32) => {
                let v = self.use_value(operand)?;
                self.smi_to_integer32(v)?
            }
            (Integer32, Tagged) | (Integer32, Smi) => {
                if can_overflow {
                    return Err(LowerError::Unsupported {
                        feature: "overflowing int32 tagging",
                    });
                }
                let v = self.use_value(operand)?;
                self.integer32_to_smi(v)
            }
            _ => return Err(LowerError::UnsupportedChange { from, to }),
        };
        self.set_value(value, native);
        Ok(())
    }

    fn smi_to_integer32(&mut self, v: Value) -> LowerResult<Value> {
        if self.tagging == TaggingMode::Narrow {
            return Err(LowerError::Unsupported {
                feature: "narrow smi untagging",
            });
        }
        Ok(self.bcx.ins().ushr_imm(v, self.tagging.shift()))
    }

    fn integer32_to_smi(&mut self, v: Value) -> Value {
        self.bcx.ins().ishl_imm(v, self.tagging.shift())
    }

    fn do_return(
        &mut self,
        value: ValueId,
        result: ValueId,
        parameter_count: ValueId,
    ) -> LowerResult<()> {
        let info = self.graph.info();
        if info.is_stub() {
            return Err(LowerError::Unsupported {
                feature: "stub frames",
            });
        }
        if info.saves_caller_doubles() {
            return Err(LowerError::Unsupported {
                feature: "caller-saved doubles",
            });
        }
        if !matches!(
            self.graph.value(parameter_count).kind,
            InstrKind::Constant(_)
        ) {
            return Err(LowerError::Unsupported {
                feature: "dynamic parameter count",
            });
        }
        let v = self.use_value(result)?;
        let inst = self.bcx.ins().return_(&[v]);
        self.set_branch(value, inst);
        Ok(())
    }

    /// The context travels as the first native argument.
    fn do_context(&mut self, value: ValueId) -> LowerResult<()> {
        if self.graph.info().is_stub() {
            return Err(LowerError::Unsupported {
                feature: "stub context",
            });
        }
        let entry = self.entry_block.ok_or(LowerError::ParameterOutsideEntry)?;
        let native = self.bcx.block_params(entry)[0];
        self.set_value(value, native);
        Ok(())
    }

    /// Replay the frontend's recorded state assignments into the abstract
    /// environment. No code is emitted.
    fn do_simulate(&mut self, assignments: &[(usize, ValueId)]) -> LowerResult<()> {
        let Some(env) = self.current_env.as_ref() else {
            return Ok(());
        };
        let mut env = env.borrow_mut();
        for &(slot, assigned) in assignments {
            if !env.set_value_at(slot, assigned) {
                return Err(LowerError::EnvironmentSlotOutOfRange {
                    slot,
                    len: env.len(),
                });
            }
        }
        Ok(())
    }
}

/// Lower `graph` into a new compilation unit of `session`.
///
/// On success the unit is declared, defined and registered, and the returned
/// chunk is in the `Done` state. On failure nothing is registered and the
/// allocated unit id is abandoned.
pub fn build_chunk(graph: &Graph, session: &mut CodegenSession) -> LowerResult<Chunk> {
    let unit = session.allocate_unit_id();
    let sig = session.unit_signature(graph.info().parameter_count());
    let func = session.declare_unit(unit, &sig)?;

    let mut ctx = session.make_context();
    ctx.func.signature = sig;
    let mut fbx = FunctionBuilderContext::new();
    let mut bcx = FunctionBuilder::new(&mut ctx.func, &mut fbx);

    let mut builder = ChunkBuilder::new(graph, &mut bcx, TaggingMode::default());
    builder.run()?;
    drop(builder);

    bcx.seal_all_blocks();
    bcx.finalize();
    session.define_unit(unit, func, &mut ctx)?;
    Ok(Chunk::new(unit, graph.info().flags()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::{CompilationInfo, GraphBuilder};
    use cranelift_codegen::ir::{AbiParam, Function};

    fn with_builder<R>(graph: &Graph, run: impl FnOnce(&mut ChunkBuilder) -> R) -> R {
        let mut func = Function::new();
        for _ in 0..graph.info().parameter_count() + HIDDEN_PARAMETERS {
            func.signature.params.push(AbiParam::new(types::I64));
        }
        func.signature.returns.push(AbiParam::new(types::I64));
        let mut fbx = FunctionBuilderContext::new();
        let mut bcx = FunctionBuilder::new(&mut func, &mut fbx);
        let mut builder = ChunkBuilder::new(graph, &mut bcx, TaggingMode::default());
        run(&mut builder)
    }

    fn straight_line_graph() -> Graph {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let a = builder.int32_constant(b0, 3);
        let b = builder.int32_constant(b0, 4);
        let sum = builder.add(b0, Representation::Integer32, a, b);
        builder.ret(b0, sum);
        builder.set_start_environment(Vec::new());
        builder.finish()
    }

    #[test]
    fn test_use_block_is_memoized() {
        let graph = straight_line_graph();
        with_builder(&graph, |builder| {
            let first = builder.use_block(BlockId(0));
            let again = builder.use_block(BlockId(0));
            assert_eq!(first, again);
            assert_eq!(builder.stats().blocks_created, 1);
        });
    }

    #[test]
    fn test_use_value_is_memoized() {
        let graph = straight_line_graph();
        let constant = graph.block(BlockId(0)).instructions[1];
        with_builder(&graph, |builder| {
            let entry = builder.use_block(BlockId(0));
            builder.bcx.switch_to_block(entry);
            let first = builder.use_value(constant).unwrap();
            let again = builder.use_value(constant).unwrap();
            assert_eq!(first, again);
            assert_eq!(builder.stats().values_materialized, 1);
        });
    }

    #[test]
    fn test_unmaterialized_value_read_is_an_error() {
        let graph = straight_line_graph();
        // The add is not emit-at-uses and has not been visited yet.
        let sum = graph.block(BlockId(0)).instructions[3];
        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.use_value(sum),
                Err(LowerError::MissingValue { value }) if value == sum
            ));
        });
    }

    #[test]
    fn test_emit_at_use_cycle_is_detected() {
        let mut graph = straight_line_graph();
        let sum = graph.block(BlockId(0)).instructions[3];
        graph.value_mut(sum).kind = InstrKind::Add {
            left: sum,
            right: sum,
        };
        graph.value_mut(sum).emit_at_uses = true;
        with_builder(&graph, |builder| {
            let entry = builder.use_block(BlockId(0));
            builder.bcx.switch_to_block(entry);
            assert!(matches!(
                builder.use_value(sum),
                Err(LowerError::MaterializationCycle { value }) if value == sum
            ));
        });
    }

    #[test]
    fn test_unsupported_opcode_aborts_the_build() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let c = builder.tagged_smi_constant(b0, 1);
        let t = builder.typeof_(b0, c);
        builder.ret(b0, t);
        builder.set_start_environment(Vec::new());
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            let outcome = builder.run();
            assert!(matches!(
                outcome,
                Err(LowerError::UnsupportedOpcode {
                    opcode: Opcode::Typeof
                })
            ));
            assert_eq!(builder.status(), ChunkStatus::Aborted);
        });
    }

    #[test]
    fn test_dummy_use_replacement_is_unsupported() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let a = builder.int32_constant(b0, 1);
        let sum = builder.add(b0, Representation::Integer32, a, a);
        builder.mark_dummy_uses(sum);
        builder.ret(b0, sum);
        builder.set_start_environment(Vec::new());
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.run(),
                Err(LowerError::Unsupported {
                    feature: "dummy-use replacement"
                })
            ));
        });
    }

    #[test]
    fn test_arithmetic_checks_operand_representations() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let a = builder.int32_constant(b0, 1);
        let b = builder.smi_constant(b0, 2);
        let sum = builder.add(b0, Representation::Integer32, a, b);
        builder.ret(b0, sum);
        builder.set_start_environment(Vec::new());
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.run(),
                Err(LowerError::RepresentationMismatch {
                    opcode: Opcode::Add,
                    expected: Representation::Integer32,
                    found: Representation::Smi,
                    ..
                })
            ));
            assert_eq!(builder.status(), ChunkStatus::Aborted);
        });
    }

    #[test]
    fn test_compare_checks_operand_representations() {
        // Compare declared int32 with a smi-representation right operand;
        // lowering it silently would compare an untagged word against a
        // high-shifted one.
        let mut builder = GraphBuilder::new(CompilationInfo::new(1));
        let b0 = builder.block();
        let b1 = builder.block();
        let b2 = builder.block();
        let p0 = builder.parameter(b0, 0, Representation::Integer32);
        let two = builder.smi_constant(b0, 2);
        builder.compare_numeric_and_branch(
            b0,
            Token::Lt,
            Representation::Integer32,
            p0,
            two,
            b1,
            b2,
        );
        let one = builder.int32_constant(b1, 1);
        builder.ret(b1, one);
        let zero = builder.int32_constant(b2, 0);
        builder.ret(b2, zero);
        builder.set_start_environment(vec![p0]);
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.run(),
                Err(LowerError::RepresentationMismatch {
                    opcode: Opcode::CompareNumericAndBranch,
                    expected: Representation::Integer32,
                    found: Representation::Smi,
                    ..
                })
            ));
            assert_eq!(builder.status(), ChunkStatus::Aborted);
        });
    }

    #[test]
    fn test_double_changes_are_unsupported() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(0));
        let b0 = builder.block();
        let c = builder.double_constant(b0, 1.5);
        builder.mark_emit_at_uses(c);
        let changed = builder.change(b0, c, Representation::Tagged);
        builder.ret(b0, changed);
        builder.set_start_environment(Vec::new());
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.run(),
                Err(LowerError::UnsupportedChange {
                    from: Representation::Double,
                    to: Representation::Tagged
                })
            ));
        });
    }

    #[test]
    fn test_overflowing_int32_tagging_is_unsupported() {
        let mut builder = GraphBuilder::new(CompilationInfo::new(2));
        let b0 = builder.block();
        let p0 = builder.parameter(b0, 0, Representation::Integer32);
        let p1 = builder.parameter(b0, 1, Representation::Integer32);
        let sum = builder.add(b0, Representation::Integer32, p0, p1);
        builder.mark_can_overflow(sum);
        let tagged = builder.change(b0, sum, Representation::Tagged);
        builder.ret(b0, tagged);
        builder.set_start_environment(vec![p0, p1]);
        let graph = builder.finish();

        with_builder(&graph, |builder| {
            assert!(matches!(
                builder.run(),
                Err(LowerError::Unsupported {
                    feature: "overflowing int32 tagging"
                })
            ));
        });
    }
}
