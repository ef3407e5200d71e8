//! Explicit code-generation session wrapping the Cranelift JIT module.
//!
//! One session owns the native module, allocates unit ids, and keeps the
//! per-unit compiled code buffers. It is passed by `&mut` into lowering and
//! into the code-materialization bridge; a single build is in flight at a
//! time by construction.

use std::fmt;
use std::sync::Arc;

use cranelift_codegen::ir::{types, AbiParam, Signature};
use cranelift_codegen::isa::TargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use hashbrown::HashMap;
use log::debug;

use crate::error::SessionError;

/// Number of hidden leading parameters every lowered function carries
/// ahead of its declared ones (context, function object, spare slot).
pub const HIDDEN_PARAMETERS: usize = 3;

/// Identifier of one compilation unit within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

/// Counters kept across a session's lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionStats {
    pub units_registered: usize,
    pub total_compiled_code_size: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session: {} units registered, {} bytes of compiled code",
            self.units_registered, self.total_compiled_code_size
        )
    }
}

struct RegisteredUnit {
    func: FuncId,
    code: Vec<u8>,
}

/// Owner of the native module and the unit registry.
pub struct CodegenSession {
    module: JITModule,
    next_unit_id: u32,
    units: HashMap<UnitId, RegisteredUnit>,
    stats: SessionStats,
}

impl CodegenSession {
    pub fn new() -> Result<Self, SessionError> {
        let isa = create_native_isa()?;
        let builder = JITBuilder::with_isa(isa, default_libcall_names());
        Ok(Self {
            module: JITModule::new(builder),
            next_unit_id: 0,
            units: HashMap::new(),
            stats: SessionStats::default(),
        })
    }

    pub fn allocate_unit_id(&mut self) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        id
    }

    /// The native signature of a lowered function with `declared` declared
    /// parameters: all parameters and the result are machine words, and the
    /// hidden leading parameters come before the declared ones.
    pub fn unit_signature(&self, declared: usize) -> Signature {
        let mut sig = self.module.make_signature();
        for _ in 0..declared + HIDDEN_PARAMETERS {
            sig.params.push(AbiParam::new(types::I64));
        }
        sig.returns.push(AbiParam::new(types::I64));
        sig
    }

    pub fn make_context(&self) -> Context {
        self.module.make_context()
    }

    pub fn declare_unit(&mut self, unit: UnitId, sig: &Signature) -> Result<FuncId, SessionError> {
        let func = self
            .module
            .declare_function(&unit.to_string(), Linkage::Export, sig)?;
        debug!("declared {unit} as {func}");
        Ok(func)
    }

    /// Compile the finished function body and register the unit, capturing
    /// its code buffer.
    pub fn define_unit(
        &mut self,
        unit: UnitId,
        func: FuncId,
        ctx: &mut Context,
    ) -> Result<(), SessionError> {
        self.module.define_function(func, ctx)?;
        let code = ctx
            .compiled_code()
            .map(|compiled| compiled.code_buffer().to_vec())
            .unwrap_or_default();
        debug!("defined {unit}: {} bytes", code.len());
        self.module.clear_context(ctx);
        self.units.insert(unit, RegisteredUnit { func, code });
        self.stats.units_registered += 1;
        Ok(())
    }

    /// Resolve the native entry address of a registered unit, finalizing
    /// pending definitions first.
    pub fn function_address(&mut self, unit: UnitId) -> Result<usize, SessionError> {
        let func = self
            .units
            .get(&unit)
            .ok_or(SessionError::UnitNotRegistered(unit))?
            .func;
        self.module.finalize_definitions()?;
        let address = self.module.get_finalized_function(func) as usize;
        debug!("{unit} entry address {address:#x}");
        Ok(address)
    }

    /// The code buffer captured when the unit was defined.
    pub fn code_buffer(&self, unit: UnitId) -> Result<&[u8], SessionError> {
        self.units
            .get(&unit)
            .map(|u| u.code.as_slice())
            .ok_or(SessionError::UnitNotRegistered(unit))
    }

    pub fn is_registered(&self, unit: UnitId) -> bool {
        self.units.contains_key(&unit)
    }

    pub fn registered_units(&self) -> usize {
        self.units.len()
    }

    /// Account for a materialized code object of `size` bytes.
    pub fn record_code_object(&mut self, size: usize) {
        self.stats.total_compiled_code_size += size;
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

fn create_native_isa() -> Result<Arc<dyn TargetIsa>, SessionError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", "speed")
        .map_err(|error| SessionError::Isa(error.to_string()))?;
    let isa_builder = cranelift_native::builder().map_err(|error| SessionError::Isa(error.into()))?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|error| SessionError::Isa(error.to_string()))
}
