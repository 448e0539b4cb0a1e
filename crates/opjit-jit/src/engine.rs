//! Native code engine.
//!
//! One Cranelift `JITModule` per host process. Runtime helpers are
//! registered as symbols and declared as imports once; every compiled unit
//! is a local function defined and finalized immediately, so its code
//! pointer is valid as soon as `define` returns. The module is append-only
//! and never frees code.

use cranelift_codegen::ir::{types, AbiParam, FuncRef, Function, Signature, Type, UserFuncName};
use cranelift_codegen::isa::CallConv;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};

use opjit_common_core::OpId;
use opjit_runtime::jit_api::{runtime_symbols, NativeFn};
use opjit_runtime::CompiledUnit;

use crate::error::JitError;
use crate::options::JitOptions;

// =============================================================================
// Runtime helpers
// =============================================================================

/// Runtime ABI functions callable from compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Helper {
    PadSv,
    SaveClearSv,
    SvNv,
    SvSetNv,
    SvSetIv,
    SvSetUv,
    SvSetSv,
    NewMortalSv,
    PushSv,
    PopSv,
    CallRunloop,
    OpNext,
}

impl Helper {
    pub(crate) const ALL: [Helper; 12] = [
        Helper::PadSv,
        Helper::SaveClearSv,
        Helper::SvNv,
        Helper::SvSetNv,
        Helper::SvSetIv,
        Helper::SvSetUv,
        Helper::SvSetSv,
        Helper::NewMortalSv,
        Helper::PushSv,
        Helper::PopSv,
        Helper::CallRunloop,
        Helper::OpNext,
    ];

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Helper::PadSv => "opjit_pad_sv",
            Helper::SaveClearSv => "opjit_save_clearsv",
            Helper::SvNv => "opjit_sv_nv",
            Helper::SvSetNv => "opjit_sv_set_nv",
            Helper::SvSetIv => "opjit_sv_set_iv",
            Helper::SvSetUv => "opjit_sv_set_uv",
            Helper::SvSetSv => "opjit_sv_set_sv",
            Helper::NewMortalSv => "opjit_new_mortal_sv",
            Helper::PushSv => "opjit_push_sv",
            Helper::PopSv => "opjit_pop_sv",
            Helper::CallRunloop => "opjit_call_runloop",
            Helper::OpNext => "opjit_op_next",
        }
    }

    /// Must match the `extern "C"` definitions in `opjit_runtime::jit_api`.
    fn signature(self, ptr: Type, call_conv: CallConv) -> Signature {
        let mut sig = Signature::new(call_conv);
        sig.params.push(AbiParam::new(ptr)); // ctx
        let (params, ret): (&[Type], Option<Type>) = match self {
            Helper::PadSv => (&[types::I32], Some(ptr)),
            Helper::SaveClearSv => (&[types::I32], None),
            Helper::SvNv => (&[ptr], Some(types::F64)),
            Helper::SvSetNv => (&[ptr, types::F64], None),
            Helper::SvSetIv | Helper::SvSetUv => (&[ptr, types::I64], None),
            Helper::SvSetSv => (&[ptr, ptr], None),
            Helper::NewMortalSv | Helper::PopSv => (&[], Some(ptr)),
            Helper::PushSv => (&[ptr], None),
            Helper::CallRunloop => (&[types::I32], None),
            Helper::OpNext => (&[], Some(types::I32)),
        };
        sig.params.extend(params.iter().map(|&t| AbiParam::new(t)));
        sig.returns.extend(ret.map(AbiParam::new));
        sig
    }
}

/// Helper imports of one function under construction.
pub(crate) struct Helpers {
    refs: Vec<FuncRef>,
}

impl Helpers {
    pub(crate) fn get(&self, helper: Helper) -> FuncRef {
        self.refs[helper as usize]
    }
}

// =============================================================================
// JitEngine
// =============================================================================

pub struct JitEngine {
    module: JITModule,
    /// Import ids, indexed by `Helper as usize`.
    helper_ids: Vec<FuncId>,
    options: JitOptions,
    next_unit: u32,
}

impl JitEngine {
    /// Set up the host ISA and register the runtime ABI.
    pub fn new(options: JitOptions) -> Result<Self, JitError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", options.opt_level.as_setting())
            .map_err(|e| JitError::EngineInit(e.to_string()))?;
        flag_builder
            .set("enable_verifier", if options.verify { "true" } else { "false" })
            .map_err(|e| JitError::EngineInit(e.to_string()))?;

        let isa_builder =
            cranelift_native::builder().map_err(|e| JitError::EngineInit(e.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| JitError::EngineInit(e.to_string()))?;
        tracing::debug!(
            triple = %isa.triple(),
            opt_level = options.opt_level.as_setting(),
            "code engine ready"
        );

        let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
        for (name, ptr) in runtime_symbols() {
            builder.symbol(name, ptr);
        }
        let mut module = JITModule::new(builder);

        let ptr = module.target_config().pointer_type();
        let call_conv = module.target_config().default_call_conv;
        let mut helper_ids = Vec::with_capacity(Helper::ALL.len());
        for helper in Helper::ALL {
            let sig = helper.signature(ptr, call_conv);
            helper_ids.push(module.declare_function(helper.symbol(), Linkage::Import, &sig)?);
        }

        Ok(Self {
            module,
            helper_ids,
            options,
            next_unit: 0,
        })
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    /// Number of units defined so far.
    pub fn unit_count(&self) -> u32 {
        self.next_unit
    }

    pub(crate) fn pointer_type(&self) -> Type {
        self.module.target_config().pointer_type()
    }

    /// `extern "C" fn(ctx: *mut Interp) -> u32`, the `NativeFn` ABI.
    fn unit_signature(&self) -> Signature {
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(self.pointer_type()));
        sig.returns.push(AbiParam::new(types::I32));
        sig
    }

    /// Fresh function with the unit signature and every helper imported.
    pub(crate) fn new_function(&mut self) -> (String, Function, Helpers) {
        let index = self.next_unit;
        self.next_unit += 1;
        let mut func =
            Function::with_name_signature(UserFuncName::user(0, index), self.unit_signature());
        let refs = self
            .helper_ids
            .iter()
            .map(|&id| self.module.declare_func_in_func(id, &mut func))
            .collect();
        (format!("opjit_unit_{index}"), func, Helpers { refs })
    }

    /// Compile, define and finalize a unit.
    pub(crate) fn define(
        &mut self,
        name: String,
        func: Function,
        subtrees: Vec<OpId>,
    ) -> Result<CompiledUnit, JitError> {
        let id = self
            .module
            .declare_function(&name, Linkage::Local, &func.signature)?;
        let mut ctx = cranelift_codegen::Context::for_function(func);
        ctx.set_disasm(self.options.disasm);
        self.module.define_function(id, &mut ctx)?;

        let code_size = ctx
            .compiled_code()
            .map_or(0, |code| code.code_info().total_size as usize);
        if let Some(vcode) = ctx.compiled_code().and_then(|code| code.vcode.as_deref()) {
            tracing::debug!(unit = %name, "disassembly:\n{vcode}");
        }
        self.module.clear_context(&mut ctx);
        self.module.finalize_definitions()?;

        let code = self.module.get_finalized_function(id);
        // SAFETY: the function was built with `unit_signature`, which is the
        // `NativeFn` ABI, and the module keeps the code alive.
        let entry = unsafe { std::mem::transmute::<*const u8, NativeFn>(code) };
        tracing::debug!(unit = %name, code_size, fragments = subtrees.len(), "defined unit");

        Ok(CompiledUnit {
            name,
            entry,
            code_size,
            subtrees,
        })
    }
}
