//! Cranelift-compiled call trampolines
//!
//! A trampoline has the fixed signature
//! `extern "C" fn(target, gpr: *const u64, fpr: *const u64, out: *mut u64)`.
//! It loads the arguments described by its [`CallFormat`] from the two
//! register images, calls `target` with the host calling convention and
//! stores the result into `out[0]` (integers) or `out[1]` (floats).

use crate::format::{ArgKind, CallFormat, ReturnKind};
use cranelift_codegen::ir::{types, AbiParam, InstBuilder, MemFlags, Type};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use std::collections::HashMap;

type TrampolineFn = extern "C" fn(u64, *const u64, *const u64, *mut u64);

/// Result registers after a native call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeResult {
    /// Integer result, sign-extended for `int32`
    pub x0: u64,
    /// Raw bits of the floating result
    pub v0: u64,
}

/// Builds and caches one trampoline per call format.
pub struct NativeBridge {
    module: JITModule,
    ctx: Context,
    trampolines: HashMap<u32, *const u8>,
    func_counter: u32,
}

impl NativeBridge {
    /// Create a bridge targeting the host ISA.
    pub fn new() -> Result<Self, String> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| e.to_string())?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| e.to_string())?;

        let isa_builder = cranelift_native::builder().map_err(|e| e.to_string())?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| e.to_string())?;
        log::debug!("native bridge targeting {}", isa.triple());

        let builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        let module = JITModule::new(builder);
        let ctx = module.make_context();

        Ok(Self {
            module,
            ctx,
            trampolines: HashMap::new(),
            func_counter: 0,
        })
    }

    /// Number of trampolines compiled so far.
    pub fn trampoline_count(&self) -> usize {
        self.trampolines.len()
    }

    /// The trampoline for `format`, compiling it on first use.
    pub fn trampoline(&mut self, format: &CallFormat) -> Result<*const u8, String> {
        let key = format.pack();
        if let Some(&code) = self.trampolines.get(&key) {
            return Ok(code);
        }
        let code = self.compile(format)?;
        self.trampolines.insert(key, code);
        Ok(code)
    }

    /// Call `target` with arguments taken from the register images.
    ///
    /// # Safety
    ///
    /// `target` must be a host function whose C signature matches `format`.
    pub unsafe fn invoke(
        &mut self,
        target: u64,
        format: &CallFormat,
        gpr: &[u64; 8],
        fpr: &[u64; 8],
    ) -> Result<NativeResult, String> {
        if target == 0 {
            return Err("native call to null".to_string());
        }
        let code = self.trampoline(format)?;
        // SAFETY: `code` was produced by `compile` with the `TrampolineFn`
        // signature and stays mapped for the lifetime of `self.module`.
        let tramp: TrampolineFn = std::mem::transmute::<*const u8, TrampolineFn>(code);
        let mut out = [0u64; 2];
        tramp(target, gpr.as_ptr(), fpr.as_ptr(), out.as_mut_ptr());
        Ok(NativeResult {
            x0: out[0],
            v0: out[1],
        })
    }

    fn compile(&mut self, format: &CallFormat) -> Result<*const u8, String> {
        self.build_ir(format)?;

        let func_name = format!("native_trampoline_{}", self.func_counter);
        self.func_counter += 1;

        let id = self
            .module
            .declare_function(&func_name, Linkage::Export, &self.ctx.func.signature)
            .map_err(|e| e.to_string())?;
        self.module
            .define_function(id, &mut self.ctx)
            .map_err(|e| e.to_string())?;
        self.module.clear_context(&mut self.ctx);
        self.module
            .finalize_definitions()
            .map_err(|e| e.to_string())?;

        log::debug!(
            "compiled {} for format {:#x}",
            func_name,
            format.pack()
        );
        Ok(self.module.get_finalized_function(id))
    }

    fn build_ir(&mut self, format: &CallFormat) -> Result<(), String> {
        // (target, gpr, fpr, out) -> ()
        let mut sig = self.module.make_signature();
        for _ in 0..4 {
            sig.params.push(AbiParam::new(types::I64));
        }
        self.ctx.func.signature = sig;

        let mut callee_sig = self.module.make_signature();
        for arg in format.args() {
            callee_sig.params.push(AbiParam::new(arg_type(*arg)));
        }
        if let Some(ty) = return_type(format.ret()) {
            callee_sig.returns.push(AbiParam::new(ty));
        }

        let mut builder_ctx = FunctionBuilderContext::new();
        let mut builder = FunctionBuilder::new(&mut self.ctx.func, &mut builder_ctx);

        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);

        let params = builder.block_params(entry_block).to_vec();
        let (target, gpr, fpr, out) = (params[0], params[1], params[2], params[3]);
        let flags = MemFlags::trusted();

        let mut args = Vec::with_capacity(format.args().len());
        let (mut next_gp, mut next_fp) = (0i32, 0i32);
        for arg in format.args() {
            let (base, slot) = if arg.is_floating() {
                next_fp += 1;
                (fpr, next_fp - 1)
            } else {
                next_gp += 1;
                (gpr, next_gp - 1)
            };
            args.push(builder.ins().load(arg_type(*arg), flags, base, slot * 8));
        }

        let sig_ref = builder.import_signature(callee_sig);
        let call = builder.ins().call_indirect(sig_ref, target, &args);
        let results = builder.inst_results(call).to_vec();

        match (format.ret(), results.first()) {
            (ReturnKind::Void, _) => {}
            (ReturnKind::Int32, Some(&v)) => {
                let wide = builder.ins().sextend(types::I64, v);
                builder.ins().store(flags, wide, out, 0);
            }
            (ReturnKind::Word, Some(&v)) => {
                builder.ins().store(flags, v, out, 0);
            }
            (ReturnKind::Float, Some(&v)) | (ReturnKind::Double, Some(&v)) => {
                builder.ins().store(flags, v, out, 8);
            }
            (kind, None) => return Err(format!("call produced no {:?} result", kind)),
        }

        builder.ins().return_(&[]);
        builder.finalize();
        Ok(())
    }
}

fn arg_type(kind: ArgKind) -> Type {
    match kind {
        ArgKind::Word => types::I64,
        ArgKind::Int32 => types::I32,
        ArgKind::Float => types::F32,
        ArgKind::Double => types::F64,
    }
}

fn return_type(kind: ReturnKind) -> Option<Type> {
    match kind {
        ReturnKind::Void => None,
        ReturnKind::Int32 => Some(types::I32),
        ReturnKind::Word => Some(types::I64),
        ReturnKind::Float => Some(types::F32),
        ReturnKind::Double => Some(types::F64),
    }
}
