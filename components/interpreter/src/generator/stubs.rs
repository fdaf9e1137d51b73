//! Shared stub routines
//!
//! The call stub is how the host enters generated code; the remaining
//! stubs turn a pending exception into a jump to the right handler for a
//! return address.

use super::codegen_error;
use crate::config::InterpreterConfig;
use crate::masm::InterpreterMacroAssembler;
use crate::runtime::entry::RuntimeEntry;
use crate::thread;
use assembler::registers::{
    C_RARGS, ESP, LR, R13, RFP, RMETHOD, RSCRATCH1, RSCRATCH2, RTHREAD, SP, V0, X0, X19, X2, X20,
    X21, X22, X23, X24, X25, X26, X27, X28, X3, X4, X5, ZR,
};
use assembler::{Address, CodeCache, Condition};
use core_types::{VmResult, WORD};

/// Words the call stub saves below its fp: result address, thread, the
/// ten callee-saved registers and the sp handed to the callee, rounded up
/// to keep sp aligned.
pub const CALL_STUB_SAVE_WORDS: i64 = 14;

/// Slot holding the sp the callee must return with.
const CALLEE_SP_OFFSET: i64 = -13 * WORD;

/// Addresses of the shared stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StubRoutines {
    /// Host entry into generated code
    pub call_stub: u64,
    /// Where a method entered through the call stub returns
    pub call_stub_return: u64,
    /// Where an exception escaping to the call stub is caught
    pub catch_exception: u64,
    /// Dispatches a pending exception to the handler for `lr`
    pub forward_exception: u64,
    /// Throws StackOverflowError in the caller
    pub throw_stack_overflow_error: u64,
    /// Throws AbstractMethodError in the caller
    pub throw_abstract_method_error: u64,
    /// Throws NullPointerException in the caller
    pub throw_null_pointer_exception: u64,
}

impl StubRoutines {
    /// Generate the stub blob into `code`.
    pub fn generate(code: &mut CodeCache, config: &InterpreterConfig) -> VmResult<Self> {
        let mut masm = InterpreterMacroAssembler::new(code.next_base(), config);
        let mut stubs = StubRoutines::default();

        masm.begin_stub("call stub").map_err(codegen_error)?;
        generate_call_stub(&mut masm);
        masm.end_stub().map_err(codegen_error)?;

        stubs.forward_exception = masm.begin_stub("forward exception").map_err(codegen_error)?;
        generate_forward_exception(&mut masm);
        masm.end_stub().map_err(codegen_error)?;

        // the throw stubs branch back to forward_exception
        let forward = stubs.forward_exception;
        stubs.throw_stack_overflow_error = masm
            .begin_stub("throw StackOverflowError")
            .map_err(codegen_error)?;
        generate_throw_exception(&mut masm, RuntimeEntry::ThrowStackOverflowError, forward);
        masm.end_stub().map_err(codegen_error)?;

        stubs.throw_abstract_method_error = masm
            .begin_stub("throw AbstractMethodError")
            .map_err(codegen_error)?;
        generate_throw_exception(&mut masm, RuntimeEntry::ThrowAbstractMethodError, forward);
        masm.end_stub().map_err(codegen_error)?;

        stubs.throw_null_pointer_exception = masm
            .begin_stub("throw NullPointerException")
            .map_err(codegen_error)?;
        generate_throw_exception(&mut masm, RuntimeEntry::ThrowNullPointerException, forward);
        masm.end_stub().map_err(codegen_error)?;

        let blob = masm.into_inner().finalize("stubs").map_err(codegen_error)?;
        stubs.call_stub = blob.begin();
        stubs.call_stub_return = blob
            .mark("call_stub_return")
            .ok_or_else(|| core_types::VmError::CodeGeneration("call_stub_return not marked".to_string()))?;
        stubs.catch_exception = blob
            .mark("catch_exception")
            .ok_or_else(|| core_types::VmError::CodeGeneration("catch_exception not marked".to_string()))?;
        code.install(blob).map_err(codegen_error)?;
        log::debug!("stub routines: {:?}", stubs);
        Ok(stubs)
    }
}

/// Call stub.
///
/// ```text
/// x0  result address (x0 at +0, v0 at +8)
/// x1  method
/// x2  entry point
/// x3  parameter words, first parameter first
/// x4  parameter count
/// x5  thread
/// ```
///
/// Saves the callee-saved registers, pushes the parameters onto a fresh
/// expression stack and calls the entry with `r13` = sp. The method returns
/// to `call_stub_return`, which stores the result and unwinds.
fn generate_call_stub(masm: &mut InterpreterMacroAssembler) {
    masm.stp(RFP, LR, Address::Pre(SP, -16));
    masm.mov(RFP, SP);
    masm.sub(SP, SP, CALL_STUB_SAVE_WORDS * WORD);

    masm.str(C_RARGS[0], Address::new(RFP, -WORD));
    masm.str(X5, Address::new(RFP, -2 * WORD));
    masm.stp(X19, X20, Address::new(RFP, -4 * WORD));
    masm.stp(X21, X22, Address::new(RFP, -6 * WORD));
    masm.stp(X23, X24, Address::new(RFP, -8 * WORD));
    masm.stp(X25, X26, Address::new(RFP, -10 * WORD));
    masm.stp(X27, X28, Address::new(RFP, -12 * WORD));

    masm.mov(RTHREAD, X5);
    masm.mov(RMETHOD, C_RARGS[1]);

    masm.block_comment("pass parameters");
    masm.mov(ESP, SP);
    masm.sub(RSCRATCH1, SP, assembler::Operand::Lsl(X4, 3));
    masm.andr(SP, RSCRATCH1, -16i64);
    {
        let parameters_done = masm.create_label();
        let loop_ = masm.create_label();
        masm.bind(loop_);
        masm.cbz(X4, parameters_done);
        masm.ldr(RSCRATCH2, Address::Post(X3, WORD));
        masm.str(RSCRATCH2, Address::Pre(ESP, -WORD));
        masm.sub(X4, X4, 1i64);
        masm.b(loop_);
        masm.bind(parameters_done);
    }

    masm.mov(R13, SP);
    if masm.config().debug_checks {
        masm.mov(RSCRATCH1, SP);
        masm.str(RSCRATCH1, Address::new(RFP, CALLEE_SP_OFFSET));
    }
    masm.blr(X2);

    let exit = masm.create_label();
    masm.mark("call_stub_return");
    masm.bind(exit);
    if masm.config().debug_checks {
        let ok = masm.create_label();
        masm.mov(RSCRATCH1, SP);
        masm.ldr(RSCRATCH2, Address::new(RFP, CALLEE_SP_OFFSET));
        masm.cmp(RSCRATCH1, RSCRATCH2);
        masm.br_cond(Condition::Eq, ok);
        masm.stop("call stub: activation removal did not restore sp");
        masm.bind(ok);
    }
    masm.ldr(RSCRATCH1, Address::new(RFP, -WORD));
    masm.str(X0, Address::new(RSCRATCH1, 0));
    masm.strd(V0, Address::new(RSCRATCH1, WORD));

    masm.ldp(X19, X20, Address::new(RFP, -4 * WORD));
    masm.ldp(X21, X22, Address::new(RFP, -6 * WORD));
    masm.ldp(X23, X24, Address::new(RFP, -8 * WORD));
    masm.ldp(X25, X26, Address::new(RFP, -10 * WORD));
    masm.ldp(X27, X28, Address::new(RFP, -12 * WORD));
    masm.mov(SP, RFP);
    masm.ldp(RFP, LR, Address::Post(SP, 16));
    masm.ret(LR);

    // x0: exception escaping the outermost activation
    masm.mark("catch_exception");
    masm.verify_oop(X0);
    masm.str(X0, Address::new(RTHREAD, thread::PENDING_EXCEPTION));
    masm.mov(X0, ZR);
    masm.b(exit);
}

/// Forward the pending exception to the handler for the return address
/// in `lr`, entered with the exception in `x0` and the throwing pc in `x3`.
fn generate_forward_exception(masm: &mut InterpreterMacroAssembler) {
    if masm.config().debug_checks {
        let ok = masm.create_label();
        masm.ldr(RSCRATCH1, Address::new(RTHREAD, thread::PENDING_EXCEPTION));
        masm.cbnz(RSCRATCH1, ok);
        masm.stop("StubRoutines::forward exception: no pending exception");
        masm.bind(ok);
    }

    // lr is trashed by the leaf call and is also the handler's x3
    masm.mov(C_RARGS[1], LR);
    masm.mov(X19, LR);
    masm.call_vm_leaf(
        RuntimeEntry::ExceptionHandlerForReturnAddress,
        &[RTHREAD, C_RARGS[1]],
    );
    masm.mov(LR, X19);

    masm.mov(X3, X19);
    masm.mov(X19, X0);
    masm.ldr(X0, Address::new(RTHREAD, thread::PENDING_EXCEPTION));
    masm.str(ZR, Address::new(RTHREAD, thread::PENDING_EXCEPTION));

    masm.verify_oop(X0);
    masm.br(X19);
}

/// Call `entry` to create and post an exception, then forward it.
///
/// Entered by a branch with `lr` still holding the return address into
/// the code that should see the exception.
fn generate_throw_exception(masm: &mut InterpreterMacroAssembler, entry: RuntimeEntry, forward: u64) {
    // enter
    masm.stp(RFP, LR, Address::Pre(SP, -16));
    masm.mov(RFP, SP);

    let resume = masm.create_label();
    masm.set_last_java_frame(SP, resume);
    masm.mov(C_RARGS[0], RTHREAD);
    masm.mov_imm(RSCRATCH1, entry.address());
    masm.blr(RSCRATCH1);
    masm.bind(resume);
    masm.reset_last_java_frame();

    // leave
    masm.mov(SP, RFP);
    masm.ldp(RFP, LR, Address::Post(SP, 16));

    masm.b_to(forward);
}
