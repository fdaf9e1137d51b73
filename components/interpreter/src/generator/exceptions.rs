//! Exception entries
//!
//! How an exception moves through interpreted frames:
//!
//! - Code in the current frame that throws branches to `throw_exception`
//!   with the exception in `x0`. The runtime looks for a handler covering
//!   the bcp; the entry then continues at the handler (exception pushed)
//!   or at `remove_activation`.
//! - `remove_activation` pops the frame and asks where the caller's return
//!   address handles exceptions: `rethrow_exception` for an interpreted
//!   caller, the call stub's `catch_exception` otherwise.
//! - `rethrow_exception` re-establishes the caller's registers and falls
//!   into `throw_exception`.
//!
//! The popframe entry lives here too: it unwinds the current activation
//! without an exception and re-executes the caller's invoke.

use super::TemplateInterpreterGenerator;
use crate::frame;
use crate::metadata::{const_method, method};
use crate::runtime::entry::RuntimeEntry;
use crate::thread;
use assembler::registers::{C_RARGS, ESP, LR, RLOCALS, RMETHOD, RSCRATCH1, RTHREAD, SP, X0, X1, X2, X3, ZR};
use assembler::Address;
use core_types::{GuestException, PopframeCondition, TosState, VmResult, WORD};

/// No detail message.
pub const MESSAGE_NONE: u64 = 0;
/// `"/ by zero"`
pub const MESSAGE_DIVIDE_BY_ZERO: u64 = 1;

/// Detail message for a message code passed to `create_exception`.
pub fn exception_message(code: u64) -> Option<&'static str> {
    match code {
        MESSAGE_DIVIDE_BY_ZERO => Some("/ by zero"),
        _ => None,
    }
}

/// Index of `exception` passed to `create_exception`.
pub fn exception_index(exception: GuestException) -> u64 {
    GuestException::ALL
        .iter()
        .position(|&e| e == exception)
        .unwrap_or(0) as u64
}

/// Addresses of the exception entries and the local throw handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionEntries {
    /// Exception arriving in an interpreted caller through a return address
    pub rethrow_exception: u64,
    /// Exception thrown by code of the current frame
    pub throw_exception: u64,
    /// Pop the frame and forward the exception to the caller
    pub remove_activation: u64,
    /// Pop the frame and re-execute the caller's invoke
    pub remove_activation_preserving_args: u64,
    /// Yellow-zone overflow inside interpreter code
    pub throw_stack_overflow_error: u64,
    /// Index in `x1`
    pub throw_array_index_out_of_bounds: u64,
    /// Object on the expression stack
    pub throw_class_cast_exception: u64,
    /// Integer division by zero
    pub throw_arithmetic_exception: u64,
    /// Null receiver or operand
    pub throw_null_pointer_exception: u64,
}

impl TemplateInterpreterGenerator {
    pub(super) fn generate_exception_entries(&mut self) -> VmResult<()> {
        self.exceptions.remove_activation_preserving_args =
            self.stub("remove_activation_preserving_args entry", |g| {
                g.generate_remove_activation_preserving_args();
                Ok(())
            })?;

        self.stub("exception handling", |g| {
            g.generate_throw_exception();
            Ok(())
        })?;

        self.exceptions.throw_stack_overflow_error = self.stub("StackOverflowError handler", |g| {
            g.masm.restore_bcp();
            g.masm.empty_expression_stack();
            g.masm.call_vm(None, RuntimeEntry::ThrowStackOverflowError, &[]);
            g.masm.should_not_reach_here();
            Ok(())
        })?;

        self.exceptions.throw_array_index_out_of_bounds =
            self.stub("ArrayIndexOutOfBoundsException handler", |g| {
                g.masm.empty_expression_stack();
                g.masm
                    .call_vm(None, RuntimeEntry::ThrowArrayIndexOutOfBounds, &[C_RARGS[1]]);
                g.masm.should_not_reach_here();
                Ok(())
            })?;

        self.exceptions.throw_class_cast_exception = self.stub("ClassCastException handler", |g| {
            g.masm.pop_ptr(C_RARGS[2]);
            g.masm.empty_expression_stack();
            g.masm
                .mov_imm(C_RARGS[1], exception_index(GuestException::ClassCast));
            g.masm.call_vm(
                Some(X0),
                RuntimeEntry::CreateKlassException,
                &[C_RARGS[1], C_RARGS[2]],
            );
            g.masm.b_to(g.exceptions.throw_exception);
            Ok(())
        })?;

        self.exceptions.throw_arithmetic_exception = self.stub("ArithmeticException handler", |g| {
            g.generate_exception_handler(GuestException::Arithmetic, MESSAGE_DIVIDE_BY_ZERO);
            Ok(())
        })?;

        self.exceptions.throw_null_pointer_exception = self.stub("NullPointerException handler", |g| {
            g.generate_exception_handler(GuestException::NullPointer, MESSAGE_NONE);
            Ok(())
        })?;
        Ok(())
    }

    fn generate_exception_handler(&mut self, exception: GuestException, message: u64) {
        self.masm.empty_expression_stack();
        self.masm.mov_imm(C_RARGS[1], exception_index(exception));
        self.masm.mov_imm(C_RARGS[2], message);
        self.masm
            .call_vm(Some(X0), RuntimeEntry::CreateException, &[C_RARGS[1], C_RARGS[2]]);
        self.masm.b_to(self.exceptions.throw_exception);
    }

    fn generate_throw_exception(&mut self) {
        // x0: exception, x3: return address into this frame
        self.exceptions.rethrow_exception = self.masm.pc();
        self.masm.str(ZR, frame::at(frame::LAST_SP_OFFSET));
        self.masm.restore_bcp();
        self.masm.restore_locals();
        self.masm.restore_constant_pool_cache();
        self.masm.get_dispatch();

        // x0: exception, rbcp: bcp of the throwing bytecode
        self.exceptions.throw_exception = self.masm.pc();
        // a null receiver may have left rmethod pointing at the callee
        self.masm.get_method(RMETHOD);
        self.masm.verify_oop(X0);
        self.masm.mov(C_RARGS[1], X0);
        self.masm.empty_expression_stack();
        self.masm
            .call_vm(Some(X3), RuntimeEntry::ExceptionHandlerForException, &[C_RARGS[1]]);
        self.masm.restore_machine_sp(frame::MONITOR_SIZE + 2);
        // x0: handler (may be remove_activation), x3: exception
        self.masm.push_ptr(X3);
        self.masm.br(X0);

        self.exceptions.remove_activation = self.masm.pc();
        self.masm.pop_ptr(X0);
        self.masm
            .str(X0, Address::new(RTHREAD, thread::VM_RESULT));
        self.masm.remove_activation(TosState::Vtos, false, true, false);
        self.masm.get_vm_result(X0);

        // between activations: x0 exception, lr return address, rfp and
        // esp belong to the caller
        self.masm.stp(X0, LR, Address::Pre(SP, -16));
        self.masm.call_vm_leaf(
            RuntimeEntry::ExceptionHandlerForReturnAddress,
            &[RTHREAD, LR],
        );
        self.masm.mov(X1, X0);
        self.masm.ldp(X0, LR, Address::Post(SP, 16));
        self.masm.mov(X3, LR);
        self.masm.br(X1);
    }

    fn generate_remove_activation_preserving_args(&mut self) {
        let preserving_args = self.preserving_args;
        self.masm.bind(preserving_args);
        self.masm.empty_expression_stack();

        let condition = Address::new(RTHREAD, thread::POPFRAME_CONDITION);
        self.masm.ldrw(X3, condition);
        self.masm
            .orr(X3, X3, PopframeCondition::PROCESSING.bits() as i64);
        self.masm.strw(X3, condition);

        let caller_not_deoptimized = self.masm.create_label();
        self.masm.ldr(C_RARGS[0], frame::at(frame::RETURN_ADDRESS_OFFSET));
        self.masm
            .call_vm_leaf(RuntimeEntry::InterpreterContains, &[C_RARGS[0]]);
        self.masm.cbnz(X0, caller_not_deoptimized);

        // the caller is not interpreted: save the arguments for it to
        // re-execute the call
        self.masm.get_method(X0);
        self.masm.ldr(X0, Address::new(X0, method::CONST_METHOD));
        self.masm.ldrh(X0, Address::new(X0, const_method::SIZE_OF_PARAMETERS));
        self.masm.lsl(X1, X0, 3);
        self.masm.restore_locals();
        self.masm.sub(X2, RLOCALS, X1);
        self.masm.add(X2, X2, WORD);
        self.masm.call_vm_leaf(
            RuntimeEntry::PopframePreserveArgs,
            &[RTHREAD, X1, X2],
        );
        self.masm.remove_activation(TosState::Vtos, false, false, false);
        self.masm.mov_imm(
            RSCRATCH1,
            PopframeCondition::FORCE_DEOPT_REEXECUTION.bits() as u64,
        );
        self.masm.strw(RSCRATCH1, condition);
        self.masm.ret(LR);

        self.masm.bind(caller_not_deoptimized);
        self.masm.remove_activation(TosState::Vtos, false, false, false);

        // the caller's outgoing arguments are still on its expression
        // stack below last_sp
        self.masm.ldr(C_RARGS[2], frame::at(frame::LAST_SP_OFFSET));
        self.masm.call_vm_leaf(
            RuntimeEntry::PopframeMoveOutgoingArgs,
            &[RTHREAD, ESP, C_RARGS[2]],
        );

        self.masm.ldr(ESP, frame::at(frame::LAST_SP_OFFSET));
        self.masm.str(ZR, frame::at(frame::LAST_SP_OFFSET));
        self.masm.restore_bcp();
        self.masm.restore_locals();
        self.masm.restore_constant_pool_cache();
        self.masm.get_method(RMETHOD);
        self.masm.get_dispatch();
        self.masm.strw(ZR, condition);

        // re-execute the invoke
        self.masm.dispatch_next(TosState::Vtos, 0);
    }
}
