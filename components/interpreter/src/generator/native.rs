//! Native method entry and result handlers

use super::{codegen_error, TemplateInterpreterGenerator};
use crate::frame;
use crate::layout::{SAFEPOINT_STATE, SERIALIZE_PAGE};
use crate::masm::NotifyMethodExitMode;
use crate::metadata::{const_method, method};
use crate::runtime::entry::RuntimeEntry;
use crate::thread;
use assembler::registers::{
    C_RARGS, ESP, LR, R13, RBCP, RFP, RLOCALS, RMETHOD, RSCRATCH1, RSCRATCH2, RTHREAD, SP, X0,
    X10, X16, X19, X2, ZR,
};
use assembler::{Address, Condition, Extend, Operand};
use core_types::{AccessFlags, BasicType, StackGuardState, ThreadState, TosState, VmResult, WORD};

impl TemplateInterpreterGenerator {
    /// Result handlers normalize a native result into the interpreter's
    /// representation: sub-word ints extended, handles unboxed.
    pub(super) fn generate_result_handlers(&mut self) -> VmResult<()> {
        self.masm.begin_stub("result handlers for native calls").map_err(codegen_error)?;
        for (i, ty) in BasicType::RESULT_HANDLER_TYPES.into_iter().enumerate() {
            self.result_handlers[i] = self.generate_result_handler_for(ty);
        }
        self.masm.end_stub().map_err(codegen_error)?;
        Ok(())
    }

    fn generate_result_handler_for(&mut self, ty: BasicType) -> u64 {
        let entry = self.masm.pc();
        match ty {
            BasicType::Boolean => {
                self.masm.andr(X0, X0, 0xffi64);
                self.masm.cmp(X0, 0i64);
                self.masm.mov_imm(RSCRATCH1, 1);
                self.masm.csel(X0, RSCRATCH1, ZR, Condition::Ne);
            }
            BasicType::Char => self.masm.extend(X0, X0, Extend::Uxth),
            BasicType::Byte => self.masm.extend(X0, X0, Extend::Sxtb),
            BasicType::Short => self.masm.extend(X0, X0, Extend::Sxth),
            BasicType::Int => self.masm.sxtw(X0, X0),
            BasicType::Object | BasicType::Array => {
                // unboxed into oop temp by the native entry
                self.masm.ldr(X0, frame::at(frame::OOP_TEMP_OFFSET));
                self.masm.verify_oop(X0);
            }
            BasicType::Long | BasicType::Void | BasicType::Float | BasicType::Double => {}
        }
        self.masm.ret(LR);
        entry
    }

    /// Activation for a native method: link on first call, move the
    /// parameters with the signature handler, call through the native
    /// bridge, then go through the thread state transitions back to Java.
    pub(super) fn generate_native_entry(&mut self, synchronized: bool) -> u64 {
        let inc_counter = self.config().inc_counter();
        let entry = self.masm.pc();

        // x2: parameter words
        self.masm.ldr(X2, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.ldrh(X2, Address::new(X2, const_method::SIZE_OF_PARAMETERS));
        self.masm.add(RLOCALS, ESP, Operand::Lsl(X2, 3));
        self.masm.sub(RLOCALS, RLOCALS, WORD);

        self.masm.andr(SP, ESP, -16i64);
        frame::build_fixed_frame(&mut self.masm, R13, true);

        let do_not_unlock = Address::new(RTHREAD, thread::DO_NOT_UNLOCK_IF_SYNCHRONIZED);
        self.masm.mov_imm(RSCRATCH2, 1);
        self.masm.strb(RSCRATCH2, do_not_unlock);

        let invocation_counter_overflow = self.masm.create_label();
        if inc_counter {
            self.generate_counter_incr(invocation_counter_overflow);
        }
        let continue_after_compile = self.masm.create_label();
        self.masm.bind(continue_after_compile);

        self.bang_stack_shadow_pages(true);

        self.masm.strb(ZR, do_not_unlock);

        if synchronized {
            self.lock_method();
        } else if self.config().debug_checks {
            let ok = self.masm.create_label();
            self.masm.ldrw(RSCRATCH1, Address::new(RMETHOD, method::ACCESS_FLAGS));
            self.masm
                .tst(RSCRATCH1, AccessFlags::SYNCHRONIZED.bits() as i64);
            self.masm.br_cond(Condition::Eq, ok);
            self.masm.stop("method needs synchronization");
            self.masm.bind(ok);
        }

        self.masm.notify_method_entry();

        // link on first call
        {
            let linked = self.masm.create_label();
            let link = self.masm.create_label();
            self.masm
                .ldr(X10, Address::new(RMETHOD, method::NATIVE_FUNCTION));
            self.masm.cbz(X10, link);
            self.masm
                .ldr(RSCRATCH1, Address::new(RMETHOD, method::SIGNATURE_HANDLER));
            self.masm.cbnz(RSCRATCH1, linked);
            self.masm.bind(link);
            self.masm
                .call_vm(None, RuntimeEntry::PrepareNativeCall, &[RMETHOD]);
            self.masm.get_method(RMETHOD);
            self.masm
                .ldr(X10, Address::new(RMETHOD, method::NATIVE_FUNCTION));
            self.masm.bind(linked);
        }

        // parameters into registers; x19: result handler
        self.masm
            .ldr(RSCRATCH1, Address::new(RMETHOD, method::SIGNATURE_HANDLER));
        self.masm.blr(RSCRATCH1);
        self.masm.mov(X19, X0);

        // static: pass the mirror through a handle in oop temp
        {
            let not_static = self.masm.create_label();
            self.masm.ldrw(RSCRATCH1, Address::new(RMETHOD, method::ACCESS_FLAGS));
            self.masm.tst(RSCRATCH1, AccessFlags::STATIC.bits() as i64);
            self.masm.br_cond(Condition::Eq, not_static);
            self.load_mirror(C_RARGS[1]);
            self.masm.str(C_RARGS[1], frame::at(frame::OOP_TEMP_OFFSET));
            self.masm
                .add(C_RARGS[1], RFP, frame::OOP_TEMP_OFFSET * WORD);
            self.masm.bind(not_static);
        }

        self.masm.add(C_RARGS[0], RTHREAD, thread::JNI_ENV);

        // room for the result registers
        self.masm.sub(RSCRATCH1, ESP, 4 * WORD);
        self.masm.andr(SP, RSCRATCH1, -16i64);

        let resume = self.masm.create_label();
        self.masm.set_last_java_frame(ESP, resume);

        self.set_thread_state(ThreadState::InNative);
        self.masm.ldrw(X16, Address::new(RMETHOD, method::CALL_FORMAT));
        self.masm.call_native(X10, X16);
        self.masm.bind(resume);

        // both result registers survive the transition on the stack
        self.masm.push(TosState::Dtos);
        self.masm.push(TosState::Ltos);

        self.set_thread_state(ThreadState::InNativeTrans);
        if self.config().use_membar {
            self.masm.dmb();
        } else {
            self.masm.load_global(RSCRATCH2, SERIALIZE_PAGE);
            self.masm.strw(ZR, Address::new(RSCRATCH2, 0));
        }

        // a safepoint or suspend request started while in native
        {
            let slow = self.masm.create_label();
            let cont = self.masm.create_label();
            self.masm.load_global(RSCRATCH2, SAFEPOINT_STATE);
            self.masm.ldrw(RSCRATCH2, Address::new(RSCRATCH2, 0));
            self.masm.cbnz(RSCRATCH2, slow);
            self.masm
                .ldrw(RSCRATCH2, Address::new(RTHREAD, thread::SUSPEND_FLAGS));
            self.masm.cbz(RSCRATCH2, cont);
            self.masm.bind(slow);
            self.masm
                .call_vm_leaf(RuntimeEntry::CheckSpecialConditionForNativeTrans, &[RTHREAD]);
            self.masm.get_method(RMETHOD);
            self.masm.bind(cont);
        }

        self.set_thread_state(ThreadState::InJava);
        self.masm.reset_last_java_frame();

        // release the handles created by the call
        self.masm.add(RSCRATCH1, RTHREAD, thread::HANDLE_BLOCK);
        self.masm
            .str(RSCRATCH1, Address::new(RTHREAD, thread::ACTIVE_HANDLES));

        // unbox an object result into oop temp, where the GC sees it
        {
            let no_oop = self.masm.create_label();
            let store = self.masm.create_label();
            let object_handler = self.result_handlers[BasicType::Object.result_handler_index()];
            self.masm.mov_imm(RSCRATCH1, object_handler);
            self.masm.cmp(X19, RSCRATCH1);
            self.masm.br_cond(Condition::Ne, no_oop);
            self.masm.pop(TosState::Ltos);
            self.masm.cbz(X0, store);
            self.masm.ldr(X0, Address::new(X0, 0));
            self.masm.bind(store);
            self.masm.str(X0, frame::at(frame::OOP_TEMP_OFFSET));
            self.masm.push(TosState::Ltos);
            self.masm.bind(no_oop);
        }

        {
            let no_reguard = self.masm.create_label();
            self.masm
                .ldrw(RSCRATCH1, Address::new(RTHREAD, thread::STACK_GUARD_STATE));
            self.masm
                .cmp(RSCRATCH1, StackGuardState::YellowDisabled as u32 as i64);
            self.masm.br_cond(Condition::Ne, no_reguard);
            self.masm
                .call_vm_leaf(RuntimeEntry::ReguardYellowPages, &[]);
            self.masm.bind(no_reguard);
        }

        // exceptions and monitor code expect a bcp
        self.masm.get_method(RMETHOD);
        self.masm.ldr(RBCP, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.add(RBCP, RBCP, const_method::CODES);

        {
            let no_exception = self.masm.create_label();
            self.masm
                .ldr(RSCRATCH1, Address::new(RTHREAD, thread::PENDING_EXCEPTION));
            self.masm.cbz(RSCRATCH1, no_exception);
            self.masm
                .call_vm(None, RuntimeEntry::ThrowPendingException, &[]);
            self.masm.should_not_reach_here();
            self.masm.bind(no_exception);
        }

        if synchronized {
            let unlock = self.masm.create_label();
            self.masm
                .add(C_RARGS[1], RFP, frame::first_monitor_offset());
            self.masm
                .ldr(RSCRATCH1, Address::new(C_RARGS[1], frame::MONITOR_OBJ_OFFSET));
            self.masm.cbnz(RSCRATCH1, unlock);
            self.masm
                .call_vm(None, RuntimeEntry::ThrowIllegalMonitorState, &[]);
            self.masm.should_not_reach_here();
            self.masm.bind(unlock);
            self.masm.unlock_object(C_RARGS[1]);
        }

        self.masm
            .notify_method_exit(TosState::Vtos, NotifyMethodExitMode::NotifyJvmti);

        self.masm.pop(TosState::Ltos);
        self.masm.pop(TosState::Dtos);
        self.masm.blr(X19);

        frame::remove_frame(&mut self.masm);
        self.masm.ret(LR);

        if inc_counter {
            self.masm.bind(invocation_counter_overflow);
            self.generate_counter_overflow(continue_after_compile);
        }
        entry
    }

    fn set_thread_state(&mut self, state: ThreadState) {
        self.masm.mov_imm(RSCRATCH1, state as u32 as u64);
        self.masm
            .strw(RSCRATCH1, Address::new(RTHREAD, thread::THREAD_STATE));
    }
}
