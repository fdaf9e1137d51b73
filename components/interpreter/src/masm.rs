//! Interpreter macro assembler
//!
//! The [`Assembler`] plus the sequences every generated routine shares:
//! expression stack pushes and pops per tos state, dispatch, frame slot
//! access, calls into the runtime, monitor handling and activation removal.
//!
//! Register conventions at dispatch: `esp` is the expression stack top,
//! `rbcp` points at the opcode being dispatched, `rlocals` at local 0,
//! `rmethod` at the method, `rcpool` at its cache and `rdispatch` at the
//! active table. A cached tos value is in `x0` (ints, longs, references)
//! or `v0` (floats, doubles); ints are kept sign-extended.

use crate::config::InterpreterConfig;
use crate::frame;
use crate::layout::{self, ACTIVE_TABLE};
use crate::metadata::{const_method, cp_cache, method};
use crate::runtime::entry::RuntimeEntry;
use crate::thread;
use assembler::registers::{
    C_RARGS, ESP, LR, R13, RBCP, RCPOOL, RDISPATCH, RFP, RLOCALS, RMETHOD, RSCRATCH1, RSCRATCH2,
    RTHREAD, SP, V0, X0, X1, X19, X3, ZR,
};
use assembler::{Address, Assembler, Condition, FloatRegister, Label, Operand, Register};
use core_types::{AccessFlags, TosState, WORD};
use std::ops::{Deref, DerefMut};

/// Whether activation removal posts a debugger method exit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMethodExitMode {
    /// Post when the thread is in interpreter-only mode
    NotifyJvmti,
    /// Never post
    SkipNotifyJvmti,
}

/// [`Assembler`] with interpreter-specific sequences.
pub struct InterpreterMacroAssembler {
    asm: Assembler,
    config: InterpreterConfig,
    forward_exception: u64,
    preserving_args: Option<Label>,
}

impl Deref for InterpreterMacroAssembler {
    type Target = Assembler;

    fn deref(&self) -> &Assembler {
        &self.asm
    }
}

impl DerefMut for InterpreterMacroAssembler {
    fn deref_mut(&mut self) -> &mut Assembler {
        &mut self.asm
    }
}

impl InterpreterMacroAssembler {
    /// Emit at `base` under `config`.
    pub fn new(base: u64, config: &InterpreterConfig) -> Self {
        Self {
            asm: Assembler::new(base),
            config: config.clone(),
            forward_exception: 0,
            preserving_args: None,
        }
    }

    /// Settings the code is generated for.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Where VM calls go when they return with a pending exception.
    pub fn set_forward_exception(&mut self, address: u64) {
        self.forward_exception = address;
    }

    /// Enable the popframe check after VM calls, branching to `label`.
    pub fn set_preserving_args_label(&mut self, label: Label) {
        self.preserving_args = Some(label);
    }

    /// The underlying assembler.
    pub fn into_inner(self) -> Assembler {
        self.asm
    }

    // =========================================================================
    // Expression stack
    // =========================================================================

    /// Push an int.
    pub fn push_i(&mut self, r: Register) {
        self.asm.str(r, Address::Pre(ESP, -WORD));
    }

    /// Push a reference.
    pub fn push_ptr(&mut self, r: Register) {
        self.asm.str(r, Address::Pre(ESP, -WORD));
    }

    /// Push a long (two slots, value in the lower one).
    pub fn push_l(&mut self, r: Register) {
        self.asm.str(r, Address::Pre(ESP, -2 * WORD));
    }

    /// Push a float.
    pub fn push_f(&mut self, v: FloatRegister) {
        self.asm.strs(v, Address::Pre(ESP, -WORD));
    }

    /// Push a double (two slots, value in the lower one).
    pub fn push_d(&mut self, v: FloatRegister) {
        self.asm.strd(v, Address::Pre(ESP, -2 * WORD));
    }

    /// Pop an int, sign-extending.
    pub fn pop_i(&mut self, r: Register) {
        self.asm.ldrsw(r, Address::Post(ESP, WORD));
    }

    /// Pop a reference.
    pub fn pop_ptr(&mut self, r: Register) {
        self.asm.ldr(r, Address::Post(ESP, WORD));
    }

    /// Pop a long.
    pub fn pop_l(&mut self, r: Register) {
        self.asm.ldr(r, Address::Post(ESP, 2 * WORD));
    }

    /// Pop a float.
    pub fn pop_f(&mut self, v: FloatRegister) {
        self.asm.ldrs(v, Address::Post(ESP, WORD));
    }

    /// Pop a double.
    pub fn pop_d(&mut self, v: FloatRegister) {
        self.asm.ldrd(v, Address::Post(ESP, 2 * WORD));
    }

    /// Push the cached tos value of `state`.
    pub fn push(&mut self, state: TosState) {
        match state {
            TosState::Atos => {
                self.verify_oop(X0);
                self.push_ptr(X0);
            }
            TosState::Btos | TosState::Ztos | TosState::Ctos | TosState::Stos | TosState::Itos => {
                self.push_i(X0)
            }
            TosState::Ltos => self.push_l(X0),
            TosState::Ftos => self.push_f(V0),
            TosState::Dtos => self.push_d(V0),
            TosState::Vtos => {}
        }
    }

    /// Pop into the tos cache of `state`.
    pub fn pop(&mut self, state: TosState) {
        match state {
            TosState::Atos => {
                self.pop_ptr(X0);
                self.verify_oop(X0);
            }
            TosState::Btos | TosState::Ztos | TosState::Ctos | TosState::Stos | TosState::Itos => {
                self.pop_i(X0)
            }
            TosState::Ltos => self.pop_l(X0),
            TosState::Ftos => self.pop_f(V0),
            TosState::Dtos => self.pop_d(V0),
            TosState::Vtos => {}
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Point `rdispatch` at the active table.
    pub fn get_dispatch(&mut self) {
        self.asm.mov_imm(RDISPATCH, ACTIVE_TABLE);
    }

    fn dispatch_base(&mut self, state: TosState) {
        if state.index() != 0 {
            self.asm.add(RSCRATCH1, RSCRATCH1, (state.index() * 256) as i64);
        }
        self.asm.ldr(RSCRATCH2, Address::Index(RDISPATCH, RSCRATCH1, 3));
        self.asm.br(RSCRATCH2);
    }

    /// Advance `rbcp` by `step` and dispatch the opcode there.
    pub fn dispatch_next(&mut self, state: TosState, step: i64) {
        self.asm.ldrb(RSCRATCH1, Address::Pre(RBCP, step));
        self.dispatch_base(state);
    }

    /// Dispatch the opcode already loaded into `rscratch1`.
    pub fn dispatch_only(&mut self, state: TosState) {
        self.dispatch_base(state);
    }

    /// Dispatch the opcode at `rbcp` through the table at `table`.
    pub fn dispatch_via(&mut self, state: TosState, table: u64) {
        self.asm.ldrb(RSCRATCH1, Address::new(RBCP, 0));
        self.asm.mov_imm(RSCRATCH2, table + (state.index() * 256 * 8) as u64);
        self.asm.ldr(RSCRATCH2, Address::Index(RSCRATCH2, RSCRATCH1, 3));
        self.asm.br(RSCRATCH2);
    }

    // =========================================================================
    // Frame slots
    // =========================================================================

    /// Store `rbcp` into the frame.
    pub fn save_bcp(&mut self) {
        self.asm.str(RBCP, frame::at(frame::BCP_OFFSET));
    }

    /// Reload `rbcp` from the frame.
    pub fn restore_bcp(&mut self) {
        self.asm.ldr(RBCP, frame::at(frame::BCP_OFFSET));
    }

    /// Reload `rlocals` from the frame.
    pub fn restore_locals(&mut self) {
        self.asm.ldr(RLOCALS, frame::at(frame::LOCALS_OFFSET));
    }

    /// Reload `rcpool` from the frame.
    pub fn restore_constant_pool_cache(&mut self) {
        self.asm.ldr(RCPOOL, frame::at(frame::CACHE_OFFSET));
    }

    /// Load the frame's method into `r`.
    pub fn get_method(&mut self, r: Register) {
        self.asm.ldr(r, frame::at(frame::METHOD_OFFSET));
    }

    /// Reset `esp` to the monitor block top and clear last_sp.
    pub fn empty_expression_stack(&mut self) {
        self.asm.ldr(ESP, frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
        self.asm.str(ZR, frame::at(frame::LAST_SP_OFFSET));
    }

    /// Move sp below the expression stack reservation of the current method.
    ///
    /// `extra` words beyond `max_stack + 2` are kept free.
    pub fn restore_machine_sp(&mut self, extra: i64) {
        self.asm.ldr(RSCRATCH1, Address::new(RMETHOD, method::CONST_METHOD));
        self.asm.ldrh(RSCRATCH1, Address::new(RSCRATCH1, const_method::MAX_STACK));
        self.asm.add(RSCRATCH1, RSCRATCH1, 2 + extra);
        self.asm.ldr(RSCRATCH2, frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
        self.asm.sub(RSCRATCH1, RSCRATCH2, Operand::Lsl(RSCRATCH1, 3));
        self.asm.andr(SP, RSCRATCH1, -16i64);
    }

    /// Load the cache index at `rbcp + bcp_offset` into `index` and the
    /// cache entry address into `cache`.
    pub fn get_cache_and_index_at_bcp(
        &mut self,
        cache: Register,
        index: Register,
        bcp_offset: i64,
        index_size: usize,
    ) {
        if index_size == 4 {
            self.asm.ldrw(index, Address::new(RBCP, bcp_offset));
        } else {
            self.asm.ldrh(index, Address::new(RBCP, bcp_offset));
        }
        self.asm
            .add(cache, RCPOOL, Operand::Lsl(index, cp_cache::ENTRY_SHIFT));
    }

    /// Address of `field` of the cache entry in `cache`.
    pub fn cache_field(cache: Register, field: i64) -> Address {
        Address::new(cache, cp_cache::BASE + field)
    }

    // =========================================================================
    // Runtime calls
    // =========================================================================

    /// Record the last Java frame for stack walking; `pc` is bound by the
    /// caller at the resume address.
    pub fn set_last_java_frame(&mut self, last_sp: Register, pc: Label) {
        self.asm
            .str(last_sp, Address::new(RTHREAD, thread::LAST_JAVA_SP));
        self.asm.str(RFP, Address::new(RTHREAD, thread::LAST_JAVA_FP));
        self.asm.adr(RSCRATCH1, pc);
        self.asm
            .str(RSCRATCH1, Address::new(RTHREAD, thread::LAST_JAVA_PC));
    }

    /// Clear the last Java frame.
    pub fn reset_last_java_frame(&mut self) {
        self.asm.str(ZR, Address::new(RTHREAD, thread::LAST_JAVA_SP));
        self.asm.str(ZR, Address::new(RTHREAD, thread::LAST_JAVA_FP));
        self.asm.str(ZR, Address::new(RTHREAD, thread::LAST_JAVA_PC));
    }

    fn pass_args(&mut self, first: usize, args: &[Register]) {
        for (i, &arg) in args.iter().enumerate() {
            let dst = C_RARGS[first + i];
            if dst != arg {
                self.asm.mov(dst, arg);
            }
        }
    }

    /// Call a runtime function that may block, allocate or throw.
    ///
    /// `rthread` goes in `x0` and `args` in `x1..`. On return a pending
    /// popframe branches to the preserving-args entry, a pending exception
    /// is forwarded, and `oop_result` receives vm_result.
    pub fn call_vm(&mut self, oop_result: Option<Register>, entry: RuntimeEntry, args: &[Register]) {
        self.save_bcp();
        self.pass_args(1, args);
        self.asm.mov(C_RARGS[0], RTHREAD);
        let resume = self.asm.create_label();
        self.set_last_java_frame(ESP, resume);
        self.asm.mov_imm(RSCRATCH1, entry.address());
        self.asm.blr(RSCRATCH1);
        self.asm.bind(resume);
        self.reset_last_java_frame();

        if let Some(preserving_args) = self.preserving_args {
            let no_popframe = self.asm.create_label();
            self.asm
                .ldrw(RSCRATCH1, Address::new(RTHREAD, thread::POPFRAME_CONDITION));
            self.asm
                .tbz(RSCRATCH1, thread::POPFRAME_PENDING_BIT, no_popframe);
            // a VM call made while popping must not start another pop
            self.asm
                .tbnz(RSCRATCH1, thread::POPFRAME_PROCESSING_BIT, no_popframe);
            self.asm.b(preserving_args);
            self.asm.bind(no_popframe);
        }

        let ok = self.asm.create_label();
        self.asm
            .ldr(RSCRATCH1, Address::new(RTHREAD, thread::PENDING_EXCEPTION));
        self.asm.cbz(RSCRATCH1, ok);
        self.asm.mov_imm(RSCRATCH1, self.forward_exception);
        self.asm.br(RSCRATCH1);
        self.asm.bind(ok);

        if let Some(r) = oop_result {
            self.get_vm_result(r);
        }
        self.restore_bcp();
        self.restore_locals();
    }

    /// Call a runtime function that neither blocks nor throws; `args` go
    /// in `x0..`.
    pub fn call_vm_leaf(&mut self, entry: RuntimeEntry, args: &[Register]) {
        self.pass_args(0, args);
        self.asm.mov_imm(RSCRATCH1, entry.address());
        self.asm.blr(RSCRATCH1);
    }

    /// Move vm_result into `r` and clear it.
    pub fn get_vm_result(&mut self, r: Register) {
        self.asm.ldr(r, Address::new(RTHREAD, thread::VM_RESULT));
        self.asm.str(ZR, Address::new(RTHREAD, thread::VM_RESULT));
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    /// Lock the object of the monitor record in `lock_reg` (`c_rarg1`).
    pub fn lock_object(&mut self, lock_reg: Register) {
        self.call_vm(None, RuntimeEntry::MonitorEnter, &[lock_reg]);
    }

    /// Unlock the object of the monitor record in `lock_reg` (`c_rarg1`)
    /// and free the record.
    pub fn unlock_object(&mut self, lock_reg: Register) {
        self.call_vm(None, RuntimeEntry::MonitorExit, &[lock_reg]);
    }

    /// Remove the current activation.
    ///
    /// Releases the monitor of a synchronized method unless the entry never
    /// took it, checks that every `monitorenter` was matched, posts the exit
    /// event and pops the frame. A missing method monitor or a still-held
    /// monitor throws IllegalMonitorStateException when
    /// `throw_monitor_exception`; otherwise the monitor is released and,
    /// when `install_monitor_exception`, the exception being propagated is
    /// replaced by IllegalMonitorStateException.
    pub fn remove_activation(
        &mut self,
        state: TosState,
        throw_monitor_exception: bool,
        install_monitor_exception: bool,
        notify_jvmdi: bool,
    ) {
        let unlocked = self.asm.create_label();
        let unlock = self.asm.create_label();
        let no_unlock = self.asm.create_label();

        let do_not_unlock = Address::new(RTHREAD, thread::DO_NOT_UNLOCK_IF_SYNCHRONIZED);
        self.asm.ldrb(X3, do_not_unlock);
        self.asm.emit(assembler::Insn::Str {
            rt: ZR,
            addr: do_not_unlock,
            width: assembler::Width::B,
        });

        self.get_method(X1);
        self.asm.ldrw(C_RARGS[2], Address::new(X1, method::ACCESS_FLAGS));
        self.asm
            .tst(C_RARGS[2], AccessFlags::SYNCHRONIZED.bits() as i64);
        self.asm.br_cond(Condition::Eq, unlocked);

        // the entry failed before locking
        self.asm.cbnz(X3, no_unlock);

        self.push(state);
        self.asm.add(C_RARGS[1], RFP, frame::first_monitor_offset());
        self.asm
            .ldr(X0, Address::new(C_RARGS[1], frame::MONITOR_OBJ_OFFSET));
        self.asm.cbnz(X0, unlock);

        self.pop(state);
        if throw_monitor_exception {
            self.call_vm(None, RuntimeEntry::ThrowIllegalMonitorState, &[]);
            self.should_not_reach_here();
        } else {
            if install_monitor_exception {
                self.call_vm(None, RuntimeEntry::NewIllegalMonitorState, &[]);
            }
            self.asm.b(unlocked);
        }

        self.asm.bind(unlock);
        self.unlock_object(C_RARGS[1]);
        self.pop(state);

        self.asm.bind(unlocked);
        {
            let restart = self.asm.create_label();
            let loop_ = self.asm.create_label();
            let entry = self.asm.create_label();
            let exception = self.asm.create_label();

            self.asm.bind(restart);
            self.asm
                .ldr(C_RARGS[1], frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
            self.asm
                .add(X19, RFP, frame::MONITOR_BLOCK_BOTTOM_OFFSET * WORD);
            self.asm.b(entry);

            self.asm.bind(exception);
            if throw_monitor_exception {
                self.call_vm(None, RuntimeEntry::ThrowIllegalMonitorState, &[]);
                self.should_not_reach_here();
            } else {
                self.push(state);
                self.unlock_object(C_RARGS[1]);
                self.pop(state);
                if install_monitor_exception {
                    self.call_vm(None, RuntimeEntry::NewIllegalMonitorState, &[]);
                }
                self.asm.b(restart);
            }

            self.asm.bind(loop_);
            self.asm
                .ldr(RSCRATCH1, Address::new(C_RARGS[1], frame::MONITOR_OBJ_OFFSET));
            self.asm.cbnz(RSCRATCH1, exception);
            self.asm
                .add(C_RARGS[1], C_RARGS[1], frame::MONITOR_SIZE * WORD);
            self.asm.bind(entry);
            self.asm.cmp(C_RARGS[1], X19);
            self.asm.br_cond(Condition::Ne, loop_);
        }

        self.asm.bind(no_unlock);
        let mode = if notify_jvmdi {
            NotifyMethodExitMode::NotifyJvmti
        } else {
            NotifyMethodExitMode::SkipNotifyJvmti
        };
        self.notify_method_exit(state, mode);
        frame::remove_frame(self);
    }

    // =========================================================================
    // Debugger notification
    // =========================================================================

    /// Post a method entry event when in interpreter-only mode.
    pub fn notify_method_entry(&mut self) {
        let l = self.asm.create_label();
        self.asm
            .ldrw(X3, Address::new(RTHREAD, thread::INTERP_ONLY_MODE));
        self.asm.cbz(X3, l);
        self.call_vm(None, RuntimeEntry::PostMethodEntry, &[]);
        self.asm.bind(l);
    }

    /// Post a method exit event, preserving the tos value.
    pub fn notify_method_exit(&mut self, state: TosState, mode: NotifyMethodExitMode) {
        if mode == NotifyMethodExitMode::NotifyJvmti {
            let l = self.asm.create_label();
            self.asm
                .ldrw(X3, Address::new(RTHREAD, thread::INTERP_ONLY_MODE));
            self.asm.cbz(X3, l);
            self.push(state);
            self.asm.mov_imm(C_RARGS[1], state.index() as u64);
            self.call_vm(None, RuntimeEntry::PostMethodExit, &[C_RARGS[1]]);
            self.pop(state);
            self.asm.bind(l);
        }
    }

    // =========================================================================
    // Checks
    // =========================================================================

    /// Check the oop in `r` when oop verification is on.
    pub fn verify_oop(&mut self, r: Register) {
        if !self.config.verify_oops {
            return;
        }
        self.asm.stp(X0, LR, Address::Pre(SP, -16));
        if r != X0 {
            self.asm.mov(X0, r);
        }
        self.asm.mov_imm(RSCRATCH1, RuntimeEntry::VerifyOop.address());
        self.asm.blr(RSCRATCH1);
        self.asm.ldp(X0, LR, Address::Post(SP, 16));
    }

    /// Stop unless `esp` equals the monitor block top.
    pub fn verify_frame_setup(&mut self) {
        if !self.config.debug_checks {
            return;
        }
        let l = self.asm.create_label();
        self.asm
            .ldr(RSCRATCH1, frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
        self.asm.cmp(ESP, RSCRATCH1);
        self.asm.br_cond(Condition::Eq, l);
        self.asm.stop("broken stack frame setup in interpreter");
        self.asm.bind(l);
    }

    /// Mark a path generated code must never take.
    pub fn should_not_reach_here(&mut self) {
        self.asm.stop("should not reach here");
    }

    /// Touch the page `offset` bytes below sp.
    pub fn bang_stack_with_offset(&mut self, offset: u64) {
        self.asm.mov_imm(RSCRATCH2, offset);
        self.asm.sub(RSCRATCH2, SP, RSCRATCH2);
        self.asm.ldr(ZR, Address::new(RSCRATCH2, 0));
    }

    /// Sender sp handed to a callee entry.
    pub fn prepare_to_jump_from_interpreted(&mut self) {
        self.asm.mov(R13, SP);
        self.asm.str(ESP, frame::at(frame::LAST_SP_OFFSET));
    }

    /// Jump to the interpreter entry of the method in `rmethod`.
    pub fn jump_from_interpreted(&mut self) {
        self.prepare_to_jump_from_interpreted();
        self.asm
            .ldr(RSCRATCH1, Address::new(RMETHOD, method::FROM_INTERPRETED));
        self.asm.br(RSCRATCH1);
    }

    /// Address of a VM global.
    pub fn load_global(&mut self, r: Register, global: u64) {
        debug_assert!(global < layout::METASPACE_BASE);
        self.asm.mov_imm(r, global);
    }
}
