//! Method entries, return entries and safepoint entries
//!
//! A method entry is reached by a branch with:
//!
//! ```text
//! rmethod  method to run
//! esp      caller's expression stack top, parameters on it
//! r13      sender sp to restore on return
//! lr       return address into the caller
//! ```
//!
//! The normal entry builds a full activation. The fast entries (empty,
//! accessor, math, `Reference.get`) return without one when they can and
//! fall back to the normal entry otherwise.

use super::{codegen_error, EntryPoint, TemplateInterpreterGenerator, RETURN_ROWS};
use crate::frame;
use crate::layout::{NORMAL_TABLE, SAFEPOINT_STATE, SATB_MARKING_ACTIVE};
use crate::metadata::{const_method, constant_pool, cp_cache, klass, method};
use crate::runtime::entry::RuntimeEntry;
use crate::thread;
use assembler::registers::{
    C_RARGS, ESP, LR, R13, RLOCALS, RMETHOD, RSCRATCH1, RSCRATCH2, RTHREAD, SP, V0, V1, X0, X1,
    X19, X2, X3, X4, X5, ZR,
};
use assembler::{Address, Condition, FpUnary, Label, Operand, Precision};
use bytecode_system::Bytecode;
use core_types::{AccessFlags, MethodKind, TosState, VmError, VmResult, WORD};
use memory_manager::layout::FIELDS_OFFSET;

/// Byte offset of `Reference.referent`, its only field.
pub const REFERENT_OFFSET: i64 = FIELDS_OFFSET;
/// Byte offset of `MethodHandle.vmtarget`, its only field.
pub const VMTARGET_OFFSET: i64 = FIELDS_OFFSET;

/// Mark on the store that zeroes one additional local.
pub const ZERO_LOCALS_MARK: &str = "zero_local";
/// The same store in the synchronized entry.
pub const ZERO_LOCALS_SYNCHRONIZED_MARK: &str = "zero_local_synchronized";

impl TemplateInterpreterGenerator {
    // =========================================================================
    // Return and safepoint entries
    // =========================================================================

    pub(super) fn generate_return_entries(&mut self) -> VmResult<()> {
        for row in 0..RETURN_ROWS {
            let (step, index_size, name) = if row == 0 {
                (3, 2, "invoke return entry points")
            } else {
                (5, 4, "invokedynamic return entry points")
            };
            self.masm.begin_stub(name).map_err(codegen_error)?;
            for tos in TosState::ALL {
                self.return_entries[row][tos.index()] = self.generate_return_entry_for(tos, step, index_size);
            }
            self.masm.end_stub().map_err(codegen_error)?;
        }
        Ok(())
    }

    /// Resume the caller after an invoke of `step` bytes: restore its
    /// registers, pop the arguments and dispatch the next bytecode.
    fn generate_return_entry_for(&mut self, state: TosState, step: i64, index_size: usize) -> u64 {
        let entry = self.masm.pc();
        self.masm.ldr(ESP, frame::at(frame::LAST_SP_OFFSET));
        self.masm.str(ZR, frame::at(frame::LAST_SP_OFFSET));
        self.masm.restore_bcp();
        self.masm.restore_locals();
        self.masm.restore_constant_pool_cache();
        self.masm.get_method(RMETHOD);

        // pop the arguments
        self.masm.get_cache_and_index_at_bcp(X1, X2, 1, index_size);
        self.masm.ldr(
            X1,
            crate::masm::InterpreterMacroAssembler::cache_field(X1, cp_cache::FLAGS),
        );
        self.masm.andr(X1, X1, cp_cache::PARAMETER_SIZE_MASK);
        self.masm.add(ESP, ESP, Operand::Lsl(X1, 3));

        self.masm.restore_machine_sp(frame::MONITOR_SIZE);
        self.masm.get_dispatch();
        self.masm.dispatch_next(state, step);
        entry
    }

    pub(super) fn generate_safepoint_entries(&mut self) -> VmResult<()> {
        self.masm.begin_stub("safepoint entry points").map_err(codegen_error)?;
        let mut entry = EntryPoint::default();
        for tos in TosState::ALL {
            let address = self.masm.pc();
            self.masm.push(tos);
            self.masm.call_vm(None, RuntimeEntry::AtSafepoint, &[]);
            self.masm.dmb();
            self.masm.dispatch_via(TosState::Vtos, NORMAL_TABLE);
            entry.set_entry(tos, address);
        }
        self.masm.end_stub().map_err(codegen_error)?;
        self.safept_entry = entry;
        Ok(())
    }

    // =========================================================================
    // Method entries
    // =========================================================================

    pub(super) fn generate_method_entries(&mut self) -> VmResult<()> {
        let zerolocals = self.method_entry(MethodKind::ZeroLocals, |g| Ok(g.generate_normal_entry(false)))?;
        self.method_entry(MethodKind::ZeroLocalsSynchronized, |g| {
            Ok(g.generate_normal_entry(true))
        })?;
        self.method_entry(MethodKind::Native, |g| Ok(g.generate_native_entry(false)))?;
        self.method_entry(MethodKind::NativeSynchronized, |g| {
            Ok(g.generate_native_entry(true))
        })?;
        self.method_entry(MethodKind::Empty, |g| Ok(g.generate_empty_entry(zerolocals)))?;
        self.method_entry(MethodKind::Accessor, |g| {
            Ok(g.generate_accessor_entry(zerolocals))
        })?;
        self.method_entry(MethodKind::Abstract, |g| Ok(g.generate_abstract_entry()))?;
        self.method_entry(MethodKind::MethodHandle, |g| {
            Ok(g.generate_method_handle_entry())
        })?;
        for kind in MethodKind::ALL.into_iter().filter(|k| k.is_math()) {
            self.method_entry(kind, |g| g.generate_math_entry(kind))?;
        }
        self.method_entry(MethodKind::ReferenceGet, |g| {
            Ok(g.generate_reference_get_entry(zerolocals))
        })?;

        if let Some(kind) = MethodKind::ALL
            .into_iter()
            .find(|k| self.method_entries[k.index()] == 0)
        {
            return Err(VmError::CodeGeneration(format!("no entry generated for {} methods", kind)));
        }
        Ok(())
    }

    fn method_entry<F>(&mut self, kind: MethodKind, body: F) -> VmResult<u64>
    where
        F: FnOnce(&mut Self) -> VmResult<u64>,
    {
        let name = format!("method entry point (kind = {})", kind);
        self.masm.begin_stub(&name).map_err(codegen_error)?;
        let entry = body(self)?;
        let stub = self.masm.end_stub().map_err(codegen_error)?;
        log::debug!("{} at {:#x} ({} bytes)", name, entry, stub.size());
        self.method_entries[kind.index()] = entry;
        Ok(entry)
    }

    /// Full activation for a bytecoded method.
    fn generate_normal_entry(&mut self, synchronized: bool) -> u64 {
        let inc_counter = self.config().inc_counter();
        let entry = self.masm.pc();

        // x2: parameter words, x3: additional locals
        self.masm.ldr(X3, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.ldrh(X2, Address::new(X3, const_method::SIZE_OF_PARAMETERS));
        self.masm.ldrh(X3, Address::new(X3, const_method::MAX_LOCALS));
        self.masm.sub(X3, X3, X2);

        self.generate_stack_overflow_check();

        // rlocals: first parameter
        self.masm.add(RLOCALS, ESP, Operand::Lsl(X2, 3));
        self.masm.sub(RLOCALS, RLOCALS, WORD);

        self.masm.sub(RSCRATCH1, ESP, Operand::Lsl(X3, 3));
        self.masm.andr(SP, RSCRATCH1, -16i64);
        {
            let exit = self.masm.create_label();
            let loop_ = self.masm.create_label();
            self.masm.cbz(X3, exit);
            self.masm.bind(loop_);
            self.masm.mark(if synchronized { ZERO_LOCALS_SYNCHRONIZED_MARK } else { ZERO_LOCALS_MARK });
            self.masm.str(ZR, Address::Post(RSCRATCH1, WORD));
            self.masm.sub(X3, X3, 1i64);
            self.masm.cbnz(X3, loop_);
            self.masm.bind(exit);
        }

        self.masm.get_dispatch();
        frame::build_fixed_frame(&mut self.masm, R13, false);

        // nothing is locked until lock_method
        let do_not_unlock = Address::new(RTHREAD, thread::DO_NOT_UNLOCK_IF_SYNCHRONIZED);
        self.masm.mov_imm(RSCRATCH2, 1);
        self.masm.strb(RSCRATCH2, do_not_unlock);

        let invocation_counter_overflow = self.masm.create_label();
        if inc_counter {
            self.generate_counter_incr(invocation_counter_overflow);
        }
        let continue_after_compile = self.masm.create_label();
        self.masm.bind(continue_after_compile);

        self.bang_stack_shadow_pages(false);

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

        self.masm.verify_frame_setup();
        self.masm.notify_method_entry();
        self.masm.dispatch_next(TosState::Vtos, 0);

        if inc_counter {
            self.masm.bind(invocation_counter_overflow);
            self.generate_counter_overflow(continue_after_compile);
        }
        entry
    }

    /// Bump the invocation counter; branch to `overflow` when it reaches
    /// the compile threshold.
    pub(super) fn generate_counter_incr(&mut self, overflow: Label) {
        let threshold = self.config().compile_threshold as u64;
        let counter = Address::new(RMETHOD, method::INVOCATION_COUNTER);
        self.masm.ldrw(RSCRATCH1, counter);
        self.masm.add(RSCRATCH1, RSCRATCH1, 1i64);
        self.masm.strw(RSCRATCH1, counter);
        self.masm.mov_imm(RSCRATCH2, threshold);
        self.masm.cmp(RSCRATCH1, RSCRATCH2);
        self.masm.br_cond(Condition::Eq, overflow);
    }

    /// Tell the compilation policy, then resume at `do_continue`.
    pub(super) fn generate_counter_overflow(&mut self, do_continue: Label) {
        // x1 = 0: overflow at method entry, not at a backward branch
        self.masm
            .call_vm(None, RuntimeEntry::FrequencyCounterOverflow, &[ZR]);
        self.masm.b(do_continue);
    }

    /// A frame larger than a page could skip the guard zones; check sp
    /// against the limit explicitly. Uses `x0`, keeps `x2` and `x3`.
    fn generate_stack_overflow_check(&mut self) {
        let page_size = self.config().page_size as i64;
        let max_pages = self.config().max_guard_pages() as i64;
        let after_frame_check = self.masm.create_label();

        // frames within a page are caught by banging
        self.masm
            .cmp(X3, (page_size - frame::OVERHEAD_SIZE) / WORD);
        self.masm.br_cond(Condition::Ls, after_frame_check);

        // bytes the new frame takes below the parameters
        self.masm.mov_imm(X0, frame::OVERHEAD_SIZE as u64);
        self.masm.add(X0, X0, Operand::Lsl(X3, 3));

        self.masm.ldr(RSCRATCH1, Address::new(RTHREAD, thread::STACK_BASE));
        self.masm.ldr(RSCRATCH2, Address::new(RTHREAD, thread::STACK_SIZE));
        if self.config().debug_checks {
            let base_ok = self.masm.create_label();
            let size_ok = self.masm.create_label();
            self.masm.cbnz(RSCRATCH1, base_ok);
            self.masm.stop("stack base is zero");
            self.masm.bind(base_ok);
            self.masm.cbnz(RSCRATCH2, size_ok);
            self.masm.stop("stack size is zero");
            self.masm.bind(size_ok);
        }
        self.masm.sub(RSCRATCH1, RSCRATCH1, RSCRATCH2);
        self.masm.add(X0, X0, RSCRATCH1);
        self.masm.mov_imm(RSCRATCH2, (max_pages * page_size * 2) as u64);
        self.masm.add(X0, X0, RSCRATCH2);

        self.masm.cmp(SP, X0);
        self.masm.br_cond(Condition::Hi, after_frame_check);

        // back to the caller's sp so the throw happens in its context
        self.masm.andr(SP, R13, -16i64);
        self.masm.b_to(self.stubs.throw_stack_overflow_error);
        self.masm.bind(after_frame_check);
    }

    /// Touch each shadow page below sp so an overflow faults here, in a
    /// complete frame. Native entries touch only the deepest page.
    pub(super) fn bang_stack_shadow_pages(&mut self, native_call: bool) {
        if !self.config().use_stack_banging {
            return;
        }
        let page_size = self.config().page_size;
        let shadow_pages = self.config().stack_shadow_pages;
        let start_page = if native_call { shadow_pages } else { 1 };
        for page in start_page..=shadow_pages {
            self.masm.bang_stack_with_offset(page * page_size);
        }
    }

    /// Lock the receiver, or the class mirror of a static method, in a
    /// fresh monitor record.
    pub(super) fn lock_method(&mut self) {
        let done = self.masm.create_label();
        self.masm.ldrw(X0, Address::new(RMETHOD, method::ACCESS_FLAGS));
        self.masm.tst(X0, AccessFlags::STATIC.bits() as i64);
        self.masm.ldr(X0, Address::new(RLOCALS, 0));
        self.masm.br_cond(Condition::Eq, done);
        self.load_mirror(X0);
        self.masm.bind(done);

        if self.config().debug_checks {
            let ok = self.masm.create_label();
            self.masm.cbnz(X0, ok);
            self.masm.stop("synchronization object is NULL");
            self.masm.bind(ok);
        }

        let entry_size = frame::MONITOR_SIZE * WORD;
        self.masm.sub(SP, SP, entry_size);
        self.masm.sub(ESP, ESP, entry_size);
        self.masm.str(ESP, frame::at(frame::MONITOR_BLOCK_TOP_OFFSET));
        self.masm.str(X0, Address::new(ESP, frame::MONITOR_OBJ_OFFSET));
        self.masm.mov(C_RARGS[1], ESP);
        self.masm.lock_object(C_RARGS[1]);
    }

    /// Mirror of the holder of `rmethod` into `r`.
    pub(super) fn load_mirror(&mut self, r: assembler::Register) {
        self.masm.ldr(r, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.ldr(r, Address::new(r, const_method::CONSTANTS));
        self.masm.ldr(r, Address::new(r, constant_pool::POOL_HOLDER));
        self.masm.ldr(r, Address::new(r, klass::MIRROR));
    }

    fn safepoint_pending(&mut self, slow_path: Label) {
        self.masm.load_global(RSCRATCH2, SAFEPOINT_STATE);
        self.masm.ldrw(RSCRATCH2, Address::new(RSCRATCH2, 0));
        self.masm.cbnz(RSCRATCH2, slow_path);
    }

    /// `return` only: no frame, no counter.
    fn generate_empty_entry(&mut self, normal_entry: u64) -> u64 {
        if !self.config().use_fast_empty_methods {
            return normal_entry;
        }
        let entry = self.masm.pc();
        let slow_path = self.masm.create_label();
        self.safepoint_pending(slow_path);
        self.masm.mov(SP, R13);
        self.masm.ret(LR);

        self.masm.bind(slow_path);
        self.masm.b_to(normal_entry);
        entry
    }

    /// `aload_0; getfield; xreturn` without a frame once the field is
    /// resolved.
    fn generate_accessor_entry(&mut self, normal_entry: u64) -> u64 {
        if !self.config().use_fast_accessor_methods {
            return normal_entry;
        }
        let entry = self.masm.pc();
        let slow_path = self.masm.create_label();
        self.safepoint_pending(slow_path);

        // receiver; a null one gets its NPE from the normal entry
        self.masm.ldr(X0, Address::new(ESP, 0));
        self.masm.cbz(X0, slow_path);

        // cache entry of the getfield at bci 1
        self.masm.ldr(X3, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.ldrh(X2, Address::new(X3, const_method::CODES + 2));
        self.masm.ldr(X3, Address::new(X3, const_method::CONSTANTS));
        self.masm.ldr(X3, Address::new(X3, constant_pool::CACHE));
        self.masm.add(X3, X3, Operand::Lsl(X2, cp_cache::ENTRY_SHIFT));
        self.masm.ldrb(
            RSCRATCH1,
            crate::masm::InterpreterMacroAssembler::cache_field(X3, cp_cache::B1),
        );
        self.masm.cmp(RSCRATCH1, Bytecode::Getfield.as_u8() as i64);
        self.masm.br_cond(Condition::Ne, slow_path);

        self.masm.ldr(
            X1,
            crate::masm::InterpreterMacroAssembler::cache_field(X3, cp_cache::F2),
        );
        self.masm.ldr(
            X2,
            crate::masm::InterpreterMacroAssembler::cache_field(X3, cp_cache::FLAGS),
        );
        self.masm.lsr(X2, X2, cp_cache::TOS_STATE_SHIFT);
        self.load_field(X2, false);

        self.masm.mov(SP, R13);
        self.masm.ret(LR);

        self.masm.bind(slow_path);
        self.masm.b_to(normal_entry);
        entry
    }

    fn generate_abstract_entry(&mut self) -> u64 {
        let entry = self.masm.pc();
        self.masm.andr(SP, R13, -16i64);
        self.masm.b_to(self.stubs.throw_abstract_method_error);
        entry
    }

    /// Signature-polymorphic invoker: the receiver MethodHandle names the
    /// target in `vmtarget`. Drop the receiver and tail-call the target's
    /// entry with the remaining arguments.
    fn generate_method_handle_entry(&mut self) -> u64 {
        let entry = self.masm.pc();
        let null_receiver = self.masm.create_label();

        // x3: just above the receiver slot
        self.masm.ldr(X3, Address::new(RMETHOD, method::CONST_METHOD));
        self.masm.ldrh(X2, Address::new(X3, const_method::SIZE_OF_PARAMETERS));
        self.masm.add(X3, ESP, Operand::Lsl(X2, 3));
        self.masm.ldr(X0, Address::new(X3, -WORD));
        self.masm.cbz(X0, null_receiver);
        self.masm.ldr(RMETHOD, Address::new(X0, VMTARGET_OFFSET));

        // slide the arguments up over the receiver
        {
            let loop_ = self.masm.create_label();
            let done = self.masm.create_label();
            self.masm.sub(X4, X3, WORD);
            self.masm.bind(loop_);
            self.masm.cmp(X4, ESP);
            self.masm.br_cond(Condition::Eq, done);
            self.masm.ldr(X5, Address::new(X4, -WORD));
            self.masm.str(X5, Address::new(X4, 0));
            self.masm.sub(X4, X4, WORD);
            self.masm.b(loop_);
            self.masm.bind(done);
        }
        self.masm.add(ESP, ESP, WORD);
        self.masm
            .ldr(RSCRATCH1, Address::new(RMETHOD, method::FROM_INTERPRETED));
        self.masm.br(RSCRATCH1);

        self.masm.bind(null_receiver);
        self.masm.andr(SP, R13, -16i64);
        self.masm.b_to(self.stubs.throw_null_pointer_exception);
        entry
    }

    /// `java.lang.Math` intrinsic; doubles are read straight off the
    /// caller's expression stack.
    fn generate_math_entry(&mut self, kind: MethodKind) -> VmResult<u64> {
        let entry = self.masm.pc();
        let leaf = match kind {
            MethodKind::MathAbs | MethodKind::MathSqrt => {
                let op = if kind == MethodKind::MathAbs {
                    FpUnary::Abs
                } else {
                    FpUnary::Sqrt
                };
                self.masm.ldrd(V0, Address::new(ESP, 0));
                self.masm.funary(op, Precision::Double, V0, V0);
                self.masm.mov(SP, R13);
                self.masm.ret(LR);
                return Ok(entry);
            }
            MethodKind::MathSin => RuntimeEntry::DSin,
            MethodKind::MathCos => RuntimeEntry::DCos,
            MethodKind::MathTan => RuntimeEntry::DTan,
            MethodKind::MathLog => RuntimeEntry::DLog,
            MethodKind::MathLog10 => RuntimeEntry::DLog10,
            MethodKind::MathExp => RuntimeEntry::DExp,
            MethodKind::MathPow => RuntimeEntry::DPow,
            other => {
                return Err(VmError::CodeGeneration(format!("{} is not a math intrinsic", other)));
            }
        };
        // the leaf call clobbers lr
        self.masm.mov(X19, LR);
        if kind == MethodKind::MathPow {
            self.masm.ldrd(V0, Address::new(ESP, 2 * WORD));
            self.masm.ldrd(V1, Address::new(ESP, 0));
        } else {
            self.masm.ldrd(V0, Address::new(ESP, 0));
        }
        self.masm.mov(SP, R13);
        self.masm.call_vm_leaf(leaf, &[]);
        self.masm.ret(X19);
        Ok(entry)
    }

    /// `Reference.get`: load the referent without a frame, logging it to
    /// the SATB queue while marking is active.
    fn generate_reference_get_entry(&mut self, normal_entry: u64) -> u64 {
        let entry = self.masm.pc();
        let slow_path = self.masm.create_label();

        self.masm.ldr(X0, Address::new(ESP, 0));
        self.masm.cbz(X0, slow_path);
        self.masm.ldr(X0, Address::new(X0, REFERENT_OFFSET));

        if self.config().use_satb_barrier {
            let done = self.masm.create_label();
            self.masm.load_global(RSCRATCH2, SATB_MARKING_ACTIVE);
            self.masm.ldrb(RSCRATCH2, Address::new(RSCRATCH2, 0));
            self.masm.cbz(RSCRATCH2, done);
            self.masm.cbz(X0, done);
            self.masm.stp(X0, LR, Address::Pre(SP, -16));
            self.masm.call_vm_leaf(RuntimeEntry::G1WbPre, &[X0]);
            self.masm.ldp(X0, LR, Address::Post(SP, 16));
            self.masm.bind(done);
        }

        self.masm.mov(SP, R13);
        self.masm.ret(LR);

        self.masm.bind(slow_path);
        self.masm.b_to(normal_entry);
        entry
    }
}
