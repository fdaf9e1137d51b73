//! Thread structure
//!
//! The per-thread block generated code addresses through `rthread`. Only the
//! owning thread writes it, except for the popframe and suspend words which
//! the runtime sets while the thread is stopped in the VM.

use core_types::{
    Oop, PopframeCondition, StackGuardState, ThreadState, VmError, VmResult,
};
use memory_manager::AddressSpace;

/// `Oop` of the pending exception, 0 if none
pub const PENDING_EXCEPTION: i64 = 0;
/// `Oop` result of the last VM call
pub const VM_RESULT: i64 = 8;
/// Expression stack top of the last Java frame, 0 when not in the VM
pub const LAST_JAVA_SP: i64 = 16;
/// Frame pointer of the last Java frame
pub const LAST_JAVA_FP: i64 = 24;
/// Resume pc of the last Java frame
pub const LAST_JAVA_PC: i64 = 32;
/// `u32` [`ThreadState`]
pub const THREAD_STATE: i64 = 40;
/// `u32` non-zero when a suspend was requested
pub const SUSPEND_FLAGS: i64 = 44;
/// `u32` [`PopframeCondition`] bits
pub const POPFRAME_CONDITION: i64 = 48;
/// `u8` set while a synchronized method entry must not unlock
pub const DO_NOT_UNLOCK_IF_SYNCHRONIZED: i64 = 52;
/// `u32` non-zero while a debugger forces interpretation
pub const INTERP_ONLY_MODE: i64 = 56;
/// `u32` [`StackGuardState`]
pub const STACK_GUARD_STATE: i64 = 60;
/// Highest stack address
pub const STACK_BASE: i64 = 64;
/// Stack size in bytes
pub const STACK_SIZE: i64 = 72;
/// Top of the active JNI handle block
pub const ACTIVE_HANDLES: i64 = 80;
/// JNI environment passed as the first native argument
pub const JNI_ENV: i64 = 88;
/// Saved `x0` of a native call
pub const RESULT_X0: i64 = 0x100;
/// Saved `v0` of a native call
pub const RESULT_V0: i64 = 0x108;
/// First JNI handle slot
pub const HANDLE_BLOCK: i64 = 0x200;
/// Words of handles
pub const HANDLE_BLOCK_WORDS: u64 = 64;
/// Scratch area for runtime call arguments
pub const ARGS_AREA: i64 = 0x400;

/// Bit of [`PopframeCondition::PENDING`] tested by generated code.
pub const POPFRAME_PENDING_BIT: u8 = 0;
/// Bit of [`PopframeCondition::PROCESSING`] tested by generated code.
pub const POPFRAME_PROCESSING_BIT: u8 = 1;

/// Typed access to a thread block in simulated memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JavaThread {
    base: u64,
}

impl JavaThread {
    /// View the block at `base`.
    pub fn at(base: u64) -> Self {
        Self { base }
    }

    /// Block address (`rthread`).
    pub fn address(&self) -> u64 {
        self.base
    }

    fn slot(&self, offset: i64) -> u64 {
        self.base.wrapping_add(offset as u64)
    }

    /// Zero the block and record the stack bounds.
    pub fn initialize(&self, mem: &mut AddressSpace, stack_base: u64, stack_size: u64) -> VmResult<()> {
        mem.fill(self.base, crate::layout::THREAD_SIZE, 0)?;
        mem.write_u64(self.slot(STACK_BASE), stack_base)?;
        mem.write_u64(self.slot(STACK_SIZE), stack_size)?;
        mem.write_u64(self.slot(ACTIVE_HANDLES), self.slot(HANDLE_BLOCK))?;
        mem.write_u64(self.slot(JNI_ENV), self.slot(JNI_ENV))?;
        mem.write_u32(self.slot(STACK_GUARD_STATE), StackGuardState::Enabled as u32)?;
        self.set_state(mem, ThreadState::InVm)
    }

    /// Current thread state.
    pub fn state(&self, mem: &AddressSpace) -> VmResult<ThreadState> {
        let raw = mem.read_u32(self.slot(THREAD_STATE))?;
        ThreadState::from_u32(raw)
            .ok_or_else(|| VmError::Internal(format!("corrupt thread state {}", raw)))
    }

    /// Set the thread state.
    pub fn set_state(&self, mem: &mut AddressSpace, state: ThreadState) -> VmResult<()> {
        mem.write_u32(self.slot(THREAD_STATE), state as u32)
    }

    /// Pending exception, if any.
    pub fn pending_exception(&self, mem: &AddressSpace) -> VmResult<Option<Oop>> {
        let oop = mem.read_u64(self.slot(PENDING_EXCEPTION))?;
        Ok((oop != 0).then_some(oop))
    }

    /// Set or clear the pending exception.
    pub fn set_pending_exception(&self, mem: &mut AddressSpace, oop: Oop) -> VmResult<()> {
        mem.write_u64(self.slot(PENDING_EXCEPTION), oop)
    }

    /// Set the oop result of a VM call.
    pub fn set_vm_result(&self, mem: &mut AddressSpace, oop: Oop) -> VmResult<()> {
        mem.write_u64(self.slot(VM_RESULT), oop)
    }

    /// Last Java frame as `(sp, fp, pc)`; sp is 0 when there is none.
    pub fn last_java_frame(&self, mem: &AddressSpace) -> VmResult<(u64, u64, u64)> {
        Ok((
            mem.read_u64(self.slot(LAST_JAVA_SP))?,
            mem.read_u64(self.slot(LAST_JAVA_FP))?,
            mem.read_u64(self.slot(LAST_JAVA_PC))?,
        ))
    }

    /// Popframe condition bits.
    pub fn popframe_condition(&self, mem: &AddressSpace) -> VmResult<PopframeCondition> {
        Ok(PopframeCondition::from_bits_truncate(
            mem.read_u32(self.slot(POPFRAME_CONDITION))?,
        ))
    }

    /// Replace the popframe condition bits.
    pub fn set_popframe_condition(&self, mem: &mut AddressSpace, condition: PopframeCondition) -> VmResult<()> {
        mem.write_u32(self.slot(POPFRAME_CONDITION), condition.bits())
    }

    /// Whether the synchronized-entry unlock guard is set.
    pub fn do_not_unlock_if_synchronized(&self, mem: &AddressSpace) -> VmResult<bool> {
        Ok(mem.read_u8(self.slot(DO_NOT_UNLOCK_IF_SYNCHRONIZED))? != 0)
    }

    /// Set the suspend request word.
    pub fn set_suspend_flags(&self, mem: &mut AddressSpace, flags: u32) -> VmResult<()> {
        mem.write_u32(self.slot(SUSPEND_FLAGS), flags)
    }

    /// Suspend request word.
    pub fn suspend_flags(&self, mem: &AddressSpace) -> VmResult<u32> {
        mem.read_u32(self.slot(SUSPEND_FLAGS))
    }

    /// Set interpreter-only mode.
    pub fn set_interp_only_mode(&self, mem: &mut AddressSpace, on: bool) -> VmResult<()> {
        mem.write_u32(self.slot(INTERP_ONLY_MODE), on as u32)
    }

    /// Stack guard state.
    pub fn stack_guard_state(&self, mem: &AddressSpace) -> VmResult<StackGuardState> {
        let raw = mem.read_u32(self.slot(STACK_GUARD_STATE))?;
        StackGuardState::from_u32(raw)
            .ok_or_else(|| VmError::Internal(format!("corrupt stack guard state {}", raw)))
    }

    /// Set the stack guard state.
    pub fn set_stack_guard_state(&self, mem: &mut AddressSpace, state: StackGuardState) -> VmResult<()> {
        mem.write_u32(self.slot(STACK_GUARD_STATE), state as u32)
    }

    /// Address of a scratch word of the runtime argument area.
    pub fn args_slot(&self, index: u64) -> u64 {
        self.slot(ARGS_AREA) + index * 8
    }

    /// Reset the JNI handle block and return the first free slot.
    pub fn reset_handles(&self, mem: &mut AddressSpace) -> VmResult<u64> {
        let first = self.slot(HANDLE_BLOCK);
        mem.write_u64(self.slot(ACTIVE_HANDLES), first)?;
        Ok(first)
    }

    /// Whether `addr` is a JNI handle slot of this thread.
    pub fn is_handle(&self, addr: u64) -> bool {
        let first = self.slot(HANDLE_BLOCK);
        (first..first + HANDLE_BLOCK_WORDS * 8).contains(&addr)
    }
}
