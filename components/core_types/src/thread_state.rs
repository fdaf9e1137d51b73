//! Per-thread states observed and updated by generated code.

/// Execution state of a guest thread.
///
/// Generated code writes these values into the thread structure as a 32-bit
/// word; the discriminants are the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ThreadState {
    /// Not yet started
    New = 2,
    /// Executing native code
    InNative = 4,
    /// Returning from native code, checking for safepoints
    InNativeTrans = 5,
    /// Executing runtime code
    InVm = 6,
    /// Executing guest code
    InJava = 8,
    /// Blocked in the runtime
    Blocked = 10,
}

impl ThreadState {
    /// Decode a stored state word.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            2 => ThreadState::New,
            4 => ThreadState::InNative,
            5 => ThreadState::InNativeTrans,
            6 => ThreadState::InVm,
            8 => ThreadState::InJava,
            10 => ThreadState::Blocked,
            _ => return None,
        })
    }
}

bitflags::bitflags! {
    /// Frame-pop request bits in the thread structure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PopframeCondition: u32 {
        /// A debugger asked for the top frame to be popped.
        const PENDING = 0x1;
        /// The pop is being carried out.
        const PROCESSING = 0x2;
        /// The caller is compiled and must re-execute after deoptimization.
        const FORCE_DEOPT_REEXECUTION = 0x4;
    }
}

/// Summary of a [`PopframeCondition`] word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopframeState {
    /// No pop requested or in progress.
    Inactive,
    /// Requested, not yet noticed by generated code.
    Pending,
    /// Being carried out.
    Processing,
    /// Finished on a compiled caller; deoptimization must re-execute the call.
    ForceDeoptReexecution,
}

impl PopframeCondition {
    /// Collapse the bits into the state they describe.
    pub fn state(self) -> PopframeState {
        if self.contains(PopframeCondition::FORCE_DEOPT_REEXECUTION) {
            PopframeState::ForceDeoptReexecution
        } else if self.contains(PopframeCondition::PROCESSING) {
            PopframeState::Processing
        } else if self.contains(PopframeCondition::PENDING) {
            PopframeState::Pending
        } else {
            PopframeState::Inactive
        }
    }
}

/// State of a thread's stack guard zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StackGuardState {
    /// Guard zones were never installed.
    Unused = 0,
    /// The yellow zone was disabled to let an overflow be handled.
    YellowDisabled = 1,
    /// Both zones are armed.
    Enabled = 2,
}

impl StackGuardState {
    /// Decode a stored state word.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => StackGuardState::Unused,
            1 => StackGuardState::YellowDisabled,
            2 => StackGuardState::Enabled,
            _ => return None,
        })
    }
}
