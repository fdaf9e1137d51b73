//! Runtime entry addresses
//!
//! Every collaborator generated code calls lives at a fixed address in the
//! runtime range. The simulator stops on a branch into the range and hands
//! the entry to the runtime, which returns through `lr`.

use crate::layout::{RUNTIME_BASE, RUNTIME_STRIDE};

macro_rules! runtime_entries {
    ($($(#[$doc:meta])* $variant:ident => $name:literal;)*) => {
        /// A runtime function reachable from generated code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RuntimeEntry {
            $($(#[$doc])* $variant,)*
        }

        impl RuntimeEntry {
            /// Every entry, in address order.
            pub const ALL: &'static [RuntimeEntry] = &[$(RuntimeEntry::$variant,)*];

            /// Symbolic name used in listings.
            pub fn name(self) -> &'static str {
                match self {
                    $(RuntimeEntry::$variant => $name,)*
                }
            }
        }
    };
}

runtime_entries! {
    /// `x1` bytecode: resolve the cache entry at bcp
    Resolve => "InterpreterRuntime::resolve";
    /// `x1` klass: allocate an instance into vm_result
    New => "InterpreterRuntime::_new";
    /// `x1` element type, `x2` length: allocate an array into vm_result
    NewArray => "InterpreterRuntime::newarray";
    /// `x1` exception index, `x2` message code: exception into vm_result
    CreateException => "InterpreterRuntime::create_exception";
    /// `x1` exception index, `x2` offending object: exception into vm_result
    CreateKlassException => "InterpreterRuntime::create_klass_exception";
    /// `x1` index: throw ArrayIndexOutOfBoundsException
    ThrowArrayIndexOutOfBounds => "InterpreterRuntime::throw_ArrayIndexOutOfBoundsException";
    /// Throw IllegalMonitorStateException
    ThrowIllegalMonitorState => "InterpreterRuntime::throw_illegal_monitor_state_exception";
    /// Replace the exception in vm_result with IllegalMonitorStateException
    NewIllegalMonitorState => "InterpreterRuntime::new_illegal_monitor_state_exception";
    /// Throw IncompatibleClassChangeError
    ThrowIncompatibleClassChange => "InterpreterRuntime::throw_IncompatibleClassChangeError";
    /// Rethrow the pending exception
    ThrowPendingException => "InterpreterRuntime::throw_pending_exception";
    /// `x1` exception: handler entry into `x0`, exception into vm_result
    ExceptionHandlerForException => "InterpreterRuntime::exception_handler_for_exception";
    /// `x1` monitor record: lock its object
    MonitorEnter => "InterpreterRuntime::monitorenter";
    /// `x1` monitor record: unlock its object and clear the record
    MonitorExit => "InterpreterRuntime::monitorexit";
    /// Invocation counter overflow
    FrequencyCounterOverflow => "InterpreterRuntime::frequency_counter_overflow";
    /// `x1` method: link the native function and signature handler
    PrepareNativeCall => "InterpreterRuntime::prepare_native_call";
    /// Debugger method entry event
    PostMethodEntry => "InterpreterRuntime::post_method_entry";
    /// `x1` tos: debugger method exit event
    PostMethodExit => "InterpreterRuntime::post_method_exit";
    /// Block until the pending safepoint completes
    AtSafepoint => "InterpreterRuntime::at_safepoint";
    /// Leaf, `x0` pc: 1 if the pc is in interpreter code
    InterpreterContains => "InterpreterRuntime::interpreter_contains";
    /// Leaf, `x0` thread, `x1` src, `x2` dest: move outgoing arguments
    PopframeMoveOutgoingArgs => "InterpreterRuntime::popframe_move_outgoing_args";
    /// Leaf, `x0` thread, `x1` bytes, `x2` start: save popped arguments
    PopframePreserveArgs => "Deoptimization::popframe_preserve_args";
    /// `x1` tos, `x2` x0, `x3` v0 bits: trace the bytecode at bcp
    TraceBytecode => "SharedRuntime::trace_bytecode";
    /// Leaf, `x0` thread, `x1` return address: handler for the caller
    ExceptionHandlerForReturnAddress => "SharedRuntime::exception_handler_for_return_address";
    /// Throw StackOverflowError
    ThrowStackOverflowError => "SharedRuntime::throw_StackOverflowError";
    /// Throw AbstractMethodError
    ThrowAbstractMethodError => "SharedRuntime::throw_AbstractMethodError";
    /// Throw NullPointerException
    ThrowNullPointerException => "SharedRuntime::throw_NullPointerException";
    /// Leaf, `x0` thread: honor a safepoint or suspend after a native call
    CheckSpecialConditionForNativeTrans => "JavaThread::check_special_condition_for_native_trans";
    /// Leaf: re-protect the yellow zone
    ReguardYellowPages => "SharedRuntime::reguard_yellow_pages";
    /// Leaf, `v0`: sine
    DSin => "SharedRuntime::dsin";
    /// Leaf, `v0`: cosine
    DCos => "SharedRuntime::dcos";
    /// Leaf, `v0`: tangent
    DTan => "SharedRuntime::dtan";
    /// Leaf, `v0`: natural logarithm
    DLog => "SharedRuntime::dlog";
    /// Leaf, `v0`: base 10 logarithm
    DLog10 => "SharedRuntime::dlog10";
    /// Leaf, `v0`: exponential
    DExp => "SharedRuntime::dexp";
    /// Leaf, `v0` base, `v1` exponent: power
    DPow => "SharedRuntime::dpow";
    /// Leaf, `x0` referent: SATB pre-barrier
    G1WbPre => "SharedRuntime::g1_wb_pre";
    /// Leaf, `x0` oop: check an oop
    VerifyOop => "MacroAssembler::debug_verify_oop";
}

impl RuntimeEntry {
    /// Position in [`RuntimeEntry::ALL`].
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&e| e == self).unwrap_or(0)
    }

    /// Address generated code branches to.
    pub fn address(self) -> u64 {
        RUNTIME_BASE + self.index() as u64 * RUNTIME_STRIDE
    }

    /// Entry at `addr`, if `addr` is an entry address.
    pub fn from_address(addr: u64) -> Option<Self> {
        let offset = addr.checked_sub(RUNTIME_BASE)?;
        if offset % RUNTIME_STRIDE != 0 {
            return None;
        }
        Self::ALL.get((offset / RUNTIME_STRIDE) as usize).copied()
    }

    /// Leaf entries run without a last Java frame and never transition the
    /// thread to the VM state.
    pub fn is_leaf(self) -> bool {
        matches!(
            self,
            RuntimeEntry::InterpreterContains
                | RuntimeEntry::PopframeMoveOutgoingArgs
                | RuntimeEntry::PopframePreserveArgs
                | RuntimeEntry::ExceptionHandlerForReturnAddress
                | RuntimeEntry::CheckSpecialConditionForNativeTrans
                | RuntimeEntry::ReguardYellowPages
                | RuntimeEntry::DSin
                | RuntimeEntry::DCos
                | RuntimeEntry::DTan
                | RuntimeEntry::DLog
                | RuntimeEntry::DLog10
                | RuntimeEntry::DExp
                | RuntimeEntry::DPow
                | RuntimeEntry::G1WbPre
                | RuntimeEntry::VerifyOop
        )
    }
}

impl std::fmt::Display for RuntimeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
