//! Collaborator hooks
//!
//! The runtime reports events to pluggable collaborators: a debugger
//! (method entry and exit while interpreter-only mode is on), a compilation
//! policy (invocation counter overflow), a native call observer and the
//! guard-page policy consulted before the yellow zone is re-armed.

use core_types::TosState;

/// Method an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEvent {
    /// Holder class
    pub class_name: String,
    /// Method name
    pub method_name: String,
    /// Method descriptor
    pub descriptor: String,
}

impl std::fmt::Display for MethodEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.method_name, self.descriptor)
    }
}

/// What a debugger wants done after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebuggerAction {
    /// Keep running
    #[default]
    Continue,
    /// Pop the frame that posted the event
    PopFrame,
}

/// Debugger callbacks, posted while the thread is in interpreter-only mode.
pub trait DebuggerHooks {
    /// A method's activation was set up.
    fn method_entry(&mut self, _method: &MethodEvent) -> DebuggerAction {
        DebuggerAction::Continue
    }

    /// A method is about to return (or unwind) with its result in `tos`.
    fn method_exit(&mut self, _method: &MethodEvent, _tos: TosState) -> DebuggerAction {
        DebuggerAction::Continue
    }
}

/// Decides what happens when a method gets hot.
pub trait CompilationPolicy {
    /// The invocation counter of `method` reached the threshold.
    fn invocation_counter_overflow(&mut self, method: &MethodEvent, count: u32);
}

/// Policy that only logs overflow events.
#[derive(Debug, Default)]
pub struct LoggingPolicy;

impl CompilationPolicy for LoggingPolicy {
    fn invocation_counter_overflow(&mut self, method: &MethodEvent, count: u32) {
        log::debug!("{} is hot after {} invocations", method, count);
    }
}

/// Something a native call observer asks for before the thread returns to
/// Java code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeCallRequest {
    /// Nothing
    #[default]
    None,
    /// Start a safepoint while the thread is in native code
    Safepoint,
    /// Ask the thread to suspend itself
    Suspend,
}

/// Observes native calls.
pub trait NativeCallHook {
    /// The native function at `target` returned.
    fn after_native_call(&mut self, target: u64) -> NativeCallRequest;
}

/// Whether the yellow zone may be re-armed.
pub trait GuardPolicy {
    /// Called when a disabled yellow zone could be re-protected.
    fn should_reguard(&mut self) -> bool;
}

/// Always re-arm.
#[derive(Debug, Default)]
pub struct AlwaysReguard;

impl GuardPolicy for AlwaysReguard {
    fn should_reguard(&mut self) -> bool {
        true
    }
}

/// The installed collaborators.
pub struct Hooks {
    pub(crate) debugger: Option<Box<dyn DebuggerHooks>>,
    pub(crate) compilation: Box<dyn CompilationPolicy>,
    pub(crate) native_call: Option<Box<dyn NativeCallHook>>,
    pub(crate) guard: Box<dyn GuardPolicy>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            debugger: None,
            compilation: Box::new(LoggingPolicy),
            native_call: None,
            guard: Box::new(AlwaysReguard),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("debugger", &self.debugger.is_some())
            .field("native_call", &self.native_call.is_some())
            .finish()
    }
}
