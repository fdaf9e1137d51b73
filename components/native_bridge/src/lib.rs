//! Host native call bridge
//!
//! Generated interpreter code describes a native call with a packed
//! [`CallFormat`] word and register images. The bridge compiles one
//! Cranelift trampoline per format that moves those images into the host
//! calling convention, calls the target and captures the result registers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod trampoline;

pub use format::{ArgKind, CallFormat, ReturnKind, MAX_ARGS};
pub use trampoline::{NativeBridge, NativeResult};

/// Target triple of the host the trampolines are compiled for.
pub fn host_triple() -> String {
    target_lexicon::Triple::host().to_string()
}
