//! Error types.
//!
//! Guest exceptions are ordinary heap objects thrown and caught by generated
//! code; [`GuestException`] only names the well-known classes the runtime
//! itself instantiates. [`VmError`] covers every failure outside guest
//! semantics: stops, faults, linkage problems, internal errors.

use thiserror::Error;

/// Well-known exception classes created by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestException {
    /// `java/lang/StackOverflowError`
    StackOverflow,
    /// `java/lang/ArrayIndexOutOfBoundsException`
    ArrayIndexOutOfBounds,
    /// `java/lang/ClassCastException`
    ClassCast,
    /// `java/lang/NullPointerException`
    NullPointer,
    /// `java/lang/ArithmeticException`
    Arithmetic,
    /// `java/lang/IllegalMonitorStateException`
    IllegalMonitorState,
    /// `java/lang/UnsatisfiedLinkError`
    UnsatisfiedLink,
    /// `java/lang/AbstractMethodError`
    AbstractMethod,
    /// `java/lang/NoSuchMethodError`
    NoSuchMethod,
    /// `java/lang/NoSuchFieldError`
    NoSuchField,
    /// `java/lang/NegativeArraySizeException`
    NegativeArraySize,
    /// `java/lang/NoClassDefFoundError`
    NoClassDefFound,
    /// `java/lang/IncompatibleClassChangeError`
    IncompatibleClassChange,
}

impl GuestException {
    /// Every well-known exception.
    pub const ALL: [GuestException; 13] = [
        GuestException::StackOverflow,
        GuestException::ArrayIndexOutOfBounds,
        GuestException::ClassCast,
        GuestException::NullPointer,
        GuestException::Arithmetic,
        GuestException::IllegalMonitorState,
        GuestException::UnsatisfiedLink,
        GuestException::AbstractMethod,
        GuestException::NoSuchMethod,
        GuestException::NoSuchField,
        GuestException::NegativeArraySize,
        GuestException::NoClassDefFound,
        GuestException::IncompatibleClassChange,
    ];

    /// Internal class name.
    pub fn class_name(self) -> &'static str {
        match self {
            GuestException::StackOverflow => "java/lang/StackOverflowError",
            GuestException::ArrayIndexOutOfBounds => "java/lang/ArrayIndexOutOfBoundsException",
            GuestException::ClassCast => "java/lang/ClassCastException",
            GuestException::NullPointer => "java/lang/NullPointerException",
            GuestException::Arithmetic => "java/lang/ArithmeticException",
            GuestException::IllegalMonitorState => "java/lang/IllegalMonitorStateException",
            GuestException::UnsatisfiedLink => "java/lang/UnsatisfiedLinkError",
            GuestException::AbstractMethod => "java/lang/AbstractMethodError",
            GuestException::NoSuchMethod => "java/lang/NoSuchMethodError",
            GuestException::NoSuchField => "java/lang/NoSuchFieldError",
            GuestException::NegativeArraySize => "java/lang/NegativeArraySizeException",
            GuestException::NoClassDefFound => "java/lang/NoClassDefFoundError",
            GuestException::IncompatibleClassChange => "java/lang/IncompatibleClassChangeError",
        }
    }

    /// Internal name of the direct superclass.
    pub fn super_class_name(self) -> &'static str {
        match self {
            GuestException::StackOverflow => "java/lang/VirtualMachineError",
            GuestException::ArrayIndexOutOfBounds => "java/lang/IndexOutOfBoundsException",
            GuestException::ClassCast
            | GuestException::NullPointer
            | GuestException::Arithmetic
            | GuestException::IllegalMonitorState
            | GuestException::NegativeArraySize => "java/lang/RuntimeException",
            GuestException::UnsatisfiedLink
            | GuestException::NoClassDefFound
            | GuestException::IncompatibleClassChange => "java/lang/LinkageError",
            GuestException::AbstractMethod
            | GuestException::NoSuchMethod
            | GuestException::NoSuchField => "java/lang/IncompatibleClassChangeError",
        }
    }
}

/// Kind of memory access that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccess {
    /// Load
    Read,
    /// Store
    Write,
    /// Instruction fetch
    Execute,
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MemoryAccess::Read => "read",
            MemoryAccess::Write => "write",
            MemoryAccess::Execute => "execute",
        })
    }
}

/// Errors raised by the interpreter outside guest exception semantics.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Generated code hit a `stop` instruction (a failed internal check).
    #[error("stop: {message} (pc={pc:#x})")]
    Stop {
        /// Message attached to the stop
        message: String,
        /// Address of the stop instruction
        pc: u64,
    },

    /// Generated code hit a breakpoint (bytecode counter reached the
    /// configured stop value).
    #[error("breakpoint at pc={pc:#x} after {count} bytecodes")]
    Breakpoint {
        /// Address of the breakpoint instruction
        pc: u64,
        /// Bytecode counter when the breakpoint was hit
        count: u64,
    },

    /// Access to unmapped or protected memory that no handler claimed.
    #[error("memory fault: {access} at {address:#x}")]
    MemoryFault {
        /// Faulting address
        address: u64,
        /// Kind of access
        access: MemoryAccess,
        /// Tag of the protected range hit, if any
        guard: Option<u32>,
    },

    /// The red zone of a thread stack was touched.
    #[error("fatal stack overflow at {address:#x}")]
    StackOverflowFatal {
        /// Faulting address
        address: u64,
    },

    /// Functionality not available in this configuration.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A class, method or field could not be resolved by the host API.
    #[error("linkage error: {0}")]
    Linkage(String),

    /// A class definition was rejected at load time.
    #[error("invalid class: {0}")]
    InvalidClass(String),

    /// The simulator executed more instructions than allowed.
    #[error("step limit of {0} instructions exceeded")]
    StepLimitExceeded(u64),

    /// Stub or signature handler generation failed.
    #[error("code generation failed: {0}")]
    CodeGeneration(String),

    /// Building or invoking a native call trampoline failed.
    #[error("native bridge: {0}")]
    NativeBridge(String),

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal inconsistency.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the interpreter.
pub type VmResult<T> = Result<T, VmError>;
