//! Template interpreter for a JVM-style bytecode
//!
//! This crate generates the machine code of an interpreter at startup and
//! runs it on an instruction-level simulator:
//! - One code template per bytecode and tos state, reached through
//!   dispatch tables in simulated memory
//! - Method entries per method kind (normal, synchronized, native,
//!   accessor, empty, math intrinsics, `Reference.get`)
//! - Exception propagation, frame popping and safepoints coordinated with
//!   the runtime
//! - Native methods called through host trampolines
//!
//! # Example
//!
//! ```
//! use interpreter::{CallOutcome, InterpreterConfig, Vm};
//! use bytecode_system::{Bytecode, ClassDefinition, CodeBuilder, MethodDefinition};
//! use core_types::{AccessFlags, Value};
//!
//! let mut vm = Vm::new(InterpreterConfig::default()).unwrap();
//! let mut code = CodeBuilder::new();
//! code.iload(0).iload(1).op(Bytecode::Iadd).op(Bytecode::Ireturn);
//! let add = MethodDefinition::new("add", "(II)I")
//!     .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
//!     .with_max_stack(2)
//!     .with_code(code.finish().unwrap());
//! vm.load_class(&ClassDefinition::new("demo/Math").with_method(add)).unwrap();
//!
//! let outcome = vm.call_static("demo/Math", "add", &[Value::Int(2), Value::Int(40)]).unwrap();
//! assert_eq!(outcome, CallOutcome::Returned(Value::Int(42)));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call_frame;
pub mod config;
pub mod frame;
pub mod generator;
pub mod layout;
pub mod masm;
pub mod metadata;
pub mod runtime;
pub mod simulator;
pub mod thread;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::InterpreterFrame;
pub use config::{ConfigError, InterpreterConfig};
pub use generator::{Interpreter, StubRoutines};
pub use runtime::hooks::{
    CompilationPolicy, DebuggerAction, DebuggerHooks, GuardPolicy, MethodEvent, NativeCallHook, NativeCallRequest,
};
pub use runtime::safepoint::{SafepointHandle, SafepointStats};
pub use runtime::{Runtime, TraceRecord};
pub use simulator::{Cpu, Simulator, StepEvent};
pub use thread::JavaThread;
pub use vm::{CallOutcome, ClassHandle, Vm};
