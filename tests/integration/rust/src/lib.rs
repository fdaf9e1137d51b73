//! Integration test suite for the template interpreter
//!
//! Scenario tests that drive generated code through the `Vm` host API and
//! the CLI session, across component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interp_cli;
    pub use interpreter;
}

use bytecode_system::{CodeBuilder, MethodDefinition};
use core_types::{AccessFlags, Value};
use interpreter::{CallOutcome, InterpreterConfig, Vm};

/// VM with the default configuration.
pub fn vm() -> Vm {
    vm_with(InterpreterConfig::default())
}

/// VM with `config`.
pub fn vm_with(config: InterpreterConfig) -> Vm {
    Vm::new(config).expect("interpreter generation")
}

/// Public static method with the body in `code`.
pub fn static_method(name: &str, descriptor: &str, max_locals: u16, code: &CodeBuilder) -> MethodDefinition {
    method(name, descriptor, max_locals, code).with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
}

/// Public instance method with the body in `code`.
pub fn method(name: &str, descriptor: &str, max_locals: u16, code: &CodeBuilder) -> MethodDefinition {
    MethodDefinition::new(name, descriptor)
        .with_access(AccessFlags::PUBLIC)
        .with_max_locals(max_locals)
        .with_code(code.finish().expect("labels bound"))
}

/// The value of a normal return; panics otherwise.
pub fn returned(outcome: CallOutcome) -> Value {
    match outcome {
        CallOutcome::Returned(v) => v,
        other => panic!("expected a return, got {:?}", other),
    }
}

/// Class name and message of an escaping exception; panics otherwise.
pub fn threw(outcome: &CallOutcome) -> (&str, Option<&str>) {
    match outcome {
        CallOutcome::Threw {
            class_name, message, ..
        } => (class_name.as_str(), message.as_deref()),
        other => panic!("expected an exception, got {:?}", other),
    }
}
