//! Bytecode system for the template interpreter
//!
//! This crate defines the bytecodes the interpreter implements, method and
//! field descriptors, the class definitions handed to the loader, and the
//! classification that picks a method's entry kind.
//!
//! # Features
//!
//! - Opcode table with encoded values and lengths
//! - Label-based body assembly and decoding
//! - Descriptor parsing
//! - Method kind classification
//!
//! # Example
//!
//! ```
//! use bytecode_system::{method_kind, Bytecode, CodeBuilder, KindPolicy, MethodDefinition};
//! use core_types::MethodKind;
//!
//! let mut b = CodeBuilder::new();
//! b.op(Bytecode::Return);
//! let m = MethodDefinition::new("noop", "()V").with_code(b.finish().unwrap());
//! assert_eq!(method_kind("demo/Main", &m, &KindPolicy::default()), MethodKind::Empty);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod class;
pub mod descriptor;
pub mod kind;
pub mod opcode;

// Re-export main types at crate root
pub use chunk::{BytecodeStream, CodeBuilder, Decoded, Label};
pub use class::{
    ClassDefinition, ConstantPoolEntry, ExceptionHandler, FieldDefinition, MethodDefinition,
};
pub use descriptor::{parse_field_descriptor, MethodDescriptor};
pub use kind::{method_kind, KindPolicy};
pub use opcode::{Bytecode, T_INT};
