//! Machine-level code emission for the template interpreter.
//!
//! This crate provides:
//! - `registers`: the register file and the interpreter's register roles
//! - `insn`: the instruction set, modeled on AArch64
//! - `assembler`: emission with labels, stub boundaries and annotations
//! - `code_cache`: placement and pc lookup of finished code
//!
//! # Example
//!
//! ```
//! use assembler::registers::{LR, X0};
//! use assembler::{Assembler, CodeCache};
//!
//! let mut cache = CodeCache::new(0x4000_0000, 0x4100_0000);
//! let mut asm = Assembler::new(cache.next_base());
//! asm.begin_stub("identity").unwrap();
//! asm.mov(X0, X0);
//! asm.ret(LR);
//! asm.end_stub().unwrap();
//! cache.install(asm.finalize("demo").unwrap()).unwrap();
//! assert!(cache.contains(0x4000_0004));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod assembler;
pub mod code_cache;
pub mod insn;
pub mod registers;

// Re-export commonly used types
pub use assembler::{AsmError, Assembler, Label};
pub use code_cache::{CodeBlob, CodeCache, StubDescriptor};
pub use insn::{
    Address, Condition, Extend, FpBinary, FpUnary, Insn, Operand, Precision, Width, INSN_SIZE,
};
pub use registers::{FloatRegister, Register};
