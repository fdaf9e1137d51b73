//! Core interpreter types and error handling.
//!
//! This crate provides the foundational vocabulary shared by every other
//! component of the template interpreter: top-of-stack states, basic types,
//! method entry kinds, thread states, access flags, host-side values and the
//! common error type.
//!
//! # Overview
//!
//! - [`TosState`] - Where the top-of-stack value lives between templates
//! - [`BasicType`] - Guest primitive and reference types
//! - [`MethodKind`] - Classification selecting a method's entry stub
//! - [`ThreadState`], [`PopframeCondition`], [`StackGuardState`] - Per-thread state
//! - [`AccessFlags`] - Method and class modifiers
//! - [`Value`] - A guest value as seen by the host
//! - [`VmError`] - Everything that can go wrong outside guest semantics
//!
//! # Examples
//!
//! ```
//! use core_types::{BasicType, TosState, Value};
//!
//! let v = Value::Int(7);
//! assert_eq!(v.basic_type(), BasicType::Int);
//! assert_eq!(TosState::from_basic_type(BasicType::Int), TosState::Itos);
//! assert_eq!(TosState::Ltos.slots(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod access_flags;
mod basic_type;
mod error;
mod method_kind;
mod thread_state;
mod tos;
mod value;

pub use access_flags::AccessFlags;
pub use basic_type::BasicType;
pub use error::{GuestException, MemoryAccess, VmError, VmResult};
pub use method_kind::MethodKind;
pub use thread_state::{PopframeCondition, PopframeState, StackGuardState, ThreadState};
pub use tos::TosState;
pub use value::{Oop, Value};

/// Size of a machine word in bytes.
pub const WORD_SIZE: u64 = 8;

/// Size of a machine word in bytes, as a signed offset.
pub const WORD: i64 = 8;
