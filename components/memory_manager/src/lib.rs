//! Memory Manager - simulated address space and heap management
//!
//! This component provides:
//! - A flat byte-addressed address space with protected (guard) ranges
//! - Bump-pointer arenas for metadata and heap objects
//! - The object header layout shared with generated code
//! - The SATB keep-alive queue fed by reference barriers
//!
//! Collection is out of scope: objects are never moved or freed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod address_space;
pub mod barriers;
pub mod heap;

// Re-export main types
pub use address_space::{AddressSpace, GuardRange};
pub use barriers::SatbQueue;
pub use heap::{layout, Arena, Heap, HeapStats};
