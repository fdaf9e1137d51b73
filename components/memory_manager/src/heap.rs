//! Heap allocation.
//!
//! Objects are laid out as `[mark word][klass][fields...]`; arrays insert a
//! 32-bit length (padded to a word) before their elements. The mark word
//! holds the owning lock record while an object is locked. Allocation is a
//! bump pointer; nothing is ever reclaimed.

use crate::address_space::AddressSpace;
use core_types::{Oop, VmError, VmResult, WORD_SIZE};
use std::collections::BTreeSet;

/// Object layout shared with generated code.
pub mod layout {
    /// Mark word (lock owner record or zero)
    pub const MARK_OFFSET: i64 = 0;
    /// Klass pointer
    pub const KLASS_OFFSET: i64 = 8;
    /// First instance field
    pub const FIELDS_OFFSET: i64 = 16;
    /// Array length (32-bit)
    pub const ARRAY_LENGTH_OFFSET: i64 = 16;
    /// First array element
    pub const ARRAY_BASE_OFFSET: i64 = 24;
    /// Bytes per instance field slot
    pub const FIELD_SLOT_SIZE: i64 = 8;
}

/// Bump-pointer allocator over a range of the address space.
#[derive(Debug, Clone)]
pub struct Arena {
    start: u64,
    top: u64,
    end: u64,
}

impl Arena {
    /// Arena over `[start, start + size)`.
    pub fn new(start: u64, size: u64) -> Self {
        Self {
            start,
            top: start,
            end: start + size,
        }
    }

    /// Allocate `size` bytes aligned to `align` (a power of two).
    pub fn allocate(&mut self, size: u64, align: u64) -> Option<u64> {
        let aligned = (self.top + align - 1) & !(align - 1);
        let new_top = aligned.checked_add(size)?;
        if new_top > self.end {
            return None;
        }
        self.top = new_top;
        Some(aligned)
    }

    /// First address.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last address.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Bytes handed out.
    pub fn used(&self) -> u64 {
        self.top - self.start
    }

    /// Total bytes.
    pub fn capacity(&self) -> u64 {
        self.end - self.start
    }

    /// Does `[start, top)` contain `addr`?
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.top
    }
}

/// Allocation statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects allocated
    pub objects: u64,
    /// Arrays allocated
    pub arrays: u64,
    /// Bytes allocated
    pub bytes: u64,
}

/// The object heap.
#[derive(Debug)]
pub struct Heap {
    arena: Arena,
    starts: BTreeSet<u64>,
    stats: HeapStats,
}

impl Heap {
    /// Heap over `[start, start + size)`.
    pub fn new(start: u64, size: u64) -> Self {
        Self {
            arena: Arena::new(start, size),
            starts: BTreeSet::new(),
            stats: HeapStats::default(),
        }
    }

    fn allocate_raw(&mut self, mem: &mut AddressSpace, size: u64) -> VmResult<Oop> {
        let oop = self.arena.allocate(size, WORD_SIZE).ok_or_else(|| {
            VmError::Internal(format!(
                "heap exhausted: {} of {} bytes used",
                self.arena.used(),
                self.arena.capacity()
            ))
        })?;
        mem.fill(oop, size, 0)?;
        self.starts.insert(oop);
        self.stats.bytes += size;
        Ok(oop)
    }

    /// Allocate a zeroed instance with `field_slots` fields.
    pub fn allocate_instance(
        &mut self,
        mem: &mut AddressSpace,
        klass: u64,
        field_slots: usize,
    ) -> VmResult<Oop> {
        let size = layout::FIELDS_OFFSET as u64 + field_slots as u64 * layout::FIELD_SLOT_SIZE as u64;
        let oop = self.allocate_raw(mem, size)?;
        mem.write_u64(oop + layout::KLASS_OFFSET as u64, klass)?;
        self.stats.objects += 1;
        log::trace!("allocated instance {:#x} ({} bytes)", oop, size);
        Ok(oop)
    }

    /// Allocate a zeroed array of `length` elements of `element_size` bytes.
    pub fn allocate_array(
        &mut self,
        mem: &mut AddressSpace,
        klass: u64,
        element_size: u64,
        length: u32,
    ) -> VmResult<Oop> {
        let size = layout::ARRAY_BASE_OFFSET as u64 + element_size * length as u64;
        let oop = self.allocate_raw(mem, size)?;
        mem.write_u64(oop + layout::KLASS_OFFSET as u64, klass)?;
        mem.write_u32(oop + layout::ARRAY_LENGTH_OFFSET as u64, length)?;
        self.stats.arrays += 1;
        log::trace!("allocated array {:#x} length {}", oop, length);
        Ok(oop)
    }

    /// Is `oop` the start of an allocated object?
    pub fn is_object(&self, oop: Oop) -> bool {
        self.starts.contains(&oop)
    }

    /// Does the allocated part of the heap contain `addr`?
    pub fn contains(&self, addr: u64) -> bool {
        self.arena.contains(addr)
    }

    /// Allocation statistics.
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Bytes in use.
    pub fn used(&self) -> u64 {
        self.arena.used()
    }
}
