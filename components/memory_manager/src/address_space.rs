//! Flat simulated address space.
//!
//! Addresses `[0, size)` are backed by a byte vector. Ranges can be
//! protected with a tag; any access touching a protected range fails with
//! [`VmError::MemoryFault`] carrying that tag, which is how guard pages and
//! the null page are modeled. All multi-byte accesses are little-endian.

use core_types::{MemoryAccess, VmError, VmResult};

/// A protected address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardRange {
    /// First protected address
    pub start: u64,
    /// One past the last protected address
    pub end: u64,
    /// Owner-defined tag reported in faults
    pub tag: u32,
}

impl GuardRange {
    fn overlaps(&self, addr: u64, len: u64) -> bool {
        addr < self.end && self.start < addr.saturating_add(len)
    }
}

/// Byte-addressed memory with guard ranges.
#[derive(Debug)]
pub struct AddressSpace {
    bytes: Vec<u8>,
    guards: Vec<GuardRange>,
}

impl AddressSpace {
    /// Zero-filled memory of `size` bytes.
    pub fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; size as usize],
            guards: Vec::new(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Protect `[start, start + len)`.
    pub fn protect(&mut self, start: u64, len: u64, tag: u32) {
        log::debug!("protect [{:#x}, {:#x}) tag {}", start, start + len, tag);
        self.guards.push(GuardRange {
            start,
            end: start + len,
            tag,
        });
    }

    /// Remove every guard range lying inside `[start, start + len)`.
    pub fn unprotect(&mut self, start: u64, len: u64) {
        log::debug!("unprotect [{:#x}, {:#x})", start, start + len);
        self.guards
            .retain(|g| !(g.start >= start && g.end <= start + len));
    }

    /// Tag of the guard covering `addr`, if any.
    pub fn guard_at(&self, addr: u64) -> Option<u32> {
        self.guards
            .iter()
            .find(|g| g.overlaps(addr, 1))
            .map(|g| g.tag)
    }

    /// Every guard range.
    pub fn guards(&self) -> &[GuardRange] {
        &self.guards
    }

    fn check(&self, addr: u64, len: u64, access: MemoryAccess) -> VmResult<usize> {
        if let Some(g) = self.guards.iter().find(|g| g.overlaps(addr, len)) {
            return Err(VmError::MemoryFault {
                address: addr.max(g.start),
                access,
                guard: Some(g.tag),
            });
        }
        match addr.checked_add(len) {
            Some(end) if end <= self.size() => Ok(addr as usize),
            _ => Err(VmError::MemoryFault {
                address: addr,
                access,
                guard: None,
            }),
        }
    }

    /// Read `width` (1, 2, 4 or 8) bytes, zero-extended.
    #[inline]
    pub fn read(&self, addr: u64, width: u64) -> VmResult<u64> {
        let at = self.check(addr, width, MemoryAccess::Read)?;
        let mut buf = [0u8; 8];
        buf[..width as usize].copy_from_slice(&self.bytes[at..at + width as usize]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Write the low `width` bytes of `value`.
    #[inline]
    pub fn write(&mut self, addr: u64, width: u64, value: u64) -> VmResult<()> {
        let at = self.check(addr, width, MemoryAccess::Write)?;
        self.bytes[at..at + width as usize].copy_from_slice(&value.to_le_bytes()[..width as usize]);
        Ok(())
    }

    /// Read a byte.
    pub fn read_u8(&self, addr: u64) -> VmResult<u8> {
        Ok(self.read(addr, 1)? as u8)
    }

    /// Read a 16-bit value.
    pub fn read_u16(&self, addr: u64) -> VmResult<u16> {
        Ok(self.read(addr, 2)? as u16)
    }

    /// Read a 32-bit value.
    pub fn read_u32(&self, addr: u64) -> VmResult<u32> {
        Ok(self.read(addr, 4)? as u32)
    }

    /// Read a word.
    pub fn read_u64(&self, addr: u64) -> VmResult<u64> {
        self.read(addr, 8)
    }

    /// Write a byte.
    pub fn write_u8(&mut self, addr: u64, value: u8) -> VmResult<()> {
        self.write(addr, 1, value as u64)
    }

    /// Write a 16-bit value.
    pub fn write_u16(&mut self, addr: u64, value: u16) -> VmResult<()> {
        self.write(addr, 2, value as u64)
    }

    /// Write a 32-bit value.
    pub fn write_u32(&mut self, addr: u64, value: u32) -> VmResult<()> {
        self.write(addr, 4, value as u64)
    }

    /// Write a word.
    pub fn write_u64(&mut self, addr: u64, value: u64) -> VmResult<()> {
        self.write(addr, 8, value)
    }

    /// Borrow `len` bytes.
    pub fn read_bytes(&self, addr: u64, len: u64) -> VmResult<&[u8]> {
        let at = self.check(addr, len, MemoryAccess::Read)?;
        Ok(&self.bytes[at..at + len as usize])
    }

    /// Copy `data` to `addr`.
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> VmResult<()> {
        let at = self.check(addr, data.len() as u64, MemoryAccess::Write)?;
        self.bytes[at..at + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Set `len` bytes to `byte`.
    pub fn fill(&mut self, addr: u64, len: u64, byte: u8) -> VmResult<()> {
        let at = self.check(addr, len, MemoryAccess::Write)?;
        self.bytes[at..at + len as usize].fill(byte);
        Ok(())
    }
}
