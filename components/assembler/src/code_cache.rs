//! Code blobs and the code cache.
//!
//! A [`CodeBlob`] is a contiguous run of instructions with its stub
//! boundaries, named marks and comments. The [`CodeCache`] places blobs at
//! increasing page-aligned addresses and answers pc lookups.

use crate::assembler::AsmError;
use crate::insn::{Insn, INSN_SIZE};
use std::fmt::Write as _;

/// A named address range inside a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubDescriptor {
    /// Stub name
    pub name: String,
    /// First instruction address
    pub begin: u64,
    /// One past the last instruction address
    pub end: u64,
}

impl StubDescriptor {
    /// Does the stub contain `pc`?
    pub fn contains(&self, pc: u64) -> bool {
        self.begin <= pc && pc < self.end
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.begin
    }
}

/// Finished code.
#[derive(Debug, Clone)]
pub struct CodeBlob {
    name: String,
    base: u64,
    insns: Vec<Insn>,
    stubs: Vec<StubDescriptor>,
    marks: Vec<(String, u64)>,
    comments: Vec<(u64, String)>,
}

impl CodeBlob {
    pub(crate) fn new(
        name: &str,
        base: u64,
        insns: Vec<Insn>,
        stubs: Vec<StubDescriptor>,
        marks: Vec<(String, u64)>,
        comments: Vec<(u64, String)>,
    ) -> Self {
        Self {
            name: name.to_string(),
            base,
            insns,
            stubs,
            marks,
            comments,
        }
    }

    /// Blob name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First address.
    pub fn begin(&self) -> u64 {
        self.base
    }

    /// One past the last address.
    pub fn end(&self) -> u64 {
        self.base + self.insns.len() as u64 * INSN_SIZE
    }

    /// Does the blob contain `pc`?
    pub fn contains(&self, pc: u64) -> bool {
        self.base <= pc && pc < self.end()
    }

    /// Instruction at `pc`.
    #[inline]
    pub fn insn_at(&self, pc: u64) -> Option<Insn> {
        if pc < self.base || pc % INSN_SIZE != 0 {
            return None;
        }
        self.insns.get(((pc - self.base) / INSN_SIZE) as usize).copied()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    /// True if the blob has no instructions.
    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Stubs, in emission order.
    pub fn stubs(&self) -> &[StubDescriptor] {
        &self.stubs
    }

    /// Address recorded under `name`.
    pub fn mark(&self, name: &str) -> Option<u64> {
        self.marks.iter().find(|(n, _)| n == name).map(|&(_, pc)| pc)
    }

    /// Listing of `[begin, end)` with stub headers and comments.
    pub fn disassemble(&self, begin: u64, end: u64) -> String {
        let mut out = String::new();
        let mut pc = begin.max(self.base);
        let end = end.min(self.end());
        while pc < end {
            if let Some(stub) = self.stubs.iter().find(|s| s.begin == pc) {
                let _ = writeln!(out, "----- {} [{:#x}, {:#x}) -----", stub.name, stub.begin, stub.end);
            }
            for (_, text) in self.comments.iter().filter(|(at, _)| *at == pc) {
                let _ = writeln!(out, "  ;; {}", text);
            }
            if let Some(insn) = self.insn_at(pc) {
                let _ = writeln!(out, "  {:#010x}: {}", pc, insn);
            }
            pc += INSN_SIZE;
        }
        out
    }
}

/// Holds every installed blob.
#[derive(Debug)]
pub struct CodeCache {
    blobs: Vec<CodeBlob>,
    next_base: u64,
    limit: u64,
}

/// Alignment of blob bases.
pub const BLOB_ALIGNMENT: u64 = 0x1000;

impl CodeCache {
    /// An empty cache covering `[base, limit)`.
    pub fn new(base: u64, limit: u64) -> Self {
        Self {
            blobs: Vec::new(),
            next_base: base,
            limit,
        }
    }

    /// Where the next blob must start.
    pub fn next_base(&self) -> u64 {
        self.next_base
    }

    /// Install a finished blob.
    pub fn install(&mut self, blob: CodeBlob) -> Result<&CodeBlob, AsmError> {
        if blob.begin() != self.next_base || blob.end() > self.limit {
            return Err(AsmError::Placement {
                name: blob.name().to_string(),
                base: blob.begin(),
                expected: self.next_base,
            });
        }
        self.next_base = (blob.end() + BLOB_ALIGNMENT).next_multiple_of(BLOB_ALIGNMENT);
        self.blobs.push(blob);
        Ok(&self.blobs[self.blobs.len() - 1])
    }

    /// Does any blob contain `pc`?
    pub fn contains(&self, pc: u64) -> bool {
        self.blob_containing(pc).is_some()
    }

    /// The blob containing `pc`.
    pub fn blob_containing(&self, pc: u64) -> Option<&CodeBlob> {
        // blobs are installed at increasing addresses
        let idx = self.blobs.partition_point(|b| b.begin() <= pc);
        let blob = self.blobs.get(idx.checked_sub(1)?)?;
        blob.contains(pc).then_some(blob)
    }

    /// Instruction at `pc`.
    #[inline]
    pub fn insn_at(&self, pc: u64) -> Option<Insn> {
        self.blob_containing(pc)?.insn_at(pc)
    }

    /// The stub containing `pc`.
    pub fn stub_containing(&self, pc: u64) -> Option<&StubDescriptor> {
        self.blob_containing(pc)?
            .stubs()
            .iter()
            .find(|s| s.contains(pc))
    }

    /// Every installed blob.
    pub fn blobs(&self) -> &[CodeBlob] {
        &self.blobs
    }

    /// Listing of the blob called `name`.
    pub fn disassemble_blob(&self, name: &str) -> Option<String> {
        let blob = self.blobs.iter().find(|b| b.name() == name)?;
        Some(blob.disassemble(blob.begin(), blob.end()))
    }
}
