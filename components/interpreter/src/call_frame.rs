//! Interpreter frame view for the runtime

use crate::frame::{
    BCP_OFFSET, LAST_SP_OFFSET, LINK_OFFSET, LOCALS_OFFSET, METHOD_OFFSET, MONITOR_BLOCK_BOTTOM_OFFSET,
    MONITOR_BLOCK_TOP_OFFSET, MONITOR_SIZE, OOP_TEMP_OFFSET, PREV_SP_OFFSET, RETURN_ADDRESS_OFFSET,
    SENDER_SP_OFFSET,
};
use core_types::{VmResult, WORD};
use memory_manager::AddressSpace;

/// An interpreter activation in simulated memory, addressed by its fp.
///
/// The runtime reaches the frame of the code that called it through the
/// thread's last Java fp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterFrame {
    fp: u64,
}

impl InterpreterFrame {
    /// View the frame whose saved fp lives at `fp`.
    pub fn at(fp: u64) -> Self {
        Self { fp }
    }

    /// Frame pointer.
    pub fn fp(&self) -> u64 {
        self.fp
    }

    fn slot(&self, offset: i64) -> u64 {
        self.fp.wrapping_add((offset * WORD) as u64)
    }

    fn read(&self, mem: &AddressSpace, offset: i64) -> VmResult<u64> {
        mem.read_u64(self.slot(offset))
    }

    /// `Method*`
    pub fn method(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, METHOD_OFFSET)
    }

    /// Saved bcp; 0 for native methods.
    pub fn bcp(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, BCP_OFFSET)
    }

    /// Redirect the frame to resume at `bcp`.
    pub fn set_bcp(&self, mem: &mut AddressSpace, bcp: u64) -> VmResult<()> {
        mem.write_u64(self.slot(BCP_OFFSET), bcp)
    }

    /// Address of local 0.
    pub fn locals(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, LOCALS_OFFSET)
    }

    /// Word of local `index`.
    pub fn local(&self, mem: &AddressSpace, index: u64) -> VmResult<u64> {
        let locals = self.locals(mem)?;
        mem.read_u64(locals.wrapping_sub(index * WORD as u64))
    }

    /// Caller's esp.
    pub fn sender_sp(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, SENDER_SP_OFFSET)
    }

    /// Expression stack top saved across a call, 0 otherwise.
    pub fn last_sp(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, LAST_SP_OFFSET)
    }

    /// Return address into the caller.
    pub fn return_address(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, RETURN_ADDRESS_OFFSET)
    }

    /// Caller's fp.
    pub fn link(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, LINK_OFFSET)
    }

    /// sp before the frame was built.
    pub fn prev_sp(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, PREV_SP_OFFSET)
    }

    /// Boxed object result of a native call.
    pub fn oop_temp(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, OOP_TEMP_OFFSET)
    }

    /// Monitor block top.
    pub fn monitor_block_top(&self, mem: &AddressSpace) -> VmResult<u64> {
        self.read(mem, MONITOR_BLOCK_TOP_OFFSET)
    }

    /// Addresses of the frame's monitor records, most recent first.
    pub fn monitors(&self, mem: &AddressSpace) -> VmResult<Vec<u64>> {
        let bottom = self.slot(MONITOR_BLOCK_BOTTOM_OFFSET);
        let mut record = self.monitor_block_top(mem)?;
        let mut out = Vec::new();
        while record < bottom {
            out.push(record);
            record += (MONITOR_SIZE * WORD) as u64;
        }
        Ok(out)
    }
}
