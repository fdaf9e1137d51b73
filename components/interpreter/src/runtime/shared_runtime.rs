//! Leaf calls shared by stubs and generated code: exception routing by
//! return address, native-transition checks, guard re-arming, math
//! intrinsics, the SATB barrier and diagnostics.

use super::entry::RuntimeEntry;
use super::Runtime;
use crate::simulator::Cpu;
use assembler::registers::{V0, V1};
use bytecode_system::Bytecode;
use core_types::{Oop, TosState, VmError, VmResult};

/// Bytecode trace records kept.
pub const TRACE_CAPACITY: usize = 4096;

/// One traced bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    /// Executing method, `Class.name(descriptor)`
    pub method: String,
    /// Bci of the bytecode
    pub bci: u16,
    /// The bytecode, `None` for an undefined opcode
    pub bytecode: Option<Bytecode>,
    /// Tos state on entry
    pub tos: TosState,
    /// Cached integer or reference value
    pub x0: u64,
    /// Cached floating value bits
    pub v0: u64,
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.bytecode.map_or("<illegal>", Bytecode::name);
        write!(f, "{} @{} {} [{}", self.method, self.bci, name, self.tos.name())?;
        match self.tos {
            TosState::Vtos => write!(f, "]"),
            TosState::Ftos | TosState::Dtos => write!(f, " {:#x}]", self.v0),
            _ => write!(f, " {:#x}]", self.x0),
        }
    }
}

impl Runtime {
    /// Continuation for an exception arriving at `return_address`.
    pub(super) fn exception_handler_for_return_address(&self, return_address: u64) -> VmResult<u64> {
        if self.interpreter.contains(return_address) {
            Ok(self.interpreter.exceptions().rethrow_exception)
        } else if return_address == self.interpreter.stubs().call_stub_return {
            Ok(self.interpreter.stubs().catch_exception)
        } else {
            Err(VmError::Internal(format!(
                "no exception handler for return address {:#x}",
                return_address
            )))
        }
    }

    pub(super) fn trace_bytecode(&mut self, tos: u64, x0: u64, v0: u64) -> VmResult<()> {
        let tos = TosState::from_index(tos as usize)
            .ok_or_else(|| VmError::Internal(format!("trace with bad tos {}", tos)))?;
        let frame = self.last_frame()?;
        let id = self.frame_method(&frame)?;
        let bcp = frame.bcp(&self.mem)?;
        let record = TraceRecord {
            method: self.universe.event(id).to_string(),
            bci: self.universe.method(id).bci(bcp).unwrap_or(0),
            bytecode: Bytecode::from_u8(self.mem.read_u8(bcp)?),
            tos,
            x0,
            v0,
        };
        log::trace!("{}", record);
        if self.trace.len() == TRACE_CAPACITY {
            self.trace.pop_front();
        }
        self.trace.push_back(record);
        Ok(())
    }

    /// Block for a pending safepoint or suspension before returning from
    /// native code.
    pub(super) fn check_special_condition_for_native_trans(&mut self) -> VmResult<()> {
        if self.safepoints.is_synchronizing() {
            self.safepoints.at_safepoint(&mut self.mem)?;
        }
        if self.thread.suspend_flags(&self.mem)? != 0 {
            log::debug!("thread suspended on native return, resuming");
            self.thread.set_suspend_flags(&mut self.mem, 0)?;
        }
        Ok(())
    }

    pub(super) fn g1_wb_pre(&mut self, oop: Oop) {
        self.satb.enqueue(oop);
    }

    pub(super) fn verify_oop(&self, oop: Oop, pc: u64) -> VmResult<()> {
        if oop != 0 && !self.heap.is_object(oop) {
            return Err(VmError::Stop {
                message: format!("broken oop {:#x}", oop),
                pc,
            });
        }
        Ok(())
    }
}

/// Compute a math intrinsic on `v0` (and `v1` for pow) into `v0`.
pub(super) fn math(cpu: &mut Cpu, entry: RuntimeEntry) -> VmResult<()> {
    let x = f64::from_bits(cpu.freg(V0));
    let result = match entry {
        RuntimeEntry::DSin => x.sin(),
        RuntimeEntry::DCos => x.cos(),
        RuntimeEntry::DTan => x.tan(),
        RuntimeEntry::DLog => x.ln(),
        RuntimeEntry::DLog10 => x.log10(),
        RuntimeEntry::DExp => x.exp(),
        RuntimeEntry::DPow => x.powf(f64::from_bits(cpu.freg(V1))),
        other => return Err(VmError::Internal(format!("{} is not a math intrinsic", other))),
    };
    cpu.set_freg(V0, result.to_bits());
    Ok(())
}
