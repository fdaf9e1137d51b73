//! Dispatch tables and per-bytecode entry points

use super::templates::{template_for, Template};
use super::{codegen_error, implemented_bytecodes, TemplateInterpreterGenerator};
use crate::layout::dispatch_slot;
use assembler::registers::{V0, X0};
use bytecode_system::Bytecode;
use core_types::{TosState, VmResult};
use memory_manager::AddressSpace;

/// Code addresses of one bytecode, per incoming tos state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryPoint {
    entries: [u64; TosState::COUNT],
}

impl EntryPoint {
    /// Every state enters at `address`.
    pub fn uniform(address: u64) -> Self {
        Self {
            entries: [address; TosState::COUNT],
        }
    }

    /// Entry for `tos`.
    pub fn entry(&self, tos: TosState) -> u64 {
        self.entries[tos.index()]
    }

    /// Set the entry for `tos`.
    pub fn set_entry(&mut self, tos: TosState, address: u64) {
        self.entries[tos.index()] = address;
    }
}

/// `(tos, opcode)` to code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    table: Vec<u64>,
}

impl DispatchTable {
    /// Table with every slot 0.
    pub fn new() -> Self {
        Self {
            table: vec![0; TosState::COUNT * 256],
        }
    }

    /// Address for `opcode` entered with `tos` cached.
    pub fn entry(&self, tos: TosState, opcode: u8) -> u64 {
        self.table[tos.index() * 256 + opcode as usize]
    }

    /// Install `entry` for `opcode` in every state.
    pub fn set_entry(&mut self, opcode: u8, entry: &EntryPoint) {
        for tos in TosState::ALL {
            self.table[tos.index() * 256 + opcode as usize] = entry.entry(tos);
        }
    }

    /// Entry point of `opcode`.
    pub fn entry_point(&self, opcode: u8) -> EntryPoint {
        let mut ep = EntryPoint::default();
        for tos in TosState::ALL {
            ep.set_entry(tos, self.entry(tos, opcode));
        }
        ep
    }

    /// Copy into simulated memory at `base`, laid out state-major.
    pub fn write(&self, mem: &mut AddressSpace, base: u64) -> VmResult<()> {
        for tos in TosState::ALL {
            for opcode in 0..=255u8 {
                mem.write_u64(dispatch_slot(base, tos, opcode), self.entry(tos, opcode))?;
            }
        }
        Ok(())
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateInterpreterGenerator {
    pub(super) fn set_entry_points_for_all_bytes(&mut self) -> VmResult<()> {
        let unimplemented = EntryPoint::uniform(self.unimplemented_bytecode);
        for opcode in 0..=255u8 {
            self.normal_table.set_entry(opcode, &unimplemented);
        }
        for bc in implemented_bytecodes() {
            let entry = self.set_entry_points(bc)?;
            self.normal_table.set_entry(bc.as_u8(), &entry);
        }
        Ok(())
    }

    pub(super) fn set_safepoints_for_all_bytes(&mut self) {
        let unimplemented = EntryPoint::uniform(self.unimplemented_bytecode);
        for opcode in 0..=255u8 {
            if Bytecode::from_u8(opcode).is_some() {
                self.safept_table.set_entry(opcode, &self.safept_entry);
            } else {
                self.safept_table.set_entry(opcode, &unimplemented);
            }
        }
    }

    fn set_entry_points(&mut self, bc: Bytecode) -> VmResult<EntryPoint> {
        let t = template_for(bc);
        let begin = self.masm.begin_stub(bc.name()).map_err(codegen_error)?;
        let mut entry = EntryPoint::uniform(self.illegal_bytecode_sequence);
        if t.tos_in == TosState::Vtos {
            self.set_vtos_entry_points(&t, &mut entry)?;
        } else {
            self.set_short_entry_points(&t, &mut entry)?;
        }
        let stub = self.masm.end_stub().map_err(codegen_error)?;
        log::trace!("template {} at {:#x} ({} bytes)", bc.name(), begin, stub.size());
        Ok(entry)
    }

    /// A vtos template gets a push trampoline for each cached state.
    fn set_vtos_entry_points(&mut self, t: &Template, entry: &mut EntryPoint) -> VmResult<()> {
        let l = self.masm.create_label();

        entry.set_entry(TosState::Atos, self.masm.pc());
        self.masm.push_ptr(X0);
        self.masm.b(l);

        entry.set_entry(TosState::Ftos, self.masm.pc());
        self.masm.push_f(V0);
        self.masm.b(l);

        entry.set_entry(TosState::Dtos, self.masm.pc());
        self.masm.push_d(V0);
        self.masm.b(l);

        entry.set_entry(TosState::Ltos, self.masm.pc());
        self.masm.push_l(X0);
        self.masm.b(l);

        let iep = self.masm.pc();
        for tos in [TosState::Btos, TosState::Ztos, TosState::Ctos, TosState::Stos, TosState::Itos] {
            entry.set_entry(tos, iep);
        }
        self.masm.push_i(X0);

        entry.set_entry(TosState::Vtos, self.masm.pc());
        self.masm.bind(l);
        self.generate_and_dispatch(t)
    }

    /// A template expecting a cached value: vtos pops it, the matching
    /// state enters directly.
    fn set_short_entry_points(&mut self, t: &Template, entry: &mut EntryPoint) -> VmResult<()> {
        entry.set_entry(TosState::Vtos, self.masm.pc());
        self.masm.pop(t.tos_in);
        entry.set_entry(t.tos_in, self.masm.pc());
        self.generate_and_dispatch(t)
    }

    fn generate_and_dispatch(&mut self, t: &Template) -> VmResult<()> {
        if self.config().print_bytecode_histogram {
            self.histogram_bytecode(t.bytecode);
        }
        if self.config().counts_bytecodes() {
            self.count_bytecode();
        }
        if self.config().trace_bytecodes {
            self.trace_bytecode(t);
        }
        if self.config().stop_interpreter_at > 0 {
            self.stop_interpreter_at();
        }
        (t.generator)(self, t.bytecode)?;
        if !t.does_dispatch {
            let step = t.bytecode.length() as i64;
            self.masm.dispatch_next(t.tos_out, step);
        }
        Ok(())
    }
}
