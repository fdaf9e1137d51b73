//! Bytecode counting, histogram, tracing and stop-at-count

use super::templates::Template;
use super::{codegen_error, TemplateInterpreterGenerator};
use crate::layout::{BYTECODE_COUNTER, BYTECODE_HISTOGRAM};
use crate::runtime::entry::RuntimeEntry;
use assembler::registers::{LR, RSCRATCH1, RSCRATCH2, SP, V0, X0, X1, X2, X3, ZR};
use assembler::{Address, Condition, Precision, Width};
use bytecode_system::Bytecode;
use core_types::{TosState, VmResult};

/// `brk` immediate used by stop-at-count.
pub const STOP_AT_BREAKPOINT: u16 = 0;

impl TemplateInterpreterGenerator {
    /// One trace routine per tos state. Each preserves the tos cache and
    /// `lr`, and hands the runtime the state and both cache registers.
    pub(super) fn generate_trace_code(&mut self) -> VmResult<()> {
        self.masm.begin_stub("bytecode tracing").map_err(codegen_error)?;
        for tos in TosState::ALL {
            self.trace_code[tos.index()] = self.masm.pc();
            self.masm.stp(X0, LR, Address::Pre(SP, -16));
            self.masm.strd(V0, Address::Pre(SP, -16));
            self.masm.mov_imm(X1, tos.index() as u64);
            self.masm.mov(X2, X0);
            self.masm.fmov_to_gp(X3, V0, Precision::Double);
            self.masm
                .call_vm(None, RuntimeEntry::TraceBytecode, &[X1, X2, X3]);
            self.masm.ldrd(V0, Address::Post(SP, 16));
            self.masm.ldp(X0, LR, Address::Post(SP, 16));
            self.masm.ret(LR);
        }
        self.masm.end_stub().map_err(codegen_error)?;
        Ok(())
    }

    pub(super) fn count_bytecode(&mut self) {
        self.masm.mov_imm(RSCRATCH1, BYTECODE_COUNTER);
        self.masm.mov_imm(RSCRATCH2, 1);
        self.masm.ldadd(Width::X, RSCRATCH2, ZR, RSCRATCH1);
    }

    pub(super) fn histogram_bytecode(&mut self, bc: Bytecode) {
        self.masm
            .mov_imm(RSCRATCH1, BYTECODE_HISTOGRAM + bc.as_u8() as u64 * 8);
        self.masm.mov_imm(RSCRATCH2, 1);
        self.masm.ldadd(Width::X, RSCRATCH2, ZR, RSCRATCH1);
    }

    pub(super) fn trace_bytecode(&mut self, t: &Template) {
        self.masm.bl_to(self.trace_code[t.tos_in.index()]);
    }

    /// Break when the global counter reaches `stop_interpreter_at`.
    pub(super) fn stop_interpreter_at(&mut self) {
        let stop_at = self.config().stop_interpreter_at;
        let skip = self.masm.create_label();
        self.masm.mov_imm(RSCRATCH1, BYTECODE_COUNTER);
        self.masm.ldr(RSCRATCH1, Address::new(RSCRATCH1, 0));
        self.masm.mov_imm(RSCRATCH2, stop_at);
        self.masm.cmp(RSCRATCH1, RSCRATCH2);
        self.masm.br_cond(Condition::Ne, skip);
        self.masm.brk(STOP_AT_BREAKPOINT);
        self.masm.bind(skip);
    }
}
