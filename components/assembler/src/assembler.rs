//! Assembler with label support.
//!
//! Emits instructions at a fixed base address so that every instruction's
//! address is known as soon as it is emitted. Forward branches go through
//! labels and are patched in [`Assembler::finalize`]. Stub boundaries,
//! named marks and block comments are recorded alongside the code for
//! lookups and listings.

use crate::code_cache::{CodeBlob, StubDescriptor};
use crate::insn::{
    Address, Condition, Extend, FpBinary, FpUnary, Insn, Operand, Precision, Width, INSN_SIZE,
};
use crate::registers::{FloatRegister, Register, ZR};
use thiserror::Error;

/// A position in the code, possibly not yet bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    /// Label number.
    #[inline]
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// A branch waiting for its label.
#[derive(Debug, Clone, Copy)]
struct Relocation {
    index: usize,
    label: Label,
}

/// Assembly failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    /// A branch refers to a label that was never bound.
    #[error("unbound label {0}")]
    UnboundLabel(u32),
    /// A label was bound twice.
    #[error("label {0} bound twice")]
    LabelRebound(u32),
    /// Stub boundaries are unbalanced.
    #[error("stub boundary mismatch: {0}")]
    StubMismatch(String),
    /// A blob was installed out of order.
    #[error("blob {name} at {base:#x} does not start at the next free address {expected:#x}")]
    Placement {
        /// blob name
        name: String,
        /// blob base
        base: u64,
        /// next free address of the cache
        expected: u64,
    },
}

/// Emits instructions into a code blob under construction.
pub struct Assembler {
    base: u64,
    insns: Vec<Insn>,
    labels: Vec<Option<u64>>,
    relocations: Vec<Relocation>,
    stubs: Vec<StubDescriptor>,
    open_stub: Option<(String, u64)>,
    marks: Vec<(String, u64)>,
    comments: Vec<(u64, String)>,
}

impl Assembler {
    /// Start emitting at `base`.
    pub fn new(base: u64) -> Self {
        Self {
            base,
            insns: Vec::with_capacity(1024),
            labels: Vec::new(),
            relocations: Vec::new(),
            stubs: Vec::new(),
            open_stub: None,
            marks: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Address of the next instruction.
    #[inline]
    pub fn pc(&self) -> u64 {
        self.base + self.insns.len() as u64 * INSN_SIZE
    }

    /// Blob base address.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Emit a raw instruction.
    pub fn emit(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    fn emit_with_reloc(&mut self, insn: Insn, label: Label) {
        match self.labels[label.0 as usize] {
            Some(target) => {
                let mut insn = insn;
                insn.set_target(target);
                self.emit(insn);
            }
            None => {
                self.relocations.push(Relocation {
                    index: self.insns.len(),
                    label,
                });
                self.emit(insn);
            }
        }
    }

    // =========================================================================
    // Labels, stubs and annotations
    // =========================================================================

    /// Create an unbound label.
    pub fn create_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind a label to the current position.
    pub fn bind(&mut self, label: Label) {
        let pc = self.pc();
        self.labels[label.0 as usize] = Some(pc);
    }

    /// Address of a bound label.
    pub fn label_address(&self, label: Label) -> Option<u64> {
        self.labels[label.0 as usize]
    }

    /// Open a named stub at the current position.
    pub fn begin_stub(&mut self, name: &str) -> Result<u64, AsmError> {
        if let Some((open, _)) = &self.open_stub {
            return Err(AsmError::StubMismatch(format!(
                "{} opened while {} is open",
                name, open
            )));
        }
        let pc = self.pc();
        self.open_stub = Some((name.to_string(), pc));
        Ok(pc)
    }

    /// Close the open stub.
    pub fn end_stub(&mut self) -> Result<StubDescriptor, AsmError> {
        let (name, begin) = self
            .open_stub
            .take()
            .ok_or_else(|| AsmError::StubMismatch("no open stub".to_string()))?;
        let descriptor = StubDescriptor {
            name,
            begin,
            end: self.pc(),
        };
        self.stubs.push(descriptor.clone());
        Ok(descriptor)
    }

    /// Record a named address.
    pub fn mark(&mut self, name: &str) {
        let pc = self.pc();
        self.marks.push((name.to_string(), pc));
    }

    /// Attach a comment to the next instruction in listings.
    pub fn block_comment(&mut self, text: &str) {
        let pc = self.pc();
        self.comments.push((pc, text.to_string()));
    }

    /// Resolve relocations and produce the blob.
    pub fn finalize(mut self, name: &str) -> Result<CodeBlob, AsmError> {
        if let Some((open, _)) = &self.open_stub {
            return Err(AsmError::StubMismatch(format!("{} never closed", open)));
        }
        for reloc in &self.relocations {
            let target = self.labels[reloc.label.0 as usize]
                .ok_or(AsmError::UnboundLabel(reloc.label.0))?;
            self.insns[reloc.index].set_target(target);
        }
        Ok(CodeBlob::new(
            name,
            self.base,
            self.insns,
            self.stubs,
            self.marks,
            self.comments,
        ))
    }

    // =========================================================================
    // Data processing
    // =========================================================================

    /// `nop`
    pub fn nop(&mut self) {
        self.emit(Insn::Nop);
    }

    /// Materialize a 64-bit constant.
    pub fn mov_imm(&mut self, rd: Register, imm: u64) {
        self.emit(Insn::MovImm { rd, imm });
    }

    /// `mov rd, rn`
    pub fn mov(&mut self, rd: Register, rn: Register) {
        self.emit(Insn::Mov { rd, rn });
    }

    /// `add rd, rn, op`
    pub fn add(&mut self, rd: Register, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Add {
            rd,
            rn,
            op: op.into(),
        });
    }

    /// `sub rd, rn, op`
    pub fn sub(&mut self, rd: Register, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Sub {
            rd,
            rn,
            op: op.into(),
        });
    }

    /// `and rd, rn, op`
    pub fn andr(&mut self, rd: Register, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::And {
            rd,
            rn,
            op: op.into(),
        });
    }

    /// `orr rd, rn, op`
    pub fn orr(&mut self, rd: Register, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Orr {
            rd,
            rn,
            op: op.into(),
        });
    }

    /// `eor rd, rn, op`
    pub fn eor(&mut self, rd: Register, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Eor {
            rd,
            rn,
            op: op.into(),
        });
    }

    /// `lsl rd, rn, #shift`
    pub fn lsl(&mut self, rd: Register, rn: Register, shift: u8) {
        self.emit(Insn::Lsl { rd, rn, shift });
    }

    /// `lsr rd, rn, #shift`
    pub fn lsr(&mut self, rd: Register, rn: Register, shift: u8) {
        self.emit(Insn::Lsr { rd, rn, shift });
    }

    /// `mul rd, rn, rm`
    pub fn mul(&mut self, rd: Register, rn: Register, rm: Register) {
        self.emit(Insn::Mul { rd, rn, rm });
    }

    /// `sdiv rd, rn, rm`
    pub fn sdiv(&mut self, rd: Register, rn: Register, rm: Register) {
        self.emit(Insn::Sdiv { rd, rn, rm });
    }

    /// `neg rd, rn`
    pub fn neg(&mut self, rd: Register, rn: Register) {
        self.emit(Insn::Neg { rd, rn });
    }

    /// Sign- or zero-extend.
    pub fn extend(&mut self, rd: Register, rn: Register, kind: Extend) {
        self.emit(Insn::Extend { rd, rn, kind });
    }

    /// `sxtw rd, rn`
    pub fn sxtw(&mut self, rd: Register, rn: Register) {
        self.extend(rd, rn, Extend::Sxtw);
    }

    /// `cmp rn, op`
    pub fn cmp(&mut self, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Cmp { rn, op: op.into() });
    }

    /// `tst rn, op`
    pub fn tst(&mut self, rn: Register, op: impl Into<Operand>) {
        self.emit(Insn::Tst { rn, op: op.into() });
    }

    /// `csel rd, rn, rm, cond`
    pub fn csel(&mut self, rd: Register, rn: Register, rm: Register, cond: Condition) {
        self.emit(Insn::Csel { rd, rn, rm, cond });
    }

    // =========================================================================
    // Loads and stores
    // =========================================================================

    fn load(&mut self, rt: Register, addr: Address, width: Width, signed: bool) {
        self.emit(Insn::Ldr {
            rt,
            addr,
            width,
            signed,
        });
    }

    fn store(&mut self, rt: Register, addr: Address, width: Width) {
        self.emit(Insn::Str { rt, addr, width });
    }

    /// 64-bit load.
    pub fn ldr(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::X, false);
    }

    /// 32-bit zero-extending load.
    pub fn ldrw(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::W, false);
    }

    /// 32-bit sign-extending load.
    pub fn ldrsw(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::W, true);
    }

    /// 16-bit zero-extending load.
    pub fn ldrh(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::H, false);
    }

    /// 8-bit zero-extending load.
    pub fn ldrb(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::B, false);
    }

    /// 8-bit sign-extending load.
    pub fn ldrsb(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::B, true);
    }

    /// 16-bit sign-extending load.
    pub fn ldrsh(&mut self, rt: Register, addr: Address) {
        self.load(rt, addr, Width::H, true);
    }

    /// 64-bit store.
    pub fn str(&mut self, rt: Register, addr: Address) {
        self.store(rt, addr, Width::X);
    }

    /// 32-bit store.
    pub fn strw(&mut self, rt: Register, addr: Address) {
        self.store(rt, addr, Width::W);
    }

    /// 16-bit store.
    pub fn strh(&mut self, rt: Register, addr: Address) {
        self.store(rt, addr, Width::H);
    }

    /// 8-bit store.
    pub fn strb(&mut self, rt: Register, addr: Address) {
        self.store(rt, addr, Width::B);
    }

    /// Store the zero register.
    pub fn str_zero(&mut self, addr: Address) {
        self.store(ZR, addr, Width::X);
    }

    /// Load pair.
    pub fn ldp(&mut self, rt1: Register, rt2: Register, addr: Address) {
        self.emit(Insn::Ldp { rt1, rt2, addr });
    }

    /// Store pair.
    pub fn stp(&mut self, rt1: Register, rt2: Register, addr: Address) {
        self.emit(Insn::Stp { rt1, rt2, addr });
    }

    /// Single-precision load.
    pub fn ldrs(&mut self, vt: FloatRegister, addr: Address) {
        self.emit(Insn::FLdr {
            vt,
            addr,
            precision: Precision::Single,
        });
    }

    /// Double-precision load.
    pub fn ldrd(&mut self, vt: FloatRegister, addr: Address) {
        self.emit(Insn::FLdr {
            vt,
            addr,
            precision: Precision::Double,
        });
    }

    /// Single-precision store.
    pub fn strs(&mut self, vt: FloatRegister, addr: Address) {
        self.emit(Insn::FStr {
            vt,
            addr,
            precision: Precision::Single,
        });
    }

    /// Double-precision store.
    pub fn strd(&mut self, vt: FloatRegister, addr: Address) {
        self.emit(Insn::FStr {
            vt,
            addr,
            precision: Precision::Double,
        });
    }

    /// Move raw bits into a floating-point register.
    pub fn fmov_from_gp(&mut self, vd: FloatRegister, rn: Register, precision: Precision) {
        self.emit(Insn::FMovFromGp { vd, rn, precision });
    }

    /// Move raw bits out of a floating-point register.
    pub fn fmov_to_gp(&mut self, rd: Register, vn: FloatRegister, precision: Precision) {
        self.emit(Insn::FMovToGp { rd, vn, precision });
    }

    /// Two-operand floating-point arithmetic.
    pub fn farith(
        &mut self,
        op: FpBinary,
        precision: Precision,
        vd: FloatRegister,
        vn: FloatRegister,
        vm: FloatRegister,
    ) {
        self.emit(Insn::FArith {
            op,
            precision,
            vd,
            vn,
            vm,
        });
    }

    /// One-operand floating-point arithmetic.
    pub fn funary(&mut self, op: FpUnary, precision: Precision, vd: FloatRegister, vn: FloatRegister) {
        self.emit(Insn::FUnary {
            op,
            precision,
            vd,
            vn,
        });
    }

    /// Atomic add returning the old value.
    pub fn ldadd(&mut self, width: Width, rs: Register, rt: Register, rn: Register) {
        self.emit(Insn::LdAdd { rs, rt, rn, width });
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// `adr rd, label`
    pub fn adr(&mut self, rd: Register, label: Label) {
        self.emit_with_reloc(Insn::Adr { rd, target: 0 }, label);
    }

    /// Load the address of the current instruction.
    pub fn adr_here(&mut self, rd: Register) {
        let target = self.pc();
        self.emit(Insn::Adr { rd, target });
    }

    /// `b label`
    pub fn b(&mut self, label: Label) {
        self.emit_with_reloc(Insn::B { target: 0 }, label);
    }

    /// `b addr`
    pub fn b_to(&mut self, target: u64) {
        self.emit(Insn::B { target });
    }

    /// `b.cond label`
    pub fn br_cond(&mut self, cond: Condition, label: Label) {
        self.emit_with_reloc(Insn::BCond { cond, target: 0 }, label);
    }

    /// `b.cond addr`
    pub fn br_cond_to(&mut self, cond: Condition, target: u64) {
        self.emit(Insn::BCond { cond, target });
    }

    /// `cbz rt, label`
    pub fn cbz(&mut self, rt: Register, label: Label) {
        self.emit_with_reloc(Insn::Cbz { rt, target: 0 }, label);
    }

    /// `cbnz rt, label`
    pub fn cbnz(&mut self, rt: Register, label: Label) {
        self.emit_with_reloc(Insn::Cbnz { rt, target: 0 }, label);
    }

    /// `cbnz rt, addr`
    pub fn cbnz_to(&mut self, rt: Register, target: u64) {
        self.emit(Insn::Cbnz { rt, target });
    }

    /// `tbz rt, #bit, label`
    pub fn tbz(&mut self, rt: Register, bit: u8, label: Label) {
        self.emit_with_reloc(Insn::Tbz { rt, bit, target: 0 }, label);
    }

    /// `tbnz rt, #bit, label`
    pub fn tbnz(&mut self, rt: Register, bit: u8, label: Label) {
        self.emit_with_reloc(Insn::Tbnz { rt, bit, target: 0 }, label);
    }

    /// `bl addr`
    pub fn bl_to(&mut self, target: u64) {
        self.emit(Insn::Bl { target });
    }

    /// `br rn`
    pub fn br(&mut self, rn: Register) {
        self.emit(Insn::Br { rn });
    }

    /// `blr rn`
    pub fn blr(&mut self, rn: Register) {
        self.emit(Insn::Blr { rn });
    }

    /// `ret rn`
    pub fn ret(&mut self, rn: Register) {
        self.emit(Insn::Ret { rn });
    }

    /// Call a host function through a trampoline.
    pub fn call_native(&mut self, target: Register, format: Register) {
        self.emit(Insn::CallNative { target, format });
    }

    /// Full memory barrier.
    pub fn dmb(&mut self) {
        self.emit(Insn::Dmb);
    }

    /// Breakpoint.
    pub fn brk(&mut self, imm: u16) {
        self.emit(Insn::Brk { imm });
    }

    /// Halt with a message.
    pub fn stop(&mut self, message: &'static str) {
        self.emit(Insn::Stop { message });
    }
}
