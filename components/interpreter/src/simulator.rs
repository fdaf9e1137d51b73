//! Instruction-level simulator
//!
//! Executes generated code one instruction at a time against the simulated
//! address space. Control leaving generated code surfaces as a
//! [`StepEvent`]: a branch into the runtime entry range, a native call, or a
//! return to the host. Faulting instructions have no architectural effect,
//! so the caller may redirect the pc and resume.

use crate::layout::{is_runtime_address, BYTECODE_COUNTER, HOST_RETURN};
use crate::runtime::entry::RuntimeEntry;
use assembler::{
    Address, CodeCache, FloatRegister, FpBinary, FpUnary, Insn, Operand, Precision, Register, Width,
    INSN_SIZE,
};
use core_types::{MemoryAccess, VmError, VmResult};
use memory_manager::AddressSpace;
use std::collections::HashMap;

/// Condition flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Negative
    pub n: bool,
    /// Zero
    pub z: bool,
    /// Carry
    pub c: bool,
    /// Overflow
    pub v: bool,
}

/// Architectural state.
#[derive(Debug, Clone, PartialEq)]
pub struct Cpu {
    x: [u64; Register::FILE_SIZE],
    v: [u64; FloatRegister::FILE_SIZE],
    /// Next instruction
    pub pc: u64,
    /// NZCV
    pub flags: Flags,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// All registers zero.
    pub fn new() -> Self {
        Self {
            x: [0; Register::FILE_SIZE],
            v: [0; FloatRegister::FILE_SIZE],
            pc: 0,
            flags: Flags::default(),
        }
    }

    /// Read a general register; the zero register reads 0.
    #[inline]
    pub fn reg(&self, r: Register) -> u64 {
        if r.is_zr() {
            0
        } else {
            self.x[r.index()]
        }
    }

    /// Write a general register; writes to the zero register vanish.
    #[inline]
    pub fn set_reg(&mut self, r: Register, value: u64) {
        if !r.is_zr() {
            self.x[r.index()] = value;
        }
    }

    /// Raw bits of a floating register.
    #[inline]
    pub fn freg(&self, v: FloatRegister) -> u64 {
        self.v[v.index()]
    }

    /// Set the raw bits of a floating register.
    #[inline]
    pub fn set_freg(&mut self, v: FloatRegister, bits: u64) {
        self.v[v.index()] = bits;
    }

    /// `x0..x7`
    pub fn gpr_args(&self) -> [u64; 8] {
        let mut out = [0; 8];
        out.copy_from_slice(&self.x[..8]);
        out
    }

    /// `v0..v7`
    pub fn fpr_args(&self) -> [u64; 8] {
        self.v
    }
}

/// What happened in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// An instruction executed
    Continue,
    /// The pc reached a runtime entry; return through `lr` when done
    RuntimeCall(RuntimeEntry),
    /// A native call; the pc already points past it
    NativeCall {
        /// Host function
        target: u64,
        /// Packed call format
        format: u32,
    },
    /// The pc reached the host return address
    HostReturn,
}

/// Executes code out of a code cache.
#[derive(Debug, Clone)]
pub struct Simulator {
    /// Register state
    pub cpu: Cpu,
    steps: u64,
    max_steps: u64,
    watched: HashMap<u64, u64>,
}

impl Simulator {
    /// Simulator allowing `max_steps` instructions between resets.
    pub fn new(max_steps: u64) -> Self {
        Self {
            cpu: Cpu::new(),
            steps: 0,
            max_steps,
            watched: HashMap::new(),
        }
    }

    /// Count executions of the instruction at `pc` from now on.
    pub fn watch(&mut self, pc: u64) {
        self.watched.insert(pc, 0);
    }

    /// Executions of a watched instruction, `None` when `pc` is not watched.
    pub fn hits(&self, pc: u64) -> Option<u64> {
        self.watched.get(&pc).copied()
    }

    /// Instructions executed since the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Restart the step budget.
    pub fn reset_steps(&mut self) {
        self.steps = 0;
    }

    /// Execute the instruction at the pc.
    pub fn step(&mut self, mem: &mut AddressSpace, code: &CodeCache) -> VmResult<StepEvent> {
        let pc = self.cpu.pc;
        if pc == HOST_RETURN {
            return Ok(StepEvent::HostReturn);
        }
        if is_runtime_address(pc) {
            return RuntimeEntry::from_address(pc)
                .map(StepEvent::RuntimeCall)
                .ok_or(VmError::MemoryFault {
                    address: pc,
                    access: MemoryAccess::Execute,
                    guard: None,
                });
        }
        if self.steps >= self.max_steps {
            return Err(VmError::StepLimitExceeded(self.max_steps));
        }
        let insn = code.insn_at(pc).ok_or(VmError::MemoryFault {
            address: pc,
            access: MemoryAccess::Execute,
            guard: None,
        })?;
        self.steps += 1;
        if let Some(hits) = self.watched.get_mut(&pc) {
            *hits += 1;
        }
        log::trace!("{:#x}: {}", pc, insn);
        self.execute(insn, mem)
    }

    fn operand(&self, op: Operand) -> u64 {
        match op {
            Operand::Imm(v) => v as u64,
            Operand::Reg(r) => self.cpu.reg(r),
            Operand::Lsl(r, s) => self.cpu.reg(r) << s,
        }
    }

    /// Effective address and base writeback.
    fn address(&self, addr: Address) -> (u64, Option<(Register, u64)>) {
        match addr {
            Address::Base(b, o) => (self.cpu.reg(b).wrapping_add(o as u64), None),
            Address::Pre(b, o) => {
                let a = self.cpu.reg(b).wrapping_add(o as u64);
                (a, Some((b, a)))
            }
            Address::Post(b, o) => {
                let a = self.cpu.reg(b);
                (a, Some((b, a.wrapping_add(o as u64))))
            }
            Address::Index(b, i, s) => (self.cpu.reg(b).wrapping_add(self.cpu.reg(i) << s), None),
        }
    }

    fn writeback(&mut self, wb: Option<(Register, u64)>) {
        if let Some((r, v)) = wb {
            self.cpu.set_reg(r, v);
        }
    }

    fn set_compare_flags(&mut self, a: u64, b: u64) {
        let r = a.wrapping_sub(b);
        self.cpu.flags = Flags {
            n: (r as i64) < 0,
            z: r == 0,
            c: a >= b,
            v: ((a ^ b) & (a ^ r)) >> 63 == 1,
        };
    }

    fn holds(&self, cond: assembler::Condition) -> bool {
        let f = self.cpu.flags;
        cond.holds(f.n, f.z, f.c, f.v)
    }

    fn execute(&mut self, insn: Insn, mem: &mut AddressSpace) -> VmResult<StepEvent> {
        let pc = self.cpu.pc;
        let mut next = pc + INSN_SIZE;
        match insn {
            Insn::Nop | Insn::Dmb => {}
            Insn::MovImm { rd, imm } => self.cpu.set_reg(rd, imm),
            Insn::Mov { rd, rn } => self.cpu.set_reg(rd, self.cpu.reg(rn)),
            Insn::Add { rd, rn, op } => {
                let v = self.cpu.reg(rn).wrapping_add(self.operand(op));
                self.cpu.set_reg(rd, v);
            }
            Insn::Sub { rd, rn, op } => {
                let v = self.cpu.reg(rn).wrapping_sub(self.operand(op));
                self.cpu.set_reg(rd, v);
            }
            Insn::And { rd, rn, op } => self.cpu.set_reg(rd, self.cpu.reg(rn) & self.operand(op)),
            Insn::Orr { rd, rn, op } => self.cpu.set_reg(rd, self.cpu.reg(rn) | self.operand(op)),
            Insn::Eor { rd, rn, op } => self.cpu.set_reg(rd, self.cpu.reg(rn) ^ self.operand(op)),
            Insn::Lsl { rd, rn, shift } => self.cpu.set_reg(rd, self.cpu.reg(rn) << (shift & 63)),
            Insn::Lsr { rd, rn, shift } => self.cpu.set_reg(rd, self.cpu.reg(rn) >> (shift & 63)),
            Insn::Mul { rd, rn, rm } => {
                self.cpu.set_reg(rd, self.cpu.reg(rn).wrapping_mul(self.cpu.reg(rm)))
            }
            Insn::Sdiv { rd, rn, rm } => {
                let divisor = self.cpu.reg(rm) as i64;
                let v = if divisor == 0 {
                    0
                } else {
                    (self.cpu.reg(rn) as i64).wrapping_div(divisor)
                };
                self.cpu.set_reg(rd, v as u64);
            }
            Insn::Neg { rd, rn } => self.cpu.set_reg(rd, self.cpu.reg(rn).wrapping_neg()),
            Insn::Extend { rd, rn, kind } => self.cpu.set_reg(rd, kind.apply(self.cpu.reg(rn))),
            Insn::Cmp { rn, op } => {
                let (a, b) = (self.cpu.reg(rn), self.operand(op));
                self.set_compare_flags(a, b);
            }
            Insn::Tst { rn, op } => {
                let r = self.cpu.reg(rn) & self.operand(op);
                self.cpu.flags = Flags {
                    n: (r as i64) < 0,
                    z: r == 0,
                    c: false,
                    v: false,
                };
            }
            Insn::Csel { rd, rn, rm, cond } => {
                let v = if self.holds(cond) {
                    self.cpu.reg(rn)
                } else {
                    self.cpu.reg(rm)
                };
                self.cpu.set_reg(rd, v);
            }
            Insn::Ldr {
                rt,
                addr,
                width,
                signed,
            } => {
                let (a, wb) = self.address(addr);
                let raw = mem.read(a, width.bytes())?;
                let v = if signed { sign_extend(raw, width) } else { raw };
                self.writeback(wb);
                self.cpu.set_reg(rt, v);
            }
            Insn::Str { rt, addr, width } => {
                let (a, wb) = self.address(addr);
                mem.write(a, width.bytes(), self.cpu.reg(rt))?;
                self.writeback(wb);
            }
            Insn::Ldp { rt1, rt2, addr } => {
                let (a, wb) = self.address(addr);
                let v1 = mem.read_u64(a)?;
                let v2 = mem.read_u64(a.wrapping_add(8))?;
                self.writeback(wb);
                self.cpu.set_reg(rt1, v1);
                self.cpu.set_reg(rt2, v2);
            }
            Insn::Stp { rt1, rt2, addr } => {
                let (a, wb) = self.address(addr);
                let (v1, v2) = (self.cpu.reg(rt1), self.cpu.reg(rt2));
                // probe both words before writing either
                mem.read_u64(a.wrapping_add(8))?;
                mem.write_u64(a, v1)?;
                mem.write_u64(a.wrapping_add(8), v2)?;
                self.writeback(wb);
            }
            Insn::FLdr {
                vt,
                addr,
                precision,
            } => {
                let (a, wb) = self.address(addr);
                let v = mem.read(a, precision_bytes(precision))?;
                self.writeback(wb);
                self.cpu.set_freg(vt, v);
            }
            Insn::FStr {
                vt,
                addr,
                precision,
            } => {
                let (a, wb) = self.address(addr);
                mem.write(a, precision_bytes(precision), self.cpu.freg(vt))?;
                self.writeback(wb);
            }
            Insn::FMovFromGp { vd, rn, precision } => {
                let v = self.cpu.reg(rn);
                self.cpu.set_freg(vd, truncate(v, precision));
            }
            Insn::FMovToGp { rd, vn, precision } => {
                let v = self.cpu.freg(vn);
                self.cpu.set_reg(rd, truncate(v, precision));
            }
            Insn::FArith {
                op,
                precision,
                vd,
                vn,
                vm,
            } => {
                let (a, b) = (self.cpu.freg(vn), self.cpu.freg(vm));
                self.cpu.set_freg(vd, fp_binary(op, precision, a, b));
            }
            Insn::FUnary {
                op,
                precision,
                vd,
                vn,
            } => {
                let a = self.cpu.freg(vn);
                self.cpu.set_freg(vd, fp_unary(op, precision, a));
            }
            Insn::LdAdd { rs, rt, rn, width } => {
                let a = self.cpu.reg(rn);
                let old = mem.read(a, width.bytes())?;
                mem.write(a, width.bytes(), old.wrapping_add(self.cpu.reg(rs)))?;
                self.cpu.set_reg(rt, old);
            }
            Insn::Adr { rd, target } => self.cpu.set_reg(rd, target),
            Insn::B { target } => next = target,
            Insn::BCond { cond, target } => {
                if self.holds(cond) {
                    next = target;
                }
            }
            Insn::Cbz { rt, target } => {
                if self.cpu.reg(rt) == 0 {
                    next = target;
                }
            }
            Insn::Cbnz { rt, target } => {
                if self.cpu.reg(rt) != 0 {
                    next = target;
                }
            }
            Insn::Tbz { rt, bit, target } => {
                if self.cpu.reg(rt) >> bit & 1 == 0 {
                    next = target;
                }
            }
            Insn::Tbnz { rt, bit, target } => {
                if self.cpu.reg(rt) >> bit & 1 != 0 {
                    next = target;
                }
            }
            Insn::Bl { target } => {
                self.cpu.set_reg(assembler::registers::LR, next);
                next = target;
            }
            Insn::Br { rn } => next = self.cpu.reg(rn),
            Insn::Blr { rn } => {
                let target = self.cpu.reg(rn);
                self.cpu.set_reg(assembler::registers::LR, next);
                next = target;
            }
            Insn::Ret { rn } => next = self.cpu.reg(rn),
            Insn::CallNative { target, format } => {
                self.cpu.pc = next;
                return Ok(StepEvent::NativeCall {
                    target: self.cpu.reg(target),
                    format: self.cpu.reg(format) as u32,
                });
            }
            Insn::Brk { .. } => {
                return Err(VmError::Breakpoint {
                    pc,
                    count: mem.read_u64(BYTECODE_COUNTER)?,
                });
            }
            Insn::Stop { message } => {
                return Err(VmError::Stop {
                    message: message.to_string(),
                    pc,
                });
            }
        }
        self.cpu.pc = next;
        Ok(StepEvent::Continue)
    }
}

fn sign_extend(v: u64, width: Width) -> u64 {
    match width {
        Width::B => v as i8 as i64 as u64,
        Width::H => v as i16 as i64 as u64,
        Width::W => v as i32 as i64 as u64,
        Width::X => v,
    }
}

fn precision_bytes(p: Precision) -> u64 {
    match p {
        Precision::Single => 4,
        Precision::Double => 8,
    }
}

fn truncate(v: u64, p: Precision) -> u64 {
    match p {
        Precision::Single => v & 0xffff_ffff,
        Precision::Double => v,
    }
}

fn fp_binary(op: FpBinary, p: Precision, a: u64, b: u64) -> u64 {
    match p {
        Precision::Single => {
            let (a, b) = (f32::from_bits(a as u32), f32::from_bits(b as u32));
            let r = match op {
                FpBinary::Add => a + b,
                FpBinary::Sub => a - b,
                FpBinary::Mul => a * b,
                FpBinary::Div => a / b,
            };
            r.to_bits() as u64
        }
        Precision::Double => {
            let (a, b) = (f64::from_bits(a), f64::from_bits(b));
            let r = match op {
                FpBinary::Add => a + b,
                FpBinary::Sub => a - b,
                FpBinary::Mul => a * b,
                FpBinary::Div => a / b,
            };
            r.to_bits()
        }
    }
}

fn fp_unary(op: FpUnary, p: Precision, a: u64) -> u64 {
    match p {
        Precision::Single => {
            let a = f32::from_bits(a as u32);
            let r = match op {
                FpUnary::Sqrt => a.sqrt(),
                FpUnary::Abs => a.abs(),
                FpUnary::Neg => -a,
                FpUnary::Mov => a,
            };
            r.to_bits() as u64
        }
        Precision::Double => {
            let a = f64::from_bits(a);
            let r = match op {
                FpUnary::Sqrt => a.sqrt(),
                FpUnary::Abs => a.abs(),
                FpUnary::Neg => -a,
                FpUnary::Mov => a,
            };
            r.to_bits()
        }
    }
}
