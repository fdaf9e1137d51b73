//! Instruction set.
//!
//! Instructions are kept in structured form rather than bit-encoded; each
//! occupies one 4-byte slot in the code cache so that addresses, return
//! addresses and pc-relative reasoning work as on hardware. Branch targets
//! are absolute code addresses, filled in when labels are bound.

use crate::registers::{FloatRegister, Register};
use std::fmt;

/// Bytes per instruction slot.
pub const INSN_SIZE: u64 = 4;

/// Condition codes, evaluated against NZCV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Equal (Z)
    Eq,
    /// Not equal (!Z)
    Ne,
    /// Unsigned higher or same (C)
    Hs,
    /// Unsigned lower (!C)
    Lo,
    /// Negative (N)
    Mi,
    /// Positive or zero (!N)
    Pl,
    /// Overflow (V)
    Vs,
    /// No overflow (!V)
    Vc,
    /// Unsigned higher (C && !Z)
    Hi,
    /// Unsigned lower or same (!C || Z)
    Ls,
    /// Signed greater or equal (N == V)
    Ge,
    /// Signed less than (N != V)
    Lt,
    /// Signed greater than (!Z && N == V)
    Gt,
    /// Signed less or equal (Z || N != V)
    Le,
    /// Always
    Al,
}

impl Condition {
    /// The opposite condition.
    pub fn invert(self) -> Self {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::Hs => Condition::Lo,
            Condition::Lo => Condition::Hs,
            Condition::Mi => Condition::Pl,
            Condition::Pl => Condition::Mi,
            Condition::Vs => Condition::Vc,
            Condition::Vc => Condition::Vs,
            Condition::Hi => Condition::Ls,
            Condition::Ls => Condition::Hi,
            Condition::Ge => Condition::Lt,
            Condition::Lt => Condition::Ge,
            Condition::Gt => Condition::Le,
            Condition::Le => Condition::Gt,
            Condition::Al => Condition::Al,
        }
    }

    /// Evaluate against flag bits.
    pub fn holds(self, n: bool, z: bool, c: bool, v: bool) -> bool {
        match self {
            Condition::Eq => z,
            Condition::Ne => !z,
            Condition::Hs => c,
            Condition::Lo => !c,
            Condition::Mi => n,
            Condition::Pl => !n,
            Condition::Vs => v,
            Condition::Vc => !v,
            Condition::Hi => c && !z,
            Condition::Ls => !c || z,
            Condition::Ge => n == v,
            Condition::Lt => n != v,
            Condition::Gt => !z && n == v,
            Condition::Le => z || n != v,
            Condition::Al => true,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Hs => "hs",
            Condition::Lo => "lo",
            Condition::Mi => "mi",
            Condition::Pl => "pl",
            Condition::Vs => "vs",
            Condition::Vc => "vc",
            Condition::Hi => "hi",
            Condition::Ls => "ls",
            Condition::Ge => "ge",
            Condition::Lt => "lt",
            Condition::Gt => "gt",
            Condition::Le => "le",
            Condition::Al => "al",
        }
    }
}

/// Second operand of data-processing instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Immediate
    Imm(i64),
    /// Register
    Reg(Register),
    /// Register shifted left
    Lsl(Register, u8),
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Reg(r)
    }
}

macro_rules! imm_operand {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(v: $t) -> Self {
                Operand::Imm(v as i64)
            }
        })*
    };
}

imm_operand!(i32, i64, u32, u64, usize);

/// Memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// `[base, #offset]`
    Base(Register, i64),
    /// `[base, #offset]!` (base updated before access)
    Pre(Register, i64),
    /// `[base], #offset` (base updated after access)
    Post(Register, i64),
    /// `[base, index, lsl #shift]`
    Index(Register, Register, u8),
}

impl Address {
    /// `[base, #offset]`
    pub fn new(base: Register, offset: i64) -> Self {
        Address::Base(base, offset)
    }
}

/// Access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// 1 byte
    B,
    /// 2 bytes
    H,
    /// 4 bytes
    W,
    /// 8 bytes
    X,
}

impl Width {
    /// Size in bytes.
    pub fn bytes(self) -> u64 {
        match self {
            Width::B => 1,
            Width::H => 2,
            Width::W => 4,
            Width::X => 8,
        }
    }
}

/// Register extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extend {
    /// Zero-extend byte
    Uxtb,
    /// Zero-extend halfword
    Uxth,
    /// Zero-extend word
    Uxtw,
    /// Sign-extend byte
    Sxtb,
    /// Sign-extend halfword
    Sxth,
    /// Sign-extend word
    Sxtw,
}

impl Extend {
    /// Apply to a value.
    pub fn apply(self, v: u64) -> u64 {
        match self {
            Extend::Uxtb => v & 0xff,
            Extend::Uxth => v & 0xffff,
            Extend::Uxtw => v & 0xffff_ffff,
            Extend::Sxtb => v as i8 as i64 as u64,
            Extend::Sxth => v as i16 as i64 as u64,
            Extend::Sxtw => v as i32 as i64 as u64,
        }
    }
}

/// Floating-point precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// `float`
    Single,
    /// `double`
    Double,
}

/// Two-operand floating-point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpBinary {
    /// `fadd`
    Add,
    /// `fsub`
    Sub,
    /// `fmul`
    Mul,
    /// `fdiv`
    Div,
}

/// One-operand floating-point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpUnary {
    /// `fsqrt`
    Sqrt,
    /// `fabs`
    Abs,
    /// `fneg`
    Neg,
    /// `fmov`
    Mov,
}

/// A machine instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Insn {
    /// `nop`
    Nop,
    /// Load a 64-bit immediate (a movz/movk sequence on hardware).
    MovImm {
        /// destination
        rd: Register,
        /// value
        imm: u64,
    },
    /// `mov rd, rn`
    Mov {
        /// destination
        rd: Register,
        /// source
        rn: Register,
    },
    /// `add rd, rn, op`
    Add {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `sub rd, rn, op`
    Sub {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `and rd, rn, op`
    And {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `orr rd, rn, op`
    Orr {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `eor rd, rn, op`
    Eor {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `lsl rd, rn, #shift`
    Lsl {
        /// destination
        rd: Register,
        /// source
        rn: Register,
        /// shift amount
        shift: u8,
    },
    /// `lsr rd, rn, #shift`
    Lsr {
        /// destination
        rd: Register,
        /// source
        rn: Register,
        /// shift amount
        shift: u8,
    },
    /// `mul rd, rn, rm`
    Mul {
        /// destination
        rd: Register,
        /// first operand
        rn: Register,
        /// second operand
        rm: Register,
    },
    /// `sdiv rd, rn, rm`; division by zero yields zero.
    Sdiv {
        /// destination
        rd: Register,
        /// dividend
        rn: Register,
        /// divisor
        rm: Register,
    },
    /// `neg rd, rn`
    Neg {
        /// destination
        rd: Register,
        /// source
        rn: Register,
    },
    /// `sxtw`/`uxtb`/... `rd, rn`
    Extend {
        /// destination
        rd: Register,
        /// source
        rn: Register,
        /// extension
        kind: Extend,
    },
    /// `cmp rn, op` (64-bit, sets NZCV)
    Cmp {
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `tst rn, op` (sets N and Z, clears C and V)
    Tst {
        /// first operand
        rn: Register,
        /// second operand
        op: Operand,
    },
    /// `csel rd, rn, rm, cond`
    Csel {
        /// destination
        rd: Register,
        /// value if the condition holds
        rn: Register,
        /// value otherwise
        rm: Register,
        /// condition
        cond: Condition,
    },
    /// Load, zero- or sign-extending to 64 bits.
    Ldr {
        /// destination
        rt: Register,
        /// memory operand
        addr: Address,
        /// access width
        width: Width,
        /// sign-extend instead of zero-extend
        signed: bool,
    },
    /// Store the low `width` bytes.
    Str {
        /// source
        rt: Register,
        /// memory operand
        addr: Address,
        /// access width
        width: Width,
    },
    /// Load pair of words; `rt1` from the lower address.
    Ldp {
        /// first destination
        rt1: Register,
        /// second destination
        rt2: Register,
        /// memory operand
        addr: Address,
    },
    /// Store pair of words; `rt1` to the lower address.
    Stp {
        /// first source
        rt1: Register,
        /// second source
        rt2: Register,
        /// memory operand
        addr: Address,
    },
    /// Floating-point load.
    FLdr {
        /// destination
        vt: FloatRegister,
        /// memory operand
        addr: Address,
        /// precision
        precision: Precision,
    },
    /// Floating-point store.
    FStr {
        /// source
        vt: FloatRegister,
        /// memory operand
        addr: Address,
        /// precision
        precision: Precision,
    },
    /// Move raw bits from a general register.
    FMovFromGp {
        /// destination
        vd: FloatRegister,
        /// source
        rn: Register,
        /// precision
        precision: Precision,
    },
    /// Move raw bits to a general register (zero-extended).
    FMovToGp {
        /// destination
        rd: Register,
        /// source
        vn: FloatRegister,
        /// precision
        precision: Precision,
    },
    /// Two-operand floating-point arithmetic.
    FArith {
        /// operation
        op: FpBinary,
        /// precision
        precision: Precision,
        /// destination
        vd: FloatRegister,
        /// first operand
        vn: FloatRegister,
        /// second operand
        vm: FloatRegister,
    },
    /// One-operand floating-point arithmetic.
    FUnary {
        /// operation
        op: FpUnary,
        /// precision
        precision: Precision,
        /// destination
        vd: FloatRegister,
        /// operand
        vn: FloatRegister,
    },
    /// Atomic add: `rt = [rn]; [rn] += rs`.
    LdAdd {
        /// addend
        rs: Register,
        /// receives the old value
        rt: Register,
        /// address
        rn: Register,
        /// access width
        width: Width,
    },
    /// `adr rd, target`
    Adr {
        /// destination
        rd: Register,
        /// address
        target: u64,
    },
    /// `b target`
    B {
        /// destination
        target: u64,
    },
    /// `b.cond target`
    BCond {
        /// condition
        cond: Condition,
        /// destination
        target: u64,
    },
    /// `cbz rt, target`
    Cbz {
        /// tested register
        rt: Register,
        /// destination
        target: u64,
    },
    /// `cbnz rt, target`
    Cbnz {
        /// tested register
        rt: Register,
        /// destination
        target: u64,
    },
    /// `tbz rt, #bit, target`
    Tbz {
        /// tested register
        rt: Register,
        /// bit number
        bit: u8,
        /// destination
        target: u64,
    },
    /// `tbnz rt, #bit, target`
    Tbnz {
        /// tested register
        rt: Register,
        /// bit number
        bit: u8,
        /// destination
        target: u64,
    },
    /// `bl target`
    Bl {
        /// destination
        target: u64,
    },
    /// `br rn`
    Br {
        /// destination register
        rn: Register,
    },
    /// `blr rn`
    Blr {
        /// destination register
        rn: Register,
    },
    /// `ret rn`
    Ret {
        /// return address register
        rn: Register,
    },
    /// Call a host function through a trampoline selected by a packed call
    /// format. Arguments come from `x0..x7`/`v0..v7`; the result lands in
    /// `x0` or `v0`. Does not touch `lr`.
    CallNative {
        /// register holding the function address
        target: Register,
        /// register holding the packed call format
        format: Register,
    },
    /// Full memory barrier.
    Dmb,
    /// Breakpoint.
    Brk {
        /// immediate
        imm: u16,
    },
    /// Halt with a message (a failed internal check).
    Stop {
        /// message
        message: &'static str,
    },
}

impl Insn {
    /// Branch target of a pc-relative instruction.
    pub fn target(&self) -> Option<u64> {
        match *self {
            Insn::Adr { target, .. }
            | Insn::B { target }
            | Insn::BCond { target, .. }
            | Insn::Cbz { target, .. }
            | Insn::Cbnz { target, .. }
            | Insn::Tbz { target, .. }
            | Insn::Tbnz { target, .. }
            | Insn::Bl { target } => Some(target),
            _ => None,
        }
    }

    /// Replace the target of a pc-relative instruction.
    pub fn set_target(&mut self, new_target: u64) -> bool {
        match self {
            Insn::Adr { target, .. }
            | Insn::B { target }
            | Insn::BCond { target, .. }
            | Insn::Cbz { target, .. }
            | Insn::Cbnz { target, .. }
            | Insn::Tbz { target, .. }
            | Insn::Tbnz { target, .. }
            | Insn::Bl { target } => {
                *target = new_target;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "#{}", v),
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Lsl(r, s) => write!(f, "{}, lsl #{}", r, s),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Base(b, 0) => write!(f, "[{}]", b),
            Address::Base(b, o) => write!(f, "[{}, #{}]", b, o),
            Address::Pre(b, o) => write!(f, "[{}, #{}]!", b, o),
            Address::Post(b, o) => write!(f, "[{}], #{}", b, o),
            Address::Index(b, i, 0) => write!(f, "[{}, {}]", b, i),
            Address::Index(b, i, s) => write!(f, "[{}, {}, lsl #{}]", b, i, s),
        }
    }
}

fn ld_mnemonic(width: Width, signed: bool) -> &'static str {
    match (width, signed) {
        (Width::B, false) => "ldrb",
        (Width::B, true) => "ldrsb",
        (Width::H, false) => "ldrh",
        (Width::H, true) => "ldrsh",
        (Width::W, false) => "ldrw",
        (Width::W, true) => "ldrsw",
        (Width::X, _) => "ldr",
    }
}

fn st_mnemonic(width: Width) -> &'static str {
    match width {
        Width::B => "strb",
        Width::H => "strh",
        Width::W => "strw",
        Width::X => "str",
    }
}

fn fp_suffix(p: Precision) -> &'static str {
    match p {
        Precision::Single => "s",
        Precision::Double => "d",
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Nop => write!(f, "nop"),
            Insn::MovImm { rd, imm } => write!(f, "mov {}, #{:#x}", rd, imm),
            Insn::Mov { rd, rn } => write!(f, "mov {}, {}", rd, rn),
            Insn::Add { rd, rn, op } => write!(f, "add {}, {}, {}", rd, rn, op),
            Insn::Sub { rd, rn, op } => write!(f, "sub {}, {}, {}", rd, rn, op),
            Insn::And { rd, rn, op } => write!(f, "and {}, {}, {}", rd, rn, op),
            Insn::Orr { rd, rn, op } => write!(f, "orr {}, {}, {}", rd, rn, op),
            Insn::Eor { rd, rn, op } => write!(f, "eor {}, {}, {}", rd, rn, op),
            Insn::Lsl { rd, rn, shift } => write!(f, "lsl {}, {}, #{}", rd, rn, shift),
            Insn::Lsr { rd, rn, shift } => write!(f, "lsr {}, {}, #{}", rd, rn, shift),
            Insn::Mul { rd, rn, rm } => write!(f, "mul {}, {}, {}", rd, rn, rm),
            Insn::Sdiv { rd, rn, rm } => write!(f, "sdiv {}, {}, {}", rd, rn, rm),
            Insn::Neg { rd, rn } => write!(f, "neg {}, {}", rd, rn),
            Insn::Extend { rd, rn, kind } => {
                write!(f, "{} {}, {}", format!("{:?}", kind).to_lowercase(), rd, rn)
            }
            Insn::Cmp { rn, op } => write!(f, "cmp {}, {}", rn, op),
            Insn::Tst { rn, op } => write!(f, "tst {}, {}", rn, op),
            Insn::Csel { rd, rn, rm, cond } => {
                write!(f, "csel {}, {}, {}, {}", rd, rn, rm, cond.mnemonic())
            }
            Insn::Ldr {
                rt,
                addr,
                width,
                signed,
            } => write!(f, "{} {}, {}", ld_mnemonic(*width, *signed), rt, addr),
            Insn::Str { rt, addr, width } => write!(f, "{} {}, {}", st_mnemonic(*width), rt, addr),
            Insn::Ldp { rt1, rt2, addr } => write!(f, "ldp {}, {}, {}", rt1, rt2, addr),
            Insn::Stp { rt1, rt2, addr } => write!(f, "stp {}, {}, {}", rt1, rt2, addr),
            Insn::FLdr {
                vt,
                addr,
                precision,
            } => write!(f, "ldr{} {}, {}", fp_suffix(*precision), vt, addr),
            Insn::FStr {
                vt,
                addr,
                precision,
            } => write!(f, "str{} {}, {}", fp_suffix(*precision), vt, addr),
            Insn::FMovFromGp { vd, rn, precision } => {
                write!(f, "fmov{} {}, {}", fp_suffix(*precision), vd, rn)
            }
            Insn::FMovToGp { rd, vn, precision } => {
                write!(f, "fmov{} {}, {}", fp_suffix(*precision), rd, vn)
            }
            Insn::FArith {
                op,
                precision,
                vd,
                vn,
                vm,
            } => write!(
                f,
                "f{}{} {}, {}, {}",
                format!("{:?}", op).to_lowercase(),
                fp_suffix(*precision),
                vd,
                vn,
                vm
            ),
            Insn::FUnary {
                op,
                precision,
                vd,
                vn,
            } => write!(
                f,
                "f{}{} {}, {}",
                format!("{:?}", op).to_lowercase(),
                fp_suffix(*precision),
                vd,
                vn
            ),
            Insn::LdAdd { rs, rt, rn, width } => {
                let suffix = if *width == Width::W { "w" } else { "" };
                write!(f, "ldadd{} {}, {}, [{}]", suffix, rs, rt, rn)
            }
            Insn::Adr { rd, target } => write!(f, "adr {}, {:#x}", rd, target),
            Insn::B { target } => write!(f, "b {:#x}", target),
            Insn::BCond { cond, target } => write!(f, "b.{} {:#x}", cond.mnemonic(), target),
            Insn::Cbz { rt, target } => write!(f, "cbz {}, {:#x}", rt, target),
            Insn::Cbnz { rt, target } => write!(f, "cbnz {}, {:#x}", rt, target),
            Insn::Tbz { rt, bit, target } => write!(f, "tbz {}, #{}, {:#x}", rt, bit, target),
            Insn::Tbnz { rt, bit, target } => write!(f, "tbnz {}, #{}, {:#x}", rt, bit, target),
            Insn::Bl { target } => write!(f, "bl {:#x}", target),
            Insn::Br { rn } => write!(f, "br {}", rn),
            Insn::Blr { rn } => write!(f, "blr {}", rn),
            Insn::Ret { rn } => write!(f, "ret {}", rn),
            Insn::CallNative { target, format } => write!(f, "call_native {}, {}", target, format),
            Insn::Dmb => write!(f, "dmb ish"),
            Insn::Brk { imm } => write!(f, "brk #{}", imm),
            Insn::Stop { message } => write!(f, "stop \"{}\"", message),
        }
    }
}
