//! Register definitions and interpreter register roles.
//!
//! The register file follows AArch64: 31 general-purpose registers
//! (`x0`..`x30`), a separate stack pointer, a zero register that reads as
//! zero and discards writes, and floating-point registers of which the
//! interpreter uses `v0`..`v7`.

use std::fmt;

/// A general-purpose register, the stack pointer, or the zero register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    /// Stack pointer encoding in this model.
    const SP_INDEX: u8 = 31;
    /// Zero register encoding in this model.
    const ZR_INDEX: u8 = 32;

    /// `xN` for `N` in `0..=30`.
    pub const fn x(n: u8) -> Self {
        assert!(n <= 30);
        Register(n)
    }

    /// Slot in a register file of [`Register::FILE_SIZE`] entries.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Registers in the file, including `sp` and `zr`.
    pub const FILE_SIZE: usize = 33;

    /// True for the stack pointer.
    pub const fn is_sp(self) -> bool {
        self.0 == Self::SP_INDEX
    }

    /// True for the zero register.
    pub const fn is_zr(self) -> bool {
        self.0 == Self::ZR_INDEX
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Self::SP_INDEX => f.write_str("sp"),
            Self::ZR_INDEX => f.write_str("xzr"),
            29 => f.write_str("fp"),
            30 => f.write_str("lr"),
            n => write!(f, "x{}", n),
        }
    }
}

/// A floating-point register `vN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatRegister(u8);

impl FloatRegister {
    /// Floating-point registers in the file.
    pub const FILE_SIZE: usize = 8;

    /// `vN` for `N` in `0..8`.
    pub const fn v(n: u8) -> Self {
        assert!((n as usize) < Self::FILE_SIZE);
        FloatRegister(n)
    }

    /// Slot in the floating-point register file.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FloatRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

macro_rules! gprs {
    ($($name:ident = $n:expr),* $(,)?) => {
        $(
            #[allow(missing_docs)]
            pub const $name: Register = Register::x($n);
        )*
    };
}

gprs! {
    X0 = 0, X1 = 1, X2 = 2, X3 = 3, X4 = 4, X5 = 5, X6 = 6, X7 = 7,
    X8 = 8, X9 = 9, X10 = 10, X11 = 11, X12 = 12, X13 = 13, X14 = 14, X15 = 15,
    X16 = 16, X17 = 17, X18 = 18, X19 = 19, X20 = 20, X21 = 21, X22 = 22, X23 = 23,
    X24 = 24, X25 = 25, X26 = 26, X27 = 27, X28 = 28, X29 = 29, X30 = 30,
}

/// Stack pointer.
pub const SP: Register = Register(Register::SP_INDEX);
/// Zero register.
pub const ZR: Register = Register(Register::ZR_INDEX);

#[allow(missing_docs)]
pub const V0: FloatRegister = FloatRegister::v(0);
#[allow(missing_docs)]
pub const V1: FloatRegister = FloatRegister::v(1);
#[allow(missing_docs)]
pub const V2: FloatRegister = FloatRegister::v(2);
#[allow(missing_docs)]
pub const V3: FloatRegister = FloatRegister::v(3);

// Interpreter register roles.

/// Method being executed.
pub const RMETHOD: Register = X12;
/// Expression stack pointer.
pub const ESP: Register = X20;
/// Active dispatch table base.
pub const RDISPATCH: Register = X21;
/// Bytecode pointer.
pub const RBCP: Register = X22;
/// Address of local 0.
pub const RLOCALS: Register = X24;
/// Constant pool cache of the current method.
pub const RCPOOL: Register = X26;
/// Current thread.
pub const RTHREAD: Register = X28;
/// Frame pointer.
pub const RFP: Register = X29;
/// Link register.
pub const LR: Register = X30;
/// Scratch, clobbered freely.
pub const RSCRATCH1: Register = X8;
/// Scratch, clobbered freely.
pub const RSCRATCH2: Register = X9;
/// Sender sp handed to method entries.
pub const R13: Register = X13;

/// Integer argument registers of the native calling convention.
pub const C_RARGS: [Register; 8] = [X0, X1, X2, X3, X4, X5, X6, X7];
/// Floating-point argument registers of the native calling convention.
pub const C_FARGS: [FloatRegister; 8] = [
    FloatRegister::v(0),
    FloatRegister::v(1),
    FloatRegister::v(2),
    FloatRegister::v(3),
    FloatRegister::v(4),
    FloatRegister::v(5),
    FloatRegister::v(6),
    FloatRegister::v(7),
];
