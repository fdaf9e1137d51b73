//! Packed native call formats.
//!
//! Generated code cannot name a host function type, so each native call
//! carries a 32-bit word describing its argument and result kinds:
//!
//! ```text
//! bits  0..4   argument count (at most 8)
//! bits  4..20  two bits per argument: 0 = word, 1 = int32, 2 = float, 3 = double
//! bits 24..28  result: 0 = void, 1 = int32, 2 = word, 3 = float, 4 = double
//! ```
//!
//! Word and int32 arguments are taken from the integer argument registers in
//! order, float and double arguments from the floating-point ones.

use arrayvec::ArrayVec;

/// Maximum arguments a call format can describe.
pub const MAX_ARGS: usize = 8;

/// Kind of a native argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// 64-bit integer or pointer
    Word,
    /// 32-bit integer
    Int32,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl ArgKind {
    fn bits(self) -> u32 {
        match self {
            ArgKind::Word => 0,
            ArgKind::Int32 => 1,
            ArgKind::Float => 2,
            ArgKind::Double => 3,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => ArgKind::Word,
            1 => ArgKind::Int32,
            2 => ArgKind::Float,
            _ => ArgKind::Double,
        }
    }

    /// True for the kinds passed in floating-point registers.
    pub fn is_floating(self) -> bool {
        matches!(self, ArgKind::Float | ArgKind::Double)
    }
}

/// Kind of a native result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// No result
    Void,
    /// 32-bit integer, sign-extended into the result word
    Int32,
    /// 64-bit integer or pointer
    Word,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl ReturnKind {
    fn bits(self) -> u32 {
        match self {
            ReturnKind::Void => 0,
            ReturnKind::Int32 => 1,
            ReturnKind::Word => 2,
            ReturnKind::Float => 3,
            ReturnKind::Double => 4,
        }
    }

    fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            0 => ReturnKind::Void,
            1 => ReturnKind::Int32,
            2 => ReturnKind::Word,
            3 => ReturnKind::Float,
            4 => ReturnKind::Double,
            _ => return None,
        })
    }
}

/// An unpacked call format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallFormat {
    args: ArrayVec<ArgKind, MAX_ARGS>,
    ret: ReturnKind,
}

impl CallFormat {
    /// Build a format. Fails when more than [`MAX_ARGS`] arguments are
    /// given.
    pub fn new(args: Vec<ArgKind>, ret: ReturnKind) -> Result<Self, String> {
        let args = ArrayVec::try_from(args.as_slice()).map_err(|_| {
            format!(
                "{} arguments exceed the {} register arguments supported",
                args.len(),
                MAX_ARGS
            )
        })?;
        Ok(Self { args, ret })
    }

    /// Argument kinds.
    pub fn args(&self) -> &[ArgKind] {
        &self.args
    }

    /// Result kind.
    pub fn ret(&self) -> ReturnKind {
        self.ret
    }

    /// Pack into a format word.
    pub fn pack(&self) -> u32 {
        let mut word = self.args.len() as u32;
        for (i, arg) in self.args.iter().enumerate() {
            word |= arg.bits() << (4 + 2 * i);
        }
        word | (self.ret.bits() << 24)
    }

    /// Unpack a format word.
    pub fn unpack(word: u32) -> Result<Self, String> {
        let count = (word & 0xf) as usize;
        if count > MAX_ARGS {
            return Err(format!("bad call format {:#x}: {} arguments", word, count));
        }
        let args = (0..count)
            .map(|i| ArgKind::from_bits(word >> (4 + 2 * i)))
            .collect();
        let ret = ReturnKind::from_bits((word >> 24) & 0xf)
            .ok_or_else(|| format!("bad call format {:#x}: result kind", word))?;
        Ok(Self { args, ret })
    }
}
