//! Top-of-stack states.
//!
//! The interpreter caches the topmost expression stack value in a register
//! between templates. The state says which register holds it (if any) and
//! how it is typed: integer-like values live in `x0`, `long` in `x0`,
//! `float`/`double` in `v0`, references in `x0`, and `Vtos` means nothing is
//! cached.

use crate::BasicType;

/// Where the top-of-stack value is held on template boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TosState {
    /// byte, cached in `x0`
    Btos = 0,
    /// boolean, cached in `x0`
    Ztos = 1,
    /// char, cached in `x0`
    Ctos = 2,
    /// short, cached in `x0`
    Stos = 3,
    /// int, cached in `x0`
    Itos = 4,
    /// long, cached in `x0`
    Ltos = 5,
    /// float, cached in `v0`
    Ftos = 6,
    /// double, cached in `v0`
    Dtos = 7,
    /// object reference, cached in `x0`
    Atos = 8,
    /// nothing cached
    Vtos = 9,
}

impl TosState {
    /// Number of distinct states.
    pub const COUNT: usize = 10;

    /// Every state, in index order.
    pub const ALL: [TosState; TosState::COUNT] = [
        TosState::Btos,
        TosState::Ztos,
        TosState::Ctos,
        TosState::Stos,
        TosState::Itos,
        TosState::Ltos,
        TosState::Ftos,
        TosState::Dtos,
        TosState::Atos,
        TosState::Vtos,
    ];

    /// Index of this state in per-state tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`TosState::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The state a value of the given type occupies once loaded.
    pub fn from_basic_type(ty: BasicType) -> Self {
        match ty {
            BasicType::Byte => TosState::Btos,
            BasicType::Boolean => TosState::Ztos,
            BasicType::Char => TosState::Ctos,
            BasicType::Short => TosState::Stos,
            BasicType::Int => TosState::Itos,
            BasicType::Long => TosState::Ltos,
            BasicType::Float => TosState::Ftos,
            BasicType::Double => TosState::Dtos,
            BasicType::Object | BasicType::Array => TosState::Atos,
            BasicType::Void => TosState::Vtos,
        }
    }

    /// Expression stack words a value in this state occupies once pushed.
    pub fn slots(self) -> usize {
        match self {
            TosState::Ltos | TosState::Dtos => 2,
            TosState::Vtos => 0,
            _ => 1,
        }
    }

    /// True for the states cached as a sign-extended integer in `x0`.
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            TosState::Btos | TosState::Ztos | TosState::Ctos | TosState::Stos | TosState::Itos
        )
    }

    /// True for the states cached in `v0`.
    pub fn is_float_like(self) -> bool {
        matches!(self, TosState::Ftos | TosState::Dtos)
    }

    /// Short lowercase name, e.g. `itos`.
    pub fn name(self) -> &'static str {
        match self {
            TosState::Btos => "btos",
            TosState::Ztos => "ztos",
            TosState::Ctos => "ctos",
            TosState::Stos => "stos",
            TosState::Itos => "itos",
            TosState::Ltos => "ltos",
            TosState::Ftos => "ftos",
            TosState::Dtos => "dtos",
            TosState::Atos => "atos",
            TosState::Vtos => "vtos",
        }
    }
}

impl std::fmt::Display for TosState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
