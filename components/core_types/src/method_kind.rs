//! Method entry kinds.

/// Classification of a method that selects its entry stub.
///
/// Exactly one entry stub is generated per kind; every method of a kind
/// shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MethodKind {
    /// Ordinary bytecode method.
    ZeroLocals = 0,
    /// Ordinary bytecode method that must lock on entry.
    ZeroLocalsSynchronized,
    /// Native method.
    Native,
    /// Synchronized native method.
    NativeSynchronized,
    /// Method whose body is a single `return`.
    Empty,
    /// Method of the shape `aload_0, getfield, <x>return`.
    Accessor,
    /// Abstract method.
    Abstract,
    /// Method handle invocation.
    MethodHandle,
    /// `Math.sin`
    MathSin,
    /// `Math.cos`
    MathCos,
    /// `Math.tan`
    MathTan,
    /// `Math.abs`
    MathAbs,
    /// `Math.sqrt`
    MathSqrt,
    /// `Math.log`
    MathLog,
    /// `Math.log10`
    MathLog10,
    /// `Math.pow`
    MathPow,
    /// `Math.exp`
    MathExp,
    /// `Reference.get`
    ReferenceGet,
}

impl MethodKind {
    /// Number of kinds.
    pub const COUNT: usize = 18;

    /// Every kind, in index order.
    pub const ALL: [MethodKind; MethodKind::COUNT] = [
        MethodKind::ZeroLocals,
        MethodKind::ZeroLocalsSynchronized,
        MethodKind::Native,
        MethodKind::NativeSynchronized,
        MethodKind::Empty,
        MethodKind::Accessor,
        MethodKind::Abstract,
        MethodKind::MethodHandle,
        MethodKind::MathSin,
        MethodKind::MathCos,
        MethodKind::MathTan,
        MethodKind::MathAbs,
        MethodKind::MathSqrt,
        MethodKind::MathLog,
        MethodKind::MathLog10,
        MethodKind::MathPow,
        MethodKind::MathExp,
        MethodKind::ReferenceGet,
    ];

    /// Index of this kind in the entry table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`MethodKind::index`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// True for the math intrinsic kinds.
    pub fn is_math(self) -> bool {
        matches!(
            self,
            MethodKind::MathSin
                | MethodKind::MathCos
                | MethodKind::MathTan
                | MethodKind::MathAbs
                | MethodKind::MathSqrt
                | MethodKind::MathLog
                | MethodKind::MathLog10
                | MethodKind::MathPow
                | MethodKind::MathExp
        )
    }

    /// True for both native kinds.
    pub fn is_native(self) -> bool {
        matches!(self, MethodKind::Native | MethodKind::NativeSynchronized)
    }

    /// True for the kinds whose entry acquires the method's monitor.
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            MethodKind::ZeroLocalsSynchronized | MethodKind::NativeSynchronized
        )
    }

    /// Name used in stub listings.
    pub fn name(self) -> &'static str {
        match self {
            MethodKind::ZeroLocals => "zerolocals",
            MethodKind::ZeroLocalsSynchronized => "zerolocals_synchronized",
            MethodKind::Native => "native",
            MethodKind::NativeSynchronized => "native_synchronized",
            MethodKind::Empty => "empty",
            MethodKind::Accessor => "accessor",
            MethodKind::Abstract => "abstract",
            MethodKind::MethodHandle => "method_handle",
            MethodKind::MathSin => "java_lang_math_sin",
            MethodKind::MathCos => "java_lang_math_cos",
            MethodKind::MathTan => "java_lang_math_tan",
            MethodKind::MathAbs => "java_lang_math_abs",
            MethodKind::MathSqrt => "java_lang_math_sqrt",
            MethodKind::MathLog => "java_lang_math_log",
            MethodKind::MathLog10 => "java_lang_math_log10",
            MethodKind::MathPow => "java_lang_math_pow",
            MethodKind::MathExp => "java_lang_math_exp",
            MethodKind::ReferenceGet => "java_lang_ref_reference_get",
        }
    }
}

impl std::fmt::Display for MethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
