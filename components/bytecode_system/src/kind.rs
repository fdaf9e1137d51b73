//! Method kind classification
//!
//! Picks the entry stub a method will be invoked through. The order of the
//! checks matters: abstract beats everything, native beats synchronized, and
//! the fast paths (empty, accessor) only apply to plain methods. Intrinsics
//! are matched before the accessor shape since `Reference.get` is one.

use crate::class::MethodDefinition;
use crate::opcode::Bytecode;
use core_types::MethodKind;

/// Switches that enable the fast entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Classify single-`return` methods as [`MethodKind::Empty`]
    pub use_fast_empty_methods: bool,
    /// Classify trivial getters as [`MethodKind::Accessor`]
    pub use_fast_accessor_methods: bool,
}

impl Default for KindPolicy {
    fn default() -> Self {
        Self {
            use_fast_empty_methods: true,
            use_fast_accessor_methods: true,
        }
    }
}

const MATH_CLASS: &str = "java/lang/Math";
const REFERENCE_CLASS: &str = "java/lang/ref/Reference";
const METHOD_HANDLE_CLASS: &str = "java/lang/invoke/MethodHandle";

/// Classify `method` declared in `class_name`.
pub fn method_kind(class_name: &str, method: &MethodDefinition, policy: &KindPolicy) -> MethodKind {
    let access = method.access;
    if access.is_abstract() {
        return MethodKind::Abstract;
    }
    if class_name == METHOD_HANDLE_CLASS && matches!(method.name.as_str(), "invokeExact" | "invoke")
    {
        return MethodKind::MethodHandle;
    }
    if access.is_native() {
        return if access.is_synchronized() {
            MethodKind::NativeSynchronized
        } else {
            MethodKind::Native
        };
    }
    if access.is_synchronized() {
        return MethodKind::ZeroLocalsSynchronized;
    }
    if policy.use_fast_empty_methods && method.code == [Bytecode::Return.as_u8()] {
        return MethodKind::Empty;
    }
    if let Some(kind) = intrinsic_kind(class_name, method) {
        return kind;
    }
    if policy.use_fast_accessor_methods && is_accessor(method) {
        return MethodKind::Accessor;
    }
    MethodKind::ZeroLocals
}

fn is_accessor(method: &MethodDefinition) -> bool {
    let code = &method.code;
    code.len() == 5
        && !method.access.is_static()
        && method.descriptor.starts_with("()")
        && code[0] == Bytecode::Aload0.as_u8()
        && code[1] == Bytecode::Getfield.as_u8()
        && Bytecode::from_u8(code[4]).is_some_and(|bc| bc.is_return() && bc != Bytecode::Return)
}

fn intrinsic_kind(class_name: &str, method: &MethodDefinition) -> Option<MethodKind> {
    if class_name == REFERENCE_CLASS
        && method.name == "get"
        && method.descriptor == "()Ljava/lang/Object;"
    {
        return Some(MethodKind::ReferenceGet);
    }
    if class_name != MATH_CLASS || !method.access.is_static() {
        return None;
    }
    let unary = method.descriptor == "(D)D";
    let binary = method.descriptor == "(DD)D";
    Some(match method.name.as_str() {
        "sin" if unary => MethodKind::MathSin,
        "cos" if unary => MethodKind::MathCos,
        "tan" if unary => MethodKind::MathTan,
        "abs" if unary => MethodKind::MathAbs,
        "sqrt" if unary => MethodKind::MathSqrt,
        "log" if unary => MethodKind::MathLog,
        "log10" if unary => MethodKind::MathLog10,
        "exp" if unary => MethodKind::MathExp,
        "pow" if binary => MethodKind::MathPow,
        _ => return None,
    })
}
