//! Guest values as seen by the host.

use crate::BasicType;
use std::fmt;

/// Address of a heap object in the simulated address space. Zero is null.
pub type Oop = u64;

/// A guest value crossing the host boundary (call arguments and results).
///
/// # Examples
///
/// ```
/// use core_types::Value;
///
/// let v = Value::Long(-1);
/// assert_eq!(v.to_stack_words(), vec![0, u64::MAX]);
/// assert_eq!(Value::Int(-1).to_stack_words(), vec![u64::MAX]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// No value (`void` result)
    Void,
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Object or array reference
    Object(Oop),
}

impl Value {
    /// The null reference.
    pub const NULL: Value = Value::Object(0);

    /// The type of this value.
    pub fn basic_type(&self) -> BasicType {
        match self {
            Value::Void => BasicType::Void,
            Value::Boolean(_) => BasicType::Boolean,
            Value::Byte(_) => BasicType::Byte,
            Value::Char(_) => BasicType::Char,
            Value::Short(_) => BasicType::Short,
            Value::Int(_) => BasicType::Int,
            Value::Long(_) => BasicType::Long,
            Value::Float(_) => BasicType::Float,
            Value::Double(_) => BasicType::Double,
            Value::Object(_) => BasicType::Object,
        }
    }

    /// Expression stack words for this value, in push order.
    ///
    /// Integer-like values are sign-extended to a full word. Two-word values
    /// push an unused high slot first and the payload second, so the payload
    /// lands at the lower address.
    pub fn to_stack_words(&self) -> Vec<u64> {
        match *self {
            Value::Void => vec![],
            Value::Boolean(b) => vec![b as u64],
            Value::Byte(v) => vec![v as i64 as u64],
            Value::Char(v) => vec![v as u64],
            Value::Short(v) => vec![v as i64 as u64],
            Value::Int(v) => vec![v as i64 as u64],
            Value::Long(v) => vec![0, v as u64],
            Value::Float(v) => vec![v.to_bits() as u64],
            Value::Double(v) => vec![0, v.to_bits()],
            Value::Object(oop) => vec![oop],
        }
    }

    /// Decode a result from the integer and floating result registers.
    pub fn from_registers(ty: BasicType, x0: u64, v0: u64) -> Value {
        match ty {
            BasicType::Void => Value::Void,
            BasicType::Boolean => Value::Boolean(x0 & 0xff != 0),
            BasicType::Byte => Value::Byte(x0 as i8),
            BasicType::Char => Value::Char(x0 as u16),
            BasicType::Short => Value::Short(x0 as i16),
            BasicType::Int => Value::Int(x0 as i32),
            BasicType::Long => Value::Long(x0 as i64),
            BasicType::Float => Value::Float(f32::from_bits(v0 as u32)),
            BasicType::Double => Value::Double(f64::from_bits(v0)),
            BasicType::Object | BasicType::Array => Value::Object(x0),
        }
    }

    /// The value as an `int`, if it is one.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a reference, if it is one.
    pub fn as_oop(&self) -> Option<Oop> {
        match *self {
            Value::Object(oop) => Some(oop),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "'{}'", c),
                None => write!(f, "\\u{:04x}", v),
            },
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Object(0) => write!(f, "null"),
            Value::Object(oop) => write!(f, "@{:#x}", oop),
        }
    }
}
