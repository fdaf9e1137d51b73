//! Guest basic types.

/// A guest type as it appears in method descriptors.
///
/// Discriminants follow the classic numbering used by class files for
/// `newarray` (`T_BOOLEAN = 4` ... `T_LONG = 11`), extended with object,
/// array and void.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum BasicType {
    /// `Z`
    Boolean = 4,
    /// `C`
    Char = 5,
    /// `F`
    Float = 6,
    /// `D`
    Double = 7,
    /// `B`
    Byte = 8,
    /// `S`
    Short = 9,
    /// `I`
    Int = 10,
    /// `J`
    Long = 11,
    /// `L...;`
    Object = 12,
    /// `[...`
    Array = 13,
    /// `V`
    Void = 14,
}

impl BasicType {
    /// Number of result handler slots; see [`BasicType::result_handler_index`].
    pub const RESULT_HANDLER_COUNT: usize = 10;

    /// One representative type per result handler slot, in slot order.
    pub const RESULT_HANDLER_TYPES: [BasicType; BasicType::RESULT_HANDLER_COUNT] = [
        BasicType::Boolean,
        BasicType::Char,
        BasicType::Byte,
        BasicType::Short,
        BasicType::Int,
        BasicType::Long,
        BasicType::Void,
        BasicType::Float,
        BasicType::Double,
        BasicType::Object,
    ];

    /// Decode a descriptor type character. Object and array types are
    /// recognised by their leading `L` and `[`.
    pub fn from_descriptor_char(c: char) -> Option<Self> {
        Some(match c {
            'Z' => BasicType::Boolean,
            'C' => BasicType::Char,
            'F' => BasicType::Float,
            'D' => BasicType::Double,
            'B' => BasicType::Byte,
            'S' => BasicType::Short,
            'I' => BasicType::Int,
            'J' => BasicType::Long,
            'L' => BasicType::Object,
            '[' => BasicType::Array,
            'V' => BasicType::Void,
            _ => return None,
        })
    }

    /// Decode a raw discriminant.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            4 => BasicType::Boolean,
            5 => BasicType::Char,
            6 => BasicType::Float,
            7 => BasicType::Double,
            8 => BasicType::Byte,
            9 => BasicType::Short,
            10 => BasicType::Int,
            11 => BasicType::Long,
            12 => BasicType::Object,
            13 => BasicType::Array,
            14 => BasicType::Void,
            _ => return None,
        })
    }

    /// Slot of the native result handler for this type. Arrays share the
    /// object handler.
    pub fn result_handler_index(self) -> usize {
        match self {
            BasicType::Boolean => 0,
            BasicType::Char => 1,
            BasicType::Byte => 2,
            BasicType::Short => 3,
            BasicType::Int => 4,
            BasicType::Long => 5,
            BasicType::Void => 6,
            BasicType::Float => 7,
            BasicType::Double => 8,
            BasicType::Object | BasicType::Array => 9,
        }
    }

    /// Words the type occupies in locals and on the expression stack.
    pub fn size_in_words(self) -> usize {
        match self {
            BasicType::Long | BasicType::Double => 2,
            BasicType::Void => 0,
            _ => 1,
        }
    }

    /// True for object and array types.
    pub fn is_reference(self) -> bool {
        matches!(self, BasicType::Object | BasicType::Array)
    }

    /// True for `float` and `double`.
    pub fn is_floating(self) -> bool {
        matches!(self, BasicType::Float | BasicType::Double)
    }

    /// Source-level name of the type.
    pub fn name(self) -> &'static str {
        match self {
            BasicType::Boolean => "boolean",
            BasicType::Char => "char",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Byte => "byte",
            BasicType::Short => "short",
            BasicType::Int => "int",
            BasicType::Long => "long",
            BasicType::Object => "object",
            BasicType::Array => "array",
            BasicType::Void => "void",
        }
    }
}
