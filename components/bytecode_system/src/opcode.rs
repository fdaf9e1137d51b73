//! Bytecode opcodes
//!
//! Defines the bytecodes the template table implements, with their encoded
//! values and lengths. Operands follow the opcode byte big-endian; constant
//! pool cache indices are already rewritten into cache order, and
//! `invokedynamic` carries a four-byte index.

macro_rules! bytecodes {
    ($( $(#[$doc:meta])* $variant:ident = $value:expr, $len:expr, $name:expr; )*) => {
        /// A bytecode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum Bytecode {
            $( $(#[$doc])* $variant = $value, )*
        }

        impl Bytecode {
            /// Every implemented bytecode, in encoding order.
            pub const ALL: &'static [Bytecode] = &[ $( Bytecode::$variant, )* ];

            /// Decode an opcode byte.
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $( $value => Some(Bytecode::$variant), )*
                    _ => None,
                }
            }

            /// Encoded length including operands.
            pub fn length(self) -> usize {
                match self {
                    $( Bytecode::$variant => $len, )*
                }
            }

            /// Mnemonic.
            pub fn name(self) -> &'static str {
                match self {
                    $( Bytecode::$variant => $name, )*
                }
            }
        }
    };
}

bytecodes! {
    /// Do nothing
    Nop = 0x00, 1, "nop";
    /// Push null
    AconstNull = 0x01, 1, "aconst_null";
    /// Push int -1
    IconstM1 = 0x02, 1, "iconst_m1";
    /// Push int 0
    Iconst0 = 0x03, 1, "iconst_0";
    /// Push int 1
    Iconst1 = 0x04, 1, "iconst_1";
    /// Push int 2
    Iconst2 = 0x05, 1, "iconst_2";
    /// Push int 3
    Iconst3 = 0x06, 1, "iconst_3";
    /// Push int 4
    Iconst4 = 0x07, 1, "iconst_4";
    /// Push int 5
    Iconst5 = 0x08, 1, "iconst_5";
    /// Push long 0
    Lconst0 = 0x09, 1, "lconst_0";
    /// Push long 1
    Lconst1 = 0x0a, 1, "lconst_1";
    /// Push float 0
    Fconst0 = 0x0b, 1, "fconst_0";
    /// Push float 1
    Fconst1 = 0x0c, 1, "fconst_1";
    /// Push float 2
    Fconst2 = 0x0d, 1, "fconst_2";
    /// Push double 0
    Dconst0 = 0x0e, 1, "dconst_0";
    /// Push double 1
    Dconst1 = 0x0f, 1, "dconst_1";
    /// Push sign-extended byte operand
    Bipush = 0x10, 2, "bipush";
    /// Push sign-extended short operand
    Sipush = 0x11, 3, "sipush";
    /// Load int local
    Iload = 0x15, 2, "iload";
    /// Load long local
    Lload = 0x16, 2, "lload";
    /// Load float local
    Fload = 0x17, 2, "fload";
    /// Load double local
    Dload = 0x18, 2, "dload";
    /// Load reference local
    Aload = 0x19, 2, "aload";
    /// Load int local 0
    Iload0 = 0x1a, 1, "iload_0";
    /// Load int local 1
    Iload1 = 0x1b, 1, "iload_1";
    /// Load int local 2
    Iload2 = 0x1c, 1, "iload_2";
    /// Load int local 3
    Iload3 = 0x1d, 1, "iload_3";
    /// Load reference local 0
    Aload0 = 0x2a, 1, "aload_0";
    /// Load reference local 1
    Aload1 = 0x2b, 1, "aload_1";
    /// Load reference local 2
    Aload2 = 0x2c, 1, "aload_2";
    /// Load reference local 3
    Aload3 = 0x2d, 1, "aload_3";
    /// Load int array element
    Iaload = 0x2e, 1, "iaload";
    /// Store int local
    Istore = 0x36, 2, "istore";
    /// Store long local
    Lstore = 0x37, 2, "lstore";
    /// Store float local
    Fstore = 0x38, 2, "fstore";
    /// Store double local
    Dstore = 0x39, 2, "dstore";
    /// Store reference local
    Astore = 0x3a, 2, "astore";
    /// Store int local 0
    Istore0 = 0x3b, 1, "istore_0";
    /// Store int local 1
    Istore1 = 0x3c, 1, "istore_1";
    /// Store int local 2
    Istore2 = 0x3d, 1, "istore_2";
    /// Store int local 3
    Istore3 = 0x3e, 1, "istore_3";
    /// Store reference local 0
    Astore0 = 0x4b, 1, "astore_0";
    /// Store reference local 1
    Astore1 = 0x4c, 1, "astore_1";
    /// Store reference local 2
    Astore2 = 0x4d, 1, "astore_2";
    /// Store reference local 3
    Astore3 = 0x4e, 1, "astore_3";
    /// Store int array element
    Iastore = 0x4f, 1, "iastore";
    /// Discard one word
    Pop = 0x57, 1, "pop";
    /// Duplicate one word
    Dup = 0x59, 1, "dup";
    /// int add
    Iadd = 0x60, 1, "iadd";
    /// long add
    Ladd = 0x61, 1, "ladd";
    /// float add
    Fadd = 0x62, 1, "fadd";
    /// double add
    Dadd = 0x63, 1, "dadd";
    /// int subtract
    Isub = 0x64, 1, "isub";
    /// int multiply
    Imul = 0x68, 1, "imul";
    /// int divide
    Idiv = 0x6c, 1, "idiv";
    /// int negate
    Ineg = 0x74, 1, "ineg";
    /// Increment int local by a signed byte
    Iinc = 0x84, 3, "iinc";
    /// int to long
    I2l = 0x85, 1, "i2l";
    /// Branch if int is zero
    Ifeq = 0x99, 3, "ifeq";
    /// Branch if int is non-zero
    Ifne = 0x9a, 3, "ifne";
    /// Branch if int is negative
    Iflt = 0x9b, 3, "iflt";
    /// Branch if int is non-negative
    Ifge = 0x9c, 3, "ifge";
    /// Branch if int is positive
    Ifgt = 0x9d, 3, "ifgt";
    /// Branch if int is non-positive
    Ifle = 0x9e, 3, "ifle";
    /// Branch if ints are equal
    IfIcmpeq = 0x9f, 3, "if_icmpeq";
    /// Branch if ints differ
    IfIcmpne = 0xa0, 3, "if_icmpne";
    /// Branch if first int is less
    IfIcmplt = 0xa1, 3, "if_icmplt";
    /// Branch if first int is greater or equal
    IfIcmpge = 0xa2, 3, "if_icmpge";
    /// Branch if first int is greater
    IfIcmpgt = 0xa3, 3, "if_icmpgt";
    /// Branch if first int is less or equal
    IfIcmple = 0xa4, 3, "if_icmple";
    /// Unconditional branch
    Goto = 0xa7, 3, "goto";
    /// Return int
    Ireturn = 0xac, 1, "ireturn";
    /// Return long
    Lreturn = 0xad, 1, "lreturn";
    /// Return float
    Freturn = 0xae, 1, "freturn";
    /// Return double
    Dreturn = 0xaf, 1, "dreturn";
    /// Return reference
    Areturn = 0xb0, 1, "areturn";
    /// Return void
    Return = 0xb1, 1, "return";
    /// Load instance field
    Getfield = 0xb4, 3, "getfield";
    /// Store instance field
    Putfield = 0xb5, 3, "putfield";
    /// Invoke static method
    Invokestatic = 0xb8, 3, "invokestatic";
    /// Invoke through a call site (four-byte index)
    Invokedynamic = 0xba, 5, "invokedynamic";
    /// Allocate an instance
    New = 0xbb, 3, "new";
    /// Allocate a primitive array
    Newarray = 0xbc, 2, "newarray";
    /// Array length
    Arraylength = 0xbe, 1, "arraylength";
    /// Throw exception
    Athrow = 0xbf, 1, "athrow";
    /// Checked cast
    Checkcast = 0xc0, 3, "checkcast";
    /// Enter monitor
    Monitorenter = 0xc2, 1, "monitorenter";
    /// Exit monitor
    Monitorexit = 0xc3, 1, "monitorexit";
    /// Branch if null
    Ifnull = 0xc6, 3, "ifnull";
    /// Branch if non-null
    Ifnonnull = 0xc7, 3, "ifnonnull";
}

impl Bytecode {
    /// Opcode byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for bytecodes with a signed 16-bit branch offset operand.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Bytecode::Ifeq
                | Bytecode::Ifne
                | Bytecode::Iflt
                | Bytecode::Ifge
                | Bytecode::Ifgt
                | Bytecode::Ifle
                | Bytecode::IfIcmpeq
                | Bytecode::IfIcmpne
                | Bytecode::IfIcmplt
                | Bytecode::IfIcmpge
                | Bytecode::IfIcmpgt
                | Bytecode::IfIcmple
                | Bytecode::Goto
                | Bytecode::Ifnull
                | Bytecode::Ifnonnull
        )
    }

    /// True for the method return bytecodes.
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Bytecode::Ireturn
                | Bytecode::Lreturn
                | Bytecode::Freturn
                | Bytecode::Dreturn
                | Bytecode::Areturn
                | Bytecode::Return
        )
    }

    /// True for bytecodes whose operand is a constant pool cache index.
    pub fn uses_cp_cache(self) -> bool {
        matches!(
            self,
            Bytecode::Getfield
                | Bytecode::Putfield
                | Bytecode::Invokestatic
                | Bytecode::Invokedynamic
                | Bytecode::New
                | Bytecode::Checkcast
        )
    }
}

impl std::fmt::Display for Bytecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type operand of `newarray` for `int[]`.
pub const T_INT: u8 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_roundtrip() {
        for &bc in Bytecode::ALL {
            assert_eq!(Bytecode::from_u8(bc.as_u8()), Some(bc));
        }
        assert_eq!(Bytecode::from_u8(0xff), None);
    }

    #[test]
    fn test_lengths() {
        assert_eq!(Bytecode::Invokedynamic.length(), 5);
        assert_eq!(Bytecode::Invokestatic.length(), 3);
        assert_eq!(Bytecode::Iinc.length(), 3);
        assert_eq!(Bytecode::Ireturn.length(), 1);
        for &bc in Bytecode::ALL {
            if bc.is_branch() {
                assert_eq!(bc.length(), 3, "{}", bc);
            }
        }
    }
}
