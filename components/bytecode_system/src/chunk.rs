//! Bytecode assembly and iteration
//!
//! [`CodeBuilder`] emits method bodies with symbolic branch labels;
//! [`BytecodeStream`] walks an encoded body.

use crate::opcode::Bytecode;
use core_types::{VmError, VmResult};

/// A branch target inside a [`CodeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Emits a method body.
///
/// # Examples
///
/// ```
/// use bytecode_system::{Bytecode, CodeBuilder};
///
/// let mut b = CodeBuilder::new();
/// let done = b.new_label();
/// b.iload(0).branch(Bytecode::Ifeq, done).iconst(1).op(Bytecode::Ireturn);
/// b.bind(done);
/// b.iconst(0).op(Bytecode::Ireturn);
/// let code = b.finish().unwrap();
/// assert_eq!(code[0], Bytecode::Iload0.as_u8());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    // (bci of branch, label)
    fixups: Vec<(usize, Label)>,
}

impl CodeBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bci.
    pub fn pc(&self) -> usize {
        self.code.len()
    }

    /// Emit a bytecode without operands.
    pub fn op(&mut self, bc: Bytecode) -> &mut Self {
        self.code.push(bc.as_u8());
        self
    }

    /// Emit a bytecode with a one-byte operand.
    pub fn op_u1(&mut self, bc: Bytecode, operand: u8) -> &mut Self {
        self.code.push(bc.as_u8());
        self.code.push(operand);
        self
    }

    /// Emit a bytecode with a two-byte operand.
    pub fn op_u2(&mut self, bc: Bytecode, operand: u16) -> &mut Self {
        self.code.push(bc.as_u8());
        self.code.extend_from_slice(&operand.to_be_bytes());
        self
    }

    /// Emit a raw byte. Used to build deliberately malformed bodies.
    pub fn raw(&mut self, byte: u8) -> &mut Self {
        self.code.push(byte);
        self
    }

    /// Push an int constant with the shortest encoding.
    pub fn iconst(&mut self, value: i16) -> &mut Self {
        match value {
            -1..=5 => self.op(
                Bytecode::from_u8((Bytecode::Iconst0.as_u8() as i16 + value) as u8)
                    .unwrap_or(Bytecode::Iconst0),
            ),
            -128..=127 => self.op_u1(Bytecode::Bipush, value as i8 as u8),
            _ => self.op_u2(Bytecode::Sipush, value as u16),
        }
    }

    /// Load an int local.
    pub fn iload(&mut self, index: u8) -> &mut Self {
        self.local_op(Bytecode::Iload, Some(Bytecode::Iload0), index)
    }

    /// Load a reference local.
    pub fn aload(&mut self, index: u8) -> &mut Self {
        self.local_op(Bytecode::Aload, Some(Bytecode::Aload0), index)
    }

    /// Store an int local.
    pub fn istore(&mut self, index: u8) -> &mut Self {
        self.local_op(Bytecode::Istore, Some(Bytecode::Istore0), index)
    }

    /// Store a reference local.
    pub fn astore(&mut self, index: u8) -> &mut Self {
        self.local_op(Bytecode::Astore, Some(Bytecode::Astore0), index)
    }

    /// Load or store a local with the given wide form.
    pub fn local(&mut self, bc: Bytecode, index: u8) -> &mut Self {
        self.op_u1(bc, index)
    }

    fn local_op(&mut self, wide: Bytecode, short: Option<Bytecode>, index: u8) -> &mut Self {
        match short {
            Some(first) if index < 4 => {
                let bc = Bytecode::from_u8(first.as_u8() + index).unwrap_or(wide);
                self.op(bc)
            }
            _ => self.op_u1(wide, index),
        }
    }

    /// `iinc index, delta`
    pub fn iinc(&mut self, index: u8, delta: i8) -> &mut Self {
        self.code.push(Bytecode::Iinc.as_u8());
        self.code.push(index);
        self.code.push(delta as u8);
        self
    }

    /// Emit a constant pool cache referencing bytecode.
    pub fn cp_op(&mut self, bc: Bytecode, index: u16) -> &mut Self {
        if bc == Bytecode::Invokedynamic {
            self.code.push(bc.as_u8());
            self.code.extend_from_slice(&(index as u32).to_be_bytes());
            self
        } else {
            self.op_u2(bc, index)
        }
    }

    /// Allocate a label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current bci.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    /// Emit a branch to a label.
    pub fn branch(&mut self, bc: Bytecode, target: Label) -> &mut Self {
        self.fixups.push((self.code.len(), target));
        self.op_u2(bc, 0)
    }

    /// Resolve labels and return the encoded body.
    pub fn finish(&self) -> VmResult<Vec<u8>> {
        let mut code = self.code.clone();
        for &(bci, label) in &self.fixups {
            let target = self.labels[label.0]
                .ok_or_else(|| VmError::InvalidClass(format!("unbound label at bci {}", bci)))?;
            let offset = target as i64 - bci as i64;
            let offset = i16::try_from(offset).map_err(|_| {
                VmError::InvalidClass(format!("branch at bci {} out of range", bci))
            })?;
            code[bci + 1..bci + 3].copy_from_slice(&offset.to_be_bytes());
        }
        Ok(code)
    }
}

/// One decoded bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Position in the body
    pub bci: usize,
    /// The bytecode
    pub bytecode: Bytecode,
    /// Operand bytes following the opcode
    pub operand: i64,
}

impl std::fmt::Display for Decoded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.bytecode.length() == 1 {
            write!(f, "{:4}: {}", self.bci, self.bytecode)
        } else if self.bytecode.is_branch() {
            write!(
                f,
                "{:4}: {} {}",
                self.bci,
                self.bytecode,
                self.bci as i64 + self.operand
            )
        } else {
            write!(f, "{:4}: {} {}", self.bci, self.bytecode, self.operand)
        }
    }
}

/// Iterates over an encoded body. Stops at the first undecodable byte.
pub struct BytecodeStream<'a> {
    code: &'a [u8],
    bci: usize,
}

impl<'a> BytecodeStream<'a> {
    /// Stream over `code` from bci 0.
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, bci: 0 }
    }
}

impl Iterator for BytecodeStream<'_> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        let bytecode = Bytecode::from_u8(*self.code.get(self.bci)?)?;
        let len = bytecode.length();
        let operands = self.code.get(self.bci + 1..self.bci + len)?;
        let operand = match (bytecode, operands.len()) {
            (_, 0) => 0,
            (Bytecode::Bipush, 1) => operands[0] as i8 as i64,
            (_, 1) => operands[0] as i64,
            (Bytecode::Iinc, 2) => operands[1] as i8 as i64,
            (bc, 2) if bc.is_branch() || bc == Bytecode::Sipush => {
                i16::from_be_bytes([operands[0], operands[1]]) as i64
            }
            (_, 2) => u16::from_be_bytes([operands[0], operands[1]]) as i64,
            (_, _) => u32::from_be_bytes([operands[0], operands[1], operands[2], operands[3]]) as i64,
        };
        let decoded = Decoded {
            bci: self.bci,
            bytecode,
            operand,
        };
        self.bci += len;
        Some(decoded)
    }
}
