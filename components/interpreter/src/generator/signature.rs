//! Native signature handlers
//!
//! A signature handler moves a native method's parameters from the
//! interpreter's locals into argument registers. Handlers depend only on
//! the parameter shape, so methods with the same fingerprint share one.
//!
//! On entry `rlocals` points at local 0. On exit `x1..x7` and `v0..v7`
//! hold the arguments after the environment and `x0` holds the result
//! handler for the return type. `x0` itself is filled by the native entry.

use super::codegen_error;
use crate::config::InterpreterConfig;
use crate::masm::InterpreterMacroAssembler;
use assembler::registers::{C_FARGS, C_RARGS, LR, RLOCALS, RSCRATCH1, RSCRATCH2, X0, ZR};
use assembler::{Address, CodeBlob, Condition};
use bytecode_system::MethodDescriptor;
use core_types::{BasicType, VmError, VmResult, WORD};
use native_bridge::{ArgKind, CallFormat, ReturnKind, MAX_ARGS};
use std::fmt;

/// Arguments every native call gets before the declared parameters: the
/// environment and the receiver or class mirror.
pub const IMPLICIT_ARGS: usize = 2;

/// Parameter shape of a native method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureFingerprint {
    is_static: bool,
    parameters: Vec<BasicType>,
    return_type: BasicType,
}

fn shape(ty: BasicType) -> BasicType {
    match ty {
        BasicType::Array => BasicType::Object,
        other => other,
    }
}

impl SignatureFingerprint {
    /// Fingerprint of `descriptor`. Fails when the arguments do not fit in
    /// registers.
    pub fn new(descriptor: &MethodDescriptor, is_static: bool) -> VmResult<Self> {
        let parameters: Vec<BasicType> = descriptor.parameters().iter().copied().map(shape).collect();
        if parameters.len() + IMPLICIT_ARGS > MAX_ARGS {
            return Err(VmError::NativeBridge(format!(
                "{}: native methods take at most {} parameters",
                descriptor.as_str(),
                MAX_ARGS - IMPLICIT_ARGS
            )));
        }
        Ok(Self {
            is_static,
            parameters,
            return_type: shape(descriptor.return_type()),
        })
    }

    /// Whether there is no receiver.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Declared parameter types, arrays as objects.
    pub fn parameters(&self) -> &[BasicType] {
        &self.parameters
    }

    /// Return type, arrays as objects.
    pub fn return_type(&self) -> BasicType {
        self.return_type
    }
}

impl fmt::Display for SignatureFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for ty in &self.parameters {
            write!(f, "{}", descriptor_char(*ty))?;
        }
        write!(f, "){}", descriptor_char(self.return_type))?;
        if self.is_static {
            write!(f, " static")?;
        }
        Ok(())
    }
}

fn descriptor_char(ty: BasicType) -> char {
    match ty {
        BasicType::Boolean => 'Z',
        BasicType::Char => 'C',
        BasicType::Float => 'F',
        BasicType::Double => 'D',
        BasicType::Byte => 'B',
        BasicType::Short => 'S',
        BasicType::Int => 'I',
        BasicType::Long => 'J',
        BasicType::Void => 'V',
        BasicType::Object | BasicType::Array => 'L',
    }
}

fn arg_kind(ty: BasicType) -> ArgKind {
    match ty {
        BasicType::Float => ArgKind::Float,
        BasicType::Double => ArgKind::Double,
        BasicType::Long | BasicType::Object | BasicType::Array => ArgKind::Word,
        _ => ArgKind::Int32,
    }
}

fn return_kind(ty: BasicType) -> ReturnKind {
    match ty {
        BasicType::Void => ReturnKind::Void,
        BasicType::Float => ReturnKind::Float,
        BasicType::Double => ReturnKind::Double,
        BasicType::Long | BasicType::Object | BasicType::Array => ReturnKind::Word,
        _ => ReturnKind::Int32,
    }
}

/// Host call format of a native method with `descriptor`.
pub fn call_format(descriptor: &MethodDescriptor, _is_static: bool) -> VmResult<CallFormat> {
    // receiver handle and class mirror handle are both words
    let mut args = vec![ArgKind::Word, ArgKind::Word];
    args.extend(descriptor.parameters().iter().map(|&ty| arg_kind(ty)));
    CallFormat::new(args, return_kind(descriptor.return_type())).map_err(VmError::NativeBridge)
}

/// Generate the handler for `fingerprint` at `base`.
pub(crate) fn generate(
    base: u64,
    config: &InterpreterConfig,
    fingerprint: &SignatureFingerprint,
    result_handler: u64,
) -> VmResult<CodeBlob> {
    let name = format!("signature handler {}", fingerprint);
    let mut masm = InterpreterMacroAssembler::new(base, config);
    masm.begin_stub(&name).map_err(codegen_error)?;

    let mut offset: i64 = 0;
    let mut next_fp = 0;

    // x1: receiver handle; a static method's mirror handle is set by the
    // native entry
    if !fingerprint.is_static() {
        pass_object(&mut masm, offset, 1);
        offset += 1;
    }
    let mut next_gp = IMPLICIT_ARGS;

    for &ty in fingerprint.parameters() {
        match ty {
            BasicType::Float => {
                masm.ldrs(C_FARGS[next_fp], local(offset));
                next_fp += 1;
            }
            BasicType::Double => {
                masm.ldrd(C_FARGS[next_fp], local(offset + 1));
                next_fp += 1;
            }
            BasicType::Long => {
                masm.ldr(C_RARGS[next_gp], local(offset + 1));
                next_gp += 1;
            }
            BasicType::Object | BasicType::Array => {
                pass_object(&mut masm, offset, next_gp);
                next_gp += 1;
            }
            _ => {
                masm.ldr(C_RARGS[next_gp], local(offset));
                next_gp += 1;
            }
        }
        offset += ty.size_in_words() as i64;
    }

    masm.mov_imm(X0, result_handler);
    masm.ret(LR);
    masm.end_stub().map_err(codegen_error)?;
    masm.into_inner().finalize(&name).map_err(codegen_error)
}

fn local(offset: i64) -> Address {
    Address::new(RLOCALS, -offset * WORD)
}

/// Pass the address of the local holding an object, or null for a null
/// reference.
fn pass_object(masm: &mut InterpreterMacroAssembler, offset: i64, reg: usize) {
    masm.sub(RSCRATCH1, RLOCALS, offset * WORD);
    masm.ldr(RSCRATCH2, Address::new(RSCRATCH1, 0));
    masm.cmp(RSCRATCH2, 0i64);
    masm.csel(C_RARGS[reg], RSCRATCH1, ZR, Condition::Ne);
}
