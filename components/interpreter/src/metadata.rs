//! Metadata layout
//!
//! Byte offsets of the metaspace structures generated code reads, and the
//! load-time rewriting of bytecode operands into cache indices.
//!
//! ```text
//! Method        const method, access flags, invocation counter, entry,
//!               native function, signature handler, call format, id
//! ConstMethod   constants, parameter/local/stack sizes, code size, code bytes
//! ConstantPool  holder klass, cache, length
//! CpCache       16-byte header, then 32-byte entries
//! Klass         super, mirror, instance slots, id
//! ```

use bytecode_system::Bytecode;
use core_types::{TosState, VmError, VmResult};

/// `Method` field offsets.
pub mod method {
    /// `ConstMethod*`
    pub const CONST_METHOD: i64 = 0;
    /// `u32` access flags
    pub const ACCESS_FLAGS: i64 = 8;
    /// `u32` invocation counter
    pub const INVOCATION_COUNTER: i64 = 12;
    /// Entry used by interpreted callers
    pub const FROM_INTERPRETED: i64 = 16;
    /// Native function, 0 until linked
    pub const NATIVE_FUNCTION: i64 = 24;
    /// Signature handler, 0 until generated
    pub const SIGNATURE_HANDLER: i64 = 32;
    /// `u32` packed native call format
    pub const CALL_FORMAT: i64 = 40;
    /// `u32` runtime method id
    pub const ID: i64 = 44;
    /// Bytes in a `Method`
    pub const SIZE: u64 = 48;
}

/// `ConstMethod` field offsets.
pub mod const_method {
    /// `ConstantPool*`
    pub const CONSTANTS: i64 = 0;
    /// `u16` parameter words, receiver included
    pub const SIZE_OF_PARAMETERS: i64 = 8;
    /// `u16` local words, never below the parameter words
    pub const MAX_LOCALS: i64 = 10;
    /// `u16` expression stack words
    pub const MAX_STACK: i64 = 12;
    /// `u16` code bytes
    pub const CODE_SIZE: i64 = 14;
    /// First bytecode
    pub const CODES: i64 = 16;
}

/// `ConstantPool` field offsets.
pub mod constant_pool {
    /// Holder `Klass*`
    pub const POOL_HOLDER: i64 = 0;
    /// `ConstantPoolCache*`
    pub const CACHE: i64 = 8;
    /// Number of entries
    pub const LENGTH: i64 = 16;
    /// Bytes in a `ConstantPool`
    pub const SIZE: u64 = 24;
}

/// `ConstantPoolCache` layout.
pub mod cp_cache {
    /// Bytes before entry 0
    pub const BASE: i64 = 16;
    /// Bytes per entry
    pub const ENTRY_SIZE: i64 = 32;
    /// log2 of [`ENTRY_SIZE`]
    pub const ENTRY_SHIFT: u8 = 5;
    /// `u32`: pool index in bits 0..16, b1 in 16..24, b2 in 24..32
    pub const INDICES: i64 = 0;
    /// Bytecode the entry is resolved for (first slot)
    pub const B1: i64 = 2;
    /// Bytecode the entry is resolved for (second slot)
    pub const B2: i64 = 3;
    /// `Method*` or `Klass*`
    pub const F1: i64 = 8;
    /// Field byte offset
    pub const F2: i64 = 16;
    /// Parameter size and tos state
    pub const FLAGS: i64 = 24;
    /// Mask of the parameter size in [`FLAGS`]
    pub const PARAMETER_SIZE_MASK: i64 = 0xff;
    /// Position of the tos state in [`FLAGS`]
    pub const TOS_STATE_SHIFT: u8 = 28;

    /// Byte offset of `field` of entry `index` from the cache start.
    pub const fn entry_field(index: u64, field: i64) -> u64 {
        (BASE + index as i64 * ENTRY_SIZE + field) as u64
    }
}

/// `Klass` field offsets.
pub mod klass {
    /// Superclass `Klass*`, 0 for the root
    pub const SUPER: i64 = 0;
    /// `java/lang/Class` instance
    pub const MIRROR: i64 = 8;
    /// `u32` instance field slots, inherited ones included
    pub const INSTANCE_SLOTS: i64 = 16;
    /// `u32` runtime klass id
    pub const ID: i64 = 20;
    /// Bytes in a `Klass`
    pub const SIZE: u64 = 24;
}

/// Pack a cache entry's flags word.
pub fn pack_flags(parameter_size: usize, tos: TosState) -> u64 {
    (parameter_size as u64 & cp_cache::PARAMETER_SIZE_MASK as u64)
        | ((tos.index() as u64) << cp_cache::TOS_STATE_SHIFT)
}

/// Parameter size and tos state of a flags word.
pub fn unpack_flags(flags: u64) -> (usize, Option<TosState>) {
    let size = (flags & cp_cache::PARAMETER_SIZE_MASK as u64) as usize;
    let tos = TosState::from_index((flags >> cp_cache::TOS_STATE_SHIFT) as usize & 0xf);
    (size, tos)
}

/// The tos state values of a type are cached in.
///
/// Sub-word integers travel as `int`.
pub fn result_tos(tos: TosState) -> TosState {
    match tos {
        TosState::Btos | TosState::Ztos | TosState::Ctos | TosState::Stos => TosState::Itos,
        other => other,
    }
}

/// Rewrite constant pool operands to little-endian cache indices.
///
/// Cache indices equal pool indices, so only the byte order changes; branch
/// offsets and other operands keep their encoding. Rewriting stops at the
/// first byte that is not a known opcode, leaving it for dispatch to reject.
pub fn rewrite(code: &[u8]) -> VmResult<Vec<u8>> {
    let mut out = code.to_vec();
    let mut bci = 0;
    while bci < out.len() {
        let Some(bc) = Bytecode::from_u8(out[bci]) else {
            break;
        };
        let len = bc.length();
        if bci + len > out.len() {
            return Err(VmError::InvalidClass(format!(
                "{} at bci {} runs past the end of the code",
                bc.name(),
                bci
            )));
        }
        if bc.uses_cp_cache() {
            out[bci + 1..bci + len].reverse();
        }
        bci += len;
    }
    Ok(out)
}
