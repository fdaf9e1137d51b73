//! Interpreter frame layout
//!
//! An interpreter activation, addressed from the frame pointer (words):
//!
//! ```text
//!   +3  oop temp (native calls)      <- boxed object result
//!   +2  previous sp                  <- exact sp before the frame was built
//!   +1  return address
//!    0  saved fp                     <- rfp
//!   -1  sender esp
//!   -2  last sp (0 unless mid-call)
//!   -3  method
//!   -4  mdx (unused)
//!   -5  constant pool cache
//!   -6  locals
//!   -7  bcp (0 for native methods)
//!   -8  monitor block top            <- initial esp
//!       monitors (2 words each), then the expression stack
//! ```
//!
//! [`build_fixed_frame`] and [`remove_frame`] are inverses: removing a frame
//! restores the sp, fp and esp that were current before it was built.

use crate::masm::InterpreterMacroAssembler;
use crate::metadata::{const_method, constant_pool, method};
use assembler::registers::{ESP, LR, RBCP, RCPOOL, RFP, RLOCALS, RMETHOD, RSCRATCH1, SP, ZR};
use assembler::{Address, Register};
use core_types::WORD;

/// Word offset of the oop temp.
pub const OOP_TEMP_OFFSET: i64 = 3;
/// Word offset of the previous sp.
pub const PREV_SP_OFFSET: i64 = 2;
/// Word offset of the return address.
pub const RETURN_ADDRESS_OFFSET: i64 = 1;
/// Word offset of the saved fp.
pub const LINK_OFFSET: i64 = 0;
/// Word offset of the sender esp.
pub const SENDER_SP_OFFSET: i64 = -1;
/// Word offset of the last sp.
pub const LAST_SP_OFFSET: i64 = -2;
/// Word offset of the method.
pub const METHOD_OFFSET: i64 = -3;
/// Word offset of the method data index.
pub const MDX_OFFSET: i64 = -4;
/// Word offset of the constant pool cache.
pub const CACHE_OFFSET: i64 = -5;
/// Word offset of the locals pointer.
pub const LOCALS_OFFSET: i64 = -6;
/// Word offset of the bcp.
pub const BCP_OFFSET: i64 = -7;
/// Word offset of the monitor block top; also the initial esp.
pub const MONITOR_BLOCK_TOP_OFFSET: i64 = -8;
/// Monitors below this slot belong to the frame.
pub const MONITOR_BLOCK_BOTTOM_OFFSET: i64 = MONITOR_BLOCK_TOP_OFFSET;

/// Words in one monitor record.
pub const MONITOR_SIZE: i64 = 2;
/// Byte offset of the displaced header in a monitor record.
pub const MONITOR_LOCK_OFFSET: i64 = 0;
/// Byte offset of the locked object in a monitor record.
pub const MONITOR_OBJ_OFFSET: i64 = 8;

/// Bytes from fp down to the end of the fixed part, plus one monitor.
pub const OVERHEAD_SIZE: i64 = -MONITOR_BLOCK_TOP_OFFSET * WORD + MONITOR_SIZE * WORD;

/// `[rfp + offset words]`
pub fn at(offset: i64) -> Address {
    Address::new(RFP, offset * WORD)
}

/// Byte offset from fp of the first monitor record of a synchronized method.
pub const fn first_monitor_offset() -> i64 {
    (MONITOR_BLOCK_BOTTOM_OFFSET - MONITOR_SIZE) * WORD
}

/// Address of the first monitor record of a synchronized method.
pub fn first_monitor() -> Address {
    Address::new(RFP, first_monitor_offset())
}

/// Words a top-most activation of a method needs on the stack.
pub fn size_top_interpreter_activation(max_locals: u16, params: u16, max_stack: u16, synchronized: bool) -> u64 {
    let fixed = (-MONITOR_BLOCK_TOP_OFFSET + PREV_SP_OFFSET + 2) as u64;
    let extra_locals = max_locals.saturating_sub(params) as u64;
    let monitors = if synchronized { MONITOR_SIZE as u64 } else { 0 };
    // reservation below esp: max_stack + one monitor + two words of slack
    fixed + extra_locals + monitors + max_stack as u64 + MONITOR_SIZE as u64 + 2
}

/// Push the fixed part of an activation.
///
/// On entry `rmethod` holds the method, `rlocals` the locals, `esp` the
/// caller's expression stack top and `prev_sp` the sp to restore on
/// removal. Leaves `rbcp`, `rcpool` and `esp` set up for the first
/// dispatch; for bytecoded methods sp ends below the expression stack
/// reservation.
pub fn build_fixed_frame(masm: &mut InterpreterMacroAssembler, prev_sp: Register, native: bool) {
    masm.block_comment("build fixed frame");
    if native {
        // oop temp pair
        masm.stp(prev_sp, ZR, Address::Pre(SP, -16));
    } else {
        masm.str(prev_sp, Address::Pre(SP, -16));
    }
    masm.stp(RFP, LR, Address::Pre(SP, -16));
    masm.mov(RFP, SP);
    // last_sp, sender esp
    masm.stp(ZR, ESP, Address::Pre(SP, -16));
    // mdx, method
    masm.stp(ZR, RMETHOD, Address::Pre(SP, -16));
    masm.ldr(RCPOOL, Address::new(RMETHOD, method::CONST_METHOD));
    masm.ldr(RCPOOL, Address::new(RCPOOL, const_method::CONSTANTS));
    masm.ldr(RCPOOL, Address::new(RCPOOL, constant_pool::CACHE));
    masm.stp(RLOCALS, RCPOOL, Address::Pre(SP, -16));
    if native {
        masm.mov(RBCP, ZR);
        masm.stp(ZR, ZR, Address::Pre(SP, -16));
    } else {
        masm.ldr(RBCP, Address::new(RMETHOD, method::CONST_METHOD));
        masm.add(RBCP, RBCP, const_method::CODES);
        // monitor block top, bcp
        masm.stp(ZR, RBCP, Address::Pre(SP, -16));
    }
    masm.mov(ESP, SP);
    if !native {
        // reserve max_stack plus a monitor and two words below esp
        masm.ldr(RSCRATCH1, Address::new(RMETHOD, method::CONST_METHOD));
        masm.ldrh(RSCRATCH1, Address::new(RSCRATCH1, const_method::MAX_STACK));
        masm.add(RSCRATCH1, RSCRATCH1, MONITOR_SIZE + 2);
        masm.sub(RSCRATCH1, SP, assembler::Operand::Lsl(RSCRATCH1, 3));
        masm.andr(SP, RSCRATCH1, -16i64);
    }
    masm.str(ESP, at(MONITOR_BLOCK_TOP_OFFSET));
}

/// Pop an activation, restoring the caller's esp, fp, lr and exact sp.
pub fn remove_frame(masm: &mut InterpreterMacroAssembler) {
    masm.block_comment("remove frame");
    masm.ldr(ESP, at(SENDER_SP_OFFSET));
    masm.mov(SP, RFP);
    masm.ldp(RFP, LR, Address::Post(SP, 16));
    masm.ldr(RSCRATCH1, Address::new(SP, 0));
    masm.mov(SP, RSCRATCH1);
}
