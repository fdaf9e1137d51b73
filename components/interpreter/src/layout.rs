//! Address-space layout
//!
//! Fixed addresses shared by the generator and the runtime. Low memory
//! holds the null page, VM globals and the three dispatch tables; sized
//! regions (metaspace, heap, thread, stack) follow from the configuration.
//! Generated code lives in the code cache, which is separate from data
//! memory, and runtime entry points occupy a reserved address range that
//! the simulator intercepts.

use crate::config::InterpreterConfig;
use core_types::TosState;

/// End of the protected page at address zero.
pub const NULL_PAGE_END: u64 = 0x1000;

/// VM globals page.
pub const GLOBALS_BASE: u64 = 0x1000;
/// `u32` safepoint state: 0 not synchronized, 1 synchronizing.
pub const SAFEPOINT_STATE: u64 = GLOBALS_BASE;
/// `u64` executed-bytecode counter.
pub const BYTECODE_COUNTER: u64 = GLOBALS_BASE + 0x08;
/// `u8` SATB marking-active flag.
pub const SATB_MARKING_ACTIVE: u64 = GLOBALS_BASE + 0x10;
/// Word written after native calls when barriers are not used.
pub const SERIALIZE_PAGE: u64 = GLOBALS_BASE + 0x18;
/// Return entry addresses, `[invoke length index][tos]`.
pub const RETURN_TABLE: u64 = GLOBALS_BASE + 0x40;
/// Per-opcode execution counters.
pub const BYTECODE_HISTOGRAM: u64 = GLOBALS_BASE + 0x100;

/// Bytes in one dispatch table.
pub const DISPATCH_TABLE_SIZE: u64 = TosState::COUNT as u64 * 256 * 8;
/// Table read by every dispatch.
pub const ACTIVE_TABLE: u64 = 0x10000;
/// Entries used while no safepoint is pending.
pub const NORMAL_TABLE: u64 = ACTIVE_TABLE + DISPATCH_TABLE_SIZE;
/// Entries used while a safepoint is pending.
pub const SAFEPT_TABLE: u64 = NORMAL_TABLE + DISPATCH_TABLE_SIZE;

/// Start of metaspace.
pub const METASPACE_BASE: u64 = 0x20000;

/// Bytes reserved for the thread structure.
pub const THREAD_SIZE: u64 = 0x1000;

/// First code cache address.
pub const CODE_BASE: u64 = 0x4000_0000;
/// End of the code cache.
pub const CODE_LIMIT: u64 = 0x5000_0000;

/// First runtime entry address.
pub const RUNTIME_BASE: u64 = 0x7000_0000;
/// Distance between runtime entries.
pub const RUNTIME_STRIDE: u64 = 16;
/// End of the runtime entry range.
pub const RUNTIME_END: u64 = 0x7001_0000;
/// Return address that ends a host call.
pub const HOST_RETURN: u64 = 0x7fff_0000;

/// Guard tag of the null page.
pub const NULL_PAGE_TAG: u32 = 1;
/// Guard tag of the yellow zone.
pub const YELLOW_ZONE_TAG: u32 = 2;
/// Guard tag of the red zone.
pub const RED_ZONE_TAG: u32 = 3;

/// Where the sized regions land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    /// Metaspace start
    pub metaspace_start: u64,
    /// Metaspace size
    pub metaspace_size: u64,
    /// Heap start
    pub heap_start: u64,
    /// Heap size
    pub heap_size: u64,
    /// Thread structure
    pub thread: u64,
    /// Lowest stack address
    pub stack_limit: u64,
    /// Highest stack address (stacks grow down from here)
    pub stack_base: u64,
    /// Page size
    pub page_size: u64,
    /// Red zone pages
    pub red_pages: u64,
    /// Yellow zone pages
    pub yellow_pages: u64,
    /// Total bytes of data memory
    pub size: u64,
}

impl MemoryMap {
    /// Lay out the regions for `config`.
    pub fn new(config: &InterpreterConfig) -> Self {
        let page = config.page_size;
        let metaspace_start = METASPACE_BASE;
        let heap_start = align_up(metaspace_start + config.metaspace_size, page);
        let thread = align_up(heap_start + config.heap_size, page);
        let stack_limit = align_up(thread + THREAD_SIZE, page);
        let stack_base = stack_limit + config.stack_size;
        Self {
            metaspace_start,
            metaspace_size: config.metaspace_size,
            heap_start,
            heap_size: config.heap_size,
            thread,
            stack_limit,
            stack_base,
            page_size: page,
            red_pages: config.stack_red_pages,
            yellow_pages: config.stack_yellow_pages,
            // one spare page above the stack base
            size: stack_base + page,
        }
    }

    /// `[start, end)` of the red zone.
    pub fn red_zone(&self) -> (u64, u64) {
        let start = self.stack_limit;
        (start, start + self.red_pages * self.page_size)
    }

    /// `[start, end)` of the yellow zone.
    pub fn yellow_zone(&self) -> (u64, u64) {
        let start = self.red_zone().1;
        (start, start + self.yellow_pages * self.page_size)
    }

    /// Stack size in bytes.
    pub fn stack_size(&self) -> u64 {
        self.stack_base - self.stack_limit
    }
}

/// Round `value` up to a multiple of the power of two `align`.
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// Address of the dispatch slot for `(tos, opcode)` in the table at `table`.
pub const fn dispatch_slot(table: u64, tos: TosState, opcode: u8) -> u64 {
    table + ((tos as u64) * 256 + opcode as u64) * 8
}

/// Address of the return-table slot for an invoke of `length` bytes.
pub fn return_table_slot(length: usize, tos: TosState) -> u64 {
    let row = if length == 5 { 1 } else { 0 };
    RETURN_TABLE + ((row * TosState::COUNT + tos.index()) as u64) * 8
}

/// Is `addr` in the runtime entry range?
pub fn is_runtime_address(addr: u64) -> bool {
    (RUNTIME_BASE..RUNTIME_END).contains(&addr)
}
