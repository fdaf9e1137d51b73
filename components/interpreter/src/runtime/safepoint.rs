//! Safepoint synchronization
//!
//! Any thread may request a safepoint through a [`SafepointHandle`]. The
//! thread running guest code notices the request between instructions and
//! arms the dispatch tables: the safepoint table is copied over the active
//! one, so the next dispatched bytecode enters the runtime through
//! `at_safepoint`. There the pending VM operations run, the normal table is
//! copied back and the safepoint ends.
//!
//! Native code sees the same request through the global safepoint state
//! word, which the native entry reads on its way back to Java.

use crate::layout::{ACTIVE_TABLE, DISPATCH_TABLE_SIZE, NORMAL_TABLE, SAFEPOINT_STATE, SAFEPT_TABLE};
use core_types::VmResult;
use memory_manager::AddressSpace;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Work performed while every thread is stopped.
pub type VmOperation = Box<dyn FnOnce() + Send>;

/// Value of the safepoint state word while no safepoint is in progress.
pub const NOT_SYNCHRONIZED: u32 = 0;
/// Value of the safepoint state word while threads are being stopped.
pub const SYNCHRONIZING: u32 = 1;

struct Shared {
    requested: AtomicBool,
    operations: Mutex<Vec<(String, VmOperation)>>,
}

/// Cloneable handle for requesting safepoints.
#[derive(Clone)]
pub struct SafepointHandle {
    shared: Arc<Shared>,
}

impl SafepointHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                requested: AtomicBool::new(false),
                operations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Request a safepoint without queuing work.
    pub fn begin(&self) {
        self.shared.requested.store(true, Ordering::Release);
    }

    /// Queue `op` and request a safepoint to run it.
    pub fn request(&self, name: &str, op: VmOperation) {
        self.shared.operations.lock().push((name.to_string(), op));
        self.begin();
    }

    /// Whether a safepoint is requested and not yet completed.
    pub fn is_pending(&self) -> bool {
        self.shared.requested.load(Ordering::Acquire)
    }

    /// Operations waiting for the next safepoint.
    pub fn pending_operations(&self) -> usize {
        self.shared.operations.lock().len()
    }
}

impl std::fmt::Debug for SafepointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafepointHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Safepoint counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafepointStats {
    /// Safepoints completed
    pub safepoints: u64,
    /// VM operations run
    pub operations: u64,
}

/// Drives the dispatch tables through safepoints.
#[derive(Debug)]
pub struct SafepointSynchronizer {
    handle: SafepointHandle,
    synchronizing: bool,
    stats: SafepointStats,
}

impl Default for SafepointSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SafepointSynchronizer {
    /// No safepoint in progress.
    pub fn new() -> Self {
        Self {
            handle: SafepointHandle::new(),
            synchronizing: false,
            stats: SafepointStats::default(),
        }
    }

    /// A handle other threads may use.
    pub fn handle(&self) -> SafepointHandle {
        self.handle.clone()
    }

    /// Whether the tables are armed.
    pub fn is_synchronizing(&self) -> bool {
        self.synchronizing
    }

    /// Counters.
    pub fn stats(&self) -> SafepointStats {
        self.stats
    }

    /// Arm the tables if a safepoint was requested. Returns true when this
    /// call armed them.
    pub fn poll(&mut self, mem: &mut AddressSpace) -> VmResult<bool> {
        if self.synchronizing || !self.handle.is_pending() {
            return Ok(false);
        }
        self.notice_safepoints(mem)?;
        Ok(true)
    }

    /// Switch every dispatch to the safepoint entries.
    pub fn notice_safepoints(&mut self, mem: &mut AddressSpace) -> VmResult<()> {
        log::debug!("safepoint: arming dispatch tables");
        mem.write_u32(SAFEPOINT_STATE, SYNCHRONIZING)?;
        copy_table(mem, SAFEPT_TABLE, ACTIVE_TABLE)?;
        self.synchronizing = true;
        Ok(())
    }

    /// Restore normal dispatch.
    pub fn ignore_safepoints(&mut self, mem: &mut AddressSpace) -> VmResult<()> {
        copy_table(mem, NORMAL_TABLE, ACTIVE_TABLE)?;
        mem.write_u32(SAFEPOINT_STATE, NOT_SYNCHRONIZED)?;
        self.synchronizing = false;
        Ok(())
    }

    /// The thread reached a safepoint: run the queued operations and end
    /// the safepoint.
    pub fn at_safepoint(&mut self, mem: &mut AddressSpace) -> VmResult<()> {
        if !self.synchronizing {
            // a late poll after the safepoint already ended
            return Ok(());
        }
        let ops: Vec<(String, VmOperation)> = std::mem::take(&mut *self.handle.shared.operations.lock());
        for (name, op) in ops {
            log::debug!("safepoint: running {}", name);
            op();
            self.stats.operations += 1;
        }
        self.handle.shared.requested.store(false, Ordering::Release);
        self.stats.safepoints += 1;
        self.ignore_safepoints(mem)?;
        log::debug!("safepoint {} complete", self.stats.safepoints);
        Ok(())
    }
}

fn copy_table(mem: &mut AddressSpace, from: u64, to: u64) -> VmResult<()> {
    let table = mem.read_bytes(from, DISPATCH_TABLE_SIZE)?.to_vec();
    mem.write_bytes(to, &table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn memory() -> AddressSpace {
        let mut mem = AddressSpace::new(SAFEPT_TABLE + DISPATCH_TABLE_SIZE);
        mem.write_u64(NORMAL_TABLE, 0x111).unwrap();
        mem.write_u64(SAFEPT_TABLE, 0x222).unwrap();
        mem.write_u64(ACTIVE_TABLE, 0x111).unwrap();
        mem
    }

    #[test]
    fn test_poll_arms_only_when_requested() {
        let mut mem = memory();
        let mut sync = SafepointSynchronizer::new();
        assert!(!sync.poll(&mut mem).unwrap());
        sync.handle().begin();
        assert!(sync.poll(&mut mem).unwrap());
        assert_eq!(mem.read_u64(ACTIVE_TABLE).unwrap(), 0x222);
        assert_eq!(mem.read_u32(SAFEPOINT_STATE).unwrap(), SYNCHRONIZING);
        // already armed
        assert!(!sync.poll(&mut mem).unwrap());
    }

    #[test]
    fn test_at_safepoint_runs_operations_and_disarms() {
        let mut mem = memory();
        let mut sync = SafepointSynchronizer::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&ran);
        sync.handle().request(
            "count",
            Box::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(sync.handle().pending_operations(), 1);
        sync.poll(&mut mem).unwrap();
        sync.at_safepoint(&mut mem).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!sync.handle().is_pending());
        assert_eq!(mem.read_u64(ACTIVE_TABLE).unwrap(), 0x111);
        assert_eq!(mem.read_u32(SAFEPOINT_STATE).unwrap(), NOT_SYNCHRONIZED);
        assert_eq!(sync.stats().safepoints, 1);
        assert_eq!(sync.stats().operations, 1);
    }
}
