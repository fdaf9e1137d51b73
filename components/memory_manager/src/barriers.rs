//! Reference barriers.
//!
//! A snapshot-at-the-beginning collector must see every reference the
//! mutator loads out of a weak referent while marking is in progress. The
//! `Reference.get` entry hands each loaded referent to [`SatbQueue::enqueue`].
//! The queue is shared with a marking thread, which drains it while the
//! mutator keeps recording.

use core_types::Oop;
use crossbeam::atomic::AtomicCell;
use crossbeam::queue::SegQueue;

/// Keep-alive queue of the SATB barrier.
#[derive(Debug, Default)]
pub struct SatbQueue {
    marking_active: AtomicCell<bool>,
    buffer: SegQueue<Oop>,
}

impl SatbQueue {
    /// An inactive, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or stop concurrent marking.
    pub fn set_marking_active(&self, active: bool) {
        self.marking_active.store(active);
    }

    /// Is marking in progress?
    pub fn is_marking_active(&self) -> bool {
        self.marking_active.load()
    }

    /// Record `oop` if marking is active. Null is ignored.
    pub fn enqueue(&self, oop: Oop) {
        if self.marking_active.load() && oop != 0 {
            log::trace!("satb enqueue {:#x}", oop);
            self.buffer.push(oop);
        }
    }

    /// Take the recorded references, oldest first.
    pub fn drain(&self) -> Vec<Oop> {
        std::iter::from_fn(|| self.buffer.pop()).collect()
    }

    /// Recorded references.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
