//! Per-frame owner counts.
//!
//! Every managed frame has one [`AtomicU32`] counting the page-table entries
//! (or other owners) that refer to it:
//!
//! - `0`: the frame is free (on the pool's free list) or was never released
//!   into the pool.
//! - `1`: exactly one owner; the next release frees the frame.
//! - `n > 1`: shared; a release only drops one owner.
//!
//! All updates are single atomic read-modify-write operations and never take
//! the free-list lock. During bootstrap the pool releases frames whose count is
//! still `0`; the double-free check is suspended until
//! [`finish_bootstrap`](ReferenceCountTable::finish_bootstrap) runs.

use crate::fatal::{self, InvariantViolation};
use crate::range::{FrameError, FrameIndex, ManagedRange};
use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use kernel_memory_addresses::PhysicalPage;

/// Outcome of dropping one owner of a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Release {
    /// Other owners remain.
    Shared(u32),
    /// That was the last owner; the frame must go back to the free list.
    Last,
}

pub struct ReferenceCountTable {
    range: ManagedRange,
    counts: Box<[AtomicU32]>,
    bootstrapped: AtomicBool,
}

impl ReferenceCountTable {
    /// One zeroed counter per frame of `range`.
    #[must_use]
    pub fn new(range: ManagedRange) -> Self {
        Self {
            range,
            counts: (0..range.frames()).map(|_| AtomicU32::new(0)).collect(),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// Number of counters (managed frames).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Whether the initial seeding of the pool has completed.
    #[inline]
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    /// End the bootstrap phase. Returns `false` if it had already ended.
    pub(crate) fn finish_bootstrap(&self) -> bool {
        !self.bootstrapped.swap(true, Ordering::AcqRel)
    }

    /// Current owner count of `frame`.
    ///
    /// The value may be stale by the time it is inspected if other cores are
    /// sharing or releasing the frame.
    #[must_use]
    pub fn get(&self, frame: PhysicalPage) -> u32 {
        self.counter(self.index(frame)).load(Ordering::Acquire)
    }

    /// Whether `frame` currently has more than one owner.
    #[must_use]
    pub fn is_shared(&self, frame: PhysicalPage) -> bool {
        self.get(frame) > 1
    }

    /// Register one more owner of an allocated `frame`.
    ///
    /// Must happen before the new owner (e.g. a second mapping) becomes
    /// visible, so that a concurrent release of the old owner cannot free the
    /// frame in between.
    ///
    /// # Panics
    /// Through [`fatal::abort`] if `frame` is not managed, is free (count `0`
    /// after bootstrap) or the count would overflow.
    pub fn increment(&self, frame: PhysicalPage) {
        let counter = self.counter(self.index(frame));
        let mut current = counter.load(Ordering::Relaxed);
        loop {
            if current == 0 && self.is_bootstrapped() {
                fatal::abort(InvariantViolation::ReferenceToFreeFrame(frame));
            }
            let Some(next) = current.checked_add(1) else {
                fatal::abort(InvariantViolation::ReferenceOverflow(frame));
            };
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        log::trace!("frame {frame}: {} owners", current + 1);
    }

    /// Mark a frame freshly popped from the free list as owned once.
    pub(crate) fn claim(&self, index: FrameIndex) {
        let previous = self.counter(index).swap(1, Ordering::AcqRel);
        if previous != 0 {
            fatal::abort(InvariantViolation::FreeFrameReferenced {
                page: self.range.page(index),
                count: previous,
            });
        }
    }

    /// Drop one owner of the frame at `index`.
    ///
    /// A count of `0` is a double free once bootstrap has finished; before
    /// that it is how unused frames enter the pool.
    pub(crate) fn release(&self, index: FrameIndex) -> Release {
        let counter = self.counter(index);
        let mut current = counter.load(Ordering::Relaxed);
        loop {
            let next = match current {
                0 if self.is_bootstrapped() => {
                    fatal::abort(InvariantViolation::DoubleFree(self.range.page(index)))
                }
                0 => return Release::Last,
                n => n - 1,
            };
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) if next == 0 => return Release::Last,
                Ok(_) => return Release::Shared(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Validate `frame`; invalid frames are fatal.
    pub(crate) fn index(&self, frame: PhysicalPage) -> FrameIndex {
        match self.range.index_of(frame.base()) {
            Ok(index) => index,
            Err(FrameError::Misaligned(pa)) => {
                fatal::abort(InvariantViolation::MisalignedFrame(pa))
            }
            Err(FrameError::OutOfRange(pa)) => {
                fatal::abort(InvariantViolation::FrameOutOfRange(pa))
            }
        }
    }

    #[inline]
    fn counter(&self, index: FrameIndex) -> &AtomicU32 {
        &self.counts[index.get()]
    }
}
