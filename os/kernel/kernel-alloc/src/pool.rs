//! The physical frame pool.
//!
//! Free frames form an intrusive singly-linked list: the first word of every
//! free frame holds the physical address of the next one, `0` ends the list.
//! The list head sits behind a [`SpinLock`] that is only held for the
//! pointer swap; poison fills and copies happen outside of it.
//!
//! ```text
//!  head ──► ┌────────┐     ┌────────┐     ┌────────┐
//!           │ next ──┼───► │ next ──┼───► │ 0      │
//!           │ 0x01.. │     │ 0x01.. │     │ 0x01.. │
//!           └────────┘     └────────┘     └────────┘
//! ```

use crate::fatal::{self, InvariantViolation};
use crate::range::{FrameIndex, ManagedRange};
use crate::refcount::{ReferenceCountTable, Release};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameAlloc, FrameRelease, PhysMapper};

/// Byte pattern written over a frame when it is handed out.
pub const ALLOC_POISON: u8 = 0x05;

/// Byte pattern written over a frame when it returns to the pool.
pub const FREE_POISON: u8 = 0x01;

/// End-of-list marker; [`ManagedRange`] never contains frame `0`.
const LIST_END: u64 = 0;

type FrameBytes = [u8; PAGE_SIZE as usize];

/// Head of the intrusive free list.
struct FreeList {
    head: u64,
    len: usize,
}

/// Snapshot of the pool's occupancy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Frames in the managed range.
    pub total: usize,
    /// Frames on the free list.
    pub free: usize,
    /// Frames not on the free list.
    pub allocated: usize,
}

/// Lock-protected pool of 4 KiB physical frames with per-frame owner counts.
///
/// `M` gives the pool access to frame contents (free-list links, poison fills
/// and copies).
pub struct FramePool<M: PhysMapper> {
    mapper: M,
    range: ManagedRange,
    free: SpinLock<FreeList>,
    references: ReferenceCountTable,
}

impl<M: PhysMapper> FramePool<M> {
    /// An empty pool over `range`. Nothing can be allocated before
    /// [`init`](Self::init) or [`init_range`](Self::init_range).
    pub fn new(mapper: M, range: ManagedRange) -> Self {
        Self {
            mapper,
            range,
            free: SpinLock::new(
                "kmem",
                FreeList {
                    head: LIST_END,
                    len: 0,
                },
            ),
            references: ReferenceCountTable::new(range),
        }
    }

    /// Seed the pool with every frame of the managed range and end bootstrap.
    ///
    /// # Panics
    /// Through [`fatal::abort`] when called a second time.
    pub fn init(&self) {
        self.init_range(self.range.start().base(), self.range.end());
    }

    /// Seed the pool with the whole frames in `[start, end)` and end bootstrap.
    ///
    /// Frames of the managed range outside `[start, end)` stay reserved and are
    /// never handed out.
    ///
    /// # Panics
    /// Through [`fatal::abort`] when the pool was already initialized or a
    /// frame lies outside the managed range.
    pub fn init_range(&self, start: PhysicalAddress, end: PhysicalAddress) {
        if self.references.is_bootstrapped() {
            fatal::abort(InvariantViolation::AlreadyInitialized);
        }

        self.release_range(start, end);
        if !self.references.finish_bootstrap() {
            fatal::abort(InvariantViolation::AlreadyInitialized);
        }

        log::debug!(
            "frame pool {}..{}: {} of {} frames free",
            self.range.start().base(),
            self.range.end(),
            self.free_frames(),
            self.range.frames()
        );
    }

    fn release_range(&self, start: PhysicalAddress, end: PhysicalAddress) {
        for page in ManagedRange::new(start, end).pages() {
            self.release(page);
        }
    }

    /// Take one frame from the pool.
    ///
    /// The frame comes back filled with [`ALLOC_POISON`] and owned once.
    /// Returns `None` when the pool is empty.
    pub fn allocate(&self) -> Option<PhysicalPage> {
        let Some((page, index)) = self.free.with_lock(|list| self.pop(list)) else {
            log::warn!("frame pool exhausted ({} frames)", self.range.frames());
            return None;
        };

        self.references.claim(index);
        self.fill(page, ALLOC_POISON);
        log::trace!("allocated frame {page}");
        Some(page)
    }

    /// [`allocate`](Self::allocate), then clear the frame.
    pub fn allocate_zeroed(&self) -> Option<PhysicalPage> {
        let page = self.allocate()?;
        self.fill(page, 0);
        Some(page)
    }

    /// Drop one owner of `frame`; the last owner returns it to the pool.
    ///
    /// # Panics
    /// Through [`fatal::abort`] if `frame` is outside the managed range or is
    /// already free (after bootstrap).
    pub fn release(&self, frame: PhysicalPage) {
        let index = self.references.index(frame);
        self.release_index(frame, index);
    }

    /// [`release`](Self::release) for a raw address, as handed over by code
    /// that tracks frames as plain physical addresses.
    ///
    /// # Panics
    /// Through [`fatal::abort`] if `pa` is not frame aligned, plus the
    /// conditions of [`release`](Self::release).
    pub fn release_address(&self, pa: PhysicalAddress) {
        let Some(frame) = PhysicalPage::from_aligned(pa) else {
            fatal::abort(InvariantViolation::MisalignedFrame(pa));
        };
        self.release(frame);
    }

    fn release_index(&self, page: PhysicalPage, index: FrameIndex) {
        match self.references.release(index) {
            Release::Shared(owners) => {
                log::trace!("released frame {page}, {owners} owners left");
            }
            Release::Last => {
                self.fill(page, FREE_POISON);
                self.free.with_lock(|list| self.push(list, page));
                log::trace!("freed frame {page}");
            }
        }
    }

    /// Copy the contents of `from` into `to`.
    ///
    /// `from` may be read by other cores at the same time (a shared frame
    /// being copied by two faulting mappings), so it is only accessed through
    /// raw pointers.
    pub(crate) fn copy_frame(&self, from: PhysicalPage, to: PhysicalPage) {
        debug_assert_ne!(from, to);
        let src = self.mapper.phys_to_ptr::<FrameBytes>(from.base()).cast_const();
        let dst = self.mapper.phys_to_ptr::<FrameBytes>(to.base());
        // SAFETY: both frames are managed and distinct; the caller owns `to`
        // and holds a reference on `from`, which nobody writes while shared.
        unsafe { core::ptr::copy_nonoverlapping(src, dst, 1) };
    }

    fn fill(&self, page: PhysicalPage, byte: u8) {
        // SAFETY: the frame is managed and exclusively owned by the caller
        // (just popped or just dropped to zero owners).
        let bytes: &mut FrameBytes = unsafe { self.mapper.phys_to_mut(page.base()) };
        bytes.fill(byte);
    }

    fn pop(&self, list: &mut FreeList) -> Option<(PhysicalPage, FrameIndex)> {
        if list.head == LIST_END {
            return None;
        }

        let head = PhysicalAddress::new(list.head);
        let Ok(index) = self.range.index_of(head) else {
            fatal::abort(InvariantViolation::CorruptFreeList(head));
        };
        // SAFETY: `head` is a managed free frame; its first word is the link.
        let next: &mut u64 = unsafe { self.mapper.phys_to_mut(head) };
        list.head = *next;
        list.len -= 1;
        Some((head.page(), index))
    }

    fn push(&self, list: &mut FreeList, page: PhysicalPage) {
        // SAFETY: `page` is a managed frame with no owners left.
        let next: &mut u64 = unsafe { self.mapper.phys_to_mut(page.base()) };
        *next = list.head;
        list.head = page.base().as_u64();
        list.len += 1;
    }

    /// Number of frames currently on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.with_lock(|list| list.len)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let total = self.range.frames();
        let free = self.free_frames();
        PoolStats {
            total,
            free,
            allocated: total - free,
        }
    }

    /// Owner counts of all managed frames.
    #[inline]
    #[must_use]
    pub const fn references(&self) -> &ReferenceCountTable {
        &self.references
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> ManagedRange {
        self.range
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }
}

/// Page-table frames come from the pool, zeroed.
impl<M: PhysMapper> FrameAlloc for FramePool<M> {
    fn alloc_4k(&self) -> Option<PhysicalPage> {
        self.allocate_zeroed()
    }
}

/// Unmapping a leaf drops the owner its entry held.
impl<M: PhysMapper> FrameRelease for FramePool<M> {
    fn release_4k(&self, page: PhysicalPage) {
        self.release(page);
    }
}
