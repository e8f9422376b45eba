//! The window of physical memory the frame pool manages.

use kernel_info::memory::PHYS_MEMORY_TOP;
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, PhysicalAddress, PhysicalPage, align_down, align_up};

/// Position of a frame within a [`ManagedRange`].
///
/// Only [`ManagedRange::index_of`] creates values of this type, so an index is
/// always in bounds for tables sized with [`ManagedRange::frames`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIndex(usize);

impl FrameIndex {
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("physical address {0} is not frame aligned")]
    Misaligned(PhysicalAddress),
    #[error("physical address {0} lies outside the managed range")]
    OutOfRange(PhysicalAddress),
}

/// A page-aligned, half-open physical range `[start, end)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ManagedRange {
    start: PhysicalPage,
    frames: usize,
}

impl ManagedRange {
    /// Whole frames within `[start, end)`: `start` is rounded up and `end`
    /// rounded down to a frame boundary. An inverted range is empty.
    ///
    /// The frame at physical address `0` is never managed; `0` terminates the
    /// free list.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let first = align_up(start.as_u64(), PAGE_SIZE);
        let first = if first == 0 { PAGE_SIZE } else { first };
        let last = align_down(end.as_u64(), PAGE_SIZE);
        let frames = if last > first { (last - first) >> PAGE_SHIFT } else { 0 };
        Self {
            start: PhysicalPage::containing(first),
            frames: frames as usize,
        }
    }

    /// Everything from the end of the kernel image up to the top of RAM.
    #[must_use]
    pub const fn above_kernel(kernel_end: PhysicalAddress) -> Self {
        Self::new(kernel_end, PhysicalAddress::new(PHYS_MEMORY_TOP))
    }

    /// First managed frame.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalPage {
        self.start
    }

    /// One past the last managed byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.start.offset_by(self.frames as u64).base()
    }

    /// Number of managed frames.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.frames == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.start.base().as_u64() && pa.as_u64() < self.end().as_u64()
    }

    /// Validate `pa` as a managed frame address and return its index.
    ///
    /// # Errors
    /// [`FrameError::Misaligned`] or [`FrameError::OutOfRange`].
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index_of(&self, pa: PhysicalAddress) -> Result<FrameIndex, FrameError> {
        if !pa.is_page_aligned() {
            return Err(FrameError::Misaligned(pa));
        }
        if !self.contains(pa) {
            return Err(FrameError::OutOfRange(pa));
        }
        Ok(FrameIndex(pa.page().index_from(self.start) as usize))
    }

    /// Frame at `index`.
    #[inline]
    #[must_use]
    pub const fn page(&self, index: FrameIndex) -> PhysicalPage {
        self.start.offset_by(index.0 as u64)
    }

    /// All managed frames in ascending order.
    pub fn pages(&self) -> impl Iterator<Item = PhysicalPage> + use<> {
        let start = self.start;
        (0..self.frames as u64).map(move |i| start.offset_by(i))
    }
}
