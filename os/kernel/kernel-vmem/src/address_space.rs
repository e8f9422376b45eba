//! # Address Space
//!
//! Helpers to build and manipulate a **single** virtual address space (tree
//! rooted at one table frame).
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] to read the leaf entry for a VA.
//! - [`AddressSpace::map`] to install leaves for a page range, allocating
//!   intermediate tables on demand.
//! - [`AddressSpace::unmap`] to clear leaves, optionally handing each frame
//!   back through a [`FrameRelease`].
//! - [`AddressSpace::update`] to rewrite a leaf's permissions in place.
//! - [`AddressSpace::destroy`] to return the table frames themselves.
//!
//! ## Safety
//!
//! - Mutating active mappings requires appropriate **TLB maintenance**; this
//!   module never flushes.
//! - The provided `PhysMapper` must yield **writable** references to table frames.
//! - Concurrent mutation of the *same* address space must be serialized by
//!   the caller; distinct address spaces may be used from different cores.

use crate::addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, VirtualAddress};
use crate::page_table::{LEVELS, PageTable, table_index};
use crate::{FrameAlloc, FrameRelease, PageEntryBits, PhysMapper};
use kernel_info::memory::USERSPACE_END;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage,
    mapper: &'m M,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("virtual address {0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    #[error("out of memory while allocating a page table")]
    OutOfMemory,
    #[error("virtual address {0} is not page aligned")]
    Unaligned(VirtualAddress),
    #[error("virtual address {0} lies beyond the end of the address space")]
    OutOfRange(VirtualAddress),
    #[error("cannot map an empty range")]
    EmptyRange,
    #[error("leaf permissions must allow read, write or execute")]
    NoAccess,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnmapError {
    #[error("virtual address {0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("virtual address {0} is not page aligned")]
    Unaligned(VirtualAddress),
    #[error("virtual address {0} is still mapped")]
    LeafStillMapped(VirtualAddress),
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing root table.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage) -> Self {
        Self { root, mapper }
    }

    /// Create an empty address space with a freshly allocated root table.
    ///
    /// Returns `None` if `alloc` is out of frames.
    pub fn create<A: FrameAlloc + ?Sized>(mapper: &'m M, alloc: &A) -> Option<Self> {
        let root = alloc.alloc_4k()?;
        let space = Self::from_root(mapper, root);
        space.table(root).zero();
        Some(space)
    }

    /// Physical page of the root table.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage {
        self.root
    }

    /// Borrow the table stored in `page`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    fn table(&self, page: PhysicalPage) -> &mut PageTable {
        // SAFETY: every page handed to this function is either the root or was
        // read from a valid non-leaf entry of this tree.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Locate the level-0 slot for `va`.
    ///
    /// With `alloc`, missing intermediate tables are created; `None` then means
    /// out of memory. Without `alloc`, `None` means the chain does not exist.
    #[allow(clippy::mut_from_ref)]
    fn leaf_slot(
        &self,
        va: VirtualAddress,
        alloc: Option<&dyn FrameAlloc>,
    ) -> Option<&mut PageEntryBits> {
        if va.as_u64() >= USERSPACE_END {
            return None;
        }

        let mut table = self.table(self.root);
        for level in (1..LEVELS).rev() {
            let index = table_index(va, level);
            let entry = table.get(index);
            let next = if entry.valid() {
                debug_assert!(!entry.is_leaf(), "huge leaves are not supported");
                entry.physical_page()
            } else {
                let page = alloc?.alloc_4k()?;
                self.table(page).zero();
                table.set(index, PageEntryBits::next_table(page));
                page
            };
            table = self.table(next);
        }
        Some(table.entry_mut(table_index(va, 0)))
    }

    /// Leaf entry mapping `va`, if any.
    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        let entry = *self.leaf_slot(va, None)?;
        entry.valid().then_some(entry)
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.walk(va)?;
        Some(entry.physical_page().base() + va.offset())
    }

    /// Map `[va, va + size)` to consecutive frames starting at `frame`, with
    /// the permission bits of `perm` (its frame number and `V` bit are ignored).
    ///
    /// `size` is rounded up to whole pages. On failure, pages mapped by this
    /// call are removed again (without releasing their frames) and the error
    /// names the page that could not be mapped.
    ///
    /// # Errors
    /// - [`MapError::Unaligned`] / [`MapError::EmptyRange`] for bad arguments.
    /// - [`MapError::NoAccess`] if `perm` grants none of read, write, execute.
    /// - [`MapError::OutOfRange`] past the end of the address space.
    /// - [`MapError::AlreadyMapped`] if a target page already has a leaf.
    /// - [`MapError::OutOfMemory`] if an intermediate table can't be allocated.
    pub fn map<A: FrameAlloc>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        size: u64,
        frame: PhysicalPage,
        perm: PageEntryBits,
    ) -> Result<(), MapError> {
        if !va.is_page_aligned() {
            return Err(MapError::Unaligned(va));
        }
        if size == 0 {
            return Err(MapError::EmptyRange);
        }
        // Without R/W/X the entry would read as a table pointer.
        if !(perm.readable() || perm.writable() || perm.executable()) {
            return Err(MapError::NoAccess);
        }

        let pages = size.div_ceil(PAGE_SIZE);
        let perm = perm.permissions();
        for i in 0..pages {
            let page_va = va.page().offset_by(i).base();
            if let Err(e) = self.map_page(alloc, page_va, frame.offset_by(i), perm) {
                self.unmap_partial(va, i);
                log::debug!("map {va}+{size:#x} failed at page {i}: {e}");
                return Err(e);
            }
        }

        log::trace!("mapped {va}+{size:#x} -> {frame} ({perm:?})");
        Ok(())
    }

    fn map_page<A: FrameAlloc>(
        &self,
        alloc: &A,
        va: VirtualAddress,
        frame: PhysicalPage,
        perm: PageEntryBits,
    ) -> Result<(), MapError> {
        if va.as_u64() >= USERSPACE_END {
            return Err(MapError::OutOfRange(va));
        }
        let slot = self
            .leaf_slot(va, Some(alloc as &dyn FrameAlloc))
            .ok_or(MapError::OutOfMemory)?;
        if slot.valid() {
            return Err(MapError::AlreadyMapped(va));
        }
        *slot = perm.leaf(frame);
        Ok(())
    }

    /// Roll back the first `pages` pages of a failed [`map`](Self::map).
    fn unmap_partial(&self, va: VirtualAddress, pages: u64) {
        for i in 0..pages {
            if let Some(slot) = self.leaf_slot(va.page().offset_by(i).base(), None) {
                *slot = PageEntryBits::new();
            }
        }
    }

    /// Remove `pages` leaves starting at `va`.
    ///
    /// With `release`, each removed frame is handed to
    /// [`FrameRelease::release_4k`] exactly once, after its entry is cleared.
    /// Pages before the first failing one stay unmapped.
    ///
    /// # Errors
    /// - [`UnmapError::Unaligned`] if `va` is not page aligned.
    /// - [`UnmapError::NotMapped`] for the first page without a leaf.
    pub fn unmap(
        &self,
        va: VirtualAddress,
        pages: u64,
        release: Option<&dyn FrameRelease>,
    ) -> Result<(), UnmapError> {
        if !va.is_page_aligned() {
            return Err(UnmapError::Unaligned(va));
        }

        for i in 0..pages {
            let page_va = va.page().offset_by(i).base();
            let slot = self
                .leaf_slot(page_va, None)
                .ok_or(UnmapError::NotMapped(page_va))?;
            if !slot.is_leaf() {
                return Err(UnmapError::NotMapped(page_va));
            }

            let frame = slot.physical_page();
            *slot = PageEntryBits::new();
            if let Some(release) = release {
                release.release_4k(frame);
            }
        }

        log::trace!("unmapped {va}+{pages} pages (release: {})", release.is_some());
        Ok(())
    }

    /// Rewrite the leaf for `va` with `f(old)`, keeping its frame.
    ///
    /// Returns the entry as it was before the update, or `None` if `va` is not
    /// mapped (nothing is changed then).
    pub fn update(
        &self,
        va: VirtualAddress,
        f: impl FnOnce(PageEntryBits) -> PageEntryBits,
    ) -> Option<PageEntryBits> {
        let slot = self.leaf_slot(va, None)?;
        if !slot.is_leaf() {
            return None;
        }
        let old = *slot;
        *slot = f(old.permissions()).leaf(old.physical_page());
        Some(old)
    }

    /// Free every table frame of this address space, root included.
    ///
    /// All leaves must have been unmapped first; the check happens before
    /// anything is freed.
    ///
    /// # Errors
    /// [`UnmapError::LeafStillMapped`] naming one still-mapped page.
    pub fn destroy(self, release: &dyn FrameRelease) -> Result<(), UnmapError> {
        if let Some(va) = self.find_leaf(self.root, LEVELS - 1, 0) {
            return Err(UnmapError::LeafStillMapped(va));
        }
        self.free_tables(self.root, LEVELS - 1, release);
        Ok(())
    }

    fn find_leaf(&self, page: PhysicalPage, level: usize, base: u64) -> Option<VirtualAddress> {
        let shift = 12 + 9 * level as u64;
        for (index, entry) in self.table(page).valid_entries() {
            let va = base | ((index as u64) << shift);
            if level == 0 || entry.is_leaf() {
                return Some(VirtualAddress::new(va));
            }
            if let Some(found) = self.find_leaf(entry.physical_page(), level - 1, va) {
                return Some(found);
            }
        }
        None
    }

    fn free_tables(&self, page: PhysicalPage, level: usize, release: &dyn FrameRelease) {
        if level > 0 {
            for (_, entry) in self.table(page).valid_entries() {
                self.free_tables(entry.physical_page(), level - 1, release);
            }
        }
        release.release_4k(page);
    }
}
