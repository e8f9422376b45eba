//! # Virtual Memory Support
//!
//! A small, three-level page-table implementation (Sv39 layout) that the
//! physical frame allocator and the copy-on-write machinery build on.
//!
//! ## What you get
//! - [`PageEntryBits`]: the 64-bit entry layout, including the OS-reserved
//!   **copy-on-write** marker.
//! - [`PageTable`]: a 4 KiB-aligned array of 512 entries.
//! - [`AddressSpace`]: `walk` / `map` / `unmap` over a tree rooted at one
//!   table frame.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`FrameRelease`],
//!   [`PhysMapper`]) so the tables can live in frames handed out by whatever
//!   physical allocator the caller uses.
//!
//! ## Virtual Address → Physical Address Walk
//!
//! A 39-bit virtual address is divided into four fields:
//!
//! ```text
//! | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L2   |  L1   |  L0   | Offset |
//! ```
//!
//! Each level holds 512 (2⁹) entries. Entries at levels 2 and 1 point to the
//! next table; level-0 entries are leaves that map one 4 KiB frame.
//!
//! ## Frame ownership
//!
//! A leaf entry *owns* one reference to its frame. Removing the entry with
//! [`AddressSpace::unmap`] and a [`FrameRelease`] gives that reference back;
//! this is the only place the page-table code touches frame accounting.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod page_entry_bits;
mod page_table;

pub use crate::address_space::{AddressSpace, MapError, UnmapError};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{ENTRIES_PER_TABLE, LEVELS, PageTable, table_index};
pub use kernel_memory_addresses as addresses;

use crate::addresses::{PhysicalAddress, PhysicalPage};

/// Source of **zeroed** physical 4 KiB frames for page tables.
///
/// Returns `None` on out-of-memory.
pub trait FrameAlloc {
    /// Allocate one zero-filled 4 KiB frame.
    fn alloc_4k(&self) -> Option<PhysicalPage>;
}

/// Sink for frames whose last page-table reference has been removed.
///
/// Implementations decide whether the frame actually becomes free; a frame
/// still referenced elsewhere merely loses one owner.
pub trait FrameRelease {
    /// Give back one reference to `page`.
    fn release_4k(&self, page: PhysicalPage);
}

/// Converts physical addresses to *temporarily* usable pointers in the current
/// virtual address space (e.g., via identity map or a higher-half direct map, HHDM).
///
/// # Safety
/// - You must ensure `pa` is mapped as writable in the current page tables
///   for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB). Memory that other
///   cores may read at the same time, such as a shared frame, is only accessed
///   through [`phys_to_ptr`](Self::phys_to_ptr).
pub trait PhysMapper {
    /// Pointer to `pa` in the current address space. Creates no reference.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// See the trait documentation. No other reference to the bytes at `pa`
    /// may be live for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // SAFETY: forwarded to the caller.
        unsafe { &mut *self.phys_to_ptr::<T>(pa) }
    }
}
