//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and 4 KiB page bases used
//! by the frame allocator and the page-table code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |----------|----------|
//! | [`PhysicalAddress`] | Any byte address in physical memory. |
//! | [`PhysicalPage`] | The page-aligned base of a 4 KiB physical frame. |
//! | [`VirtualAddress`] | Any byte address in a (page-table translated) address space. |
//! | [`VirtualPage`] | The page-aligned base of a 4 KiB virtual page. |
//!
//! The page types can only hold aligned values: constructing one either
//! aligns down explicitly ([`PhysicalAddress::page`]) or checks
//! ([`PhysicalPage::from_aligned`]). Code that receives a page therefore never
//! re-validates alignment.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8000_1234);
//! let frame = pa.page();
//! assert_eq!(frame.base().as_u64(), 0x8000_1000);
//! assert_eq!(pa.offset(), 0x234);
//! assert!(PhysicalPage::from_aligned(pa).is_none());
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` over `u64` and implement `Copy`,
//!   `Eq`, `Ord` and `Hash`, making them suitable as map keys.
//! - All alignment and offset calculations are `const fn`.
//! - Only the 4 KiB base page size exists; there are no huge-page variants.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use page_size::{PAGE_SHIFT, PAGE_SIZE, align_down, align_up, is_page_aligned};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_page_and_offset() {
        let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
        let pp = pa.page();
        assert_eq!(pp.base().as_u64(), 0x0000_0010_2000_0000);
        assert_eq!(pa.offset(), 0x42);
        assert_eq!(pp.base() + pa.offset(), pa);
    }

    #[test]
    fn checked_page_construction() {
        assert!(PhysicalPage::from_aligned(PhysicalAddress::new(0x1001)).is_none());
        let pp = PhysicalPage::from_aligned(PhysicalAddress::new(0x2000)).unwrap();
        assert_eq!(pp.base().as_u64(), 0x2000);
        assert_eq!(pp.index_from(PhysicalPage::containing(0x1000)), 1);
    }

    #[test]
    fn page_stepping() {
        let pp = PhysicalPage::containing(0x8000_0000);
        assert_eq!(pp.offset_by(3).base().as_u64(), 0x8000_3000);

        let vp = VirtualAddress::new(0x4_2fff).page();
        assert_eq!(vp.base().as_u64(), 0x4_2000);
        assert_eq!(vp.offset_by(1).base().as_u64(), 0x4_3000);
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x12345, PAGE_SIZE), 0x12000);
        assert_eq!(align_up(0x12345, PAGE_SIZE), 0x13000);
        assert_eq!(align_up(0x13000, PAGE_SIZE), 0x13000);
        assert!(is_page_aligned(0x13000));
        assert!(!is_page_aligned(0x13008));
    }

    #[test]
    fn display_is_hex() {
        let pa = PhysicalAddress::new(0x8000_1000);
        assert_eq!(format!("{pa}"), "0x0000000080001000");
        assert_eq!(format!("{:?}", pa.page()), "PhysicalPage(0x0000000080001000)");
    }
}
