use crate::addresses::{PAGE_SHIFT, PhysicalPage};
use bitfield_struct::bitfield;

/// A single 64-bit page-table entry in its raw bitfield form.
///
/// ### Bit layout
///
/// | Bits   | Name     | Meaning |
/// |--------|----------|---------|
/// | 0      | `V`      | Valid entry if set |
/// | 1      | `R`      | Readable |
/// | 2      | `W`      | Writable |
/// | 3      | `X`      | Executable |
/// | 4      | `U`      | User-mode accessible |
/// | 5      | `G`      | Global mapping |
/// | 6      | `A`      | Accessed |
/// | 7      | `D`      | Dirty |
/// | 8      | `COW`    | OS-reserved: frame is shared copy-on-write |
/// | 9      | `RSW`    | OS-reserved, unused |
/// | 10..54 | `PPN`    | Physical page number |
/// | 54..64 | reserved | Must be zero |
///
/// An entry with `V` set and none of `R`/`W`/`X` points to the next-level
/// table; any of `R`/`W`/`X` makes it a leaf.
///
/// ### Copy-on-write
/// A leaf with `COW` set never has `W` set. Resolving the fault produces a
/// private frame and an entry with `COW` cleared and `W` set, see
/// [`resolved_copy_on_write`](Self::resolved_copy_on_write).
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_vmem::addresses::PhysicalPage;
/// let e = PageEntryBits::user_rw().leaf(PhysicalPage::containing(0x8000_3000));
/// assert!(e.valid() && e.is_leaf());
/// assert_eq!(e.physical_page().base().as_u64(), 0x8000_3000);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Valid (V, bit 0).
    pub valid: bool,
    /// Readable (R, bit 1).
    pub readable: bool,
    /// Writable (W, bit 2).
    pub writable: bool,
    /// Executable (X, bit 3).
    pub executable: bool,
    /// User-mode accessible (U, bit 4).
    pub user: bool,
    /// Global (G, bit 5).
    pub global: bool,
    /// Accessed (A, bit 6). Set by hardware, not a permission.
    pub accessed: bool,
    /// Dirty (D, bit 7). Set by hardware on first write.
    pub dirty: bool,

    /// Copy-on-write marker (RSW bit 8).
    ///
    /// The frame is shared with at least one other mapping and must not be
    /// written in place.
    pub copy_on_write: bool,

    /// Second OS-reserved bit (RSW bit 9).
    pub os_reserved: bool,

    /// Physical page number (bits 10..=53).
    #[bits(44)]
    ppn: u64,

    #[bits(10)]
    __: u16,
}

impl PageEntryBits {
    /// Frame this entry refers to (leaf frame or next-level table).
    #[inline]
    #[must_use]
    pub const fn physical_page(&self) -> PhysicalPage {
        PhysicalPage::containing(self.ppn() << PAGE_SHIFT)
    }

    #[inline]
    pub const fn set_physical_page(&mut self, page: PhysicalPage) {
        self.set_ppn(page.base().as_u64() >> PAGE_SHIFT);
    }

    /// Whether the entry maps a frame rather than pointing to a table.
    #[inline]
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.valid() && (self.readable() || self.writable() || self.executable())
    }

    /// The permission and status bits only (frame number cleared).
    #[inline]
    #[must_use]
    pub const fn permissions(self) -> Self {
        self.with_ppn(0)
    }

    /// Build a valid leaf for `page` using the permission bits of `self`.
    #[inline]
    #[must_use]
    pub const fn leaf(self, page: PhysicalPage) -> Self {
        self.with_ppn(page.base().as_u64() >> PAGE_SHIFT)
            .with_valid(true)
    }

    /// A non-leaf entry pointing to the table in `page`.
    #[inline]
    #[must_use]
    pub const fn next_table(page: PhysicalPage) -> Self {
        Self::new()
            .with_valid(true)
            .with_ppn(page.base().as_u64() >> PAGE_SHIFT)
    }

    /// Permissions for the shared side of a copy-on-write mapping:
    /// write access removed, marker set.
    #[inline]
    #[must_use]
    pub const fn shared_copy_on_write(self) -> Self {
        self.with_writable(false).with_copy_on_write(true)
    }

    /// Permissions for the private copy after a copy-on-write fault:
    /// marker cleared, write access granted.
    #[inline]
    #[must_use]
    pub const fn resolved_copy_on_write(self) -> Self {
        self.with_copy_on_write(false).with_writable(true)
    }

    #[inline]
    #[must_use]
    pub const fn user_rw() -> Self {
        Self::new()
            .with_readable(true)
            .with_writable(true)
            .with_user(true)
    }

    #[inline]
    #[must_use]
    pub const fn user_rx() -> Self {
        Self::new()
            .with_readable(true)
            .with_executable(true)
            .with_user(true)
    }

    #[inline]
    #[must_use]
    pub const fn kernel_rw() -> Self {
        Self::new().with_readable(true).with_writable(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_match_layout() {
        assert_eq!(PageEntryBits::new().with_valid(true).into_bits(), 1 << 0);
        assert_eq!(PageEntryBits::new().with_writable(true).into_bits(), 1 << 2);
        assert_eq!(PageEntryBits::new().with_user(true).into_bits(), 1 << 4);
        assert_eq!(
            PageEntryBits::new().with_copy_on_write(true).into_bits(),
            1 << 8
        );
        let e = PageEntryBits::next_table(PhysicalPage::containing(0x8765_4000));
        assert_eq!(e.into_bits(), (0x8765_4000 >> 12 << 10) | 1);
    }

    #[test]
    fn cow_transitions() {
        let page = PhysicalPage::containing(0x8000_1000);
        let shared = PageEntryBits::user_rw().leaf(page).shared_copy_on_write();
        assert!(shared.copy_on_write());
        assert!(!shared.writable());
        assert!(shared.readable() && shared.user());

        let private = shared.permissions().resolved_copy_on_write();
        assert!(!private.copy_on_write());
        assert!(private.writable());
        assert!(private.readable() && private.user() && private.valid());
        assert_eq!(private.physical_page(), PhysicalPage::containing(0));
    }

    #[test]
    fn table_pointer_is_not_a_leaf() {
        let e = PageEntryBits::next_table(PhysicalPage::containing(0x1000));
        assert!(e.valid());
        assert!(!e.is_leaf());
        assert!(!PageEntryBits::new().is_leaf());
    }
}
