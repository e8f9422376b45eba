//! # Page Table

use crate::PageEntryBits;
use crate::addresses::{PAGE_SHIFT, VirtualAddress};

/// Number of entries in one table.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Number of translation levels (root is level `LEVELS - 1`).
pub const LEVELS: usize = 3;

/// Index into the table at `level` for `va` (9 bits per level above the
/// 12-bit page offset).
#[inline]
#[must_use]
pub const fn table_index(va: VirtualAddress, level: usize) -> usize {
    let shift = PAGE_SHIFT as usize + 9 * level;
    ((va.as_u64() >> shift) & 0x1FF) as usize
}

/// One page table: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntryBits; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, index: usize) -> PageEntryBits {
        self.entries[index]
    }

    #[inline]
    pub const fn set(&mut self, index: usize, entry: PageEntryBits) {
        self.entries[index] = entry;
    }

    #[inline]
    pub const fn entry_mut(&mut self, index: usize) -> &mut PageEntryBits {
        &mut self.entries[index]
    }

    /// Clear all entries.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::new());
    }

    /// Iterate over `(index, entry)` for all valid entries.
    pub fn valid_entries(&self) -> impl Iterator<Item = (usize, PageEntryBits)> + '_ {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, e)| e.valid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_split_va() {
        let va = VirtualAddress::new((3 << 30) | (5 << 21) | (7 << 12) | 0x123);
        assert_eq!(table_index(va, 2), 3);
        assert_eq!(table_index(va, 1), 5);
        assert_eq!(table_index(va, 0), 7);
    }

    #[test]
    fn indices_are_bounded() {
        let va = VirtualAddress::new(u64::MAX);
        for level in 0..LEVELS {
            assert!(table_index(va, level) < ENTRIES_PER_TABLE);
        }
    }
}
