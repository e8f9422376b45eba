//! # Fixed-offset PhysMapper
//!
//! A [`PhysMapper`] for kernels that see all of physical memory at a constant
//! offset, such as a higher-half direct map (HHDM): physical address `pa` is
//! reachable at virtual address `offset + pa`.
//!
//! The offset is a runtime value so the same code can run on the kernel's
//! HHDM ([`DirectMapper::hhdm`]) and on a host buffer standing in for RAM.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::DirectMapper;
//! use kernel_vmem::{PageTable, PhysMapper};
//! use kernel_vmem::addresses::PhysicalAddress;
//!
//! #[repr(align(4096))]
//! struct Frame([u8; 4096]);
//! let mut ram = Box::new(Frame([0xff; 4096]));
//!
//! const RAM_BASE: u64 = 0x8000_0000;
//! let mapper = DirectMapper::new((ram.0.as_mut_ptr() as u64).wrapping_sub(RAM_BASE));
//! unsafe {
//!     let table: &mut PageTable = mapper.phys_to_mut(PhysicalAddress::new(RAM_BASE));
//!     table.zero();
//! }
//! assert!(ram.0.iter().all(|&b| b == 0));
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] that adds a fixed offset to every physical address.
///
/// # Safety
/// - The mapping must be present and cover every physical address passed in.
/// - The returned references must only be used for valid, writable memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirectMapper {
    offset: u64,
}

impl DirectMapper {
    #[inline]
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    /// The kernel's higher-half direct map.
    #[inline]
    #[must_use]
    pub const fn hhdm() -> Self {
        Self::new(HHDM_BASE)
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for DirectMapper {
    #[inline]
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        pa.as_u64().wrapping_add(self.offset) as *mut T
    }
}
