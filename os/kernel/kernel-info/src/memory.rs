//! # Memory Layout

/// Size of a physical frame and of a base page, in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// First byte of physical RAM; the kernel image is loaded here.
pub const PHYS_MEMORY_BASE: u64 = 0x8000_0000;

/// Amount of physical RAM the kernel expects to manage.
pub const PHYS_MEMORY_SIZE: u64 = 128 * 1024 * 1024;

/// One past the last byte of physical RAM.
pub const PHYS_MEMORY_TOP: u64 = PHYS_MEMORY_BASE + PHYS_MEMORY_SIZE;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Highest user virtual address plus one (Sv39: 38 usable bits for user space).
pub const USERSPACE_END: u64 = 1 << 38;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(PHYS_MEMORY_BASE.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_MEMORY_TOP.is_multiple_of(PAGE_SIZE));
    assert!(PHYS_MEMORY_TOP > PHYS_MEMORY_BASE);
    assert!(HHDM_BASE >= USERSPACE_END);
};
