#![allow(dead_code)]

use kernel_alloc::phys_mapper::DirectMapper;
use kernel_alloc::{FramePool, ManagedRange};
use kernel_vmem::addresses::{PhysicalAddress, PhysicalPage};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

/// Physical address of the first simulated frame.
pub const RAM_BASE: u64 = 0x8000_0000;

/// A 4 KiB-aligned host buffer that stands in for physical RAM at
/// [`RAM_BASE`].
pub struct SimulatedRam {
    ptr: NonNull<u8>,
    frames: usize,
}

// Safety: the buffer is plain memory; tests coordinate access through the pool.
unsafe impl Send for SimulatedRam {}
unsafe impl Sync for SimulatedRam {}

impl SimulatedRam {
    pub fn new(frames: usize) -> Self {
        let ptr = unsafe { alloc_zeroed(Self::layout(frames)) };
        Self {
            ptr: NonNull::new(ptr).expect("host allocation"),
            frames,
        }
    }

    fn layout(frames: usize) -> Layout {
        Layout::from_size_align(frames * 4096, 4096).expect("layout")
    }

    pub fn mapper(&self) -> DirectMapper {
        self.mapper_at(RAM_BASE)
    }

    /// A mapper that places the buffer at physical address `base` instead.
    pub fn mapper_at(&self, base: u64) -> DirectMapper {
        DirectMapper::new((self.ptr.as_ptr() as u64).wrapping_sub(base))
    }

    pub fn range(&self) -> ManagedRange {
        ManagedRange::new(
            PhysicalAddress::new(RAM_BASE),
            PhysicalAddress::new(RAM_BASE + self.frames as u64 * 4096),
        )
    }

    pub fn frame(&self, n: u64) -> PhysicalPage {
        PhysicalPage::containing(RAM_BASE + n * 4096)
    }

    /// A copy of the 4096 bytes of `page`.
    pub fn read(&self, page: PhysicalPage) -> Vec<u8> {
        self.bytes(page).to_vec()
    }

    pub fn write(&self, page: PhysicalPage, data: &[u8]) {
        let offset = self.offset(page);
        assert!(data.len() <= 4096);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
    }

    fn bytes(&self, page: PhysicalPage) -> &[u8] {
        let offset = self.offset(page);
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), 4096) }
    }

    fn offset(&self, page: PhysicalPage) -> usize {
        let offset = (page.base().as_u64() - RAM_BASE) as usize;
        assert!(offset < self.frames * 4096, "{page} is not simulated");
        offset
    }
}

impl Drop for SimulatedRam {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.frames)) }
    }
}

/// A pool over all of `ram`, not yet initialized.
pub fn pool(ram: &SimulatedRam) -> FramePool<DirectMapper> {
    FramePool::new(ram.mapper(), ram.range())
}

/// A pool over all of `ram`, seeded with every frame.
pub fn initialized_pool(ram: &SimulatedRam) -> FramePool<DirectMapper> {
    let pool = pool(ram);
    pool.init();
    pool
}

/// Whether every byte of `data` equals `byte`.
pub fn filled_with(data: &[u8], byte: u8) -> bool {
    data.iter().all(|&b| b == byte)
}
