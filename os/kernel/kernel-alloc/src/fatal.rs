//! Unrecoverable invariant violations.
//!
//! A violation means physical-memory accounting can no longer be trusted.
//! There is no `Result` for these: [`abort`] logs the diagnostic and panics,
//! taking down the current execution context.

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_vmem::MapError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("release of misaligned frame {0}")]
    MisalignedFrame(PhysicalAddress),
    #[error("frame {0} lies outside the managed range")]
    FrameOutOfRange(PhysicalAddress),
    #[error("double free of frame {0}")]
    DoubleFree(PhysicalPage),
    #[error("new reference to free frame {0}")]
    ReferenceToFreeFrame(PhysicalPage),
    #[error("reference count overflow on frame {0}")]
    ReferenceOverflow(PhysicalPage),
    #[error("frame {page} on the free list still has {count} references")]
    FreeFrameReferenced { page: PhysicalPage, count: u32 },
    #[error("free list link {0} points outside the managed range")]
    CorruptFreeList(PhysicalAddress),
    #[error("frame pool initialized twice")]
    AlreadyInitialized,
    #[error("copy-on-write fault at unmapped address {0}")]
    CowNotMapped(VirtualAddress),
    #[error("copy-on-write fault at {0} without copy-on-write marker")]
    CowNotMarked(VirtualAddress),
    #[error("remapping {va} after copy-on-write failed: {error}")]
    CowRemap { va: VirtualAddress, error: MapError },
}

/// Report `violation` and stop.
#[cold]
#[inline(never)]
#[track_caller]
pub fn abort(violation: InvariantViolation) -> ! {
    log::error!("kernel invariant violated: {violation}");
    panic!("kernel invariant violated: {violation}");
}
