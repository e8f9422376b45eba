//! Copy-on-write sharing and write-fault resolution.
//!
//! Sharing ([`share_page`]) turns one writable mapping into two read-only
//! mappings of the same frame, both carrying the copy-on-write marker, and
//! gives the frame a second owner. The first write through either mapping
//! faults; [`resolve_write_fault`] then gives the writer a private copy:
//!
//! 1. allocate a new frame,
//! 2. copy the shared frame into it while the faulting mapping still owns
//!    the old frame,
//! 3. unmap the old mapping, dropping its owner (the old frame returns to the
//!    pool if that was the last one),
//! 4. map the new frame writable with the marker cleared.
//!
//! Nothing here takes a lock; the pool and the owner counts synchronize
//! themselves. Two cores resolving two mappings of the same frame each end up
//! with their own copy. Callers flush the TLB entry for the page afterwards.

use crate::fatal::{self, InvariantViolation};
use crate::pool::FramePool;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalPage, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameRelease, MapError, PhysMapper};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CowError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("virtual address {0} is not mapped")]
    NotMapped(VirtualAddress),
    #[error("virtual address {0} is not a copy-on-write mapping")]
    NotCopyOnWrite(VirtualAddress),
    #[error("failed to map shared frame: {0}")]
    Map(MapError),
}

impl From<MapError> for CowError {
    fn from(value: MapError) -> Self {
        Self::Map(value)
    }
}

/// Handle a write fault at `va` in `aspace`.
///
/// This is the check a trap handler runs before calling [`resolve_cow`]: a
/// fault on an unmapped page or on a mapping without the copy-on-write marker
/// is a genuine access violation, reported as an error so the caller can
/// terminate the offending process.
///
/// # Errors
/// - [`CowError::NotMapped`] / [`CowError::NotCopyOnWrite`] for access violations.
/// - [`CowError::OutOfMemory`] if no frame is left for the copy.
pub fn resolve_write_fault<M: PhysMapper, P: PhysMapper>(
    aspace: &AddressSpace<'_, M>,
    pool: &FramePool<P>,
    va: VirtualAddress,
) -> Result<PhysicalPage, CowError> {
    let entry = aspace.walk(va).ok_or(CowError::NotMapped(va))?;
    if !entry.copy_on_write() {
        return Err(CowError::NotCopyOnWrite(va));
    }
    resolve_cow(aspace, pool, va)
}

/// Replace the copy-on-write mapping of the page containing `va` by a private,
/// writable copy and return the new frame.
///
/// On [`CowError::OutOfMemory`] the address space is unchanged.
///
/// # Errors
/// [`CowError::OutOfMemory`] if the pool is empty.
///
/// # Panics
/// Through [`fatal::abort`] if `va` is not mapped, not marked copy-on-write,
/// or the new frame cannot be mapped.
pub fn resolve_cow<M: PhysMapper, P: PhysMapper>(
    aspace: &AddressSpace<'_, M>,
    pool: &FramePool<P>,
    va: VirtualAddress,
) -> Result<PhysicalPage, CowError> {
    let page_va = va.page().base();
    let Some(entry) = aspace.walk(page_va) else {
        fatal::abort(InvariantViolation::CowNotMapped(va));
    };
    if !entry.copy_on_write() {
        fatal::abort(InvariantViolation::CowNotMarked(va));
    }

    let old = entry.physical_page();
    let perm = entry.permissions().resolved_copy_on_write();

    let Some(new) = pool.allocate() else {
        log::warn!("copy-on-write at {va}: no frame left for the copy");
        return Err(CowError::OutOfMemory);
    };
    pool.copy_frame(old, new);

    if aspace.unmap(page_va, 1, Some(pool as &dyn FrameRelease)).is_err() {
        fatal::abort(InvariantViolation::CowNotMapped(va));
    }
    if let Err(error) = aspace.map(pool, page_va, PAGE_SIZE, new, perm) {
        fatal::abort(InvariantViolation::CowRemap { va, error });
    }

    log::trace!("copy-on-write at {page_va}: {old} -> {new}");
    Ok(new)
}

/// Share the frame mapped at `va` in `parent` with `child` (the duplication
/// step of a fork).
///
/// A writable parent mapping loses its write permission and gains the
/// copy-on-write marker; read-only mappings are shared as they are. The frame
/// gets its new owner *before* the child mapping exists, and the child is
/// mapped with the parent's resulting permissions.
///
/// If the child mapping fails the new owner is dropped again; the parent keeps
/// its copy-on-write entry, which only costs a copy on its next write.
///
/// # Errors
/// - [`CowError::NotMapped`] if `parent` has no mapping at `va`.
/// - [`CowError::Map`] if the child cannot be mapped.
pub fn share_page<M: PhysMapper, P: PhysMapper>(
    parent: &AddressSpace<'_, M>,
    child: &AddressSpace<'_, M>,
    pool: &FramePool<P>,
    va: VirtualAddress,
) -> Result<PhysicalPage, CowError> {
    let page_va = va.page().base();
    let old = parent
        .update(page_va, |e| {
            if e.writable() {
                e.shared_copy_on_write()
            } else {
                e
            }
        })
        .ok_or(CowError::NotMapped(va))?;

    let frame = old.physical_page();
    let perm = if old.writable() {
        old.permissions().shared_copy_on_write()
    } else {
        old.permissions()
    };

    pool.references().increment(frame);
    if let Err(e) = child.map(pool, page_va, PAGE_SIZE, frame, perm) {
        pool.release(frame);
        return Err(e.into());
    }

    log::trace!(
        "shared {page_va} -> {frame} ({} owners)",
        pool.references().get(frame)
    );
    Ok(frame)
}
