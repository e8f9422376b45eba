mod common;

use common::{SimulatedRam, filled_with, initialized_pool};
use kernel_alloc::{CowError, resolve_cow, resolve_write_fault, share_page};
use kernel_vmem::addresses::{PhysicalPage, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameRelease, MapError, PageEntryBits};

const VA: VirtualAddress = VirtualAddress::new(0x40_0000);

fn pattern() -> Vec<u8> {
    (0..4096u32).map(|i| (i * 7 % 251) as u8).collect()
}

/// Allocate a frame, fill it with [`pattern`] and map it at [`VA`] with `perm`.
fn mapped_frame<M: kernel_vmem::PhysMapper>(
    ram: &SimulatedRam,
    pool: &kernel_alloc::FramePool<kernel_alloc::phys_mapper::DirectMapper>,
    space: &AddressSpace<'_, M>,
    perm: PageEntryBits,
) -> PhysicalPage {
    let frame = pool.allocate().expect("frame");
    ram.write(frame, &pattern());
    space.map(pool, VA, 4096, frame, perm).expect("map");
    frame
}

#[test]
fn resolution_of_shared_frame_copies_content() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");

    let old = mapped_frame(&ram, &pool, &space, PageEntryBits::user_rw().shared_copy_on_write());
    pool.references().increment(old); // the other sharer
    assert_eq!(pool.references().get(old), 2);
    let free_before = pool.free_frames();

    let new = resolve_write_fault(&space, &pool, VA + 0x10).expect("resolved");

    assert_ne!(new, old);
    assert_eq!(ram.read(new), pattern());
    assert_eq!(ram.read(old), pattern(), "still in use by the other sharer");
    assert_eq!(pool.references().get(new), 1);
    assert_eq!(pool.references().get(old), 1);
    assert_eq!(pool.free_frames(), free_before - 1);

    let entry = space.walk(VA).expect("mapped");
    assert_eq!(entry.physical_page(), new);
    assert!(entry.writable());
    assert!(!entry.copy_on_write());
    assert!(entry.user() && entry.readable());
}

#[test]
fn resolution_of_sole_owner_still_copies_true_content() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");

    let old = mapped_frame(&ram, &pool, &space, PageEntryBits::user_rw().shared_copy_on_write());
    assert_eq!(pool.references().get(old), 1);
    let free_before = pool.free_frames();

    let new = resolve_cow(&space, &pool, VA).expect("resolved");

    assert_eq!(ram.read(new), pattern());
    assert_eq!(pool.references().get(old), 0);
    assert_eq!(pool.free_frames(), free_before, "one frame taken, one returned");
    assert!(filled_with(&ram.read(old)[8..], kernel_alloc::FREE_POISON));
}

#[test]
fn out_of_memory_leaves_mapping_untouched() {
    let ram = SimulatedRam::new(8);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");

    let old = mapped_frame(&ram, &pool, &space, PageEntryBits::user_rw().shared_copy_on_write());
    pool.references().increment(old);
    let hoard: Vec<_> = std::iter::from_fn(|| pool.allocate()).collect();
    assert!(!hoard.is_empty());

    assert_eq!(resolve_cow(&space, &pool, VA), Err(CowError::OutOfMemory));

    let entry = space.walk(VA).expect("still mapped");
    assert_eq!(entry.physical_page(), old);
    assert!(entry.copy_on_write() && !entry.writable());
    assert_eq!(pool.references().get(old), 2);
}

#[test]
fn write_fault_gate_rejects_access_violations() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");

    let unmapped = VirtualAddress::new(0x80_0000);
    assert_eq!(
        resolve_write_fault(&space, &pool, unmapped),
        Err(CowError::NotMapped(unmapped))
    );

    mapped_frame(&ram, &pool, &space, PageEntryBits::user_rx());
    assert_eq!(
        resolve_write_fault(&space, &pool, VA),
        Err(CowError::NotCopyOnWrite(VA))
    );
}

#[test]
fn share_then_both_sides_write() {
    let ram = SimulatedRam::new(32);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let parent = AddressSpace::create(&mapper, &pool).expect("parent");
    let child = AddressSpace::create(&mapper, &pool).expect("child");

    let frame = mapped_frame(&ram, &pool, &parent, PageEntryBits::user_rw());
    assert_eq!(share_page(&parent, &child, &pool, VA), Ok(frame));
    assert_eq!(pool.references().get(frame), 2);

    for space in [&parent, &child] {
        let entry = space.walk(VA).expect("mapped");
        assert_eq!(entry.physical_page(), frame);
        assert!(entry.copy_on_write() && !entry.writable());
    }

    let child_copy = resolve_write_fault(&child, &pool, VA).expect("child copy");
    assert_eq!(pool.references().get(frame), 1);
    ram.write(child_copy, b"child");

    let parent_copy = resolve_write_fault(&parent, &pool, VA).expect("parent copy");
    assert_eq!(pool.references().get(frame), 0);
    assert_ne!(parent_copy, child_copy);
    assert_eq!(ram.read(parent_copy), pattern());
    assert_eq!(&ram.read(child_copy)[..5], b"child");
}

#[test]
fn read_only_pages_are_shared_without_marker() {
    let ram = SimulatedRam::new(32);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let parent = AddressSpace::create(&mapper, &pool).expect("parent");
    let child = AddressSpace::create(&mapper, &pool).expect("child");

    let frame = mapped_frame(&ram, &pool, &parent, PageEntryBits::user_rx());
    share_page(&parent, &child, &pool, VA).expect("shared");

    let entry = child.walk(VA).expect("mapped");
    assert!(!entry.copy_on_write());
    assert!(entry.executable() && !entry.writable());
    assert_eq!(pool.references().get(frame), 2);
}

#[test]
fn failed_child_mapping_drops_the_new_owner() {
    let ram = SimulatedRam::new(32);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let parent = AddressSpace::create(&mapper, &pool).expect("parent");
    let child = AddressSpace::create(&mapper, &pool).expect("child");

    let frame = mapped_frame(&ram, &pool, &parent, PageEntryBits::user_rw());
    let other = mapped_frame(&ram, &pool, &child, PageEntryBits::user_rw());

    assert_eq!(
        share_page(&parent, &child, &pool, VA),
        Err(CowError::Map(MapError::AlreadyMapped(VA)))
    );
    assert_eq!(pool.references().get(frame), 1);
    assert_eq!(child.walk(VA).map(|e| e.physical_page()), Some(other));
}

#[test]
fn share_of_unmapped_page_fails() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let parent = AddressSpace::create(&mapper, &pool).expect("parent");
    let child = AddressSpace::create(&mapper, &pool).expect("child");

    assert_eq!(
        share_page(&parent, &child, &pool, VA),
        Err(CowError::NotMapped(VA))
    );
}

#[test]
fn unmap_with_release_returns_frames_to_pool() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");

    let frame = mapped_frame(&ram, &pool, &space, PageEntryBits::user_rw());
    let free_before = pool.free_frames();

    space.unmap(VA, 1, Some(&pool as &dyn FrameRelease)).expect("unmap");
    assert_eq!(pool.free_frames(), free_before + 1);
    assert_eq!(pool.references().get(frame), 0);

    space.destroy(&pool).expect("destroy");
    assert_eq!(pool.free_frames(), 16);
}

#[test]
#[should_panic(expected = "copy-on-write fault at unmapped address")]
fn resolver_on_unmapped_address_is_fatal() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");
    let _ = resolve_cow(&space, &pool, VA);
}

#[test]
#[should_panic(expected = "without copy-on-write marker")]
fn resolver_on_private_mapping_is_fatal() {
    let ram = SimulatedRam::new(16);
    let pool = initialized_pool(&ram);
    let mapper = ram.mapper();
    let space = AddressSpace::create(&mapper, &pool).expect("root");
    mapped_frame(&ram, &pool, &space, PageEntryBits::user_rw());
    let _ = resolve_cow(&space, &pool, VA);
}
