//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户地址空间测试

use crate::config::PAGE_SIZE;
use crate::errno::Errno;
use crate::mm::{FrameAllocator, PhysAddr, PteFlags, UserSpace, VirtAddr};

fn allocator(nframes: usize) -> FrameAllocator {
    FrameAllocator::new(PhysAddr(0x8020_0000), nframes)
}

#[test]
fn test_grow_maps_zeroed_user_pages() {
    let mem = allocator(16);
    let mut space = UserSpace::create(&mem).unwrap();
    assert_eq!(space.grow(&mem, 0, 3 * PAGE_SIZE, PteFlags::W), Ok(3 * PAGE_SIZE));
    assert_eq!(space.mapped_pages(), 3);
    assert_eq!(mem.free_frames(), 16 - 4);

    let pte = space.translate(VirtAddr(PAGE_SIZE)).unwrap();
    assert!(pte.flags.contains(PteFlags::V | PteFlags::R | PteFlags::W | PteFlags::U));
    assert!(mem.with_page(pte.pa, |page| page.iter().all(|&b| b == 0)));

    space.free(&mem, 3 * PAGE_SIZE);
    assert_eq!(mem.free_frames(), 16);
    assert!(mem.check_consistency());
}

#[test]
fn test_grow_rolls_back_when_out_of_frames() {
    let mem = allocator(4);
    let mut space = UserSpace::create(&mem).unwrap();
    assert_eq!(space.grow(&mem, 0, PAGE_SIZE, PteFlags::W), Ok(PAGE_SIZE));
    let free = mem.free_frames();

    // 只剩 2 帧，要 4 帧
    assert_eq!(
        space.grow(&mem, PAGE_SIZE, 5 * PAGE_SIZE, PteFlags::W),
        Err(Errno::OutOfMemory)
    );
    assert_eq!(mem.free_frames(), free);
    assert_eq!(space.mapped_pages(), 1);
    assert!(mem.check_consistency());
}

#[test]
fn test_shrink_releases_frames() {
    let mem = allocator(8);
    let mut space = UserSpace::create(&mem).unwrap();
    space.grow(&mem, 0, 4 * PAGE_SIZE, PteFlags::W).unwrap();
    assert_eq!(space.shrink(&mem, 4 * PAGE_SIZE, PAGE_SIZE + 1), PAGE_SIZE + 1);
    // 不足一页的部分仍然保留映射
    assert_eq!(space.mapped_pages(), 2);
    assert_eq!(mem.free_frames(), 8 - 3);
}

#[test]
fn test_copy_across_page_boundary() {
    let mem = allocator(8);
    let mut space = UserSpace::create(&mem).unwrap();
    space.grow(&mem, 0, 2 * PAGE_SIZE, PteFlags::W).unwrap();

    let data: Vec<u8> = (0..64).collect();
    let addr = PAGE_SIZE - 32;
    space.copy_out(&mem, addr, &data).unwrap();

    let mut back = vec![0u8; 64];
    space.copy_in(&mem, &mut back, addr).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_copy_to_unmapped_address_fails() {
    let mem = allocator(8);
    let mut space = UserSpace::create(&mem).unwrap();
    space.grow(&mem, 0, PAGE_SIZE, PteFlags::W).unwrap();

    assert_eq!(space.copy_out(&mem, PAGE_SIZE, b"x"), Err(Errno::BadAddress));
    // 跨页时后半部分未映射
    assert_eq!(space.copy_out(&mem, PAGE_SIZE - 1, b"xy"), Err(Errno::BadAddress));
    let mut buf = [0u8; 4];
    assert_eq!(space.copy_in(&mem, &mut buf, 8 * PAGE_SIZE), Err(Errno::BadAddress));
}

#[test]
fn test_kernel_only_mapping_not_user_accessible() {
    let mem = allocator(8);
    let mut space = UserSpace::create(&mem).unwrap();
    let pa = mem.allocate().unwrap();
    space.map(VirtAddr(0), pa, PteFlags::R | PteFlags::W).unwrap();
    assert_eq!(space.copy_out(&mem, 0, b"x"), Err(Errno::BadAddress));
    space.unmap(&mem, VirtAddr(0), 1, true);
    assert_eq!(mem.ref_count(pa), 0);
}

#[test]
fn test_copy_to_child_is_independent() {
    let mem = allocator(16);
    let mut parent = UserSpace::create(&mem).unwrap();
    parent.grow(&mem, 0, 2 * PAGE_SIZE, PteFlags::W).unwrap();
    parent.copy_out(&mem, 100, b"parent").unwrap();

    let mut child = UserSpace::create(&mem).unwrap();
    parent.copy_to(&mem, &mut child, 2 * PAGE_SIZE).unwrap();
    assert_eq!(child.mapped_pages(), 2);

    child.copy_out(&mem, 100, b"child!").unwrap();
    let mut buf = [0u8; 6];
    parent.copy_in(&mem, &mut buf, 100).unwrap();
    assert_eq!(&buf, b"parent");
    child.copy_in(&mem, &mut buf, 100).unwrap();
    assert_eq!(&buf, b"child!");

    child.free(&mem, 2 * PAGE_SIZE);
    parent.free(&mem, 2 * PAGE_SIZE);
    assert_eq!(mem.free_frames(), 16);
}

#[test]
fn test_copy_to_rolls_back_when_out_of_frames() {
    let mem = allocator(6);
    let mut parent = UserSpace::create(&mem).unwrap();
    parent.grow(&mem, 0, 3 * PAGE_SIZE, PteFlags::W).unwrap();
    let mut child = UserSpace::create(&mem).unwrap();
    // 剩 1 帧，需要 3 帧
    assert_eq!(mem.free_frames(), 1);
    assert_eq!(
        parent.copy_to(&mem, &mut child, 3 * PAGE_SIZE),
        Err(Errno::OutOfMemory)
    );
    assert_eq!(child.mapped_pages(), 0);
    assert_eq!(mem.free_frames(), 1);
}

#[test]
#[should_panic(expected = "mappages: remap")]
fn test_remap_panics() {
    let mem = allocator(4);
    let mut space = UserSpace::create(&mem).unwrap();
    let pa = mem.allocate().unwrap();
    space.map(VirtAddr(0), pa, PteFlags::R).unwrap();
    space.map(VirtAddr(0), pa, PteFlags::R).unwrap();
}
