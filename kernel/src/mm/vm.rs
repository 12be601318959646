//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 用户地址空间
//!
//! 对应 xv6 kernel/vm.c 中面向用户页表的部分 (uvmcreate / mappages /
//! uvmunmap / uvmalloc / uvmdealloc / uvmcopy / uvmfree / copyout / copyin)。
//! 页表在这里是一张 虚拟页号 → (物理页, 权限) 的映射表，所有页帧都来自
//! [`FrameAllocator`]；根页表仍占用一个页帧，与真实实现的内存开销一致。

use std::collections::BTreeMap;

use bitflags::bitflags;

use super::page::{page_round_up, FrameAllocator, PhysAddr, VirtAddr, VirtPageNr};
use crate::arch::trap::MAXVA;
use crate::config::PAGE_SIZE;
use crate::errno::{Errno, KResult};

bitflags! {
    /// 页表项权限位 (Sv39)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u64 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
    }
}

/// 页表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pte {
    pub pa: PhysAddr,
    pub flags: PteFlags,
}

/// 用户地址空间
#[derive(Debug)]
pub struct UserSpace {
    /// 根页表页
    root: PhysAddr,
    ptes: BTreeMap<VirtPageNr, Pte>,
}

impl UserSpace {
    /// 创建空地址空间，页帧耗尽时返回 None
    pub fn create(mem: &FrameAllocator) -> Option<Self> {
        let root = mem.allocate()?;
        mem.with_page(root, |page| page.fill(0));
        Some(Self {
            root,
            ptes: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// 建立一页映射
    ///
    /// 重复映射同一虚拟页是内核错误。
    pub fn map(&mut self, va: VirtAddr, pa: PhysAddr, flags: PteFlags) -> KResult<()> {
        if !va.is_aligned() {
            panic!("mappages: va not aligned");
        }
        if va.as_usize() >= MAXVA {
            return Err(Errno::BadAddress);
        }
        if self.ptes.contains_key(&va.page_number()) {
            panic!("mappages: remap");
        }
        self.ptes.insert(
            va.page_number(),
            Pte {
                pa,
                flags: flags | PteFlags::V,
            },
        );
        Ok(())
    }

    /// 解除 [va, va + npages 页) 的映射，do_free 时释放对应页帧的引用
    pub fn unmap(&mut self, mem: &FrameAllocator, va: VirtAddr, npages: usize, do_free: bool) {
        if !va.is_aligned() {
            panic!("uvmunmap: not aligned");
        }
        let first = va.page_number();
        for vpn in first..first + npages {
            let pte = self
                .ptes
                .remove(&vpn)
                .unwrap_or_else(|| panic!("uvmunmap: not mapped"));
            if do_free {
                mem.release_ref(pte.pa);
            }
        }
    }

    pub fn translate(&self, va: VirtAddr) -> Option<Pte> {
        self.ptes.get(&va.page_number()).copied()
    }

    /// 已映射的页数
    pub fn mapped_pages(&self) -> usize {
        self.ptes.len()
    }

    /// 把地址空间从 old_size 扩展到 new_size，新页清零
    ///
    /// 失败时回滚本次分配的页，返回 OutOfMemory。
    pub fn grow(
        &mut self,
        mem: &FrameAllocator,
        old_size: usize,
        new_size: usize,
        xperm: PteFlags,
    ) -> KResult<usize> {
        if new_size < old_size {
            return Ok(old_size);
        }
        let start = page_round_up(old_size);
        for va in (start..new_size).step_by(PAGE_SIZE) {
            let Some(pa) = mem.allocate() else {
                self.shrink(mem, va, start);
                return Err(Errno::OutOfMemory);
            };
            mem.with_page(pa, |page| page.fill(0));
            if let Err(e) = self.map(VirtAddr(va), pa, PteFlags::R | PteFlags::U | xperm) {
                mem.free(pa);
                self.shrink(mem, va, start);
                return Err(e);
            }
        }
        Ok(new_size)
    }

    /// 把地址空间从 old_size 收缩到 new_size，返回新大小
    pub fn shrink(&mut self, mem: &FrameAllocator, old_size: usize, new_size: usize) -> usize {
        if new_size >= old_size {
            return old_size;
        }
        let (new_top, old_top) = (page_round_up(new_size), page_round_up(old_size));
        if new_top < old_top {
            self.unmap(mem, VirtAddr(new_top), (old_top - new_top) / PAGE_SIZE, true);
        }
        new_size
    }

    /// 把 [0, size) 的内容逐页复制到 child（复制而非共享）
    ///
    /// 失败时释放 child 中已复制的页。
    pub fn copy_to(&self, mem: &FrameAllocator, child: &mut UserSpace, size: usize) -> KResult<()> {
        for va in (0..size).step_by(PAGE_SIZE) {
            let pte = self
                .translate(VirtAddr(va))
                .unwrap_or_else(|| panic!("uvmcopy: page not present"));
            let Some(pa) = mem.allocate() else {
                child.unmap(mem, VirtAddr(0), va / PAGE_SIZE, true);
                return Err(Errno::OutOfMemory);
            };
            mem.copy_page(pte.pa, pa);
            if let Err(e) = child.map(VirtAddr(va), pa, pte.flags) {
                mem.free(pa);
                child.unmap(mem, VirtAddr(0), va / PAGE_SIZE, true);
                return Err(e);
            }
        }
        Ok(())
    }

    /// 释放用户页 [0, size) 与根页表
    ///
    /// 其余映射（跳板页、陷阱帧）必须已经解除。
    pub fn free(mut self, mem: &FrameAllocator, size: usize) {
        if size > 0 {
            self.unmap(mem, VirtAddr(0), page_round_up(size) / PAGE_SIZE, true);
        }
        if !self.ptes.is_empty() {
            panic!("freewalk: leaf");
        }
        mem.free(self.root);
    }

    /// 查找可供用户访问、具有 perm 权限的页
    fn user_page(&self, va: VirtAddr, perm: PteFlags) -> KResult<PhysAddr> {
        if va.as_usize() >= MAXVA {
            return Err(Errno::BadAddress);
        }
        match self.translate(va) {
            Some(pte) if pte.flags.contains(PteFlags::U | perm) => Ok(pte.pa),
            _ => Err(Errno::BadAddress),
        }
    }

    /// 从内核复制到用户地址 dst
    pub fn copy_out(&self, mem: &FrameAllocator, dst: usize, src: &[u8]) -> KResult<()> {
        let mut done = 0;
        while done < src.len() {
            let va = VirtAddr(dst + done);
            let pa = self.user_page(va.floor(), PteFlags::W)?;
            let off = va.page_offset();
            let n = (PAGE_SIZE - off).min(src.len() - done);
            mem.with_page(pa, |page| page[off..off + n].copy_from_slice(&src[done..done + n]));
            done += n;
        }
        Ok(())
    }

    /// 从用户地址 src 复制到内核
    pub fn copy_in(&self, mem: &FrameAllocator, dst: &mut [u8], src: usize) -> KResult<()> {
        let mut done = 0;
        while done < dst.len() {
            let va = VirtAddr(src + done);
            let pa = self.user_page(va.floor(), PteFlags::R)?;
            let off = va.page_offset();
            let n = (PAGE_SIZE - off).min(dst.len() - done);
            mem.with_page(pa, |page| dst[done..done + n].copy_from_slice(&page[off..off + n]));
            done += n;
        }
        Ok(())
    }
}
