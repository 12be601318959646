//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 页帧管理
//!
//! 物理页帧分配器：空闲链表 + 每帧引用计数，整体由一把锁保护。
//! 对应 xv6 的 kernel/kalloc.c。
//!
//! 不变量：
//! - 页帧在空闲链表上 ⇔ 引用计数为 0
//! - allocate() 返回的页帧引用计数恰为 1
//! - 引用计数归零时页帧回到空闲链表
//!
//! 分配器锁是叶子锁：持有它时不会再获取任何其他锁（页内容锁除外）。

use crate::config::PAGE_SIZE;

pub const PAGE_MASK: usize = PAGE_SIZE - 1;

pub type PhysFrameNr = usize;

pub type VirtPageNr = usize;

/// 一个物理页的内容
pub type Page = [u8; PAGE_SIZE];

/// 分配时的填充字节，暴露未初始化使用
pub const ALLOC_JUNK: u8 = 5;

/// 释放时的填充字节，暴露悬垂访问
pub const FREE_JUNK: u8 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(pub usize);

impl PhysAddr {
    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn is_aligned(&self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    pub fn frame_number(&self) -> PhysFrameNr {
        self.0 / PAGE_SIZE
    }

    pub fn from_frame(number: PhysFrameNr) -> Self {
        Self(number * PAGE_SIZE)
    }
}

impl VirtAddr {
    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn is_aligned(&self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    pub fn floor(&self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    pub fn page_number(&self) -> VirtPageNr {
        self.0 / PAGE_SIZE
    }

    pub fn page_offset(&self) -> usize {
        self.0 & PAGE_MASK
    }
}

/// 向上取整到页边界
pub const fn page_round_up(size: usize) -> usize {
    (size + PAGE_MASK) & !PAGE_MASK
}

// 使用 usize::MAX 表示空闲链表的空指针
const FREE_LIST_NULL: usize = usize::MAX;

/// 锁保护的分配器状态
///
/// 链表后继存放在独立的数组里，不写进页帧本身，
/// 因此释放时整页都是毒化字节。
struct Kmem {
    /// 空闲链表头（托管范围内的下标）
    head: usize,
    next: Box<[usize]>,
    refs: Box<[u32]>,
    nr_free: usize,
}

impl Kmem {
    fn push(&mut self, index: usize) {
        self.next[index] = self.head;
        self.head = index;
        self.nr_free += 1;
    }
}

/// 物理页帧分配器
pub struct FrameAllocator {
    /// 第一个托管页帧号
    start: PhysFrameNr,
    nframes: usize,
    kmem: spin::Mutex<Kmem>,
    /// 模拟的物理内存
    pages: Box<[spin::Mutex<Box<Page>>]>,
}

impl FrameAllocator {
    /// 托管 [start, start + nframes) 范围内的页帧，全部放入空闲链表
    pub fn new(start: PhysAddr, nframes: usize) -> Self {
        let start = (start.0 + PAGE_MASK) / PAGE_SIZE;
        let pages = (0..nframes)
            .map(|_| spin::Mutex::new(Box::new([0u8; PAGE_SIZE])))
            .collect();

        let allocator = Self {
            start,
            nframes,
            kmem: spin::Mutex::new(Kmem {
                head: FREE_LIST_NULL,
                next: vec![FREE_LIST_NULL; nframes].into_boxed_slice(),
                refs: vec![0; nframes].into_boxed_slice(),
                nr_free: 0,
            }),
            pages,
        };

        // freerange
        {
            let mut kmem = allocator.kmem.lock();
            for index in 0..nframes {
                allocator.pages[index].lock().fill(FREE_JUNK);
                kmem.push(index);
            }
        }

        log::info!(
            "kalloc: managing {} frames at {:#x}..{:#x}",
            nframes,
            start * PAGE_SIZE,
            (start + nframes) * PAGE_SIZE
        );
        allocator
    }

    /// 校验页帧地址，返回托管范围内的下标；非法地址直接停机
    fn index_of(&self, pa: PhysAddr, op: &str) -> usize {
        let number = pa.frame_number();
        if !pa.is_aligned() || number < self.start || number >= self.start + self.nframes {
            log::error!("{}: bad frame address {:#x}", op, pa.0);
            panic!("{}", op);
        }
        number - self.start
    }

    /// 分配一个页帧
    ///
    /// 空闲链表为空，或链表头的引用计数不为 0 时返回 None。
    /// 返回的页帧填满 [`ALLOC_JUNK`]。
    pub fn allocate(&self) -> Option<PhysAddr> {
        let index = {
            let mut kmem = self.kmem.lock();
            let head = kmem.head;
            if head == FREE_LIST_NULL {
                return None;
            }
            if kmem.refs[head] != 0 {
                log::debug!(
                    "kalloc: free frame {:#x} still referenced",
                    (self.start + head) * PAGE_SIZE
                );
                return None;
            }
            kmem.head = kmem.next[head];
            kmem.next[head] = FREE_LIST_NULL;
            kmem.refs[head] = 1;
            kmem.nr_free -= 1;
            head
        };

        self.pages[index].lock().fill(ALLOC_JUNK);
        Some(PhysAddr::from_frame(self.start + index))
    }

    /// 释放页帧
    ///
    /// 调用者必须是唯一持有者（引用计数为 1）。
    pub fn free(&self, pa: PhysAddr) {
        let index = self.index_of(pa, "kfree");
        let mut kmem = self.kmem.lock();
        match kmem.refs[index] {
            0 => panic!("kfree: double free {:#x}", pa.0),
            1 => {}
            n => panic!("kfree: frame {:#x} still has {} references", pa.0, n),
        }
        kmem.refs[index] = 0;
        self.pages[index].lock().fill(FREE_JUNK);
        kmem.push(index);
    }

    /// 增加引用计数
    pub fn retain(&self, pa: PhysAddr) {
        let index = self.index_of(pa, "retain");
        let mut kmem = self.kmem.lock();
        if kmem.refs[index] == 0 {
            panic!("retain: frame {:#x} is free", pa.0);
        }
        kmem.refs[index] += 1;
    }

    /// 减少引用计数，归零时释放
    pub fn release_ref(&self, pa: PhysAddr) {
        let index = self.index_of(pa, "release_ref");
        let mut kmem = self.kmem.lock();
        if kmem.refs[index] == 0 {
            panic!("release_ref: frame {:#x} already free", pa.0);
        }
        kmem.refs[index] -= 1;
        if kmem.refs[index] == 0 {
            self.pages[index].lock().fill(FREE_JUNK);
            kmem.push(index);
        }
    }

    pub fn ref_count(&self, pa: PhysAddr) -> u32 {
        let index = self.index_of(pa, "ref_count");
        self.kmem.lock().refs[index]
    }

    /// 空闲页帧数
    pub fn free_frames(&self) -> usize {
        self.kmem.lock().nr_free
    }

    pub fn total_frames(&self) -> usize {
        self.nframes
    }

    /// 访问页帧内容
    pub fn with_page<R>(&self, pa: PhysAddr, f: impl FnOnce(&mut Page) -> R) -> R {
        let index = self.index_of(pa, "page access");
        let mut page = self.pages[index].lock();
        f(&mut page)
    }

    /// 把 src 的内容复制到 dst
    pub fn copy_page(&self, src: PhysAddr, dst: PhysAddr) {
        let mut buf = vec![0u8; PAGE_SIZE];
        self.with_page(src, |page| buf.copy_from_slice(&page[..]));
        self.with_page(dst, |page| page.copy_from_slice(&buf));
    }

    /// 检查空闲链表与引用计数是否一致
    ///
    /// 遍历链表：链上每一帧引用计数为 0、无环，且链长等于
    /// 引用计数为 0 的帧数。
    pub fn check_consistency(&self) -> bool {
        let kmem = self.kmem.lock();
        let mut on_list = vec![false; self.nframes];
        let mut len = 0;
        let mut cur = kmem.head;
        while cur != FREE_LIST_NULL {
            if on_list[cur] || kmem.refs[cur] != 0 {
                return false;
            }
            on_list[cur] = true;
            len += 1;
            cur = kmem.next[cur];
        }
        let zero_refs = kmem.refs.iter().filter(|&&r| r == 0).count();
        len == zero_refs && len == kmem.nr_free
    }
}
