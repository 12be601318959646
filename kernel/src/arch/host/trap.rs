//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 陷阱帧与用户地址空间布局
//!
//! 对应 xv6 的 kernel/proc.h (struct trapframe) 与 kernel/memlayout.h。
//! 陷阱帧占用每个进程独有的一个物理页，映射在用户地址空间的
//! TRAPFRAME 处，紧挨着 TRAMPOLINE 之下。

use core::mem::size_of;
use core::ptr;

use crate::config::PAGE_SIZE;
use crate::mm::page::Page;

/// 最大虚拟地址（Sv39 下避免符号扩展，只用 38 位）
pub const MAXVA: usize = 1 << (9 + 9 + 9 + 12 - 1);

/// 跳板页，映射在用户与内核地址空间的最高处
pub const TRAMPOLINE: usize = MAXVA - PAGE_SIZE;

/// 陷阱帧页
pub const TRAPFRAME: usize = TRAMPOLINE - PAGE_SIZE;

/// 用户态寄存器快照
///
/// 布局与 xv6 一致，前五个字段由内核在返回用户态前填写。
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    /// 内核页表
    pub kernel_satp: usize,
    /// 进程内核栈顶
    pub kernel_sp: usize,
    /// usertrap() 地址
    pub kernel_trap: usize,
    /// 用户程序计数器
    pub epc: usize,
    /// 内核 tp (hartid)
    pub kernel_hartid: usize,
    pub ra: usize,
    pub sp: usize,
    pub gp: usize,
    pub tp: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub s0: usize,
    pub s1: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
}

const _: () = assert!(size_of::<TrapFrame>() <= PAGE_SIZE);

impl TrapFrame {
    /// 从陷阱帧页读取
    pub fn load(page: &Page) -> Self {
        // SAFETY: TrapFrame 只含 usize 字段，任意字节都是合法值；页足够大
        unsafe { ptr::read_unaligned(page.as_ptr() as *const TrapFrame) }
    }

    /// 写回陷阱帧页
    pub fn store(&self, page: &mut Page) {
        // SAFETY: 同上
        unsafe { ptr::write_unaligned(page.as_mut_ptr() as *mut TrapFrame, *self) }
    }
}
