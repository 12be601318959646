//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理模块
//!
//! - `page`: 物理页帧分配器
//! - `vm`: 用户地址空间

pub mod page;
pub mod vm;

pub use page::{FrameAllocator, PhysAddr, VirtAddr};
pub use vm::{PteFlags, UserSpace};

/// 物理内存起始地址 (QEMU virt)
pub const KERNBASE: usize = 0x8000_0000;

/// 内核映像占用的大小，托管页帧从其后开始
pub const KERNEL_IMAGE_SIZE: usize = 2 * 1024 * 1024;

/// 跳板页所在的物理页（位于内核映像内，不由分配器管理）
pub const TRAMPOLINE_PA: PhysAddr = PhysAddr(KERNBASE);
