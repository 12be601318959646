//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 上下文切换
//!
//! 对应 xv6 的 kernel/swtch.S。真实硬件上 swtch 保存被调用者保存寄存器
//! 并恢复另一组；模拟平台上每个执行流（CPU 调度循环或进程）都是一个
//! 宿主线程，切换就是把执行权连同持有的进程锁守卫一起交给对方，然后
//! 自己停在切换点等待下一次被交回。
//!
//! 停机时切换点被作废 ([`Handoff::poison`])，停在上面的执行流不再
//! 等待，自行退出。
//!
//! [`Context`] 仍然保留寄存器记录，用来描述新进程第一次被调度时的
//! 入口地址与内核栈顶。

use core::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

/// 内核上下文切换保存的寄存器
///
/// 对应 xv6 的 struct context
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    /// 返回地址 (x1)
    pub ra: usize,
    /// 栈指针 (x2)
    pub sp: usize,
    /// 被调用者保存寄存器 s0-s11
    pub s: [usize; 12],
}

impl Context {
    pub const fn zero() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s: [0; 12],
        }
    }
}

/// 切换点
///
/// 一个执行流调用 [`Handoff::take`] 挂起自己，直到另一个执行流调用
/// [`Handoff::give`] 把值（通常是持有的进程锁守卫）交过来。
pub struct Handoff<T> {
    baton: spin::Mutex<Option<T>>,
    waiter: spin::Mutex<Option<Thread>>,
    poisoned: AtomicBool,
}

impl<T> Handoff<T> {
    pub const fn new() -> Self {
        Self {
            baton: spin::Mutex::new(None),
            waiter: spin::Mutex::new(None),
            poisoned: AtomicBool::new(false),
        }
    }

    /// 把执行权交给停在此切换点的执行流
    pub fn give(&self, value: T) {
        if self.baton.lock().replace(value).is_some() {
            panic!("swtch: context resumed twice");
        }
        if let Some(waiter) = self.waiter.lock().as_ref() {
            waiter.unpark();
        }
    }

    /// 停在切换点，直到被交回执行权
    ///
    /// 切换点被作废后返回 `None`，已经交过来的值仍然优先取走。
    pub fn take(&self) -> Option<T> {
        *self.waiter.lock() = Some(thread::current());
        loop {
            if let Some(value) = self.baton.lock().take() {
                return Some(value);
            }
            if self.poisoned.load(Ordering::Acquire) {
                return None;
            }
            thread::park();
        }
    }

    /// 作废切换点，唤醒停在上面的执行流
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
        if let Some(waiter) = self.waiter.lock().as_ref() {
            waiter.unpark();
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}
