//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 自旋锁 (Spinlock)
//!
//! 对应 xv6 的 kernel/spinlock.c 与 Linux 的 raw_spinlock：
//! - 获取锁之前关中断 (push_off)，释放之后按嵌套深度恢复 (pop_off)
//! - 记录持有者 CPU，同一 CPU 重复获取视为死锁，直接停机
//!
//! 与普通互斥锁不同，守卫可以跨越上下文切换：调度器获取进程锁后
//! 把守卫交给进程，由进程在另一侧释放（见 [`crate::arch::context::Handoff`]）。

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::cpu::Cpu;

/// 未被持有
const NO_HOLDER: usize = 0;

/// 自旋锁
pub struct SpinLock<T> {
    /// 锁名（用于诊断）
    name: &'static str,
    /// 持有者 CPU 编号 + 1
    holder: AtomicUsize,
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(value: T, name: &'static str) -> Self {
        Self {
            name,
            holder: AtomicUsize::new(NO_HOLDER),
            inner: spin::Mutex::new(value),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取锁
    ///
    /// 对应 xv6 的 acquire()。返回的守卫记录获取时所在的 CPU，
    /// 释放时在该 CPU 上执行 pop_off。
    pub fn lock<'a>(&'a self, cpu: &'a Cpu) -> SpinLockGuard<'a, T> {
        // 关中断，避免与中断处理程序死锁
        cpu.push_off();
        if self.holding(cpu) {
            log::error!("cpu {}: acquire {} while holding it", cpu.id(), self.name);
            panic!("acquire {}", self.name);
        }

        let guard = self.inner.lock();
        self.holder.store(cpu.id() + 1, Ordering::Release);

        SpinLockGuard {
            lock: self,
            cpu,
            guard: ManuallyDrop::new(guard),
        }
    }

    /// 当前 CPU 是否持有此锁
    pub fn holding(&self, cpu: &Cpu) -> bool {
        self.inner.is_locked() && self.holder.load(Ordering::Acquire) == cpu.id() + 1
    }

    /// 释放守卫并返回锁本身，供之后重新获取
    pub fn unlock<'a>(guard: SpinLockGuard<'a, T>) -> &'a SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }
}

/// 自旋锁守卫
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    cpu: &'a Cpu,
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
}

// 守卫在上下文切换时随执行权一起移交给另一个执行流
unsafe impl<T: Send> Send for SpinLockGuard<'_, T> {}

impl<'a, T> SpinLockGuard<'a, T> {
    /// 获取此锁时所在的 CPU
    pub fn cpu(&self) -> &'a Cpu {
        self.cpu
    }

    pub fn lock(&self) -> &'a SpinLock<T> {
        self.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.holder.store(NO_HOLDER, Ordering::Release);
        // SAFETY: guard 只在这里释放一次
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.cpu.pop_off();
    }
}
