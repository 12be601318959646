//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Per-CPU 状态
//!
//! 对应 xv6 的 struct cpu：当前进程、调度器上下文、push_off 嵌套深度
//! 以及 push_off 之前的中断使能状态。中断使能位 (sstatus.SIE) 和挂起的
//! 时钟中断在模拟平台上都是原子标志。
//!
//! 每个字段只由当前在此 CPU 上执行的那个执行流读写；执行流之间的
//! 移交经过 [`Handoff`] 同步，因此计数器使用 Relaxed 即可。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::context::Handoff;
use crate::process::ProcGuard;

/// 无当前进程
const NO_PROC: usize = usize::MAX;

/// CPU 记录
pub struct Cpu {
    id: usize,
    /// 当前运行的进程槽位
    proc: AtomicUsize,
    /// push_off 嵌套深度
    noff: AtomicUsize,
    /// push_off 之前中断是否开启
    intena: AtomicBool,
    /// 中断使能位
    intr: AtomicBool,
    /// 挂起的时钟中断
    timer_pending: AtomicBool,
    /// 调度器上下文，swtch() 在这里交回执行权
    sched_context: Handoff<ProcGuard<'static>>,
}

impl Cpu {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            proc: AtomicUsize::new(NO_PROC),
            noff: AtomicUsize::new(0),
            intena: AtomicBool::new(false),
            intr: AtomicBool::new(false),
            timer_pending: AtomicBool::new(false),
            sched_context: Handoff::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// 当前进程槽位
    pub fn current(&self) -> Option<usize> {
        match self.proc.load(Ordering::Acquire) {
            NO_PROC => None,
            slot => Some(slot),
        }
    }

    pub fn set_current(&self, slot: Option<usize>) {
        self.proc.store(slot.unwrap_or(NO_PROC), Ordering::Release);
    }

    // ============================================================
    // 中断使能
    // ============================================================

    #[inline]
    pub fn intr_on(&self) {
        self.intr.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn intr_off(&self) {
        self.intr.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn intr_get(&self) -> bool {
        self.intr.load(Ordering::Relaxed)
    }

    /// 关中断并增加嵌套深度
    ///
    /// push_off/pop_off 与 intr_off/intr_on 类似，但成对匹配：
    /// 两次 push_off 需要两次 pop_off 才能恢复；最外层 push_off 之前
    /// 中断是关闭的，则 pop_off 之后仍保持关闭。
    pub fn push_off(&self) {
        let old = self.intr_get();
        self.intr_off();
        if self.noff.load(Ordering::Relaxed) == 0 {
            self.intena.store(old, Ordering::Relaxed);
        }
        self.noff.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop_off(&self) {
        if self.intr_get() {
            panic!("pop_off - interruptible");
        }
        let noff = self.noff.load(Ordering::Relaxed);
        if noff < 1 {
            panic!("pop_off");
        }
        self.noff.store(noff - 1, Ordering::Relaxed);
        if noff == 1 && self.intena.load(Ordering::Relaxed) {
            self.intr_on();
        }
    }

    /// 当前嵌套深度
    pub fn noff(&self) -> usize {
        self.noff.load(Ordering::Relaxed)
    }

    pub fn intena(&self) -> bool {
        self.intena.load(Ordering::Relaxed)
    }

    pub fn set_intena(&self, intena: bool) {
        self.intena.store(intena, Ordering::Relaxed);
    }

    // ============================================================
    // 时钟中断
    // ============================================================

    /// 触发时钟中断（由定时器线程或测试调用）
    pub fn raise_timer(&self) {
        self.timer_pending.store(true, Ordering::Release);
    }

    /// 中断开启时取走挂起的时钟中断
    pub fn take_timer(&self) -> bool {
        self.intr_get() && self.timer_pending.swap(false, Ordering::AcqRel)
    }

    // ============================================================
    // 调度器上下文
    // ============================================================

    pub(crate) fn sched_context(&self) -> &Handoff<ProcGuard<'static>> {
        &self.sched_context
    }
}
