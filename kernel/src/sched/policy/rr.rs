//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 轮转调度
//!
//! 每个 CPU 记住上次停下的位置，从它之后继续按表序扫描，
//! 每遇到一个可运行进程就运行一次。

use core::sync::atomic::{AtomicUsize, Ordering};

use super::{lock_if_runnable, Scheduler};
use crate::arch::cpu::Cpu;
use crate::config::{SchedPolicy, NPROC};
use crate::kernel::Kernel;
use crate::process::ProcGuard;

pub struct RoundRobin {
    /// 每个 CPU 下一次扫描的起点
    cursors: Box<[AtomicUsize]>,
}

impl RoundRobin {
    pub fn new(ncpu: usize) -> Self {
        Self {
            cursors: (0..ncpu).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    fn cursor(&self, cpu: &Cpu) -> Option<&AtomicUsize> {
        self.cursors.get(cpu.id())
    }
}

impl Scheduler for RoundRobin {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Rr
    }

    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)> {
        let start = self.cursor(cpu).map_or(0, |c| c.load(Ordering::Relaxed));
        for i in 0..NPROC {
            let slot = (start + i) % NPROC;
            if let Some(guard) = lock_if_runnable(kernel, cpu, slot) {
                if let Some(cursor) = self.cursor(cpu) {
                    cursor.store((slot + 1) % NPROC, Ordering::Relaxed);
                }
                return Some((slot, guard));
            }
        }
        None
    }
}
