//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 彩票调度
//!
//! 每个可运行进程持有若干彩票，每次调度抽一张，持有者运行。
//! 进程被选中的概率等于它的彩票数占可运行进程彩票总数的比例。
//!
//! 随机数是一个以当前滴答为增量的线性同余发生器：
//! `next = next * 1103515245 + ticks; rand = (next / 65536) % 32768`
//!
//! 彩票总数超过 32768 时，连续取几个随机数拼成一个足够宽的抽签值，
//! 否则累计彩票数在 32768 以上的进程永远抽不中。

use super::{lock_if_runnable, Scheduler};
use crate::arch::cpu::Cpu;
use crate::config::SchedPolicy;
use crate::kernel::Kernel;
use crate::process::{ProcGuard, ProcState};

/// 发生器初始状态
const SEED: u64 = 1;

/// 单个随机数的取值个数
const RAND_RANGE: u64 = 32768;

pub struct Lottery {
    next: spin::Mutex<u64>,
}

impl Lottery {
    pub fn new() -> Self {
        Self {
            next: spin::Mutex::new(SEED),
        }
    }

    /// 下一个随机数，范围 [0, 32768)
    pub fn rand(&self, ticks: u64) -> u64 {
        let mut next = self.next.lock();
        *next = next.wrapping_mul(1103515245).wrapping_add(ticks);
        (*next / 65536) % RAND_RANGE
    }

    /// 抽签，范围 [0, total)
    ///
    /// total 不超过 32768 时只用一个随机数。
    pub fn draw(&self, ticks: u64, total: u64) -> u64 {
        let mut draw = self.rand(ticks);
        let mut range = RAND_RANGE;
        while range < total {
            draw = draw * RAND_RANGE + self.rand(ticks);
            range = range.saturating_mul(RAND_RANGE);
        }
        draw % total
    }
}

impl Default for Lottery {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for Lottery {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Lottery
    }

    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)> {
        let total: u64 = kernel
            .procs()
            .iter()
            .map(|proc| {
                let inner = proc.lock(cpu);
                match inner.state {
                    ProcState::Runnable => inner.sched.tickets as u64,
                    _ => 0,
                }
            })
            .sum();
        if total == 0 {
            return None;
        }

        let draw = self.draw(kernel.ticks(), total);

        // 中奖者是累计彩票数第一个超过 draw 的进程；
        // 重新走一遍，途中状态可能已经变化
        let mut acc = 0;
        for proc in kernel.procs().iter() {
            let Some(guard) = lock_if_runnable(kernel, cpu, proc.slot()) else {
                continue;
            };
            acc += guard.sched.tickets as u64;
            if acc > draw {
                return Some((proc.slot(), guard));
            }
        }
        None
    }
}
