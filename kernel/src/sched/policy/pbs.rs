//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 基于动态优先级的调度 (PBS)
//!
//! 动态优先级由静态优先级和“友好度”(niceness) 算出，数值越小越优先：
//!
//! ```text
//! niceness = (sleep / (sleep + run)) * 10   // 先做整数除法；两者都为 0 时取 5
//! dp       = clamp(sp - niceness + 5, 0, 100)
//! ```
//!
//! dp 相同时，被调度次数少的优先；再相同时，先进入可调度状态的优先。

use super::{select_min_by_key, Scheduler};
use crate::arch::cpu::Cpu;
use crate::config::SchedPolicy;
use crate::kernel::Kernel;
use crate::process::{ProcGuard, ProcInner, SchedStats};
use crate::sched::sched::MAX_PRIORITY;

/// 没有运行和睡眠记录时的默认友好度
const DEFAULT_NICENESS: u64 = 5;

/// 动态优先级
pub fn dynamic_priority(stats: &SchedStats) -> u32 {
    let total = stats.sleep_ticks + stats.run_ticks;
    let niceness = if total == 0 {
        DEFAULT_NICENESS
    } else {
        (stats.sleep_ticks / total) * 10
    };
    let dp = stats.static_priority as i64 - niceness as i64 + 5;
    dp.clamp(0, MAX_PRIORITY as i64) as u32
}

pub struct Pbs;

impl Scheduler for Pbs {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Pbs
    }

    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)> {
        select_min_by_key(kernel, cpu, |inner| {
            (
                dynamic_priority(&inner.sched),
                inner.sched.num_scheduled,
                inner.sched.start_ticks,
            )
        })
    }

    fn on_dispatch(&self, inner: &mut ProcInner, _now: u64) {
        inner.sched.num_scheduled += 1;
        inner.sched.run_ticks = 0;
        inner.sched.sleep_ticks = 0;
    }
}
