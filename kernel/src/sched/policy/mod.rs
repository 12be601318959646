//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度策略
//!
//! 类似 Linux 的调度类 (sched_class)：调度循环只调用 [`Scheduler`]
//! 的几个钩子，具体选择哪个进程由策略决定。策略在启动时根据配置
//! 选定 ([`create`])。
//!
//! - `fcfs`: 先来先服务
//! - `rr`: 轮转
//! - `lottery`: 彩票调度
//! - `pbs`: 动态优先级
//! - `mlfq`: 多级反馈队列
//!
//! 约定：select_next 返回的进程处于 Runnable 状态且持有其锁；
//! 其余钩子都在持有该进程锁时调用。选择过程中任何时刻最多持有
//! 一把进程锁。

pub mod fcfs;
pub mod lottery;
pub mod mlfq;
pub mod pbs;
pub mod rr;

use crate::arch::cpu::Cpu;
use crate::config::SchedPolicy;
use crate::kernel::Kernel;
use crate::process::{ProcGuard, ProcHandle, ProcInner, ProcState};

pub use fcfs::Fcfs;
pub use lottery::Lottery;
pub use mlfq::Mlfq;
pub use pbs::{dynamic_priority, Pbs};
pub use rr::RoundRobin;

/// 调度策略接口
pub trait Scheduler: Send + Sync {
    fn policy(&self) -> SchedPolicy;

    /// 选出下一个运行的进程，返回槽位与持有的进程锁
    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)>;

    /// 槽位刚被占用
    fn on_spawn(&self, _handle: ProcHandle, _inner: &mut ProcInner, _now: u64) {}

    /// 即将切换到该进程
    fn on_dispatch(&self, _inner: &mut ProcInner, _now: u64) {}

    /// 进程让出 CPU，回到调度循环
    fn on_return(&self, _handle: ProcHandle, _inner: &mut ProcInner, _now: u64) {}

    /// 槽位即将被回收
    fn on_destroy(&self, _handle: ProcHandle) {}

    /// 每个滴答统计之后调用（不持有任何锁）
    fn on_tick(&self, _kernel: &Kernel, _cpu: &Cpu) {}
}

/// 根据配置创建调度策略
pub fn create(policy: SchedPolicy, ncpu: usize) -> Box<dyn Scheduler> {
    match policy {
        SchedPolicy::Fcfs => Box::new(Fcfs),
        SchedPolicy::Rr => Box::new(RoundRobin::new(ncpu)),
        SchedPolicy::Lottery => Box::new(Lottery::new()),
        SchedPolicy::Pbs => Box::new(Pbs),
        SchedPolicy::Mlfq => Box::new(Mlfq::new()),
    }
}

/// 锁住槽位，仍可运行时返回守卫
pub(crate) fn lock_if_runnable<'k>(kernel: &'k Kernel, cpu: &'k Cpu, slot: usize) -> Option<ProcGuard<'k>> {
    let guard = kernel.procs().get(slot).lock(cpu);
    (guard.state == ProcState::Runnable).then_some(guard)
}

/// 在所有可运行进程中找 key 最小的那个（相同时取表中靠前的），
/// 然后重新加锁确认它仍可运行
pub(crate) fn select_min_by_key<'k, K, F>(kernel: &'k Kernel, cpu: &'k Cpu, key: F) -> Option<(usize, ProcGuard<'k>)>
where
    K: Ord,
    F: Fn(&ProcInner) -> K,
{
    let mut best: Option<(K, usize)> = None;
    for proc in kernel.procs().iter() {
        let inner = proc.lock(cpu);
        if inner.state != ProcState::Runnable {
            continue;
        }
        let k = key(&inner);
        if best.as_ref().map_or(true, |(bk, _)| k < *bk) {
            best = Some((k, proc.slot()));
        }
    }
    let (_, slot) = best?;
    lock_if_runnable(kernel, cpu, slot).map(|guard| (slot, guard))
}
