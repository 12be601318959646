//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 多级反馈队列 (MLFQ)
//!
//! MLFQ_LEVELS 层队列，0 层优先级最高。每次调度之前：
//! 1. 老化：1 层及以上的队头进程等待超过 MLFQ_AGING_TICKS 个滴答时上移一层
//! 2. 入队：所有可运行但不在队列中的进程按当前层入队
//!
//! 然后从 0 层开始依次出队，丢弃不可运行的进程，选中第一个可运行的。
//! 运行结束后回到原层队尾，不按时间片降级。
//!
//! 队列锁是叶子锁：持有它时不获取进程锁。需要同时看进程状态和队列时，
//! 先放开队列锁去锁进程，再重新获取队列锁并确认队头没有变化。

use super::Scheduler;
use crate::arch::cpu::Cpu;
use crate::config::{SchedPolicy, MLFQ_AGING_TICKS, MLFQ_LEVELS};
use crate::kernel::Kernel;
use crate::process::{ProcGuard, ProcHandle, ProcInner, ProcState};
use crate::sched::queue::ProcQueue;

pub struct Mlfq {
    queues: spin::Mutex<[ProcQueue; MLFQ_LEVELS]>,
}

impl Mlfq {
    pub fn new() -> Self {
        Self {
            queues: spin::Mutex::new(core::array::from_fn(|_| ProcQueue::new())),
        }
    }

    /// 老化 (queue_switch)
    ///
    /// 进入队列的时刻不刷新，上移后的进程如果继续等待，会在之后的
    /// 滴答里一层层地继续上移。
    fn age(&self, kernel: &Kernel, cpu: &Cpu) {
        let now = kernel.ticks();
        for level in 1..MLFQ_LEVELS {
            loop {
                let Some(handle) = self.queues.lock()[level].front() else {
                    break;
                };
                let proc = kernel.procs().get(handle.slot);
                let mut inner = proc.lock(cpu);

                let mut queues = self.queues.lock();
                if queues[level].front() != Some(handle) {
                    // 其他 CPU 已经动过队头
                    continue;
                }
                if proc.generation() != handle.generation {
                    queues[level].pop();
                    continue;
                }
                if inner.state != ProcState::Runnable
                    || now.saturating_sub(inner.sched.q_enter_time) <= MLFQ_AGING_TICKS
                {
                    break;
                }

                queues[level].pop();
                inner.sched.curr_q = level - 1;
                inner.sched.cq_rticks = 0;
                queues[level - 1].push(handle);
                log::debug!("mlfq: pid {} aged to level {}", inner.pid, level - 1);
            }
        }
    }

    /// 可运行但不在队列中的进程按当前层入队
    fn admit(&self, kernel: &Kernel, cpu: &Cpu) {
        let now = kernel.ticks();
        for proc in kernel.procs().iter() {
            let mut inner = proc.lock(cpu);
            if inner.state == ProcState::Runnable && !inner.sched.queued {
                inner.sched.q_enter_time = now;
                inner.sched.cq_rticks = 0;
                inner.sched.queued = true;
                self.queues.lock()[inner.sched.curr_q].push(proc.handle());
            }
        }
    }
}

impl Default for Mlfq {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for Mlfq {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Mlfq
    }

    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)> {
        self.age(kernel, cpu);
        self.admit(kernel, cpu);

        for level in 0..MLFQ_LEVELS {
            loop {
                let Some(handle) = self.queues.lock()[level].pop() else {
                    break;
                };
                let proc = kernel.procs().get(handle.slot);
                let mut inner = proc.lock(cpu);
                if proc.generation() != handle.generation {
                    // 槽位已被回收并重新占用
                    continue;
                }
                inner.sched.queued = false;
                if inner.state == ProcState::Runnable {
                    return Some((handle.slot, inner));
                }
            }
        }
        None
    }

    fn on_spawn(&self, handle: ProcHandle, inner: &mut ProcInner, now: u64) {
        inner.sched.curr_q = 0;
        inner.sched.q_enter_time = now;
        inner.sched.queued = true;
        self.queues.lock()[0].push(handle);
    }

    fn on_return(&self, handle: ProcHandle, inner: &mut ProcInner, now: u64) {
        inner.sched.q_enter_time = now;
        inner.sched.cq_rticks = 0;
        inner.sched.queued = true;
        self.queues.lock()[inner.sched.curr_q].push(handle);
    }

    fn on_destroy(&self, handle: ProcHandle) {
        let mut queues = self.queues.lock();
        for queue in queues.iter_mut() {
            queue.remove(handle.slot);
        }
    }

    fn on_tick(&self, kernel: &Kernel, cpu: &Cpu) {
        self.age(kernel, cpu);
    }
}
