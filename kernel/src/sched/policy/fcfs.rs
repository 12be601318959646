//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 先来先服务：选进入可调度状态最早的进程，运行到它自己让出 CPU

use super::{select_min_by_key, Scheduler};
use crate::arch::cpu::Cpu;
use crate::config::SchedPolicy;
use crate::kernel::Kernel;
use crate::process::ProcGuard;

pub struct Fcfs;

impl Scheduler for Fcfs {
    fn policy(&self) -> SchedPolicy {
        SchedPolicy::Fcfs
    }

    fn select_next<'k>(&self, kernel: &'k Kernel, cpu: &'k Cpu) -> Option<(usize, ProcGuard<'k>)> {
        select_min_by_key(kernel, cpu, |inner| inner.sched.start_ticks)
    }
}
