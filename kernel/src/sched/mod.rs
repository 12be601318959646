//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! - `sched`: 调度循环、上下文切换协议、sleep/wakeup、kill、滴答统计
//! - `policy`: 五种可选的调度策略 (FCFS / RR / Lottery / PBS / MLFQ)
//! - `queue`: MLFQ 使用的有界环形队列
//!
//! 调度入口: run_scheduler() -> Scheduler::select_next() -> swtch

pub mod policy;
pub mod queue;
pub mod sched;

pub use policy::{create, dynamic_priority, Scheduler};
pub use queue::ProcQueue;
pub use sched::{usertrap_entry, MAX_PRIORITY};
