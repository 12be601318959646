//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! procsched：多核进程调度与物理页帧管理
//!
//! 模块划分：
//! - `arch`: CPU 记录、上下文切换、陷阱帧、多核启动（宿主机模拟）
//! - `mm`: 页帧分配器与用户地址空间
//! - `process`: 进程表、fork / exit / wait、用户态接口
//! - `sched`: 调度循环与五种调度策略
//! - `signal`: 用户态闹钟
//! - `sync`: 关中断自旋锁
//! - `fs`: 打开文件与 inode 引用
//!
//! 使用方式：
//! ```ignore
//! let kernel = Kernel::boot(KernelConfig::with_policy(SchedPolicy::Mlfq, 2))?;
//! kernel.user_init(|up| { /* init 进程体 */ 0 })?;
//! let mut machine = Machine::start(kernel)?;
//! machine.start_timer(Duration::from_millis(1))?;
//! ```

pub mod arch;
pub mod config;
pub mod errno;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod sched;
pub mod signal;
pub mod sync;

#[cfg(test)]
mod tests;

pub use arch::smp::Machine;
pub use config::{KernelConfig, SchedPolicy};
pub use errno::{Errno, KResult};
pub use kernel::Kernel;
pub use process::{Pid, UserProc};
