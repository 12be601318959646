//! 进程管理模块
//!
//! - `task`: 进程控制块 (struct proc)
//! - `table`: 进程表、槽位分配与回收 (allocproc / freeproc / userinit)
//! - `pid`: PID 分配
//! - `fork`: 进程创建
//! - `wait`: 退出与回收
//! - `usermod`: 进程体使用的系统调用接口

pub mod fork;
pub mod pid;
pub mod table;
pub mod task;
pub mod usermod;
pub mod wait;

pub use fork::Program;
pub use pid::{PidAllocator, PID_INIT};
pub use table::{Parents, ProcTable};
pub use task::{Channel, Pid, Proc, ProcData, ProcGuard, ProcHandle, ProcInner, ProcState, SchedStats};
pub use usermod::{Sysno, UserProc, INITCODE};
pub use wait::WaitTimes;
