//! 同步原语 (Synchronization Primitives)
//!
//! - `spinlock`: 关中断的自旋锁，守卫可随上下文切换移交
//!
//! 锁顺序（从外到内）：
//! - wait 锁 → 进程锁 → {MLFQ 队列锁, 页帧分配器锁, 页内容锁}
//! - ticks 锁 → 进程锁
//!
//! 调度器任何时候最多持有一把进程锁。

pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
