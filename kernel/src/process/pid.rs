//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! PID 管理
//!
//! PID 单调递增、不复用。分配器有自己的锁，与任何进程锁无关，
//! 可以在持有进程锁时调用。

use super::task::Pid;

/// init 进程的 PID
pub const PID_INIT: Pid = 1;

/// PID 分配器
pub struct PidAllocator {
    next: spin::Mutex<Pid>,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self {
            next: spin::Mutex::new(PID_INIT),
        }
    }

    /// 分配一个新的 PID
    pub fn alloc(&self) -> Pid {
        let mut next = self.next.lock();
        let pid = *next;
        *next += 1;
        pid
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
