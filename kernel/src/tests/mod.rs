//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 单元测试模块
//!
//! 分两类：
//! - 表级测试：直接在测试线程上用 `boot_cpu` 操作进程表和调度策略，
//!   不启动 CPU 线程
//! - 整机测试：`Machine::start` 启动所有 CPU 的调度循环，init 进程体
//!   在进程线程里运行，结果通过通道送回测试线程
//!
//! 运行测试：
//! ```bash
//! cargo test --package procsched
//! ```

mod address_space;
mod halt;
mod process_table;
mod signal;
mod sleep_wakeup;
mod smp_schedule;

use std::sync::mpsc;
use std::time::Duration;

use crate::config::{KernelConfig, SchedPolicy, NPROC};
use crate::kernel::Kernel;
use crate::process::{Pid, ProcInner, ProcState, UserProc};
use crate::Machine;

/// 测试机器的页帧数：内核栈之外留 128 帧
pub(crate) const TEST_FRAMES: usize = NPROC + 128;

/// 整机测试等待结果的上限
pub(crate) const TIMEOUT: Duration = Duration::from_secs(30);

/// 时钟周期
pub(crate) const TICK: Duration = Duration::from_millis(1);

pub(crate) fn boot(policy: SchedPolicy, cpus: usize) -> &'static Kernel {
    boot_with_frames(policy, cpus, TEST_FRAMES)
}

pub(crate) fn boot_with_frames(policy: SchedPolicy, cpus: usize, frames: usize) -> &'static Kernel {
    let mut config = KernelConfig::with_policy(policy, cpus);
    config.machine.frames = frames;
    Kernel::boot(config).expect("boot")
}

/// 在进程表上放一个可运行进程（没有进程线程，只用于表级测试）
pub(crate) fn runnable(kernel: &Kernel) -> (usize, Pid) {
    let (slot, mut inner) = kernel.spawn(kernel.boot_cpu()).expect("spawn");
    inner.state = ProcState::Runnable;
    (slot, inner.pid)
}

/// 在持有进程锁的情况下读写槽位
pub(crate) fn with_inner<R>(kernel: &Kernel, slot: usize, f: impl FnOnce(&mut ProcInner) -> R) -> R {
    let mut inner = kernel.procs().get(slot).lock(kernel.boot_cpu());
    f(&mut inner)
}

/// 启动一台机器，让 init 运行 `body`，返回 body 的结果
///
/// body 返回后 init 进入回收循环，不会退出。
pub(crate) fn run_init<T, F>(policy: SchedPolicy, cpus: usize, body: F) -> T
where
    T: Send + 'static,
    F: FnOnce(&mut UserProc) -> T + Send + 'static,
{
    let kernel = boot(policy, cpus);
    let (tx, rx) = mpsc::channel();
    kernel
        .user_init(move |up| {
            let result = body(up);
            let _ = tx.send(result);
            loop {
                if up.wait(0).is_err() {
                    let _ = up.sleep_ticks(10);
                }
            }
        })
        .expect("user_init");

    let mut machine = Machine::start(kernel).expect("start machine");
    machine.start_timer(TICK).expect("start timer");
    let result = rx.recv_timeout(TIMEOUT).expect("init did not report");
    assert_eq!(machine.shutdown(), Ok(()));
    result
}

/// 子进程在忙循环里反复陷入，直到滴答推进 n 次
pub(crate) fn spin_ticks(up: &mut UserProc, n: u64) {
    let start = up.uptime();
    while up.uptime() - start < n {
        up.usertrap();
        std::thread::yield_now();
    }
}
