//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程退出与回收 (exit / wait / waitx)
//!
//! 退出的进程先成为 Zombie，保留 PID、退出状态和时间统计，
//! 直到父进程在 wait 中取走并回收槽位。
//!
//! 父子关系由 wait 锁保护，加锁顺序固定为 wait 锁 → 进程锁，
//! 避免 exit 与 wait 之间丢失唤醒。

use std::panic;

use crate::arch::cpu::Cpu;
use crate::config::NPROC;
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;

use super::fork::Exited;
use super::table::Parents;
use super::task::{Channel, Pid, ProcState};
use super::usermod::{Sysno, SyscallRet, UserProc};

/// waitx 报告的时间统计（滴答）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitTimes {
    /// 等待时间 = etime - ctime - rtime
    pub wtime: u64,
    /// 运行时间
    pub rtime: u64,
}

impl SyscallRet for (Pid, WaitTimes) {
    fn raw(&self) -> i64 {
        self.0 as i64
    }
}

impl Kernel {
    /// 把 slot 的子进程交给 init，调用者持有 wait 锁
    pub(crate) fn reparent(&self, cpu: &Cpu, slot: usize, parents: &mut Parents) {
        let Some(init) = self.init_slot() else {
            return;
        };
        for child in 0..NPROC {
            if parents[child] == Some(slot) {
                parents[child] = Some(init);
                self.wakeup(cpu, Channel::Proc(init));
            }
        }
    }
}

impl UserProc {
    /// 退出当前进程，不会返回
    pub fn exit(&mut self, status: i32) -> ! {
        self.do_exit(status);
        // 离开进程体，回到线程入口
        panic::resume_unwind(Box::new(Exited));
    }

    /// 进程退出，返回时执行权已经永久交给调度器
    pub(crate) fn do_exit(&mut self, status: i32) {
        let kernel = self.kernel();
        let cpu = self.cpu();
        let slot = self.slot();

        if kernel.init_slot() == Some(slot) {
            log::error!("pid {}: init exiting with status {}", self.pid(), status);
            panic!("init exiting");
        }

        // 关闭所有打开的文件
        let data = self.data_mut();
        for file in data.ofile.iter_mut() {
            if let Some(file) = file.take() {
                file.close();
            }
        }
        if let Some(cwd) = data.cwd.take() {
            kernel.vfs().iput(cwd);
        }

        let mut parents = kernel.procs().parents().lock(cpu);

        // 子进程交给 init
        kernel.reparent(cpu, slot, &mut parents);

        // 父进程可能正在 wait 中睡眠
        if let Some(parent) = parents[slot] {
            kernel.wakeup(cpu, Channel::Proc(parent));
        }

        let mut inner = self.proc().lock(cpu);
        inner.xstate = status;
        inner.state = ProcState::Zombie;
        inner.sched.etime = kernel.ticks();

        drop(parents);

        log::debug!("exit: pid {} status {}", self.pid(), status);
        self.sched_final(inner);
    }

    /// 等待一个子进程退出，返回其 PID
    ///
    /// addr 非 0 时把退出状态写到该用户地址。
    pub fn wait(&mut self, addr: usize) -> KResult<Pid> {
        let ret = self.reap(addr).map(|(pid, _)| pid);
        self.syscall_ret(Sysno::Wait, ret)
    }

    /// 与 wait 相同，同时返回子进程的运行与等待时间
    pub fn waitx(&mut self, addr: usize) -> KResult<(Pid, WaitTimes)> {
        let ret = self.reap(addr);
        self.syscall_ret(Sysno::Waitx, ret)
    }

    fn reap(&mut self, addr: usize) -> KResult<(Pid, WaitTimes)> {
        let kernel = self.kernel();
        let slot = self.slot();
        let mut parents = kernel.procs().parents().lock(self.cpu());

        loop {
            let mut havekids = false;
            for child in 0..NPROC {
                if parents[child] != Some(slot) {
                    continue;
                }
                // 持有子进程锁，保证它已经在 exit 中完成切换
                let mut inner = kernel.procs().get(child).lock(self.cpu());
                havekids = true;
                if inner.state != ProcState::Zombie {
                    continue;
                }

                let pid = inner.pid;
                let stats = &inner.sched;
                let times = WaitTimes {
                    rtime: stats.rtime,
                    wtime: (stats.etime - stats.ctime).saturating_sub(stats.rtime),
                };
                if addr != 0 {
                    self.copy_out(addr, &inner.xstate.to_ne_bytes())?;
                }
                kernel.destroy(child, &mut inner);
                parents[child] = None;
                return Ok((pid, times));
            }

            if !havekids {
                return Err(Errno::NoChild);
            }
            if self.killed() {
                return Err(Errno::InterruptedSystemCall);
            }

            // 等待子进程退出
            parents = self.sleep(Channel::Proc(slot), parents);
        }
    }
}
