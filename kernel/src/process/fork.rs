//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程创建 (fork)
//!
//! 流程:
//! 1. 分配进程槽位 (allocproc)，此时只持有子进程锁
//! 2. 复制地址空间 (uvmcopy，逐页复制而非共享)
//! 3. 复制陷阱帧，子进程 a0 = 0
//! 4. 复制打开文件、当前目录（引用计数）和进程名
//! 5. 在 wait 锁下记录父进程
//! 6. 子进程设为 Runnable
//!
//! 任何一步失败都完整回滚，父进程看到的只是返回错误。

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;

use super::task::{Pid, ProcState};
use super::usermod::{Sysno, UserProc};

/// 进程体
///
/// 返回值作为退出状态。
pub type Program = Box<dyn FnOnce(&mut UserProc) -> i32 + Send + 'static>;

/// 进程调用 exit 后从进程体中退出时携带的标记
pub(crate) struct Exited;

/// 停机时停在切换点的进程从进程体中退出时携带的标记
pub(crate) struct Halted;

/// 新进程的内核入口地址（写入 context.ra）
pub fn user_entry() -> usize {
    forkret as fn(&'static Kernel, usize, Program) as usize
}

/// 新进程第一次被调度时从这里开始
///
/// 调度器把进程锁交过来，这里释放它，然后返回用户态运行进程体。
///
/// 进程体里的其他 panic 相当于内核 panic：整台机器停机，正在等待
/// 这个进程让出的 CPU 被唤醒并报告，然后 panic 继续向外传播。
fn forkret(kernel: &'static Kernel, slot: usize, program: Program) {
    let proc = kernel.procs().get(slot);
    // 从未被调度就停机了
    let Some(guard) = proc.resume_point().take() else {
        return;
    };
    let cpu = guard.cpu();
    drop(guard);

    let mut up = UserProc::new(kernel, slot, cpu);
    up.usertrapret();

    let run = panic::catch_unwind(AssertUnwindSafe(|| {
        let status = program(&mut up);
        up.do_exit(status);
    }));
    match run {
        Ok(()) => {}
        Err(payload) if payload.is::<Exited>() || payload.is::<Halted>() => {}
        Err(payload) => {
            log::error!("pid {}: panicked on cpu {}, halting", up.pid(), up.cpu().id());
            kernel.halt();
            up.cpu().sched_context().poison();
            panic::resume_unwind(payload);
        }
    }
}

impl Kernel {
    /// 为进程启动宿主线程，线程停在切换点等待第一次调度
    pub(crate) fn start_thread(&'static self, slot: usize, pid: Pid, program: Program) -> KResult<()> {
        thread::Builder::new()
            .name(format!("pid-{}", pid))
            .spawn(move || forkret(self, slot, program))
            .map(|handle| self.procs().get(slot).set_thread(handle))
            .map_err(|e| {
                log::error!("fork: cannot start thread for pid {}: {}", pid, e);
                Errno::TryAgain
            })
    }
}

impl UserProc {
    /// 创建子进程，返回子进程 PID
    ///
    /// 子进程从同一个陷阱帧返回用户态（a0 = 0），然后运行 `program`。
    pub fn fork<F>(&mut self, program: F) -> KResult<Pid>
    where
        F: FnOnce(&mut UserProc) -> i32 + Send + 'static,
    {
        let ret = self.do_fork(Box::new(program));
        self.syscall_ret(Sysno::Fork, ret)
    }

    fn do_fork(&mut self, program: Program) -> KResult<Pid> {
        let kernel = self.kernel();
        let cpu = self.cpu();
        let parent = self.proc();

        // 先读出父进程加锁字段，之后只持有子进程锁
        let tickets = parent.lock(cpu).sched.tickets;
        let name = self.name();

        let (slot, mut inner) = kernel.spawn(cpu)?;
        let child = kernel.procs().get(slot);
        // SAFETY: 子进程处于 Allocated 状态且持有其锁
        let np = unsafe { child.data_mut() };
        let p = self.data();

        if let Err(e) = p.space().copy_to(kernel.mem(), np.space_mut(), p.sz) {
            kernel.destroy(slot, &mut inner);
            return Err(e);
        }
        np.sz = p.sz;
        inner.sched.tickets = tickets;
        np.trace_mask = p.trace_mask;

        let mut tf = self.trapframe();
        tf.a0 = 0;
        kernel.mem().with_page(np.trapframe_pa(), |page| tf.store(page));

        for (dst, src) in np.ofile.iter_mut().zip(p.ofile.iter()) {
            *dst = src.as_ref().map(|file| file.dup());
        }
        np.cwd = p.cwd.clone();
        inner.name = name;

        let pid = inner.pid;
        if let Err(e) = kernel.start_thread(slot, pid, program) {
            kernel.destroy(slot, &mut inner);
            return Err(e);
        }
        drop(inner);

        {
            let mut parents = kernel.procs().parents().lock(cpu);
            parents[slot] = Some(self.slot());
        }

        child.lock(cpu).state = ProcState::Runnable;
        log::debug!("fork: pid {} -> pid {}", self.pid(), pid);
        Ok(pid)
    }
}
