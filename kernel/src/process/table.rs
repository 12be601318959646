//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程表
//!
//! 固定容量的槽位数组，所有进程都活在这里；进程之间的引用是槽位下标
//! （需要防止槽位复用时用 [`ProcHandle`](super::ProcHandle) 带上代数）。
//!
//! 父子关系保存在 `parents` 数组里，由 wait 锁保护。任何需要同时
//! 访问父子关系和进程锁的路径（fork、exit、wait）都必须先获取 wait 锁，
//! 再获取进程锁。

use crate::arch::context::Context;
use crate::arch::cpu::Cpu;
use crate::arch::trap::{TrapFrame, TRAMPOLINE, TRAPFRAME};
use crate::config::{DEFAULT_PRIORITY, DEFAULT_TICKETS, NPROC, PAGE_SIZE};
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::mm::{PhysAddr, PteFlags, UserSpace, VirtAddr, TRAMPOLINE_PA};
use crate::sync::SpinLock;

use super::fork::{user_entry, Program};
use super::task::{Pid, Proc, ProcGuard, ProcInner, ProcState, SchedStats};
use super::usermod::INITCODE;
use super::UserProc;

/// 父进程表：parents[child] = Some(parent)
pub type Parents = [Option<usize>; NPROC];

/// 进程表
pub struct ProcTable {
    procs: Box<[Proc]>,
    /// wait 锁
    parents: SpinLock<Parents>,
}

impl ProcTable {
    /// 每个槽位使用 kstacks 中对应的内核栈页
    pub fn new(kstacks: &[PhysAddr]) -> Self {
        assert_eq!(kstacks.len(), NPROC, "proc_mapstacks");
        Self {
            procs: kstacks
                .iter()
                .enumerate()
                .map(|(slot, &kstack)| Proc::new(slot, kstack))
                .collect(),
            parents: SpinLock::new([None; NPROC], "wait_lock"),
        }
    }

    pub fn get(&self, slot: usize) -> &Proc {
        &self.procs[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.procs.iter()
    }

    /// wait 锁
    pub fn parents(&self) -> &SpinLock<Parents> {
        &self.parents
    }

    /// 按 PID 查找进程槽位（不含空闲槽位）
    pub fn find(&self, cpu: &Cpu, pid: Pid) -> Option<usize> {
        self.iter().find_map(|proc| {
            let inner = proc.lock(cpu);
            (inner.state != ProcState::Unused && inner.pid == pid).then_some(proc.slot())
        })
    }
}

impl Kernel {
    /// 分配进程槽位（allocproc）
    ///
    /// 返回的槽位处于 Allocated 状态，仍持有进程锁；调用者负责把它
    /// 设为 Runnable 或者调用 [`Kernel::destroy`] 回收。
    pub fn spawn<'k>(&'k self, cpu: &'k Cpu) -> KResult<(usize, ProcGuard<'k>)> {
        for proc in self.procs().iter() {
            let mut inner = proc.lock(cpu);
            if inner.state != ProcState::Unused {
                continue;
            }

            let slot = proc.slot();
            inner.pid = self.pids.alloc();
            inner.state = ProcState::Allocated;
            proc.bump_generation();

            // SAFETY: 槽位刚被占用且持有进程锁，没有其他执行流访问私有数据
            let data = unsafe { proc.data_mut() };

            let Some(trapframe) = self.mem().allocate() else {
                self.destroy(slot, &mut inner);
                return Err(Errno::OutOfMemory);
            };
            data.trapframe = Some(trapframe);

            match self.proc_pagetable(trapframe) {
                Some(pagetable) => data.pagetable = Some(pagetable),
                None => {
                    self.destroy(slot, &mut inner);
                    return Err(Errno::OutOfMemory);
                }
            }

            // 第一次被调度时从 forkret 开始，栈顶为内核栈页的末尾
            data.context = Context::zero();
            data.context.ra = user_entry();
            data.context.sp = data.kstack.as_usize() + PAGE_SIZE;

            let now = self.ticks();
            inner.sched = SchedStats {
                tickets: DEFAULT_TICKETS,
                static_priority: DEFAULT_PRIORITY,
                start_ticks: now,
                ctime: now,
                q_enter_time: now,
                ..SchedStats::default()
            };
            self.scheduler().on_spawn(proc.handle(), &mut inner, now);

            log::debug!("allocproc: pid {} in slot {}", inner.pid, slot);
            return Ok((slot, inner));
        }
        Err(Errno::TryAgain)
    }

    /// 回收进程槽位（freeproc），调用者持有进程锁
    ///
    /// 释放陷阱帧、地址空间及其映射的所有页、闹钟备份页，其余字段清零。
    pub fn destroy(&self, slot: usize, inner: &mut ProcInner) {
        let proc = self.procs().get(slot);
        self.scheduler().on_destroy(proc.handle());

        // SAFETY: 持有进程锁，进程不在任何 CPU 上运行
        let data = unsafe { proc.data_mut() };
        if let Some(trapframe) = data.trapframe.take() {
            self.mem().free(trapframe);
        }
        if let Some(backup) = data.alarm.backup.take() {
            self.mem().free(backup);
        }
        if let Some(pagetable) = data.pagetable.take() {
            self.proc_freepagetable(pagetable, data.sz);
        }
        for file in data.ofile.iter_mut() {
            if let Some(file) = file.take() {
                file.close();
            }
        }
        if let Some(cwd) = data.cwd.take() {
            self.vfs().iput(cwd);
        }
        data.reset();

        *inner = ProcInner::default();
    }

    /// 创建进程页表：只有跳板页和陷阱帧，没有用户内存
    fn proc_pagetable(&self, trapframe: PhysAddr) -> Option<UserSpace> {
        let mut pagetable = UserSpace::create(self.mem())?;

        // 跳板页与陷阱帧不带 PTE_U，只在陷入和返回时由内核使用
        if pagetable
            .map(VirtAddr(TRAMPOLINE), TRAMPOLINE_PA, PteFlags::R | PteFlags::X)
            .is_err()
        {
            pagetable.free(self.mem(), 0);
            return None;
        }
        if pagetable
            .map(VirtAddr(TRAPFRAME), trapframe, PteFlags::R | PteFlags::W)
            .is_err()
        {
            pagetable.unmap(self.mem(), VirtAddr(TRAMPOLINE), 1, false);
            pagetable.free(self.mem(), 0);
            return None;
        }
        Some(pagetable)
    }

    /// 释放进程页表及其映射的用户内存
    fn proc_freepagetable(&self, mut pagetable: UserSpace, sz: usize) {
        pagetable.unmap(self.mem(), VirtAddr(TRAMPOLINE), 1, false);
        pagetable.unmap(self.mem(), VirtAddr(TRAPFRAME), 1, false);
        pagetable.free(self.mem(), sz);
    }

    /// 创建第一个用户进程 (userinit)
    ///
    /// 该进程成为孤儿进程的新父进程，退出即停机。
    pub fn user_init<F>(&'static self, program: F) -> KResult<Pid>
    where
        F: FnOnce(&mut UserProc) -> i32 + Send + 'static,
    {
        if self.init_slot().is_some() {
            return Err(Errno::InvalidArgument);
        }
        let cpu = self.boot_cpu();
        let (slot, mut inner) = self.spawn(cpu)?;
        let proc = self.procs().get(slot);
        // SAFETY: 持有进程锁，进程尚未可运行
        let data = unsafe { proc.data_mut() };

        // 一页用户内存，放入 initcode
        if let Err(e) = data
            .space_mut()
            .grow(self.mem(), 0, PAGE_SIZE, PteFlags::W | PteFlags::X)
        {
            self.destroy(slot, &mut inner);
            return Err(e);
        }
        data.sz = PAGE_SIZE;
        if let Err(e) = data.space().copy_out(self.mem(), 0, INITCODE) {
            self.destroy(slot, &mut inner);
            return Err(e);
        }

        // 第一次返回用户态：从地址 0 开始执行，栈顶在页末
        let trapframe = TrapFrame {
            epc: 0,
            sp: PAGE_SIZE,
            ..TrapFrame::default()
        };
        self.mem()
            .with_page(data.trapframe_pa(), |page| trapframe.store(page));

        inner.name = "initcode".into();
        data.cwd = self.vfs().namei("/");

        let pid = inner.pid;
        let program: Program = Box::new(program);
        if let Err(e) = self.start_thread(slot, pid, program) {
            self.destroy(slot, &mut inner);
            return Err(e);
        }

        self.set_init_slot(slot);
        inner.state = ProcState::Runnable;
        log::info!("userinit: pid {} ({})", pid, self.scheduler().policy());
        Ok(pid)
    }
}
