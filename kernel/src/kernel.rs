//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内核实例
//!
//! 所有全局状态（CPU 记录、页帧分配器、进程表、调度策略、滴答计数）
//! 都挂在一个 [`Kernel`] 上。启动时创建并泄漏为 `&'static`，之后由
//! CPU 线程和进程线程共享。

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::arch::cpu::Cpu;
use crate::config::{KernelConfig, SchedPolicy, NPROC};
use crate::errno::{Errno, KResult};
use crate::fs::Vfs;
use crate::mm::{FrameAllocator, PhysAddr, KERNBASE, KERNEL_IMAGE_SIZE};
use crate::process::{PidAllocator, ProcState, ProcTable};
use crate::sched::{self, Scheduler};
use crate::sync::SpinLock;

/// 内核
pub struct Kernel {
    config: KernelConfig,
    cpus: Box<[Cpu]>,
    /// 模拟 CPU 之外的宿主线程（启动、测试驱动）使用的 CPU 记录
    boot_cpu: Cpu,
    mem: FrameAllocator,
    procs: ProcTable,
    pub(crate) pids: PidAllocator,
    scheduler: Box<dyn Scheduler>,
    /// 全局滴答计数，只由 CPU 0 的时钟中断推进
    pub(crate) ticks: AtomicU64,
    /// 保护“检查滴答并在 ticks 通道上睡眠”的过程
    tickslock: SpinLock<()>,
    vfs: Vfs,
    /// init 进程所在槽位
    init_slot: spin::Once<usize>,
    halted: AtomicBool,
}

impl Kernel {
    /// 启动内核
    ///
    /// 初始化顺序：
    /// 1. 校验配置
    /// 2. CPU 记录
    /// 3. 页帧分配器 (kinit)
    /// 4. 每个进程槽位的内核栈 (proc_mapstacks)
    /// 5. 调度策略
    pub fn boot(config: KernelConfig) -> KResult<&'static Kernel> {
        if let Err(e) = config.validate() {
            log::error!("boot: {}", e);
            return Err(Errno::InvalidArgument);
        }

        let ncpu = config.machine.cpus;
        let cpus: Box<[Cpu]> = (0..ncpu).map(Cpu::new).collect();

        let mem = FrameAllocator::new(PhysAddr(KERNBASE + KERNEL_IMAGE_SIZE), config.machine.frames);

        let mut kstacks = Vec::with_capacity(NPROC);
        for _ in 0..NPROC {
            let kstack = mem.allocate().ok_or(Errno::OutOfMemory)?;
            kstacks.push(kstack);
        }
        let procs = ProcTable::new(&kstacks);

        let scheduler = sched::create(config.sched.policy, ncpu);

        log::info!(
            "boot: {} cpus, {} frames ({} free), policy {}",
            ncpu,
            mem.total_frames(),
            mem.free_frames(),
            config.sched.policy
        );

        let kernel = Kernel {
            config,
            cpus,
            boot_cpu: Cpu::new(ncpu),
            mem,
            procs,
            pids: PidAllocator::new(),
            scheduler,
            ticks: AtomicU64::new(0),
            tickslock: SpinLock::new((), "time"),
            vfs: Vfs::new(),
            init_slot: spin::Once::new(),
            halted: AtomicBool::new(false),
        };
        Ok(Box::leak(Box::new(kernel)))
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn ncpu(&self) -> usize {
        self.cpus.len()
    }

    pub fn cpu(&self, id: usize) -> &Cpu {
        &self.cpus[id]
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn boot_cpu(&self) -> &Cpu {
        &self.boot_cpu
    }

    pub fn mem(&self) -> &FrameAllocator {
        &self.mem
    }

    pub fn procs(&self) -> &ProcTable {
        &self.procs
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn policy(&self) -> SchedPolicy {
        self.scheduler.policy()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn tickslock(&self) -> &SpinLock<()> {
        &self.tickslock
    }

    pub fn init_slot(&self) -> Option<usize> {
        self.init_slot.get().copied()
    }

    pub(crate) fn set_init_slot(&self, slot: usize) {
        self.init_slot.call_once(|| slot);
    }

    /// 停止所有调度循环
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// 打印进程列表（调试用，对应 ^P）
    ///
    /// 每行：pid 状态 名字 q0..q4 彩票数 静态优先级
    pub fn procdump(&self, cpu: &Cpu) -> String {
        let mut out = String::new();
        for proc in self.procs.iter() {
            let inner = proc.lock(cpu);
            if inner.state == ProcState::Unused {
                continue;
            }
            let mut line = format!("{} {} {}", inner.pid, inner.state.name(), inner.name);
            for q in inner.sched.q_ticks.iter() {
                let _ = write!(line, " {}", q);
            }
            let _ = write!(line, " {} {}", inner.sched.tickets, inner.sched.static_priority);
            log::info!("{}", line);
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}
