//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程控制块
//!
//! 对应 xv6 的 struct proc。字段分为两部分：
//! - [`ProcInner`]: 受进程锁保护（state、channel、killed、xstate、pid、name 以及调度统计）
//! - [`ProcData`]: 进程私有，只由进程自己访问，或在持有进程锁且进程不在
//!   运行时由内核访问（创建、回收）
//!
//! 父进程关系不在这里，而在进程表的 wait 锁下维护。

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::arch::context::{Context, Handoff};
use crate::arch::cpu::Cpu;
use crate::config::{MLFQ_LEVELS, NOFILE};
use crate::fs::{File, Inode};
use crate::mm::{PhysAddr, UserSpace};
use crate::signal::AlarmState;
use crate::sync::{SpinLock, SpinLockGuard};

/// 进程 ID
pub type Pid = u32;

/// 进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcState {
    /// 空闲槽位
    #[default]
    Unused,
    /// 已占用，正在初始化
    Allocated,
    /// 等待在某个通道上
    Sleeping,
    /// 可运行
    Runnable,
    /// 正在某个 CPU 上运行
    Running,
    /// 已退出，等待父进程回收
    Zombie,
}

impl ProcState {
    /// procdump 使用的定宽名称
    pub fn name(&self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Allocated => "used  ",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }
}

/// 睡眠通道
///
/// 只做相等比较，不携带数据。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// 某个进程（wait 在自己的槽位上睡眠）
    Proc(usize),
    /// 时钟滴答
    Ticks,
    /// 任意内核对象
    Addr(usize),
}

/// 进程表句柄：槽位 + 代数
///
/// 槽位每次被重新占用时代数加一，过期的句柄可以被识别出来。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcHandle {
    pub slot: usize,
    pub generation: u32,
}

/// 调度统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedStats {
    /// 彩票数 (lottery)
    pub tickets: u32,
    /// 静态优先级 (pbs)，数值越小优先级越高
    pub static_priority: u32,
    /// 最近一次调度以来的运行滴答
    pub run_ticks: u64,
    /// 最近一次调度以来的睡眠滴答
    pub sleep_ticks: u64,
    pub ready_ticks: u64,
    /// 被调度次数
    pub num_scheduled: u64,
    /// 进入可调度状态的时刻
    pub start_ticks: u64,
    /// 累计运行滴答
    pub rtime: u64,
    /// 创建时刻
    pub ctime: u64,
    /// 退出时刻
    pub etime: u64,
    /// 当前 MLFQ 层
    pub curr_q: usize,
    /// 每层累计运行滴答
    pub q_ticks: [u64; MLFQ_LEVELS],
    /// 自上次换队以来的运行滴答
    pub cq_rticks: u64,
    /// 进入当前队列的时刻
    pub q_enter_time: u64,
    /// 是否在某个 MLFQ 队列中
    pub queued: bool,
}

/// 受进程锁保护的字段
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcInner {
    pub state: ProcState,
    /// 非空表示正在该通道上睡眠
    pub channel: Option<Channel>,
    pub killed: bool,
    /// 退出状态，由父进程的 wait 取走
    pub xstate: i32,
    pub pid: Pid,
    /// 进程名（procdump 在其他 CPU 上读取）
    pub name: String,
    pub sched: SchedStats,
}

/// 进程锁守卫
pub type ProcGuard<'a> = SpinLockGuard<'a, ProcInner>;

/// 进程私有数据
pub struct ProcData {
    /// 内核栈页（启动时分配，槽位复用时保留）
    pub kstack: PhysAddr,
    /// 用户内存大小（字节）
    pub sz: usize,
    pub pagetable: Option<UserSpace>,
    /// 陷阱帧页
    pub trapframe: Option<PhysAddr>,
    pub context: Context,
    pub ofile: [Option<File>; NOFILE],
    pub cwd: Option<Arc<Inode>>,
    /// 系统调用跟踪掩码
    pub trace_mask: u32,
    pub alarm: AlarmState,
}

impl ProcData {
    fn new(kstack: PhysAddr) -> Self {
        Self {
            kstack,
            sz: 0,
            pagetable: None,
            trapframe: None,
            context: Context::zero(),
            ofile: core::array::from_fn(|_| None),
            cwd: None,
            trace_mask: 0,
            alarm: AlarmState::default(),
        }
    }

    /// 清空所有字段，只保留内核栈
    pub(crate) fn reset(&mut self) {
        *self = ProcData::new(self.kstack);
    }

    pub fn space(&self) -> &UserSpace {
        match self.pagetable.as_ref() {
            Some(pt) => pt,
            None => panic!("proc: no address space"),
        }
    }

    pub fn space_mut(&mut self) -> &mut UserSpace {
        match self.pagetable.as_mut() {
            Some(pt) => pt,
            None => panic!("proc: no address space"),
        }
    }

    pub fn trapframe_pa(&self) -> PhysAddr {
        match self.trapframe {
            Some(pa) => pa,
            None => panic!("proc: no trapframe"),
        }
    }
}

/// 进程表槽位
pub struct Proc {
    slot: usize,
    generation: AtomicU32,
    inner: SpinLock<ProcInner>,
    data: UnsafeCell<ProcData>,
    /// 进程的切换点：调度器把执行权连同进程锁交到这里
    resume: Handoff<ProcGuard<'static>>,
    /// 进程的宿主线程，停机时回收
    thread: spin::Mutex<Option<JoinHandle<()>>>,
}

// ProcData 的访问规则见 data_mut()
unsafe impl Sync for Proc {}

impl Proc {
    pub fn new(slot: usize, kstack: PhysAddr) -> Self {
        Self {
            slot,
            generation: AtomicU32::new(0),
            inner: SpinLock::new(ProcInner::default(), "proc"),
            data: UnsafeCell::new(ProcData::new(kstack)),
            resume: Handoff::new(),
            thread: spin::Mutex::new(None),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    /// 槽位被重新占用（持有进程锁）
    pub(crate) fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn handle(&self) -> ProcHandle {
        ProcHandle {
            slot: self.slot,
            generation: self.generation(),
        }
    }

    /// 获取进程锁
    pub fn lock<'a>(&'a self, cpu: &'a Cpu) -> ProcGuard<'a> {
        self.inner.lock(cpu)
    }

    pub fn holding(&self, cpu: &Cpu) -> bool {
        self.inner.holding(cpu)
    }

    /// 进程私有数据
    ///
    /// # Safety
    ///
    /// 调用者必须是正在运行的该进程本身，或者持有进程锁且进程不在
    /// 任何 CPU 上运行（Allocated / Zombie），并且同一时刻没有其他
    /// 可变引用。
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut ProcData {
        &mut *self.data.get()
    }

    /// 只读访问私有数据，安全条件同 [`Proc::data_mut`]
    pub(crate) unsafe fn data(&self) -> &ProcData {
        &*self.data.get()
    }

    pub(crate) fn resume_point(&self) -> &Handoff<ProcGuard<'static>> {
        &self.resume
    }

    /// 记录新的宿主线程；槽位上一个线程已经最后一次切换出去，句柄直接丢弃
    pub(crate) fn set_thread(&self, handle: JoinHandle<()>) {
        *self.thread.lock() = Some(handle);
    }

    pub(crate) fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }
}
