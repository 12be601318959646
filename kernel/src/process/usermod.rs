//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户态接口
//!
//! [`UserProc`] 是进程体看到的内核：每个方法对应一个系统调用或一次
//! 陷入。进程体运行在自己的宿主线程上，通过 [`UserProc::usertrap`]
//! 模拟“从用户态陷入内核再返回”，时钟中断只在这个检查点上生效。

use std::sync::Arc;

use crate::arch::cpu::Cpu;
use crate::arch::trap::{TrapFrame, TRAPFRAME};
use crate::config::PAGE_SIZE;
use crate::errno::{Errno, KResult};
use crate::fs::{File, Inode};
use crate::kernel::Kernel;
use crate::mm::PteFlags;
use crate::sched::sched::usertrap_entry;

use super::task::{Channel, Pid, Proc, ProcData};

/// 第一个用户进程的代码 (user/initcode.S)
///
/// exec("/init", argv); for(;;) exit();
pub const INITCODE: &[u8] = &[
    0x17, 0x05, 0x00, 0x00, 0x13, 0x05, 0x45, 0x02, 0x97, 0x05, 0x00, 0x00, 0x93, 0x85, 0x35,
    0x02, 0x93, 0x08, 0x70, 0x00, 0x73, 0x00, 0x00, 0x00, 0x93, 0x08, 0x20, 0x00, 0x73, 0x00,
    0x00, 0x00, 0xef, 0xf0, 0x9f, 0xff, 0x2f, 0x69, 0x6e, 0x69, 0x74, 0x00, 0x00, 0x24, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// 系统调用号
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sysno {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Pipe = 4,
    Read = 5,
    Kill = 6,
    Exec = 7,
    Fstat = 8,
    Chdir = 9,
    Dup = 10,
    Getpid = 11,
    Sbrk = 12,
    Sleep = 13,
    Uptime = 14,
    Open = 15,
    Write = 16,
    Mknod = 17,
    Unlink = 18,
    Link = 19,
    Mkdir = 20,
    Close = 21,
    Trace = 22,
    Sigalarm = 23,
    Sigreturn = 24,
    Settickets = 25,
    Waitx = 26,
    Setpriority = 27,
}

impl Sysno {
    pub fn name(&self) -> &'static str {
        match self {
            Sysno::Fork => "fork",
            Sysno::Exit => "exit",
            Sysno::Wait => "wait",
            Sysno::Pipe => "pipe",
            Sysno::Read => "read",
            Sysno::Kill => "kill",
            Sysno::Exec => "exec",
            Sysno::Fstat => "fstat",
            Sysno::Chdir => "chdir",
            Sysno::Dup => "dup",
            Sysno::Getpid => "getpid",
            Sysno::Sbrk => "sbrk",
            Sysno::Sleep => "sleep",
            Sysno::Uptime => "uptime",
            Sysno::Open => "open",
            Sysno::Write => "write",
            Sysno::Mknod => "mknod",
            Sysno::Unlink => "unlink",
            Sysno::Link => "link",
            Sysno::Mkdir => "mkdir",
            Sysno::Close => "close",
            Sysno::Trace => "trace",
            Sysno::Sigalarm => "sigalarm",
            Sysno::Sigreturn => "sigreturn",
            Sysno::Settickets => "settickets",
            Sysno::Waitx => "waitx",
            Sysno::Setpriority => "setpriority",
        }
    }

    /// trace 掩码中的位
    pub fn mask(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// 系统调用返回值在 a0 中的形式
pub trait SyscallRet {
    fn raw(&self) -> i64;
}

impl SyscallRet for () {
    fn raw(&self) -> i64 {
        0
    }
}

impl SyscallRet for usize {
    fn raw(&self) -> i64 {
        *self as i64
    }
}

impl SyscallRet for u32 {
    fn raw(&self) -> i64 {
        *self as i64
    }
}

impl SyscallRet for u64 {
    fn raw(&self) -> i64 {
        *self as i64
    }
}

/// 进程在用户态看到的内核
pub struct UserProc {
    kernel: &'static Kernel,
    slot: usize,
    pid: Pid,
    /// 当前所在的 CPU，每次 sched 返回后更新
    cpu: &'static Cpu,
}

impl UserProc {
    pub(crate) fn new(kernel: &'static Kernel, slot: usize, cpu: &'static Cpu) -> Self {
        let pid = kernel.procs().get(slot).lock(cpu).pid;
        Self {
            kernel,
            slot,
            pid,
            cpu,
        }
    }

    pub fn kernel(&self) -> &'static Kernel {
        self.kernel
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// getpid
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn cpu(&self) -> &'static Cpu {
        self.cpu
    }

    pub(crate) fn set_cpu(&mut self, cpu: &'static Cpu) {
        self.cpu = cpu;
    }

    pub fn proc(&self) -> &'static Proc {
        self.kernel.procs().get(self.slot)
    }

    pub(crate) fn data(&self) -> &ProcData {
        // SAFETY: 进程私有数据只由正在运行的进程本身访问
        unsafe { self.proc().data() }
    }

    pub(crate) fn data_mut(&mut self) -> &mut ProcData {
        // SAFETY: 同上
        unsafe { self.proc().data_mut() }
    }

    /// 记录被跟踪的系统调用
    pub(crate) fn syscall_ret<T: SyscallRet>(&self, sysno: Sysno, ret: KResult<T>) -> KResult<T> {
        if self.data().trace_mask & sysno.mask() != 0 {
            let raw = match &ret {
                Ok(value) => value.raw(),
                Err(e) => e.as_neg_i32() as i64,
            };
            log::debug!("{}: syscall {} -> {}", self.pid, sysno.name(), raw);
        }
        ret
    }

    pub fn killed(&self) -> bool {
        self.proc().lock(self.cpu).killed
    }

    pub fn set_killed(&self) {
        self.proc().lock(self.cpu).killed = true;
    }

    // ============================================================
    // 陷入与返回
    // ============================================================

    /// 用户态陷入检查点 (usertrap)
    ///
    /// 在这里交付挂起的时钟中断：先检查 killed，再交付闹钟并让出 CPU，
    /// 最后返回用户态。被杀死的进程不会从这里返回。
    pub fn usertrap(&mut self) {
        let timer = self.kernel.devintr(self.cpu);
        self.cpu.intr_off();

        if self.killed() {
            self.exit(-1);
        }
        if timer {
            self.alarm_tick();
            self.yield_now();
        }
        self.usertrapret();
    }

    /// 返回用户态 (usertrapret)
    ///
    /// 填写下一次陷入需要的内核字段，然后开中断。
    pub(crate) fn usertrapret(&mut self) {
        self.cpu.intr_off();

        let data = self.data();
        let kernel_satp = data.space().root().as_usize();
        let kernel_sp = data.kstack.as_usize() + PAGE_SIZE;
        let hartid = self.cpu.id();
        self.kernel.mem().with_page(data.trapframe_pa(), |page| {
            let mut tf = TrapFrame::load(page);
            tf.kernel_satp = kernel_satp;
            tf.kernel_sp = kernel_sp;
            tf.kernel_trap = usertrap_entry();
            tf.kernel_hartid = hartid;
            tf.store(page);
        });

        self.cpu.intr_on();
    }

    /// 当前陷阱帧
    pub fn trapframe(&self) -> TrapFrame {
        self.kernel
            .mem()
            .with_page(self.data().trapframe_pa(), |page| TrapFrame::load(page))
    }

    pub fn set_trapframe(&mut self, tf: &TrapFrame) {
        self.kernel
            .mem()
            .with_page(self.data().trapframe_pa(), |page| tf.store(page));
    }

    // ============================================================
    // 用户内存
    // ============================================================

    /// 用户地址空间大小
    pub fn size(&self) -> usize {
        self.data().sz
    }

    /// 扩展或收缩用户内存 (sbrk)，返回原来的大小
    pub fn grow(&mut self, n: isize) -> KResult<usize> {
        let mem = self.kernel.mem();
        let data = self.data_mut();
        let old = data.sz;
        let ret = if n >= 0 {
            match old.checked_add(n as usize) {
                Some(new) if new <= TRAPFRAME => data
                    .space_mut()
                    .grow(mem, old, new, PteFlags::W)
                    .map(|sz| {
                        data.sz = sz;
                        old
                    }),
                _ => Err(Errno::OutOfMemory),
            }
        } else {
            match old.checked_sub(n.unsigned_abs()) {
                Some(new) => {
                    data.sz = data.space_mut().shrink(mem, old, new);
                    Ok(old)
                }
                None => Err(Errno::InvalidArgument),
            }
        };
        self.syscall_ret(Sysno::Sbrk, ret)
    }

    pub fn copy_out(&self, dst: usize, src: &[u8]) -> KResult<()> {
        self.data().space().copy_out(self.kernel.mem(), dst, src)
    }

    pub fn copy_in(&self, dst: &mut [u8], src: usize) -> KResult<()> {
        self.data().space().copy_in(self.kernel.mem(), dst, src)
    }

    // ============================================================
    // 文件
    // ============================================================

    /// 放入最小的空闲描述符
    pub fn install_file(&mut self, file: File) -> KResult<usize> {
        let ofile = &mut self.data_mut().ofile;
        match ofile.iter().position(Option::is_none) {
            Some(fd) => {
                ofile[fd] = Some(file);
                Ok(fd)
            }
            None => {
                file.close();
                Err(Errno::TooManyOpenFiles)
            }
        }
    }

    /// 打开已存在的路径
    pub fn open(&mut self, path: &str, readable: bool, writable: bool) -> KResult<usize> {
        let ret = match self.kernel.vfs().namei(path) {
            Some(ip) => self.install_file(File::open(ip, readable, writable)),
            None => Err(Errno::NoSuchFileOrDirectory),
        };
        self.syscall_ret(Sysno::Open, ret)
    }

    pub fn file(&self, fd: usize) -> Option<&File> {
        self.data().ofile.get(fd)?.as_ref()
    }

    pub fn close(&mut self, fd: usize) -> KResult<()> {
        let ret = match self.data_mut().ofile.get_mut(fd).and_then(Option::take) {
            Some(file) => {
                file.close();
                Ok(())
            }
            None => Err(Errno::BadFileNumber),
        };
        self.syscall_ret(Sysno::Close, ret)
    }

    /// 打开的描述符数
    pub fn open_files(&self) -> usize {
        self.data().ofile.iter().flatten().count()
    }

    pub fn cwd(&self) -> Option<&Arc<Inode>> {
        self.data().cwd.as_ref()
    }

    pub fn name(&self) -> String {
        self.proc().lock(self.cpu).name.clone()
    }

    pub fn set_name(&mut self, name: &str) {
        self.proc().lock(self.cpu).name = name.into();
    }

    // ============================================================
    // 其他系统调用
    // ============================================================

    pub fn getpid(&self) -> Pid {
        let pid = self.pid;
        // getpid 不会失败
        let _ = self.syscall_ret(Sysno::Getpid, Ok(pid));
        pid
    }

    /// 设置系统调用跟踪掩码，由 fork 继承
    pub fn trace(&mut self, mask: u32) -> KResult<()> {
        self.data_mut().trace_mask = mask;
        self.syscall_ret(Sysno::Trace, Ok(()))
    }

    /// 设置彩票数
    pub fn settickets(&mut self, tickets: u32) -> KResult<()> {
        self.proc().lock(self.cpu).sched.tickets = tickets;
        self.syscall_ret(Sysno::Settickets, Ok(()))
    }

    pub fn kill(&self, pid: Pid) -> KResult<()> {
        let ret = self.kernel.kill(self.cpu, pid);
        self.syscall_ret(Sysno::Kill, ret)
    }

    /// 自系统启动以来的滴答数
    pub fn uptime(&self) -> u64 {
        let ticks = self.kernel.ticks();
        let _ = self.syscall_ret(Sysno::Uptime, Ok(ticks));
        ticks
    }

    /// 睡眠 n 个滴答，被杀死时提前返回
    pub fn sleep_ticks(&mut self, n: u64) -> KResult<()> {
        let kernel = self.kernel;
        let mut ticks = kernel.tickslock().lock(self.cpu);
        let ticks0 = kernel.ticks();
        while kernel.ticks() - ticks0 < n {
            if self.killed() {
                drop(ticks);
                return self.syscall_ret(Sysno::Sleep, Err(Errno::InterruptedSystemCall));
            }
            ticks = self.sleep(Channel::Ticks, ticks);
        }
        drop(ticks);
        self.syscall_ret(Sysno::Sleep, Ok(()))
    }
}
