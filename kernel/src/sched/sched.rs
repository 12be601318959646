//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器核心
//!
//! 对应 xv6 kernel/proc.c 中的 scheduler / sched / yield / sleep / wakeup
//! 以及 kernel/trap.c 中的 devintr / clockintr。
//!
//! 每个 CPU 运行一个调度循环：向当前策略要一个可运行进程（连同它的锁），
//! 标记为 Running，然后切换过去。进程让出 CPU 时仍持有自己的锁，
//! 切换回调度循环后由调度循环释放。
//!
//! 进程锁保证了两件事：
//! - 同一进程不会同时在两个 CPU 上运行
//! - sleep 检查条件与进入睡眠之间不会丢失唤醒

use core::sync::atomic::Ordering;
use std::panic;
use std::thread;
use std::time::Duration;

use crate::arch::cpu::Cpu;
use crate::errno::{Errno, KResult};
use crate::kernel::Kernel;
use crate::process::fork::Halted;
use crate::process::{Channel, Pid, ProcGuard, ProcState, Sysno, UserProc};
use crate::sync::SpinLockGuard;

/// 优先级上限
pub const MAX_PRIORITY: u32 = 100;

/// 没有可运行进程时的等待 (wfi)
const IDLE_WAIT: Duration = Duration::from_micros(50);

/// 用户态陷入入口地址（写入陷阱帧的 kernel_trap）
pub fn usertrap_entry() -> usize {
    UserProc::usertrap as fn(&mut UserProc) as usize
}

impl Kernel {
    /// 每个 CPU 的调度循环，直到停机
    pub fn run_scheduler(&'static self, cpu: &'static Cpu) {
        cpu.set_current(None);
        log::info!("cpu {}: scheduler started ({})", cpu.id(), self.policy());

        while !self.is_halted() {
            // 开中断，让所有进程都在睡眠时也能收到时钟中断
            cpu.intr_on();
            self.devintr(cpu);
            cpu.intr_off();

            match self.scheduler().select_next(self, cpu) {
                Some((slot, guard)) => self.dispatch(cpu, slot, guard),
                None => thread::sleep(IDLE_WAIT),
            }
        }
        log::info!("cpu {}: scheduler stopped", cpu.id());
    }

    /// 切换到选中的进程，进程让出 CPU 后返回
    fn dispatch(&'static self, cpu: &'static Cpu, slot: usize, mut guard: ProcGuard<'static>) {
        let proc = self.procs().get(slot);
        if guard.state != ProcState::Runnable {
            panic!("scheduler: pid {} not runnable", guard.pid);
        }

        self.scheduler().on_dispatch(&mut guard, self.ticks());
        guard.state = ProcState::Running;
        cpu.set_current(Some(slot));

        #[cfg(feature = "debug_log")]
        log::trace!("cpu {}: switch to pid {}", cpu.id(), guard.pid);

        // swtch(&c->context, &p->context)
        let pid = guard.pid;
        proc.resume_point().give(guard);
        let Some(mut guard) = cpu.sched_context().take() else {
            // 进程线程 panic，整台机器已经停机
            log::error!("cpu {}: pid {} never switched back", cpu.id(), pid);
            panic!("scheduler: pid {} panicked", pid);
        };

        // 进程已经改变了自己的状态
        cpu.set_current(None);
        self.scheduler().on_return(proc.handle(), &mut guard, self.ticks());

        #[cfg(feature = "debug_log")]
        log::trace!("cpu {}: back from pid {} ({})", cpu.id(), guard.pid, guard.state.name().trim());
    }

    /// 处理挂起的设备中断，返回是否是时钟中断
    ///
    /// 只有 CPU 0 推进全局滴答。
    pub fn devintr(&self, cpu: &Cpu) -> bool {
        if !cpu.take_timer() {
            return false;
        }
        if cpu.id() == 0 {
            self.clock_intr(cpu);
        }
        true
    }

    /// 时钟中断：推进滴答，唤醒等待滴答的进程，再做滴答统计
    pub fn clock_intr(&self, cpu: &Cpu) {
        {
            let _guard = self.tickslock().lock(cpu);
            self.ticks.fetch_add(1, Ordering::AcqRel);
            self.wakeup(cpu, Channel::Ticks);
        }
        self.update_ticks(cpu);
    }

    /// 滴答统计
    pub fn update_ticks(&self, cpu: &Cpu) {
        for proc in self.procs().iter() {
            let mut inner = proc.lock(cpu);
            let state = inner.state;
            let stats = &mut inner.sched;
            match state {
                ProcState::Running => {
                    stats.run_ticks += 1;
                    stats.rtime += 1;
                    stats.cq_rticks += 1;
                    stats.q_ticks[stats.curr_q] += 1;
                }
                ProcState::Sleeping => stats.sleep_ticks += 1,
                ProcState::Runnable => stats.ready_ticks += 1,
                _ => {}
            }
        }
        self.scheduler().on_tick(self, cpu);
    }

    /// 唤醒在 chan 上睡眠的所有进程
    ///
    /// 调用者不能持有任何进程锁。当前 CPU 上正在运行的进程不在此列。
    pub fn wakeup(&self, cpu: &Cpu, chan: Channel) {
        let current = cpu.current();
        for proc in self.procs().iter() {
            if current == Some(proc.slot()) {
                continue;
            }
            let mut inner = proc.lock(cpu);
            if inner.state == ProcState::Sleeping && inner.channel == Some(chan) {
                inner.state = ProcState::Runnable;
            }
        }
    }

    /// 杀死进程
    ///
    /// 只设置标志；进程下一次从内核返回用户态时退出。睡眠中的进程
    /// 被唤醒，以便尽快看到标志。
    pub fn kill(&self, cpu: &Cpu, pid: Pid) -> KResult<()> {
        for proc in self.procs().iter() {
            let mut inner = proc.lock(cpu);
            if inner.state != ProcState::Unused && inner.pid == pid {
                inner.killed = true;
                if inner.state == ProcState::Sleeping {
                    inner.state = ProcState::Runnable;
                }
                log::debug!("kill: pid {}", pid);
                return Ok(());
            }
        }
        Err(Errno::NoSuchProcess)
    }

    /// 设置静态优先级，返回原来的值
    ///
    /// 同时清零运行与睡眠滴答，使动态优先级重新从静态优先级开始计算。
    pub fn set_priority(&self, cpu: &Cpu, pid: Pid, priority: u32) -> KResult<u32> {
        if priority > MAX_PRIORITY {
            return Err(Errno::InvalidArgument);
        }
        for proc in self.procs().iter() {
            let mut inner = proc.lock(cpu);
            if inner.state != ProcState::Unused && inner.pid == pid {
                let old = inner.sched.static_priority;
                inner.sched.static_priority = priority;
                inner.sched.run_ticks = 0;
                inner.sched.sleep_ticks = 0;
                return Ok(old);
            }
        }
        Err(Errno::NoSuchProcess)
    }
}

impl UserProc {
    /// 切换回调度循环 (sched)
    ///
    /// 调用者只能持有自己的进程锁，并且已经改变了进程状态。
    /// 返回时进程再次被调度，仍持有自己的进程锁，可能已经换了 CPU。
    fn sched(&mut self, guard: ProcGuard<'static>) -> ProcGuard<'static> {
        let cpu = self.cpu();
        self.check_sched(cpu, &guard);

        // intena 属于这个内核线程而不是这个 CPU
        let intena = cpu.intena();
        cpu.sched_context().give(guard);
        let Some(guard) = self.proc().resume_point().take() else {
            // 停机，不会再被调度
            panic::resume_unwind(Box::new(Halted));
        };

        let cpu = guard.cpu();
        self.set_cpu(cpu);
        cpu.set_intena(intena);
        guard
    }

    /// 最后一次切换（exit），不会再被调度
    pub(crate) fn sched_final(&mut self, guard: ProcGuard<'static>) {
        let cpu = self.cpu();
        self.check_sched(cpu, &guard);
        cpu.sched_context().give(guard);
    }

    fn check_sched(&self, cpu: &Cpu, guard: &ProcGuard<'static>) {
        if !self.proc().holding(cpu) {
            panic!("sched p->lock");
        }
        if cpu.noff() != 1 {
            log::error!("pid {}: sched with {} locks held", self.pid(), cpu.noff());
            panic!("sched locks");
        }
        if guard.state == ProcState::Running {
            panic!("sched running");
        }
        if cpu.intr_get() {
            panic!("sched interruptible");
        }
    }

    /// 让出 CPU，保持可运行
    pub fn yield_now(&mut self) {
        let mut guard = self.proc().lock(self.cpu());
        guard.state = ProcState::Runnable;
        let guard = self.sched(guard);
        drop(guard);
    }

    /// 在 chan 上睡眠，释放 lk，被唤醒后重新获取 lk
    ///
    /// 先获取进程锁再释放 lk：wakeup 需要进程锁，因此在进程真正
    /// 进入睡眠之前不会错过唤醒。
    pub fn sleep<T>(
        &mut self,
        chan: Channel,
        lk: SpinLockGuard<'static, T>,
    ) -> SpinLockGuard<'static, T> {
        let mut guard = self.proc().lock(self.cpu());
        let lk = crate::sync::SpinLock::unlock(lk);

        guard.channel = Some(chan);
        guard.state = ProcState::Sleeping;

        let mut guard = self.sched(guard);

        guard.channel = None;
        drop(guard);

        lk.lock(self.cpu())
    }

    /// 唤醒在 chan 上睡眠的进程
    pub fn wakeup(&self, chan: Channel) {
        self.kernel().wakeup(self.cpu(), chan);
    }

    /// 设置进程的静态优先级，返回原来的值
    ///
    /// 新优先级比原来高（数值更小）时让出 CPU，使调度器重新选择。
    pub fn set_priority(&mut self, priority: u32, pid: Pid) -> KResult<u32> {
        let ret = self.kernel().set_priority(self.cpu(), pid, priority);
        let ret = self.syscall_ret(Sysno::Setpriority, ret);
        if let Ok(old) = ret {
            if priority < old {
                self.yield_now();
            }
        }
        ret
    }
}
