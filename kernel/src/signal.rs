//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 用户态闹钟 (sigalarm / sigreturn)
//!
//! 进程登记一个间隔和处理函数地址后，每次在用户态收到时钟中断时
//! 累计一个滴答；累计到间隔时把陷阱帧备份到一个新页帧，再把返回地址
//! 改成处理函数。处理函数结束时调用 sigreturn，从备份恢复陷阱帧。
//!
//! 处理函数执行期间闹钟处于解除状态，不会重入。

use crate::arch::trap::TrapFrame;
use crate::errno::{Errno, KResult};
use crate::mm::PhysAddr;
use crate::process::{Sysno, UserProc};

/// 每进程的闹钟状态（进程私有，只由进程自己访问）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmState {
    /// 触发间隔（滴答），0 表示不触发
    pub interval: u64,
    /// 处理函数的用户地址
    pub handler: usize,
    /// 自上次触发以来的滴答
    pub elapsed: u64,
    /// 是否允许触发
    pub armed: bool,
    /// 触发时保存的陷阱帧
    pub backup: Option<PhysAddr>,
}

impl UserProc {
    /// 登记闹钟
    pub fn sigalarm(&mut self, interval: u64, handler: usize) -> KResult<()> {
        let alarm = &mut self.data_mut().alarm;
        alarm.interval = interval;
        alarm.handler = handler;
        alarm.armed = true;
        self.syscall_ret(Sysno::Sigalarm, Ok(()))
    }

    /// 从闹钟处理函数返回，恢复触发前的陷阱帧
    ///
    /// 返回恢复后的 a0，使被打断的系统调用返回值保持不变。
    pub fn sigreturn(&mut self) -> KResult<usize> {
        let mem = self.kernel().mem();
        let tf_pa = self.data().trapframe_pa();
        let Some(backup) = self.data_mut().alarm.backup.take() else {
            return self.syscall_ret(Sysno::Sigreturn, Err(Errno::InvalidArgument));
        };

        // 内核相关字段以当前值为准：恢复后可能在另一个 CPU 上返回用户态
        let current = mem.with_page(tf_pa, |page| TrapFrame::load(page));
        let mut saved = mem.with_page(backup, |page| TrapFrame::load(page));
        saved.kernel_satp = current.kernel_satp;
        saved.kernel_sp = current.kernel_sp;
        saved.kernel_trap = current.kernel_trap;
        saved.kernel_hartid = current.kernel_hartid;
        mem.with_page(tf_pa, |page| saved.store(page));
        mem.free(backup);

        let alarm = &mut self.data_mut().alarm;
        alarm.armed = true;
        alarm.elapsed = 0;
        if alarm.interval == 0 && alarm.handler == 0 {
            alarm.armed = false;
        }

        self.syscall_ret(Sysno::Sigreturn, Ok(saved.a0))
    }

    /// 用户态时钟中断时调用
    pub(crate) fn alarm_tick(&mut self) {
        let mem = self.kernel().mem();
        let tf_pa = self.data().trapframe_pa();
        let pid = self.pid();
        let alarm = &mut self.data_mut().alarm;
        if !alarm.armed {
            return;
        }
        alarm.elapsed += 1;
        if alarm.interval == 0 || alarm.elapsed < alarm.interval {
            return;
        }

        let Some(backup) = mem.allocate() else {
            log::debug!("pid {}: no frame for alarm backup, delivery skipped", pid);
            return;
        };
        mem.copy_page(tf_pa, backup);
        let handler = alarm.handler;
        mem.with_page(tf_pa, |page| {
            let mut tf = TrapFrame::load(page);
            tf.epc = handler;
            tf.store(page);
        });

        alarm.backup = Some(backup);
        alarm.armed = false;
        alarm.elapsed = 0;
    }
}
