//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 多核启动
//!
//! 每个 CPU 一个宿主线程（hart-N），运行该 CPU 的调度循环。
//! 可选的定时器线程周期性地向所有 CPU 发出时钟中断。

use core::sync::atomic::{AtomicBool, Ordering};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::kernel::Kernel;

/// 运行中的模拟机器
pub struct Machine {
    kernel: &'static Kernel,
    harts: Vec<JoinHandle<()>>,
    timer: Option<(Arc<AtomicBool>, JoinHandle<()>)>,
}

impl Machine {
    /// 启动所有 CPU 的调度循环
    pub fn start(kernel: &'static Kernel) -> io::Result<Self> {
        let mut harts = Vec::with_capacity(kernel.ncpu());
        for cpu in kernel.cpus() {
            let handle = thread::Builder::new()
                .name(format!("hart-{}", cpu.id()))
                .spawn(move || kernel.run_scheduler(cpu))?;
            harts.push(handle);
        }
        log::info!("smp: {} harts started", harts.len());
        Ok(Self {
            kernel,
            harts,
            timer: None,
        })
    }

    pub fn kernel(&self) -> &'static Kernel {
        self.kernel
    }

    /// 启动定时器，每 period 向所有 CPU 发出一次时钟中断
    pub fn start_timer(&mut self, period: Duration) -> io::Result<()> {
        if self.timer.is_some() {
            return Ok(());
        }
        let stop = Arc::new(AtomicBool::new(false));
        let kernel = self.kernel;
        let stop2 = stop.clone();
        let handle = thread::Builder::new().name("timer".into()).spawn(move || {
            while !stop2.load(Ordering::Acquire) {
                thread::sleep(period);
                for cpu in kernel.cpus() {
                    cpu.raise_timer();
                }
            }
        })?;
        self.timer = Some((stop, handle));
        Ok(())
    }

    /// 停机并等待所有调度循环和进程线程退出
    ///
    /// 正在运行的进程要到下一次让出 CPU 时调度循环才能退出，
    /// 因此定时器在调度循环全部退出之后才停止。之后作废每个进程的
    /// 切换点，停在上面的进程线程从进程体中退出。
    ///
    /// 有线程因 panic 退出时返回这些线程的名字。
    pub fn shutdown(mut self) -> Result<(), Vec<String>> {
        self.kernel.halt();
        let mut panicked = Vec::new();
        for hart in self.harts.drain(..) {
            let name = thread_name(&hart);
            if hart.join().is_err() {
                log::error!("smp: {} panicked", name);
                panicked.push(name);
            }
        }
        if let Some((stop, timer)) = self.timer.take() {
            stop.store(true, Ordering::Release);
            let _ = timer.join();
        }

        for proc in self.kernel.procs().iter() {
            proc.resume_point().poison();
        }
        for proc in self.kernel.procs().iter() {
            let Some(handle) = proc.take_thread() else {
                continue;
            };
            let name = thread_name(&handle);
            if handle.join().is_err() {
                log::error!("smp: {} panicked", name);
                panicked.push(name);
            }
        }

        log::info!("smp: machine halted at tick {}", self.kernel.ticks());
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(panicked)
        }
    }
}

fn thread_name(handle: &JoinHandle<()>) -> String {
    handle.thread().name().unwrap_or("<unnamed>").to_string()
}
