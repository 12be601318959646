//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 停机测试
//!
//! 进程 panic 时整台机器停机；shutdown 回收所有进程线程

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

use super::{boot, TICK, TIMEOUT};
use crate::config::SchedPolicy;
use crate::Machine;

#[test]
fn test_process_panic_halts_machine() {
    println!("test: 1. Testing panic in a process...");
    let kernel = boot(SchedPolicy::Rr, 1);
    kernel
        .user_init(|up| {
            up.fork(|_| -> i32 { panic!("user fault") }).unwrap();
            loop {
                if up.wait(0).is_err() {
                    let _ = up.sleep_ticks(10);
                }
            }
        })
        .unwrap();

    let mut machine = Machine::start(kernel).unwrap();
    machine.start_timer(TICK).unwrap();
    let start = Instant::now();
    while !kernel.is_halted() {
        assert!(start.elapsed() < TIMEOUT, "machine kept running");
        thread::sleep(TICK);
    }

    // CPU 0 和出错的进程线程都报告 panic，init 正常退出
    let mut panicked = machine.shutdown().unwrap_err();
    panicked.sort();
    println!("test:    panicked threads = {:?}", panicked);
    assert_eq!(panicked.len(), 2);
    assert_eq!(panicked[0], "hart-0");
    assert!(panicked[1].starts_with("pid-"));
    println!("test:    SUCCESS - machine halted");
}

#[test]
fn test_shutdown_releases_parked_processes() {
    println!("test: 2. Testing shutdown with live processes...");
    let kernel = boot(SchedPolicy::Rr, 2);
    let token = Arc::new(());
    let held = token.clone();
    let (tx, rx) = mpsc::channel();
    kernel
        .user_init(move |up| {
            let sleeper = held.clone();
            up.fork(move |up| {
                let _keep = sleeper;
                loop {
                    let _ = up.sleep_ticks(1_000_000);
                }
            })
            .unwrap();
            let _ = tx.send(());
            let _keep = held;
            loop {
                if up.wait(0).is_err() {
                    let _ = up.sleep_ticks(10);
                }
            }
        })
        .unwrap();

    let mut machine = Machine::start(kernel).unwrap();
    machine.start_timer(TICK).unwrap();
    rx.recv_timeout(TIMEOUT).expect("init did not report");
    assert_eq!(machine.shutdown(), Ok(()));

    // 两个进程体都已经退出并释放了捕获的值
    assert_eq!(Arc::strong_count(&token), 1);
    assert!(kernel.procs().iter().all(|proc| proc.take_thread().is_none()));
    println!("test:    SUCCESS - process threads joined");
}
