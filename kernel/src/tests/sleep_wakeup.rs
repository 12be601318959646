//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! sleep / wakeup 测试

use std::sync::mpsc;

use super::{boot, run_init, runnable, with_inner, TICK, TIMEOUT};
use crate::config::SchedPolicy;
use crate::process::{Channel, ProcState};
use crate::sync::SpinLock;
use crate::Machine;

#[test]
fn test_wakeup_matches_channel() {
    println!("test: 1. Testing wakeup channel matching...");
    let kernel = boot(SchedPolicy::Rr, 1);
    let (a, _) = runnable(kernel);
    let (b, _) = runnable(kernel);
    for (slot, addr) in [(a, 1), (b, 2)] {
        with_inner(kernel, slot, |inner| {
            inner.state = ProcState::Sleeping;
            inner.channel = Some(Channel::Addr(addr));
        });
    }

    kernel.wakeup(kernel.boot_cpu(), Channel::Addr(1));
    with_inner(kernel, a, |inner| assert_eq!(inner.state, ProcState::Runnable));
    with_inner(kernel, b, |inner| assert_eq!(inner.state, ProcState::Sleeping));

    // 时钟中断只唤醒 ticks 通道
    with_inner(kernel, a, |inner| {
        inner.state = ProcState::Sleeping;
        inner.channel = Some(Channel::Ticks);
    });
    kernel.clock_intr(kernel.boot_cpu());
    with_inner(kernel, a, |inner| assert_eq!(inner.state, ProcState::Runnable));
    with_inner(kernel, b, |inner| assert_eq!(inner.state, ProcState::Sleeping));
}

#[test]
fn test_wakeup_skips_current_process() {
    let kernel = boot(SchedPolicy::Rr, 1);
    let (a, _) = runnable(kernel);
    with_inner(kernel, a, |inner| {
        inner.state = ProcState::Sleeping;
        inner.channel = Some(Channel::Addr(7));
    });
    let cpu = kernel.boot_cpu();
    cpu.set_current(Some(a));
    kernel.wakeup(cpu, Channel::Addr(7));
    with_inner(kernel, a, |inner| assert_eq!(inner.state, ProcState::Sleeping));
    cpu.set_current(None);
    kernel.wakeup(cpu, Channel::Addr(7));
    with_inner(kernel, a, |inner| assert_eq!(inner.state, ProcState::Runnable));
}

#[test]
fn test_sleep_ticks() {
    let (before, after) = run_init(SchedPolicy::Rr, 1, |up| {
        let before = up.uptime();
        up.sleep_ticks(5).unwrap();
        (before, up.uptime())
    });
    assert!(after - before >= 5, "slept {} ticks", after - before);
}

#[test]
fn test_no_lost_wakeup() {
    println!("test: 2. Testing producer / consumer on two CPUs...");
    const ITEMS: u32 = 200;
    let items: &'static SpinLock<u32> = Box::leak(Box::new(SpinLock::new(0, "items")));
    let chan = Channel::Addr(items as *const _ as usize);

    let consumed = run_init(SchedPolicy::Rr, 2, move |up| {
        let producer = up
            .fork(move |up| {
                for _ in 0..ITEMS {
                    *items.lock(up.cpu()) += 1;
                    up.wakeup(chan);
                    up.usertrap();
                }
                0
            })
            .unwrap();

        let mut consumed = 0;
        while consumed < ITEMS {
            let mut guard = items.lock(up.cpu());
            while *guard == 0 {
                guard = up.sleep(chan, guard);
            }
            *guard -= 1;
            drop(guard);
            consumed += 1;
            up.usertrap();
        }
        assert_eq!(up.wait(0), Ok(producer));
        consumed
    });
    assert_eq!(consumed, ITEMS);
    println!("test:    SUCCESS - every item consumed");
}

#[test]
fn test_kill_wakes_sleeper() {
    println!("test: 3. Testing kill on a sleeping process...");
    let kernel = boot(SchedPolicy::Rr, 2);
    let (tx, rx) = mpsc::channel();
    kernel
        .user_init(move |up| {
            let child = up
                .fork(|up| {
                    let _ = up.sleep_ticks(1_000_000);
                    // 被杀死后第一次陷入就退出
                    up.usertrap();
                    0
                })
                .unwrap();
            let _ = up.sleep_ticks(3);
            let killed = up.kill(child);
            let mut status = [0u8; 4];
            up.grow(4096).unwrap();
            let reaped = up.wait(4096);
            up.copy_in(&mut status, 4096).unwrap();
            let missing = up.kill(child);
            let _ = tx.send((child, killed, reaped, i32::from_ne_bytes(status), missing));
            loop {
                let _ = up.sleep_ticks(10);
            }
        })
        .unwrap();
    let mut machine = Machine::start(kernel).unwrap();
    machine.start_timer(TICK).unwrap();
    let (child, killed, reaped, status, missing) = rx.recv_timeout(TIMEOUT).expect("init did not report");
    assert_eq!(machine.shutdown(), Ok(()));

    assert_eq!(killed, Ok(()));
    assert_eq!(reaped, Ok(child));
    assert_eq!(status, -1);
    assert_eq!(missing, Err(crate::errno::Errno::NoSuchProcess));
}
