//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! SMP 调度验证测试
//!
//! 在两个 CPU 上运行每一种调度策略，检查所有子进程都能运行完成

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use super::{run_init, spin_ticks};
use crate::config::SchedPolicy;

const CHILDREN: i32 = 4;

#[test]
fn test_every_policy_on_two_cpus() {
    println!("test: Testing SMP scheduling...");
    for policy in SchedPolicy::ALL {
        println!("test: policy {}", policy);
        let statuses = run_init(policy, 2, |up| {
            for i in 0..CHILDREN {
                up.fork(move |up| {
                    spin_ticks(up, 5);
                    i
                })
                .unwrap();
            }
            let mut statuses = Vec::new();
            let mut raw = [0u8; 4];
            up.grow(4096).unwrap();
            while up.wait(4096).is_ok() {
                up.copy_in(&mut raw, 4096).unwrap();
                statuses.push(i32::from_ne_bytes(raw));
            }
            statuses.sort();
            statuses
        });
        assert_eq!(statuses, (0..CHILDREN).collect::<Vec<_>>(), "{}", policy);
        println!("test:    SUCCESS - {} children finished", CHILDREN);
    }
}

#[test]
fn test_round_robin_uses_both_cpus() {
    let cpus = Arc::new(Mutex::new(BTreeSet::new()));
    let seen = cpus.clone();
    run_init(SchedPolicy::Rr, 2, move |up| {
        for _ in 0..CHILDREN {
            let seen = seen.clone();
            up.fork(move |up| {
                let start = up.uptime();
                while up.uptime() - start < 10 {
                    seen.lock().unwrap().insert(up.cpu().id());
                    up.usertrap();
                    std::thread::yield_now();
                }
                0
            })
            .unwrap();
        }
        while up.wait(0).is_ok() {}
    });
    assert_eq!(*cpus.lock().unwrap(), BTreeSet::from([0, 1]));
}

#[test]
fn test_mlfq_queue_ticks_match_runtime() {
    let (rtime, per_level) = run_init(SchedPolicy::Mlfq, 2, |up| {
        let (tx, rx) = std::sync::mpsc::channel();
        up.fork(move |up| {
            spin_ticks(up, 10);
            let stats = up.proc().lock(up.cpu()).sched;
            let _ = tx.send((stats.rtime, stats.q_ticks.iter().sum::<u64>()));
            0
        })
        .unwrap();
        up.wait(0).unwrap();
        rx.recv().unwrap()
    });
    assert!(rtime > 0);
    assert_eq!(rtime, per_level);
}
