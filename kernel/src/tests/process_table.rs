//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程表测试
//!
//! 槽位分配与回收、PID 分配、init 进程创建、kill、procdump

use super::{boot, boot_with_frames, runnable, with_inner};
use crate::arch::trap::{TRAMPOLINE, TRAPFRAME};
use crate::config::{SchedPolicy, DEFAULT_PRIORITY, DEFAULT_TICKETS, NPROC, PAGE_SIZE};
use crate::errno::Errno;
use crate::mm::{PteFlags, VirtAddr, TRAMPOLINE_PA};
use crate::process::fork::user_entry;
use crate::process::{Channel, ProcInner, ProcState, UserProc, INITCODE, PID_INIT};

#[test]
fn test_spawn_initial_state() {
    println!("test: 1. Testing allocproc...");
    let kernel = boot(SchedPolicy::Rr, 1);
    let (slot, inner) = kernel.spawn(kernel.boot_cpu()).unwrap();

    assert_eq!(slot, 0);
    assert_eq!(inner.pid, PID_INIT);
    assert_eq!(inner.state, ProcState::Allocated);
    assert!(!inner.killed);
    assert_eq!(inner.sched.tickets, DEFAULT_TICKETS);
    assert_eq!(inner.sched.static_priority, DEFAULT_PRIORITY);
    assert_eq!(inner.sched.ctime, kernel.ticks());
    assert_eq!(inner.sched.rtime, 0);

    // SAFETY: 持有进程锁，进程没有线程
    let data = unsafe { kernel.procs().get(slot).data() };
    assert_eq!(data.sz, 0);
    assert_eq!(data.context.ra, user_entry());
    assert_eq!(data.context.sp, data.kstack.as_usize() + PAGE_SIZE);

    let space = data.space();
    let trampoline = space.translate(VirtAddr(TRAMPOLINE)).unwrap();
    assert_eq!(trampoline.pa, TRAMPOLINE_PA);
    assert!(!trampoline.flags.contains(PteFlags::U));
    let trapframe = space.translate(VirtAddr(TRAPFRAME)).unwrap();
    assert_eq!(trapframe.pa, data.trapframe_pa());
    assert_eq!(space.mapped_pages(), 2);
    println!("test:    SUCCESS - trampoline and trapframe mapped");
}

#[test]
fn test_pids_are_unique_and_increasing() {
    let kernel = boot(SchedPolicy::Rr, 1);
    let (a, pa) = runnable(kernel);
    let (_, pb) = runnable(kernel);
    assert!(pb > pa);

    // 回收后同一槽位拿到新的 PID
    with_inner(kernel, a, |inner| kernel.destroy(a, inner));
    let (c, pc) = runnable(kernel);
    assert_eq!(c, a);
    assert!(pc > pb);
}

#[test]
fn test_destroy_returns_every_frame() {
    println!("test: 2. Testing freeproc...");
    let kernel = boot(SchedPolicy::Rr, 1);
    let free = kernel.mem().free_frames();
    let generation = kernel.procs().get(0).generation();

    let (slot, mut inner) = kernel.spawn(kernel.boot_cpu()).unwrap();
    assert_eq!(kernel.mem().free_frames(), free - 2);
    // SAFETY: 持有进程锁
    let data = unsafe { kernel.procs().get(slot).data_mut() };
    data.space_mut()
        .grow(kernel.mem(), 0, 3 * PAGE_SIZE, PteFlags::W)
        .unwrap();
    data.sz = 3 * PAGE_SIZE;

    kernel.destroy(slot, &mut inner);
    assert_eq!(*inner, ProcInner::default());
    drop(inner);

    assert_eq!(kernel.mem().free_frames(), free);
    assert!(kernel.mem().check_consistency());
    assert_eq!(kernel.procs().get(slot).generation(), generation + 1);
    with_inner(kernel, slot, |inner| assert_eq!(inner.state, ProcState::Unused));
    println!("test:    SUCCESS - all frames returned");
}

#[test]
fn test_table_exhaustion() {
    let kernel = boot(SchedPolicy::Rr, 1);
    for _ in 0..NPROC {
        runnable(kernel);
    }
    assert_eq!(kernel.spawn(kernel.boot_cpu()).err(), Some(Errno::TryAgain));
}

#[test]
fn test_spawn_out_of_memory_rolls_back() {
    println!("test: 3. Testing allocproc without frames...");
    // 内核栈之外只剩 3 帧：第一个进程用 2 帧，第二个拿到陷阱帧后页表分配失败
    let kernel = boot_with_frames(SchedPolicy::Rr, 1, NPROC + 3);
    runnable(kernel);
    assert_eq!(kernel.mem().free_frames(), 1);

    assert_eq!(kernel.spawn(kernel.boot_cpu()).err(), Some(Errno::OutOfMemory));
    assert_eq!(kernel.mem().free_frames(), 1);
    with_inner(kernel, 1, |inner| assert_eq!(inner.state, ProcState::Unused));
    assert!(kernel.mem().check_consistency());
}

#[test]
fn test_user_init() {
    println!("test: 4. Testing userinit...");
    let kernel = boot(SchedPolicy::Rr, 1);
    let pid = kernel.user_init(|_| 0).unwrap();
    assert_eq!(pid, PID_INIT);

    let slot = kernel.init_slot().unwrap();
    with_inner(kernel, slot, |inner| {
        assert_eq!(inner.state, ProcState::Runnable);
        assert_eq!(inner.name, "initcode");
    });

    // 测试线程借用 init 的身份检查用户内存（init 线程尚未被调度）
    let up = UserProc::new(kernel, slot, kernel.boot_cpu());
    assert_eq!(up.size(), PAGE_SIZE);
    let mut code = vec![0u8; INITCODE.len()];
    up.copy_in(&mut code, 0).unwrap();
    assert_eq!(code, INITCODE);
    let tf = up.trapframe();
    assert_eq!(tf.epc, 0);
    assert_eq!(tf.sp, PAGE_SIZE);
    assert_eq!(up.cwd().map(|ip| ip.path().to_string()), Some("/".to_string()));

    assert_eq!(kernel.user_init(|_| 0).err(), Some(Errno::InvalidArgument));
    println!("test:    SUCCESS - init process created once");
}

#[test]
#[should_panic(expected = "init exiting")]
fn test_init_exit_panics() {
    let kernel = boot(SchedPolicy::Rr, 1);
    kernel.user_init(|_| 0).unwrap();
    let slot = kernel.init_slot().unwrap();
    let mut up = UserProc::new(kernel, slot, kernel.boot_cpu());
    up.exit(0);
}

#[test]
fn test_kill() {
    let kernel = boot(SchedPolicy::Rr, 1);
    let (slot, pid) = runnable(kernel);
    with_inner(kernel, slot, |inner| {
        inner.state = ProcState::Sleeping;
        inner.channel = Some(Channel::Addr(0x1000));
    });

    kernel.kill(kernel.boot_cpu(), pid).unwrap();
    with_inner(kernel, slot, |inner| {
        assert!(inner.killed);
        assert_eq!(inner.state, ProcState::Runnable);
    });

    assert_eq!(kernel.kill(kernel.boot_cpu(), pid + 100), Err(Errno::NoSuchProcess));
}

#[test]
fn test_kill_ignores_free_slots() {
    let kernel = boot(SchedPolicy::Rr, 1);
    let (slot, pid) = runnable(kernel);
    with_inner(kernel, slot, |inner| kernel.destroy(slot, inner));
    assert_eq!(kernel.kill(kernel.boot_cpu(), pid), Err(Errno::NoSuchProcess));
    // 回收后 pid 字段归零，pid 0 也找不到
    assert_eq!(kernel.kill(kernel.boot_cpu(), 0), Err(Errno::NoSuchProcess));
}

#[test]
fn test_find_and_procdump() {
    let kernel = boot(SchedPolicy::Mlfq, 1);
    let (slot, pid) = runnable(kernel);
    with_inner(kernel, slot, |inner| {
        inner.name = "worker".into();
        inner.sched.tickets = 7;
    });
    assert_eq!(kernel.procs().find(kernel.boot_cpu(), pid), Some(slot));
    assert_eq!(kernel.procs().find(kernel.boot_cpu(), pid + 1), None);

    let dump = kernel.procdump(kernel.boot_cpu());
    let line = dump.lines().next().unwrap();
    let fields: Vec<&str> = line.split_whitespace().collect();
    assert_eq!(fields[0], pid.to_string());
    assert_eq!(fields[1], "runble");
    assert_eq!(fields[2], "worker");
    assert_eq!(&fields[3..8], &["0", "0", "0", "0", "0"]);
    assert_eq!(fields[8], "7");
    assert_eq!(fields[9], DEFAULT_PRIORITY.to_string());
    assert_eq!(dump.lines().count(), 1);
}
