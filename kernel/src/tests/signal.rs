//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! sigalarm / sigreturn 测试

use super::run_init;
use crate::config::SchedPolicy;
use crate::errno::Errno;
use crate::signal::AlarmState;

const HANDLER: usize = 0x1000;
const USER_PC: usize = 0x200;

/// 陷入直到 epc 变为处理函数地址，最多等待 limit 个滴答
fn trap_until_handler(up: &mut crate::UserProc, limit: u64) -> bool {
    let start = up.uptime();
    while up.uptime() - start < limit {
        up.usertrap();
        if up.trapframe().epc == HANDLER {
            return true;
        }
        std::thread::yield_now();
    }
    false
}

#[test]
fn test_alarm_fires_and_returns() {
    println!("test: 1. Testing sigalarm...");
    let results = run_init(SchedPolicy::Rr, 1, |up| {
        let mut tf = up.trapframe();
        tf.epc = USER_PC;
        tf.a0 = 42;
        tf.s1 = 7;
        up.set_trapframe(&tf);

        let free = up.kernel().mem().free_frames();
        up.sigalarm(2, HANDLER).unwrap();
        let fired = trap_until_handler(up, 1000);
        let during: AlarmState = up.data().alarm.clone();
        let backup_frames = free - up.kernel().mem().free_frames();

        // 处理函数改写寄存器后调用 sigreturn
        let mut tf = up.trapframe();
        tf.a0 = 0;
        tf.s1 = 0;
        up.set_trapframe(&tf);
        let ret = up.sigreturn();
        let restored = up.trapframe();
        let after: AlarmState = up.data().alarm.clone();
        let leaked = free - up.kernel().mem().free_frames();
        let again = up.sigreturn();

        (fired, during, backup_frames, ret, restored, after, leaked, again)
    });
    let (fired, during, backup_frames, ret, restored, after, leaked, again) = results;

    assert!(fired, "alarm never delivered");
    // 处理函数运行期间不再触发
    assert!(!during.armed);
    assert!(during.backup.is_some());
    assert_eq!(backup_frames, 1);

    assert_eq!(ret, Ok(42));
    assert_eq!(restored.epc, USER_PC);
    assert_eq!(restored.a0, 42);
    assert_eq!(restored.s1, 7);
    assert!(after.armed);
    assert_eq!(after.elapsed, 0);
    assert!(after.backup.is_none());
    assert_eq!(leaked, 0);

    assert_eq!(again, Err(Errno::InvalidArgument));
    println!("test:    SUCCESS - trapframe restored");
}

#[test]
fn test_alarm_fires_repeatedly() {
    let count = run_init(SchedPolicy::Rr, 1, |up| {
        let mut tf = up.trapframe();
        tf.epc = USER_PC;
        up.set_trapframe(&tf);
        up.sigalarm(1, HANDLER).unwrap();

        let mut count = 0;
        for _ in 0..3 {
            if trap_until_handler(up, 1000) {
                count += 1;
                up.sigreturn().unwrap();
            }
        }
        count
    });
    assert_eq!(count, 3);
}

#[test]
fn test_zero_interval_never_fires() {
    let (fired, state) = run_init(SchedPolicy::Rr, 1, |up| {
        up.sigalarm(0, HANDLER).unwrap();
        let fired = trap_until_handler(up, 10);
        (fired, up.data().alarm.clone())
    });
    assert!(!fired);
    assert!(state.backup.is_none());
}

#[test]
fn test_sigalarm_zero_disarms_after_return() {
    let armed = run_init(SchedPolicy::Rr, 1, |up| {
        let mut tf = up.trapframe();
        tf.epc = USER_PC;
        up.set_trapframe(&tf);
        up.sigalarm(1, HANDLER).unwrap();
        assert!(trap_until_handler(up, 1000));
        // 处理函数里取消闹钟
        up.sigalarm(0, 0).unwrap();
        up.sigreturn().unwrap();
        up.data().alarm.armed
    });
    assert!(!armed);
}
