//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! MLFQ 运行队列
//!
//! 容量为 NPROC 的环形队列，存放进程句柄。队列本身没有锁，
//! 由持有者（MLFQ 策略）用一把叶子锁串行化访问。

use crate::config::NPROC;
use crate::process::ProcHandle;

/// 有界环形队列
#[derive(Debug, Clone)]
pub struct ProcQueue {
    head: usize,
    tail: usize,
    size: usize,
    procs: [Option<ProcHandle>; NPROC],
}

impl ProcQueue {
    pub const fn new() -> Self {
        Self {
            head: 0,
            tail: 0,
            size: 0,
            procs: [None; NPROC],
        }
    }

    /// 入队尾
    pub fn push(&mut self, handle: ProcHandle) {
        if self.size == NPROC {
            panic!("que_push: full");
        }
        self.procs[self.tail] = Some(handle);
        self.tail = (self.tail + 1) % NPROC;
        self.size += 1;
    }

    /// 出队头
    pub fn pop(&mut self) -> Option<ProcHandle> {
        if self.size == 0 {
            return None;
        }
        let handle = self.procs[self.head].take();
        self.head = (self.head + 1) % NPROC;
        self.size -= 1;
        handle
    }

    /// 插到队头
    pub fn push_front(&mut self, handle: ProcHandle) {
        if self.size == NPROC {
            panic!("que_pushfront: full");
        }
        self.head = (self.head + NPROC - 1) % NPROC;
        self.procs[self.head] = Some(handle);
        self.size += 1;
    }

    pub fn front(&self) -> Option<ProcHandle> {
        if self.size == 0 {
            return None;
        }
        self.procs[self.head]
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn len(&self) -> usize {
        self.size
    }

    /// 移除某个槽位的所有句柄（不论代数），保持其余元素的顺序
    ///
    /// 返回是否移除了元素。
    pub fn remove(&mut self, slot: usize) -> bool {
        let len = self.size;
        let mut removed = false;
        for _ in 0..len {
            if let Some(handle) = self.pop() {
                if handle.slot == slot {
                    removed = true;
                } else {
                    self.push(handle);
                }
            }
        }
        removed
    }

    /// 按队列顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = ProcHandle> + '_ {
        (0..self.size).filter_map(move |i| self.procs[(self.head + i) % NPROC])
    }
}

impl Default for ProcQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: usize) -> ProcHandle {
        ProcHandle { slot, generation: 1 }
    }

    #[test]
    fn test_fifo_order() {
        let mut q = ProcQueue::new();
        assert!(q.is_empty());
        for slot in 0..5 {
            q.push(handle(slot));
        }
        assert_eq!(q.len(), 5);
        assert_eq!(q.front(), Some(handle(0)));
        for slot in 0..5 {
            assert_eq!(q.pop(), Some(handle(slot)));
        }
        assert_eq!(q.pop(), None);
        assert_eq!(q.front(), None);
    }

    #[test]
    fn test_wraparound() {
        let mut q = ProcQueue::new();
        // 让 head/tail 绕过数组末尾多次
        for round in 0..3 {
            for slot in 0..NPROC {
                q.push(handle(slot));
            }
            assert_eq!(q.len(), NPROC);
            for slot in 0..NPROC {
                assert_eq!(q.pop(), Some(handle(slot)), "round {}", round);
            }
            q.push(handle(round));
            assert_eq!(q.pop(), Some(handle(round)));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_push_front() {
        let mut q = ProcQueue::new();
        q.push(handle(1));
        q.push(handle(2));
        q.push_front(handle(0));
        assert_eq!(q.iter().map(|h| h.slot).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(q.pop(), Some(handle(0)));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut q = ProcQueue::new();
        for slot in [3, 7, 3, 9] {
            q.push(handle(slot));
        }
        assert!(q.remove(3));
        assert!(!q.remove(42));
        assert_eq!(q.iter().map(|h| h.slot).collect::<Vec<_>>(), vec![7, 9]);
    }

    #[test]
    #[should_panic(expected = "que_push: full")]
    fn test_push_full() {
        let mut q = ProcQueue::new();
        for slot in 0..=NPROC {
            q.push(handle(slot % NPROC));
        }
    }
}
