//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 宿主机模拟平台
//!
//! 每个 CPU 对应一个宿主线程运行调度循环，每个进程对应一个宿主线程
//! 运行进程体；上下文切换通过 [`context::Handoff`] 在两者之间移交执行权。

pub mod context;
pub mod cpu;
pub mod smp;
pub mod trap;
