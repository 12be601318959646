//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 当前支持的平台：
//! - **host** - 宿主机模拟（CPU 与进程均为宿主线程）

pub mod host;

pub use host::{context, cpu, smp, trap};
