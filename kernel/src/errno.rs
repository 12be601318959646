//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 编号与 include/uapi/asm-generic/errno-base.h 一致

use core::fmt;

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use procsched::errno::{Errno, KResult};
///
/// fn lookup(found: bool) -> KResult<u32> {
///     if !found {
///         return Err(Errno::NoSuchProcess);
///     }
///     Ok(1)
/// }
///
/// // 系统调用风格的返回值
/// assert_eq!(lookup(false).unwrap_err().as_neg_i32(), -3);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// No such file or directory (ENOENT, 2)
    NoSuchFileOrDirectory = 2,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Bad file number (EBADF, 9)
    BadFileNumber = 9,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,
}

impl Errno {
    /// 转换为 i32 值
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// 转换为负数 i32 值（系统调用返回值）
    pub fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Errno::NoSuchFileOrDirectory => "ENOENT",
            Errno::NoSuchProcess => "ESRCH",
            Errno::InterruptedSystemCall => "EINTR",
            Errno::BadFileNumber => "EBADF",
            Errno::NoChild => "ECHILD",
            Errno::TryAgain => "EAGAIN",
            Errno::OutOfMemory => "ENOMEM",
            Errno::BadAddress => "EFAULT",
            Errno::InvalidArgument => "EINVAL",
            Errno::TooManyOpenFiles => "EMFILE",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// 内核操作结果
pub type KResult<T> = Result<T, Errno>;
