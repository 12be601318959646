//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 打开文件对象
//!
//! fork 复制的是句柄而不是文件本身：[`File::dup`] 增加共享引用计数，
//! [`File::close`] 减少引用计数，最后一个句柄关闭时文件对象释放。

use std::sync::Arc;

use super::inode::Inode;

/// 打开文件的共享状态
#[derive(Debug)]
pub struct OpenFile {
    inode: Arc<Inode>,
    readable: bool,
    writable: bool,
}

/// 打开文件句柄
#[derive(Debug)]
pub struct File(Arc<OpenFile>);

impl File {
    pub fn open(inode: Arc<Inode>, readable: bool, writable: bool) -> Self {
        File(Arc::new(OpenFile {
            inode,
            readable,
            writable,
        }))
    }

    /// filedup
    pub fn dup(&self) -> File {
        File(self.0.clone())
    }

    /// fileclose
    pub fn close(self) {
        drop(self);
    }

    /// 共享此文件对象的句柄数
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn inode(&self) -> &Inode {
        &self.0.inode
    }

    pub fn readable(&self) -> bool {
        self.0.readable
    }

    pub fn writable(&self) -> bool {
        self.0.writable
    }
}
