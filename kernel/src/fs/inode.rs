//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 索引节点与路径查找
//!
//! 只提供进程核心需要的接口：namei()、idup()（`Arc::clone`）与
//! iput()（释放 `Arc`）。

use std::collections::BTreeMap;
use std::sync::Arc;

/// inode 编号
pub type Ino = u32;

/// 根目录 inode 编号
pub const ROOT_INO: Ino = 1;

/// 索引节点
#[derive(Debug)]
pub struct Inode {
    ino: Ino,
    path: String,
}

impl Inode {
    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

struct InodeTable {
    next_ino: Ino,
    by_path: BTreeMap<String, Arc<Inode>>,
}

/// 内存中的文件系统命名空间
pub struct Vfs {
    table: spin::Mutex<InodeTable>,
}

impl Vfs {
    /// 创建只含根目录的命名空间
    pub fn new() -> Self {
        let root = Arc::new(Inode {
            ino: ROOT_INO,
            path: "/".into(),
        });
        let mut by_path = BTreeMap::new();
        by_path.insert("/".to_string(), root);
        Self {
            table: spin::Mutex::new(InodeTable {
                next_ino: ROOT_INO + 1,
                by_path,
            }),
        }
    }

    /// 路径查找
    pub fn namei(&self, path: &str) -> Option<Arc<Inode>> {
        self.table.lock().by_path.get(path).cloned()
    }

    /// 创建（或返回已有的）路径
    pub fn create(&self, path: &str) -> Arc<Inode> {
        let mut table = self.table.lock();
        if let Some(ip) = table.by_path.get(path) {
            return ip.clone();
        }
        let ip = Arc::new(Inode {
            ino: table.next_ino,
            path: path.into(),
        });
        table.next_ino += 1;
        table.by_path.insert(path.into(), ip.clone());
        ip
    }

    /// 释放 inode 引用
    pub fn iput(&self, ip: Arc<Inode>) {
        drop(ip);
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}
