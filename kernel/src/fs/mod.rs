//! 文件层接口
//!
//! 进程核心只依赖文件层的几个操作：
//! - `file`: 打开文件句柄，按引用计数在进程间共享 (filedup / fileclose)
//! - `inode`: 路径查找与 inode 引用 (namei / idup / iput)

pub mod file;
pub mod inode;

pub use file::File;
pub use inode::{Inode, Vfs};
