//! 文件系统的块缓存层
//!
//! 上层（日志、inode、目录）只通过 [`BCACHE`] 读写磁盘块。

mod bio;

pub use bio::{Bcache, Buf, BufData, CacheStats, BCACHE};
