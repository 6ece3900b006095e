//! 块设备边界
//!
//! 块缓存只通过 [`BlockDevice`] 访问存储，具体驱动（virtio、ramdisk）由内核提供。

use crate::fs::Buf;

pub mod ramdisk;

pub use ramdisk::RamDisk;

/// 同步块设备读写接口。
///
/// `rw` 在返回前完成整个传输：读取时把块 `buf.blockno()` 的内容填入缓冲区，
/// 写入时把缓冲区内容持久化到该块。调用者持有缓冲块的睡眠锁。
pub trait BlockDevice: Sync {
    fn rw(&self, buf: &mut Buf<'_>, writing: bool);
}
