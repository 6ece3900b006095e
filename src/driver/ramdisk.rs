//! 内存中的块设备
//!
//! 用一段常驻内存模拟磁盘，供宿主环境的模拟与测试使用；
//! 读写次数被计数，以便观察块缓存是否真的命中。
//! 存储区由调用者提供（裸机上通常是加载进内存的磁盘镜像）。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::consts::BSIZE;
use crate::fault::{fatal, Fault};
use crate::fs::Buf;
use crate::spinlock::SpinLock;

use super::BlockDevice;

pub struct RamDisk {
    blocks: SpinLock<&'static mut [[u8; BSIZE]]>,
    nblocks: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    /// 以 `blocks` 为存储区创建设备，块号即切片下标
    pub fn new(blocks: &'static mut [[u8; BSIZE]]) -> Self {
        Self {
            nblocks: blocks.len(),
            blocks: SpinLock::new(blocks, "ramdisk"),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn nblocks(&self) -> usize {
        self.nblocks
    }

    /// 设备读取次数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 设备写入次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 绕过块缓存直接查看磁盘上的块内容
    pub fn peek(&self, blockno: u32, f: impl FnOnce(&[u8; BSIZE])) {
        let i = self.index(blockno);
        let blocks = self.blocks.lock();
        f(&blocks[i]);
    }

    fn index(&self, blockno: u32) -> usize {
        let i = blockno as usize;
        if i >= self.nblocks {
            fatal(Fault::BlockOutOfRange("ramdisk", blockno));
        }
        i
    }
}

impl BlockDevice for RamDisk {
    fn rw(&self, buf: &mut Buf<'_>, writing: bool) {
        let i = self.index(buf.blockno());
        let mut blocks = self.blocks.lock();
        if writing {
            blocks[i].copy_from_slice(&buf[..]);
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            buf.copy_from_slice(&blocks[i]);
            self.reads.fetch_add(1, Ordering::Relaxed);
        }
    }
}
