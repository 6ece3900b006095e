//! 空闲页帧链表
//!
//! 链表节点就放在空闲页帧自身的第一个字里，不额外占用内存。

use core::ptr;

/// 链表节点，覆盖在空闲页帧的开头
///
/// # 内存布局
/// - `#[repr(C)]` 确保节点位于页帧的首地址
#[repr(C)]
struct Run {
    next: *mut Run,
}

/// 单向侵入式空闲链表，带长度计数
pub struct FreeList {
    head: *mut Run,
    len: usize,
}

// 链表中的页帧只通过持有所在分区自旋锁的上下文访问
unsafe impl Send for FreeList {}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            len: 0,
        }
    }

    /// 将页帧压入链表头部
    ///
    /// # 安全性
    /// - `raw_addr` 必须指向一个页对齐、可写且不在任何链表中的页帧
    /// - 调用后该页帧被链表接管，调用者不得再访问
    pub unsafe fn push(&mut self, raw_addr: usize) {
        let run = raw_addr as *mut Run;
        ptr::write(run, Run { next: self.head });
        self.head = run;
        self.len += 1;
    }

    /// 从链表头部弹出一个页帧，链表为空时返回 `None`
    pub fn pop(&mut self) -> Option<usize> {
        if self.head.is_null() {
            return None;
        }
        let run = self.head;
        // 安全性：链表中的节点都由 `push` 写入，且页帧在链表中时无人访问
        self.head = unsafe { (*run).next };
        self.len -= 1;
        Some(run as usize)
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}
