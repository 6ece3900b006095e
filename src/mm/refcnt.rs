//! 写时复制页帧的共享计数
//!
//! 计数表示“除当前持有者之外还有多少个共享者”：0 表示唯一持有者。
//! 一个被 k 个地址空间共享的页帧（k-1 次 `add_ref`）恰好在第 k 次释放时回到空闲链表。

use core::mem::{align_of, size_of};
use core::ptr;
use core::slice;
use core::sync::atomic::{AtomicU32, Ordering};

pub struct RefTable {
    counts: &'static [AtomicU32],
}

impl RefTable {
    /// 从 `*cur` 开始切出 `npages` 个计数并清零，`*cur` 前移到表尾。
    ///
    /// # 安全性
    /// `[*cur, *cur + npages * 4)` 必须是可写、此后不会被其他用途占用的内存。
    pub unsafe fn carve(cur: &mut usize, npages: usize) -> Self {
        let start = (*cur + align_of::<AtomicU32>() - 1) & !(align_of::<AtomicU32>() - 1);
        let raw = start as *mut AtomicU32;
        ptr::write_bytes(raw, 0, npages);
        *cur = start + npages * size_of::<AtomicU32>();
        Self {
            counts: slice::from_raw_parts(raw, npages),
        }
    }

    /// 增加一个共享者
    pub fn add_ref(&self, index: usize) {
        self.counts[index].fetch_add(1, Ordering::AcqRel);
    }

    /// 放弃一次持有。
    ///
    /// 返回 `true` 表示调用者是最后一个持有者，应当真正释放页帧；
    /// 返回 `false` 表示只是消耗了一个共享者，页帧仍在使用。
    pub fn drop_ref(&self, index: usize) -> bool {
        self.counts[index]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
    }

    pub fn count(&self, index: usize) -> u32 {
        self.counts[index].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> RefTable {
        let mem: &'static mut [u32] = Vec::leak(vec![0xdead_beef_u32; n]);
        let mut cur = mem.as_mut_ptr() as usize;
        let t = unsafe { RefTable::carve(&mut cur, n) };
        assert_eq!(cur, mem.as_ptr() as usize + n * 4);
        t
    }

    #[test]
    fn carved_counts_start_at_zero() {
        let t = table(4);
        assert_eq!(t.counts.len(), 4);
        assert!((0..4).all(|i| t.count(i) == 0));
    }

    #[test]
    fn k_sharers_need_k_drops() {
        let t = table(2);
        t.add_ref(1);
        t.add_ref(1);
        assert_eq!(t.count(1), 2);
        assert!(!t.drop_ref(1));
        assert!(!t.drop_ref(1));
        assert!(t.drop_ref(1));
        assert_eq!(t.count(1), 0);
        assert_eq!(t.count(0), 0);
    }
}
