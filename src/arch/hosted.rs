//! 宿主环境下的实现
//!
//! 每个线程在第一次使用时领取一个唯一的上下文编号，并按轮转方式落在某个 hart 上；
//! 测试可以用 [`bind_hart`] 把线程固定到指定 hart，模拟调度器的迁移。
//! 中断并不存在，这里只维护嵌套计数以捕获不配对的 `push_off`/`pop_off`。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::consts::NCPU;
use crate::fault::{fatal, Fault};

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(0);

std::thread_local! {
    static CONTEXT: usize = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
    static HART: Cell<Option<usize>> = const { Cell::new(None) };
    static NOFF: Cell<usize> = const { Cell::new(0) };
}

pub fn context_id() -> usize {
    CONTEXT.with(|c| *c)
}

pub fn cpu_id() -> usize {
    HART.with(|h| h.get()).unwrap_or_else(|| context_id() % NCPU)
}

/// 把当前线程固定到 `hart` 上运行
pub fn bind_hart(hart: usize) {
    assert!(hart < NCPU, "bind_hart: hart {} out of range", hart);
    HART.with(|h| h.set(Some(hart)));
}

pub fn push_off() {
    NOFF.with(|n| n.set(n.get() + 1));
}

pub fn pop_off() {
    NOFF.with(|n| match n.get().checked_sub(1) {
        Some(v) => n.set(v),
        None => fatal(Fault::PopOffMismatch),
    });
}

#[inline]
pub fn relax() {
    std::thread::yield_now();
}
