//! 内核错误类型
//!
//! 分为两类：可恢复的资源耗尽（[`AllocError`]，作为 `Result` 返回给调用者），
//! 以及不可恢复的不变量破坏（[`Fault`]，经由 [`fatal`] 使内核停机）。

use core::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// 内核是否已因致命错误停机
static HALTED: AtomicBool = AtomicBool::new(false);

/// 物理页分配失败。调用者自行决定如何降级（例如让系统调用失败）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("kalloc: out of memory")]
    OutOfMemory,
}

/// 不可恢复的内核错误。
///
/// 出现这些错误意味着调用者或内核状态本身已经损坏，继续运行只会导致静默的数据破坏，
/// 因此只能通过 [`fatal`] 停机，而不能作为普通错误返回。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    /// 所有缓冲块都被引用，缓存已超额订阅
    #[error("bget: no buffers")]
    NoBuffers,

    /// 未持有缓冲块睡眠锁就写回
    #[error("bwrite: buffer {0} not locked")]
    WriteUnlocked(usize),

    /// `unpin` 次数多于 `pin`
    #[error("bunpin: buffer {0} reference count underflow")]
    UnpinUnderflow(usize),

    /// 释放未对齐或越界的物理地址
    #[error("kfree: bad physical address {0:#x}")]
    BadFree(usize),

    /// 对未对齐或越界的物理地址增加引用
    #[error("kincref: bad physical address {0:#x}")]
    BadRef(usize),

    /// 同一上下文重复获取自旋锁
    #[error("spinlock {0} acquire")]
    SpinReacquire(&'static str),

    /// 释放并非由当前上下文持有的自旋锁
    #[error("spinlock {0} release")]
    SpinRelease(&'static str),

    /// 被引用的缓冲块不在其键所属的桶中
    #[error("bcache: buffer {0} not in its bucket")]
    BufferLost(usize),

    /// `pop_off` 与 `push_off` 不匹配
    #[error("pop_off(): count not match")]
    PopOffMismatch,

    /// 块设备访问越界
    #[error("{0}: block {1} out of range")]
    BlockOutOfRange(&'static str, u32),

    #[error("{0}: used before init")]
    Uninitialized(&'static str),

    #[error("{0}: init twice")]
    InitTwice(&'static str),
}

/// 报告致命错误并停止当前执行上下文。
///
/// 裸机环境下由内核的 panic 处理函数负责挂起 hart；
/// 宿主环境下 panic 会展开到测试框架。
#[cold]
#[track_caller]
pub fn fatal(fault: Fault) -> ! {
    HALTED.store(true, Ordering::Relaxed);
    log::error!("kernel fault: {}", fault);
    panic!("{}", fault)
}

/// 内核是否曾经触发过致命错误
pub fn halted() -> bool {
    HALTED.load(Ordering::Relaxed)
}
