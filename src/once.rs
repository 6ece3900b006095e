//! 只能设置一次的全局状态
//!
//! 内核启动时安装的进程级状态（块设备、物理内存布局、调度器钩子）
//! 在整个运行期间只初始化一次且不再拆除，用 [`InitCell`] 把这一点显式化。

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::arch;
use crate::fault::{fatal, Fault};

const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;

pub struct InitCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// READY 之后只读共享；初始化只有一个写者
unsafe impl<T: Sync + Send> Sync for InitCell<T> {}
unsafe impl<T: Send> Send for InitCell<T> {}

impl<T> InitCell<T> {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// 安装值。
    ///
    /// # 可能的错误
    /// 重复设置是致命错误，`name` 用于报告是哪个子系统被初始化了两次。
    pub fn set(&self, value: T, name: &'static str) -> &T {
        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            fatal(Fault::InitTwice(name));
        }
        unsafe { (*self.value.get()).write(value) };
        self.state.store(READY, Ordering::Release);
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    pub fn get(&self) -> Option<&T> {
        match self.state.load(Ordering::Acquire) {
            READY => Some(unsafe { (*self.value.get()).assume_init_ref() }),
            _ => None,
        }
    }

    /// 获取已安装的值，未初始化即使用是致命错误。
    ///
    /// 如果另一个上下文正在初始化，则等待其完成。
    pub fn get_or_fault(&self, name: &'static str) -> &T {
        loop {
            match self.state.load(Ordering::Acquire) {
                READY => return unsafe { (*self.value.get()).assume_init_ref() },
                INITING => arch::relax(),
                _ => fatal(Fault::Uninitialized(name)),
            }
        }
    }
}

impl<T> Default for InitCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
