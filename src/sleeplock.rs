//! 睡眠锁模块
//! 提供基于进程休眠/唤醒机制的同步原语，适用于可能长时间持有的锁。
//!
//! 当锁被占用时，尝试获取锁的进程会进入休眠状态，避免忙等待。
//! 休眠与唤醒由进程层通过 [`register_sleeper`] 注册的 [`Sleeper`] 完成；
//! 在进程层就绪之前（或宿主环境中），等待者释放内部自旋锁后轮询。

use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut, Drop};

use crate::arch;
use crate::once::InitCell;
use crate::spinlock::{SpinLock, SpinLockGuard};

/// 进程层提供的休眠/唤醒接口
pub trait Sleeper: Sync {
    /// 在通道 `chan` 上休眠。
    ///
    /// 实现必须在把当前进程标记为休眠之后才释放 `guard`，
    /// 以免错过在两者之间发生的唤醒。返回时 `guard` 已被释放。
    fn sleep(&self, chan: usize, guard: SpinLockGuard<'_, ()>);

    /// 唤醒所有在通道 `chan` 上休眠的进程
    fn wakeup(&self, chan: usize);

    /// 当前进程的标识。
    ///
    /// 睡眠锁可能跨越调度点持有，进程可能迁移到别的 hart，
    /// 因此持有者用进程而不是 hart 来标识。
    fn current(&self) -> usize {
        arch::context_id()
    }
}

fn current() -> isize {
    match SLEEPER.get() {
        Some(sleeper) => sleeper.current() as isize,
        None => arch::context_id() as isize,
    }
}

static SLEEPER: InitCell<&'static dyn Sleeper> = InitCell::new();

/// 安装进程层的休眠/唤醒实现，只能调用一次
pub fn register_sleeper(sleeper: &'static dyn Sleeper) {
    SLEEPER.set(sleeper, "sleeper");
}

/// 睡眠锁结构，提供阻塞式同步机制
///
/// # 字段说明
/// - `lock`: 内部自旋锁，保护`locked`与`owner`，以锁的名称命名
/// - `locked`: 表示锁是否已被占用
/// - `owner`: 持有者的进程标识，用于`holding`检查
/// - `data`: 被保护的数据，通过`UnsafeCell`实现内部可变性
pub struct SleepLock<T: ?Sized> {
    lock: SpinLock<()>,
    locked: Cell<bool>,
    owner: Cell<isize>,
    data: UnsafeCell<T>,
}

// `locked`和`owner`只在持有内部自旋锁时访问
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            lock: SpinLock::new((), name),
            locked: Cell::new(false),
            owner: Cell::new(-1),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取睡眠锁（可能阻塞进程）
    ///
    /// # 流程解释
    /// 1. 获取内部自旋锁保护临界区
    /// 2. 检查`locked`状态：
    ///   - 如果已锁定：让当前进程在锁的地址上休眠，被唤醒后重新获取内部锁
    ///   - 如果未锁定：设置`locked=true`并记录持有者
    /// 3. 释放内部自旋锁
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut guard = self.lock.lock();

        while self.locked.get() {
            match SLEEPER.get() {
                Some(sleeper) => sleeper.sleep(self.chan(), guard),
                None => {
                    drop(guard);
                    arch::relax();
                }
            }
            guard = self.lock.lock();
        }

        self.locked.set(true);
        self.owner.set(current());
        drop(guard);

        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// 当前上下文是否持有此睡眠锁
    pub fn holding(&self) -> bool {
        let guard = self.lock.lock();
        let r = self.locked.get() && self.owner.get() == current();
        drop(guard);
        r
    }

    fn unlock(&self) {
        let guard = self.lock.lock();
        self.locked.set(false);
        self.owner.set(-1);
        if let Some(sleeper) = SLEEPER.get() {
            sleeper.wakeup(self.chan());
        }
        drop(guard);
    }

    /// 休眠通道，取`locked`字段的地址
    fn chan(&self) -> usize {
        self.locked.as_ptr() as usize
    }
}

/// 睡眠锁守卫，离开作用域时释放锁并唤醒等待者
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
}

impl<'a, T: ?Sized> Deref for SleepLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &*self.data
    }
}

impl<'a, T: ?Sized> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex, Once};
    use std::thread;
    use std::vec::Vec;

    /// 用条件变量充当进程层：`current` 取线程局部的进程号，未设置时退回上下文编号
    struct CondSleeper {
        generation: Mutex<u64>,
        cv: Condvar,
        slept: Mutex<Vec<usize>>,
        woken: Mutex<Vec<usize>>,
    }

    impl Sleeper for CondSleeper {
        fn sleep(&self, chan: usize, guard: SpinLockGuard<'_, ()>) {
            let mut generation = self.generation.lock().unwrap();
            self.slept.lock().unwrap().push(chan);
            let seen = *generation;
            drop(guard);
            while *generation == seen {
                generation = self.cv.wait(generation).unwrap();
            }
        }

        fn wakeup(&self, chan: usize) {
            self.woken.lock().unwrap().push(chan);
            *self.generation.lock().unwrap() += 1;
            self.cv.notify_all();
        }

        fn current(&self) -> usize {
            PID.with(|p| p.get()).unwrap_or_else(arch::context_id)
        }
    }

    static COND: CondSleeper = CondSleeper {
        generation: Mutex::new(0),
        cv: Condvar::new(),
        slept: Mutex::new(Vec::new()),
        woken: Mutex::new(Vec::new()),
    };

    static INSTALL: Once = Once::new();

    std::thread_local! {
        static PID: Cell<Option<usize>> = const { Cell::new(None) };
    }

    fn install() {
        INSTALL.call_once(|| register_sleeper(&COND));
    }

    fn set_pid(pid: Option<usize>) {
        PID.with(|p| p.set(pid));
    }

    #[test]
    fn waiter_sleeps_on_lock_and_is_woken() {
        install();
        let l: &'static SleepLock<u32> = Box::leak(Box::new(SleepLock::new(0, "sleeper")));
        let chan = l.chan();
        let g = l.lock();

        thread::scope(|s| {
            let waiter = s.spawn(|| *l.lock() += 1);
            while !COND.slept.lock().unwrap().contains(&chan) {
                thread::yield_now();
            }
            drop(g);
            waiter.join().unwrap();
        });

        assert!(COND.woken.lock().unwrap().contains(&chan));
        assert_eq!(*l.lock(), 1);
    }

    #[test]
    fn owner_is_the_process_not_the_thread() {
        install();
        let l = SleepLock::new((), "migrate");
        let pid = 1 << 40;

        set_pid(Some(pid));
        let g = l.lock();
        assert!(l.holding());

        thread::scope(|s| {
            s.spawn(|| assert!(!l.holding()));
            // 同一进程被调度到另一个 hart 上
            s.spawn(|| {
                set_pid(Some(pid));
                assert!(l.holding());
            });
        });

        set_pid(Some(pid + 1));
        assert!(!l.holding());
        set_pid(Some(pid));
        drop(g);
        assert!(!l.holding());
        set_pid(None);
    }

    #[test]
    fn holding_follows_guard() {
        let l = SleepLock::new(5u32, "holding");
        assert!(!l.holding());
        let g = l.lock();
        assert_eq!(*g, 5);
        assert!(l.holding());
        thread::scope(|s| {
            s.spawn(|| assert!(!l.holding()));
        });
        drop(g);
        assert!(!l.holding());
    }

    #[test]
    fn waiters_are_serialized() {
        let l = SleepLock::new(0usize, "counter");
        let in_cs = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let mut g = l.lock();
                        assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                        *g += 1;
                        thread::yield_now();
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(*l.lock(), 6 * 200);
    }
}
