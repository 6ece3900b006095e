//! xv6 内核的资源核心：分桶块缓存与分区式物理页帧分配器
//!
//! 裸机 RISC-V 上以 `no_std` 方式链接进内核；宿主环境下每个线程扮演一个内核线程，
//! 便于在操作系统线程上测试并发行为。

#![cfg_attr(target_os = "none", no_std)]
#![warn(rust_2018_idioms)]

mod arch;
pub mod consts;
pub mod driver;
pub mod fault;
pub mod fs;
pub mod mm;
mod once;
mod rmain;
pub mod sleeplock;
pub mod spinlock;

#[cfg(not(target_os = "none"))]
pub use arch::bind_hart;
pub use arch::cpu_id;
pub use driver::{BlockDevice, RamDisk};
pub use fault::{AllocError, Fault};
pub use fs::{Buf, BCACHE};
pub use mm::{PhysAddr, KMEM};
pub use rmain::{core_init, core_ready};
pub use sleeplock::{register_sleeper, Sleeper};
