//! 内存管理模块
//!
//! 只负责物理页帧：分区式分配器 [`Kmem`] 以及写时复制所需的共享计数。

pub use addr::{pg_round_down, pg_round_up, PhysAddr};
pub use kalloc::{Kmem, KMEM};

mod addr;
pub mod kalloc;
mod list;
#[cfg(feature = "cow")]
mod refcnt;
