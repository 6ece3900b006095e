//! 资源核心的启动流程

use core::sync::atomic::{AtomicBool, Ordering};

use crate::driver::BlockDevice;
use crate::fs::BCACHE;
use crate::mm::KMEM;

/// `STARTED` 表示主核是否完成了资源核心的全局初始化。
/// 其他 hart 在使用缓存或分配器之前应等待该标志。
static STARTED: AtomicBool = AtomicBool::new(false);

/// 在主核上初始化物理页帧分配器与块缓存。
///
/// # 功能说明
/// 先把 `[mem_start, mem_end)` 交给 [`KMEM`]，再用 `disk` 初始化 [`BCACHE`]，
/// 最后置位启动标志。两者都是进程级状态，只初始化一次，运行期间不拆除。
///
/// # 安全性
/// - `[mem_start, mem_end)` 必须是内核镜像之后、不被其他用途占用的物理内存；
/// - 只能在一个 hart 上调用一次，重复调用是致命错误。
pub unsafe fn core_init(disk: &'static dyn BlockDevice, mem_start: usize, mem_end: usize) {
    log::info!("xv6-kcore is booting");

    KMEM.kinit(mem_start, mem_end);
    BCACHE.binit(disk);

    #[cfg(feature = "verbose_init_info")]
    log::info!(
        "kmem: {} free bytes, bcache: {:?}",
        KMEM.free_bytes(),
        BCACHE.stats()
    );

    STARTED.store(true, Ordering::SeqCst);
}

/// 主核是否已完成 [`core_init`]
pub fn core_ready() -> bool {
    STARTED.load(Ordering::SeqCst)
}
