//! 物理页帧分配器
//!
//! 受管理的物理内存按地址平均切成 `NCPU` 个分区（arena），每个分区一把自旋锁、
//! 一条空闲链表。分配优先使用当前 hart 的分区，空了再按环形顺序向其他分区借；
//! 释放时页帧总是回到其地址所属的分区，而不是释放者所在的分区。

use core::ptr;

use array_macro::array;

use crate::arch;
use crate::consts::{KALLOC_JUNK, KFREE_JUNK, NCPU, PGSIZE};
use crate::fault::{fatal, AllocError, Fault};
use crate::once::InitCell;
use crate::spinlock::SpinLock;

use super::addr::{pg_round_down, pg_round_up, PhysAddr};
use super::list::FreeList;
#[cfg(feature = "cow")]
use super::refcnt::RefTable;

pub static KMEM: Kmem = Kmem::new();

/// 分区式物理页帧分配器
pub struct Kmem {
    arenas: [SpinLock<FreeList>; NCPU],
    geometry: InitCell<Geometry>,
}

/// `kinit` 之后不再改变的内存布局
struct Geometry {
    /// 第一个可分配页帧
    base: usize,
    /// 可分配区间的结束地址（不包含）
    end: usize,
    /// 每个分区覆盖的字节数，最后一个分区另外接收剩余的页帧
    span: usize,
    #[cfg(feature = "cow")]
    refs: RefTable,
}

impl Geometry {
    fn contains(&self, raw: usize) -> bool {
        raw % PGSIZE == 0 && raw >= self.base && raw < self.end
    }

    fn arena_of(&self, raw: usize) -> usize {
        core::cmp::min((raw - self.base) / self.span, NCPU - 1)
    }

    #[cfg(feature = "cow")]
    fn index(&self, raw: usize) -> usize {
        (raw - self.base) / PGSIZE
    }
}

impl Kmem {
    pub const fn new() -> Self {
        Self {
            arenas: array![_ => SpinLock::new(FreeList::new(), "kmem"); NCPU],
            geometry: InitCell::new(),
        }
    }

    /// 初始化分配器，接管物理内存区间 `[start, end)`。
    ///
    /// # 功能说明
    /// - 启用 `cow` 时，先从区间开头切出共享计数表；
    /// - 把剩余部分按页对齐，平均分给 `NCPU` 个分区，除不尽的页归最后一个分区；
    /// - 将每一页填充 `KFREE_JUNK` 后放入其所属分区的空闲链表。
    ///
    /// # 安全性
    /// - `[start, end)` 必须是可写且不被其他任何用途占用的物理内存；
    /// - 只能调用一次，重复调用是致命错误。
    pub unsafe fn kinit(&self, start: usize, end: usize) {
        let mut cur = start;
        let end = pg_round_down(end);

        #[cfg(feature = "cow")]
        let refs = RefTable::carve(&mut cur, end.saturating_sub(pg_round_up(start)) / PGSIZE);

        let base = pg_round_up(cur);
        let npages = end.saturating_sub(base) / PGSIZE;
        let span = core::cmp::max(npages / NCPU, 1) * PGSIZE;

        let g = self.geometry.set(
            Geometry {
                base,
                end: base + npages * PGSIZE,
                span,
                #[cfg(feature = "cow")]
                refs,
            },
            "kmem",
        );

        let mut raw = g.base;
        while raw < g.end {
            self.free_frame(g, raw);
            raw += PGSIZE;
        }

        log::info!(
            "kmem: {} pages in [{:#x}, {:#x}), {} per arena",
            npages,
            g.base,
            g.end,
            span / PGSIZE
        );
        #[cfg(feature = "verbose_init_info")]
        for (id, arena) in self.arenas.iter().enumerate() {
            log::info!("kmem: arena {} holds {} pages", id, arena.lock().len());
        }
    }

    /// 分配一个物理页帧。
    ///
    /// # 流程解释
    /// - 先尝试当前 hart 的分区；
    /// - 为空则按环形顺序依次尝试之后的分区，每次只持有一把分区锁；
    /// - 取到的页帧填充 `KALLOC_JUNK`，内容对调用者没有意义。
    ///
    /// # 可能的错误
    /// 所有分区都为空时返回 [`AllocError::OutOfMemory`]。
    pub fn kalloc(&self) -> Result<PhysAddr, AllocError> {
        self.kalloc_from(arch::cpu_id())
    }

    fn kalloc_from(&self, hart: usize) -> Result<PhysAddr, AllocError> {
        self.geometry();
        for i in 0..NCPU {
            let id = (hart + i) % NCPU;
            let page = self.arenas[id].lock().pop();
            if let Some(raw) = page {
                if i != 0 {
                    log::debug!("kalloc: hart {} took a page from arena {}", hart, id);
                }
                // 安全性：页帧刚从空闲链表取出，只有当前调用者可以访问
                unsafe { ptr::write_bytes(raw as *mut u8, KALLOC_JUNK, PGSIZE) };
                return Ok(unsafe { PhysAddr::from_raw(raw) });
            }
        }
        log::warn!("kalloc: out of memory on hart {}", hart);
        Err(AllocError::OutOfMemory)
    }

    /// 释放一个物理页帧。
    ///
    /// 启用 `cow` 且页帧仍有其他共享者时，只消耗一个共享者，页帧继续保留。
    ///
    /// # 可能的错误
    /// 地址未页对齐或不在受管理区间内时触发致命错误。
    ///
    /// # 安全性
    /// 调用者必须持有该页帧，且释放后不再访问它。
    pub unsafe fn kfree(&self, pa: PhysAddr) {
        let g = self.geometry();
        let raw = pa.into_raw();
        if !g.contains(raw) {
            fatal(Fault::BadFree(raw));
        }
        #[cfg(feature = "cow")]
        if !g.refs.drop_ref(g.index(raw)) {
            return;
        }
        self.free_frame(g, raw);
    }

    unsafe fn free_frame(&self, g: &Geometry, raw: usize) {
        ptr::write_bytes(raw as *mut u8, KFREE_JUNK, PGSIZE);
        self.arenas[g.arena_of(raw)].lock().push(raw);
    }

    /// 为页帧增加一个共享者（写时复制 fork 时调用）
    #[cfg(feature = "cow")]
    pub fn kincref(&self, pa: PhysAddr) {
        let g = self.geometry();
        let raw = pa.into_raw();
        if !g.contains(raw) {
            fatal(Fault::BadRef(raw));
        }
        g.refs.add_ref(g.index(raw));
    }

    /// 除当前持有者之外的共享者数量；为 0 时写时复制缺页可以直接改写原页
    #[cfg(feature = "cow")]
    pub fn sharers(&self, pa: PhysAddr) -> u32 {
        let g = self.geometry();
        let raw = pa.into_raw();
        if !g.contains(raw) {
            fatal(Fault::BadRef(raw));
        }
        g.refs.count(g.index(raw))
    }

    /// 所有分区中的空闲页数。逐个加锁，并发下不是原子快照。
    pub fn free_pages(&self) -> usize {
        self.arenas.iter().map(|a| a.lock().len()).sum()
    }

    pub fn free_bytes(&self) -> usize {
        self.free_pages() * PGSIZE
    }

    pub fn arena_free_pages(&self, id: usize) -> usize {
        self.arenas[id].lock().len()
    }

    /// 页帧所属的分区；不在受管理区间内时返回 `None`
    pub fn arena_of(&self, pa: PhysAddr) -> Option<usize> {
        let g = self.geometry();
        let raw = pa.into_raw();
        g.contains(raw).then(|| g.arena_of(raw))
    }

    /// 受管理的页帧总数
    pub fn total_pages(&self) -> usize {
        let g = self.geometry();
        (g.end - g.base) / PGSIZE
    }

    fn geometry(&self) -> &Geometry {
        self.geometry.get_or_fault("kmem")
    }
}

impl Default for Kmem {
    fn default() -> Self {
        Self::new()
    }
}
