//! 缓存层
//!
//! 块缓存把磁盘块缓存在固定数量的缓冲块中，并且是多个进程访问同一磁盘块时的同步点：
//! 同一时刻只有一个进程能持有某个缓冲块。
//!
//! 缓冲块按 `(dev, blockno)` 的哈希分布在 `NBUCKET` 个桶里，每个桶一把自旋锁。
//! 命中只需要锁住所在的桶；未命中时先在本桶内回收，再按环形顺序向其他桶“借”一个
//! 空闲缓冲块并把它挪进本桶。
//!
//! 使用方式：
//! * 调用 `bread` 获取某个磁盘块对应的缓冲块；
//! * 修改数据后调用 `Buf::bwrite` 写回磁盘；
//! * 用完后丢弃 `Buf`，即释放缓冲块；
//! * 不要长时间持有缓冲块。

use array_macro::array;
use arrayvec::ArrayVec;

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::consts::{BSIZE, NBUCKET, NBUF};
use crate::driver::BlockDevice;
use crate::fault::{fatal, Fault};
use crate::once::InitCell;
use crate::sleeplock::{SleepLock, SleepLockGuard};
use crate::spinlock::{SpinLock, SpinLockGuard};

pub static BCACHE: Bcache = Bcache::new();

/// 全局缓冲区缓存（Buffer Cache）结构体，用于块设备的读写缓存。
///
/// `Bcache` 提供了一个固定大小的内存缓冲区池，用于缓存磁盘块数据，
/// 以减少重复的磁盘访问。缓冲块的元数据分散在多个桶中，每个桶由各自的自旋锁保护；
/// 缓冲块的数据由各自的睡眠锁保护。
///
/// 该结构在内核初始化阶段通过 [`Bcache::binit`] 初始化一次，之后贯穿整个运行期间。
pub struct Bcache {
    /// 串行化跨桶窃取。
    ///
    /// 只有持有该锁的上下文才会同时持有两个桶锁（先本桶、后供给桶），
    /// 其余路径任何时刻最多持有一个桶锁，因此不会形成环路等待。
    evict: SpinLock<()>,

    /// 分桶后的缓冲块元数据
    buckets: [SpinLock<Bucket>; NBUCKET],

    /// 缓冲块数组，下标与 `BufCtrl::index` 对应
    bufs: [BufInner; NBUF],

    /// 缓存所使用的块设备，在 `binit` 时安装
    disk: InitCell<&'static dyn BlockDevice>,
}

impl Bcache {
    pub const fn new() -> Self {
        Self {
            evict: SpinLock::new((), "bcache.evict"),
            buckets: array![_ => SpinLock::new(Bucket::new(), "bcache.bucket"); NBUCKET],
            bufs: array![_ => BufInner::new(); NBUF],
            disk: InitCell::new(),
        }
    }

    /// 初始化缓冲区缓存。
    ///
    /// # 功能说明
    /// 把全部缓冲块按轮转方式分配到各个桶中（初始时都没有绑定磁盘块，且都可回收），
    /// 并安装底层块设备。只能在启动时调用一次，重复调用是致命错误。
    pub fn binit(&self, disk: &'static dyn BlockDevice) {
        for index in 0..NBUF {
            let mut bucket = self.buckets[index % NBUCKET].lock();
            bucket.lru.push(BufCtrl::new(index));
            bucket.avail += 1;
        }
        self.disk.set(disk, "bcache");

        log::info!("bcache: {} buffers of {} bytes in {} buckets", NBUF, BSIZE, NBUCKET);
    }

    /// 获取指定设备与块号对应的缓冲块，并持有其睡眠锁。
    ///
    /// # 功能说明
    /// 若缓存命中，则增加引用计数后返回已存在的缓冲块；否则回收一个引用计数为 0 的缓冲块，
    /// 绑定到新的 `(dev, blockno)` 并清除其有效位。该函数不访问磁盘，
    /// 调用者需通过有效位判断是否需要从磁盘加载（见 [`Bcache::bread`]）。
    ///
    /// # 流程解释
    /// - 只锁住本桶查找，命中则直接返回；
    /// - 未命中时仍在同一次加锁内按 LRU 顺序回收本桶的空闲缓冲块；
    /// - 本桶没有空闲缓冲块时才获取 `evict` 锁，重新锁住本桶并再次查找和回收，
    ///   因为在两次加锁之间可能有其他上下文已经装入了同一个块或释放了缓冲块；
    /// - 再从本桶之后的桶开始按环形顺序逐个锁住供给桶，
    ///   取出其中最久未使用的空闲缓冲块，挪入本桶；
    /// - 释放所有自旋锁之后才获取睡眠锁（可能休眠）。
    ///
    /// # 可能的错误
    /// 所有缓冲块都处于被引用状态时触发致命错误 `"bget: no buffers"`。
    pub fn bget(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let id = BlockId { dev, blockno };
        let home = id.bucket();

        let mut bucket = self.buckets[home].lock();
        if let Some(index) = bucket.find_cached(id) {
            drop(bucket);
            log::trace!("bget: hit dev {} blockno {}", dev, blockno);
            return self.hold(index, id);
        }
        if let Some(index) = self.recycle(&mut bucket, id) {
            drop(bucket);
            log::trace!("bget: miss dev {} blockno {} -> buffer {}", dev, blockno, index);
            return self.hold(index, id);
        }
        drop(bucket);

        let evict = self.evict.lock();
        let mut bucket = self.buckets[home].lock();
        let index = match bucket.find_cached(id) {
            Some(index) => index,
            None => match self.recycle(&mut bucket, id) {
                Some(index) => index,
                None => self.steal(home, &mut bucket, id),
            },
        };
        drop(bucket);
        drop(evict);

        log::trace!("bget: miss dev {} blockno {} -> buffer {}", dev, blockno, index);
        self.hold(index, id)
    }

    /// 在本桶内回收并清除有效位，调用者持有本桶锁
    fn recycle(&self, bucket: &mut Bucket, id: BlockId) -> Option<usize> {
        let index = bucket.recycle(id)?;
        self.bufs[index].valid.store(false, Ordering::Relaxed);
        Some(index)
    }

    /// 从其他桶借一个空闲缓冲块放入本桶，并绑定到 `id`。
    ///
    /// 调用者持有 `evict` 锁和本桶锁；供给桶锁每次只持有一把。
    fn steal(&self, home: usize, bucket: &mut SpinLockGuard<'_, Bucket>, id: BlockId) -> usize {
        for i in 1..NBUCKET {
            let donor = (home + i) % NBUCKET;
            let mut other = self.buckets[donor].lock();
            if let Some(mut ctrl) = other.take_free() {
                drop(other);
                let index = ctrl.index;
                ctrl.bind(id);
                self.bufs[index].valid.store(false, Ordering::Relaxed);
                bucket.lru.push(ctrl);
                log::debug!("bget: buffer {} moved from bucket {} to bucket {}", index, donor, home);
                return index;
            }
        }
        fatal(Fault::NoBuffers)
    }

    fn hold(&self, index: usize, id: BlockId) -> Buf<'_> {
        Buf {
            cache: self,
            index,
            dev: id.dev,
            blockno: id.blockno,
            data: Some(self.bufs[index].data.lock()),
        }
    }

    /// 从缓冲区缓存中读取指定设备与块号对应的数据。
    ///
    /// 若缓冲块尚未从磁盘加载（有效位为 false），则同步读取一次并置有效位。
    /// 返回的缓冲块仍由调用者独占持有。
    pub fn bread(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let mut b = self.bget(dev, blockno);
        if !self.bufs[b.index].valid.load(Ordering::Relaxed) {
            self.disk().rw(&mut b, false);
            self.bufs[b.index].valid.store(true, Ordering::Relaxed);
        }
        b
    }

    /// 释放一次引用；引用计数归零时缓冲块重新变为可回收，并移到本桶的最近使用端。
    fn brelse(&self, index: usize, id: BlockId) {
        self.buckets[id.bucket()].lock().release(index);
    }

    fn disk(&self) -> &'static dyn BlockDevice {
        *self.disk.get_or_fault("bcache")
    }

    /// 逐桶统计缓冲块的使用情况。
    ///
    /// 每次只锁一个桶，因此在并发修改下得到的不是原子快照；
    /// 在没有进行中的 `bget`/`brelse` 时，`free + in_use == total` 恒成立。
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total: 0,
            free: 0,
            in_use: 0,
            consistent: true,
        };
        for (i, bucket) in self.buckets.iter().enumerate() {
            let bucket = bucket.lock();
            let free = bucket.lru.iter().filter(|b| b.refcnt == 0).count();
            stats.total += bucket.lru.len();
            stats.free += free;
            stats.in_use += bucket.lru.len() - free;
            stats.consistent &= free == bucket.avail;
            stats.consistent &= bucket
                .lru
                .iter()
                .all(|b| b.id.map_or(true, |id| id.bucket() == i));
        }
        stats
    }
}

impl Default for Bcache {
    fn default() -> Self {
        Self::new()
    }
}

/// 缓冲区缓存的统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// 缓冲块总数，始终等于 `NBUF`
    pub total: usize,
    /// 引用计数为 0 的缓冲块数量
    pub free: usize,
    /// 引用计数大于 0 的缓冲块数量
    pub in_use: usize,
    /// 每个桶的 `avail` 计数与其实际空闲数一致，且已绑定的缓冲块都位于其哈希桶中
    pub consistent: bool,
}

/// 缓冲块数据的包装结构，表示一个已分配的磁盘块缓存实体。
///
/// `Buf` 代表一个特定 `(dev, blockno)` 的缓冲块，持有对其数据的独占访问权限
/// （由 `SleepLockGuard` 保护），并在生命周期结束时自动释放：
/// 先释放睡眠锁，再减少引用计数。
pub struct Buf<'a> {
    cache: &'a Bcache,

    /// 缓冲块在 `Bcache::bufs` 中的下标
    index: usize,

    dev: u32,

    blockno: u32,

    /// 在 `Buf` 生命周期内始终为 `Some`，只在 `Drop` 中被提前取走，
    /// 以便先释放睡眠锁再更新元数据。
    data: Option<SleepLockGuard<'a, BufData>>,
}

impl<'a> Buf<'a> {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn blockno(&self) -> u32 {
        self.blockno
    }

    /// 将缓冲区内容同步写回磁盘。
    ///
    /// # 可能的错误
    /// 调用者必须持有该缓冲块的睡眠锁，否则触发致命错误。
    pub fn bwrite(&mut self) {
        if self.data.is_none() || !self.cache.bufs[self.index].data.holding() {
            fatal(Fault::WriteUnlocked(self.index));
        }
        self.cache.disk().rw(self, true);
    }

    /// 提供指向缓冲区数据的原始常量指针，供上层把块内容解释为磁盘结构。
    pub fn raw_data(&self) -> *const BufData {
        &**self
    }

    /// 提供指向缓冲区数据的原始可变指针。
    pub fn raw_data_mut(&mut self) -> *mut BufData {
        &mut **self
    }

    /// 将当前缓冲块的引用计数加一，表示“钉住”该块，防止其被回收。
    ///
    /// # 功能说明
    /// 被钉住的缓冲块在释放睡眠锁之后仍然常驻缓存，直到对应的 `unpin`。
    /// 常用于多步操作期间保护某个块（例如日志提交前的数据块）。
    pub fn pin(&self) {
        let mut bucket = self.cache.buckets[self.id().bucket()].lock();
        bucket.ctrl_mut(self.index).refcnt += 1;
    }

    /// 将当前缓冲块的引用计数减一，撤销一次 `pin`。
    ///
    /// # 可能的错误
    /// 引用计数不能因此降到当前持有者自身的那一次引用以下，否则触发致命错误。
    pub fn unpin(&self) {
        let mut bucket = self.cache.buckets[self.id().bucket()].lock();
        let ctrl = bucket.ctrl_mut(self.index);
        if ctrl.refcnt <= 1 {
            fatal(Fault::UnpinUnderflow(self.index));
        }
        ctrl.refcnt -= 1;
    }

    fn id(&self) -> BlockId {
        BlockId {
            dev: self.dev,
            blockno: self.blockno,
        }
    }
}

impl<'a> Deref for Buf<'a> {
    type Target = BufData;

    fn deref(&self) -> &BufData {
        match self.data.as_ref() {
            Some(guard) => &**guard,
            None => fatal(Fault::WriteUnlocked(self.index)),
        }
    }
}

impl<'a> DerefMut for Buf<'a> {
    fn deref_mut(&mut self) -> &mut BufData {
        match self.data.as_mut() {
            Some(guard) => &mut **guard,
            None => fatal(Fault::WriteUnlocked(self.index)),
        }
    }
}

impl<'a> Drop for Buf<'a> {
    fn drop(&mut self) {
        drop(self.data.take());
        self.cache.brelse(self.index, self.id());
    }
}

/// 缓存键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockId {
    dev: u32,
    blockno: u32,
}

impl BlockId {
    /// 键所属的桶
    fn bucket(&self) -> usize {
        (self.dev as usize).wrapping_add(self.blockno as usize) % NBUCKET
    }
}

/// 一个桶：按释放时间排序的缓冲块控制信息，以及其中空闲缓冲块的数量。
///
/// `lru` 中越靠前的缓冲块越久未被使用，回收从前往后查找；
/// 引用计数归零的缓冲块被移到末尾。
struct Bucket {
    lru: ArrayVec<BufCtrl, NBUF>,

    /// 本桶中引用计数为 0 的缓冲块数量
    avail: usize,
}

impl Bucket {
    const fn new() -> Self {
        Self {
            lru: ArrayVec::new_const(),
            avail: 0,
        }
    }

    /// 查找已缓存的块，命中则增加引用计数并返回缓冲块下标。
    fn find_cached(&mut self, id: BlockId) -> Option<usize> {
        let ctrl = self.lru.iter_mut().find(|b| b.id == Some(id))?;
        if ctrl.refcnt == 0 {
            self.avail -= 1;
        }
        ctrl.refcnt += 1;
        Some(ctrl.index)
    }

    /// 在本桶内回收最久未使用的空闲缓冲块并绑定到 `id`。
    fn recycle(&mut self, id: BlockId) -> Option<usize> {
        if self.avail == 0 {
            return None;
        }
        let ctrl = self.lru.iter_mut().find(|b| b.refcnt == 0)?;
        ctrl.bind(id);
        self.avail -= 1;
        Some(ctrl.index)
    }

    /// 取出最久未使用的空闲缓冲块，供其他桶使用。
    fn take_free(&mut self) -> Option<BufCtrl> {
        if self.avail == 0 {
            return None;
        }
        let pos = self.lru.iter().position(|b| b.refcnt == 0)?;
        self.avail -= 1;
        Some(self.lru.remove(pos))
    }

    /// 减少引用计数；归零时计入空闲并移到最近使用端。
    fn release(&mut self, index: usize) {
        let pos = self.position(index);
        let ctrl = &mut self.lru[pos];
        ctrl.refcnt -= 1;
        if ctrl.refcnt == 0 {
            self.avail += 1;
            let ctrl = self.lru.remove(pos);
            self.lru.push(ctrl);
        }
    }

    fn ctrl_mut(&mut self, index: usize) -> &mut BufCtrl {
        let pos = self.position(index);
        &mut self.lru[pos]
    }

    /// 已被引用的缓冲块一定位于其键的哈希桶中
    fn position(&self, index: usize) -> usize {
        match self.lru.iter().position(|b| b.index == index) {
            Some(pos) => pos,
            None => fatal(Fault::BufferLost(index)),
        }
    }
}

/// 缓冲块控制结构，记录缓冲块绑定的磁盘块与引用计数。
struct BufCtrl {
    /// 绑定的磁盘块，从未使用过的缓冲块为 `None`
    id: Option<BlockId>,

    /// 当前持有或钉住该缓冲块的次数，为 0 时可被回收
    refcnt: usize,

    /// 在 `Bcache::bufs` 中的下标
    index: usize,
}

impl BufCtrl {
    const fn new(index: usize) -> Self {
        Self {
            id: None,
            refcnt: 0,
            index,
        }
    }

    fn bind(&mut self, id: BlockId) {
        self.id = Some(id);
        self.refcnt = 1;
    }
}

/// 缓冲块的数据部分：块内容及其有效位。
struct BufInner {
    /// 数据是否已反映磁盘内容。
    ///
    /// 在持有所在桶的自旋锁（回收时清除）或数据睡眠锁（读取后设置）时才修改。
    valid: AtomicBool,

    data: SleepLock<BufData>,
}

impl BufInner {
    const fn new() -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new(BufData::new(), "buffer"),
        }
    }
}

/// BufData 的对齐方式应足以满足可能由此结构体转换而来的其他结构体的需求。
#[repr(C, align(8))]
pub struct BufData([u8; BSIZE]);

impl BufData {
    const fn new() -> Self {
        Self([0; BSIZE])
    }
}

impl Deref for BufData {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &[u8; BSIZE] {
        &self.0
    }
}

impl DerefMut for BufData {
    fn deref_mut(&mut self) -> &mut [u8; BSIZE] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::RamDisk;
    use std::boxed::Box;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::sync::mpsc;
    use std::time::Duration;
    use std::vec;
    use std::vec::Vec;

    const NBLOCKS: usize = 512;

    fn setup() -> (&'static Bcache, &'static RamDisk) {
        let storage = Vec::leak(vec![[0u8; BSIZE]; NBLOCKS]);
        let disk: &'static RamDisk = Box::leak(Box::new(RamDisk::new(storage)));
        let cache: &'static Bcache = Box::leak(Box::new(Bcache::new()));
        cache.binit(disk);
        (cache, disk)
    }

    /// 落在 0 号桶中的第 k 个块号
    fn bucket0_block(k: u32) -> u32 {
        k * NBUCKET as u32
    }

    #[test]
    fn binit_spreads_buffers() {
        let (cache, _) = setup();
        let stats = cache.stats();
        assert_eq!(stats.total, NBUF);
        assert_eq!(stats.free, NBUF);
        assert_eq!(stats.in_use, 0);
        assert!(stats.consistent);
    }

    #[test]
    fn bread_loads_once_and_caches() {
        let (cache, disk) = setup();
        let b = cache.bread(1, 7);
        assert_eq!((b.dev(), b.blockno()), (1, 7));
        drop(b);
        let b = cache.bread(1, 7);
        drop(b);
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn write_back_then_read_sees_data_without_disk_read() {
        let (cache, disk) = setup();
        let mut b = cache.bread(0, 3);
        b[0] = 0xab;
        b[BSIZE - 1] = 0xcd;
        b.bwrite();
        drop(b);
        assert_eq!(disk.writes(), 1);
        disk.peek(3, |data| assert_eq!((data[0], data[BSIZE - 1]), (0xab, 0xcd)));

        let b = cache.bread(0, 3);
        assert_eq!((b[0], b[BSIZE - 1]), (0xab, 0xcd));
        drop(b);
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn evicted_block_is_reloaded_from_disk() {
        let (cache, disk) = setup();
        let mut b = cache.bread(0, 5);
        b[10] = 42;
        b.bwrite();
        drop(b);

        // 用其他块把缓存整个翻一遍
        for blockno in 100..100 + NBUF as u32 {
            drop(cache.bread(0, blockno));
        }
        let reads = disk.reads();

        let b = cache.bread(0, 5);
        assert_eq!(b[10], 42);
        drop(b);
        assert_eq!(disk.reads(), reads + 1);
    }

    #[test]
    fn recycled_buffer_is_invalidated() {
        let (cache, disk) = setup();
        let mut b = cache.bget(0, 9);
        b[0] = 77;
        drop(b);
        for blockno in 200..200 + NBUF as u32 {
            drop(cache.bread(0, blockno));
        }
        let b = cache.bread(0, 9);
        assert_eq!(b[0], 0, "stale contents must not survive eviction");
        drop(b);
        assert!(disk.reads() > NBUF);
    }

    #[test]
    fn pinned_buffer_is_never_evicted() {
        let (cache, disk) = setup();
        let b = cache.bread(0, 1);
        b.pin();
        drop(b);

        // 只剩 NBUF - 1 个可回收的缓冲块
        let held: Vec<_> = (100..100 + NBUF as u32 - 1)
            .map(|blockno| cache.bread(0, blockno))
            .collect();
        assert!(held.iter().all(|b| b.blockno() != 1));
        let stats = cache.stats();
        assert_eq!(stats.in_use, NBUF);
        assert_eq!(stats.free, 0);
        drop(held);

        let reads = disk.reads();
        let b = cache.bread(0, 1);
        assert_eq!(disk.reads(), reads, "pinned block must still be cached");
        b.unpin();
        drop(b);
        assert_eq!(cache.stats().free, NBUF);
    }

    #[test]
    fn bwrite_from_non_holder_is_fatal() {
        let (cache, disk) = setup();
        let b = cache.bread(0, 4);
        let res = thread::spawn(move || {
            let mut b = b;
            b.bwrite();
        })
        .join();

        let msg = res
            .unwrap_err()
            .downcast::<std::string::String>()
            .map(|m| *m)
            .unwrap_or_default();
        assert!(msg.contains("bwrite"), "unexpected panic: {}", msg);
        assert_eq!(disk.writes(), 0);

        // 恐慌路径上缓冲块也被正确释放
        let stats = cache.stats();
        assert_eq!(stats.free, NBUF);
        assert!(stats.consistent);
    }

    #[test]
    fn local_recycle_does_not_wait_for_cross_bucket_steals() {
        let (cache, _) = setup();
        let evict = cache.evict.lock();

        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let b = cache.bread(0, 5);
            tx.send(b.blockno()).unwrap();
        });
        let got = rx.recv_timeout(Duration::from_secs(10));

        drop(evict);
        reader.join().unwrap();
        assert_eq!(got, Ok(5));
    }

    #[test]
    #[should_panic(expected = "bcache: buffer 3 not in its bucket")]
    fn buffer_missing_from_its_bucket_is_fatal() {
        let bucket = Bucket::new();
        bucket.position(3);
    }

    #[test]
    #[should_panic(expected = "bunpin")]
    fn unpin_without_pin_is_fatal() {
        let (cache, _) = setup();
        let b = cache.bread(0, 1);
        b.unpin();
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn exhausted_pool_is_fatal() {
        let (cache, _) = setup();
        let _held: Vec<_> = (0..NBUF as u32).map(|blockno| cache.bget(0, blockno)).collect();
        let _ = cache.bget(0, NBUF as u32);
    }

    #[test]
    fn conservation_holds_while_buffers_are_held() {
        let (cache, _) = setup();
        let held: Vec<_> = (0..10).map(|blockno| cache.bread(2, blockno)).collect();
        let stats = cache.stats();
        assert_eq!(stats.in_use, 10);
        assert_eq!(stats.free + stats.in_use, NBUF);
        assert!(stats.consistent);
        drop(held);
        let stats = cache.stats();
        assert_eq!(stats.free, NBUF);
        assert!(stats.consistent);
    }

    #[test]
    fn one_bucket_borrows_from_all_others() {
        let (cache, _) = setup();
        let barrier = Barrier::new(20);

        thread::scope(|s| {
            for k in 0..20 {
                let barrier = &barrier;
                s.spawn(move || {
                    let b = cache.bread(0, bucket0_block(k));
                    assert_eq!(b.blockno(), bucket0_block(k));
                    barrier.wait();
                    drop(b);
                });
            }
        });

        let stats = cache.stats();
        assert_eq!(stats.free, NBUF);
        assert!(stats.consistent);
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn one_bucket_faults_when_too_few_free() {
        let (cache, _) = setup();
        // 占住 11 个不在 0 号桶中的缓冲块，只剩 19 个可回收
        let _others: Vec<_> = (1..=11u32).map(|blockno| cache.bread(0, blockno)).collect();
        let _bucket0: Vec<_> = (0..20).map(|k| cache.bread(0, bucket0_block(k))).collect();
    }

    #[test]
    fn holders_of_one_block_are_serialized() {
        let (cache, disk) = setup();
        let in_cs = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let mut b = cache.bread(3, 11);
                        assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                        let n = u32::from_le_bytes(b[..4].try_into().unwrap()) + 1;
                        b[..4].copy_from_slice(&n.to_le_bytes());
                        thread::yield_now();
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        let b = cache.bread(3, 11);
        assert_eq!(u32::from_le_bytes(b[..4].try_into().unwrap()), 600);
        drop(b);
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn concurrent_mixed_workload_conserves_buffers() {
        let (cache, _) = setup();
        thread::scope(|s| {
            for t in 0..8u32 {
                s.spawn(move || {
                    for i in 0..200u32 {
                        let blockno = (t * 7 + i * 3) % 64;
                        let mut b = cache.bread(0, blockno);
                        if i % 5 == 0 {
                            b[0] = blockno as u8;
                            b.bwrite();
                        }
                    }
                });
            }
        });
        let stats = cache.stats();
        assert_eq!(stats.total, NBUF);
        assert_eq!(stats.free, NBUF);
        assert!(stats.consistent);
    }
}
