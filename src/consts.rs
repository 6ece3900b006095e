//! 内核核心的编译期常量

/// 最大 hart 数量，同时也是物理页分区（arena）的数量
pub const NCPU: usize = 8;

/// 块缓存中缓冲块的数量
pub const NBUF: usize = 30;

/// 块缓存的分桶数，取素数可减少哈希冲突
pub const NBUCKET: usize = 13;

/// 磁盘块大小（字节）
pub const BSIZE: usize = 1024;

/// 页帧大小（字节）
pub const PGSIZE: usize = 4096;
pub const PGSHIFT: usize = 12;

/// 新分配页帧的填充字节，用于捕获对未初始化内存的读取
pub const KALLOC_JUNK: u8 = 5;

/// 被释放页帧的填充字节，用于捕获悬垂引用
pub const KFREE_JUNK: u8 = 1;
