//! 物理页帧地址

use core::fmt;

use crate::consts::{PGSHIFT, PGSIZE};

/// 物理页帧地址封装类型
///
/// # 内存布局
/// - `#[repr(C)]` 确保C兼容内存布局
/// - 存储`usize`类型的原始物理地址
///
/// # 合法性保证
/// 由分配器交出的 `PhysAddr` 总是页对齐，并位于受管理的物理内存区间内。
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// 从原始usize值构造物理地址
    ///
    /// # 安全性
    /// 调用者必须确保`raw`指向一个可被内核直接访问的页帧。
    /// 对齐与范围由 `kfree`/`kincref` 再次检查，检查失败是致命错误。
    #[inline]
    pub const unsafe fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// 解封装获取原始物理地址
    #[inline]
    pub const fn into_raw(self) -> usize {
        self.0
    }

    #[inline]
    pub fn is_page_aligned(&self) -> bool {
        self.0 % PGSIZE == 0
    }

    /// 页帧号
    #[inline]
    pub fn page_num(&self) -> usize {
        self.0 >> PGSHIFT
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// 把整页视为字节切片
    ///
    /// # 安全性
    /// 调用者必须拥有该页帧（由 `kalloc` 返回且尚未 `kfree`），
    /// 并且没有其他引用同时访问该页。
    #[inline]
    pub unsafe fn as_page_mut<'a>(self) -> &'a mut [u8; PGSIZE] {
        &mut *(self.0 as *mut [u8; PGSIZE])
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

/// 向上取整到页边界
///
/// # 功能说明
/// 计算大于等于`address`的最小页对齐地址
#[inline]
pub const fn pg_round_up(address: usize) -> usize {
    (address + (PGSIZE - 1)) & !(PGSIZE - 1)
}

/// 向下取整到页边界
///
/// # 功能说明
/// 计算小于等于`address`的最大页对齐地址
#[inline]
pub const fn pg_round_down(address: usize) -> usize {
    address & !(PGSIZE - 1)
}
