//! RISC-V 监督模式下的实现

use core::arch::asm;
use core::cell::Cell;

use array_macro::array;
use bit_field::BitField;

use crate::consts::NCPU;
use crate::fault::{fatal, Fault};

/// sstatus 中的 SIE 位（监督模式全局中断使能）
const SSTATUS_SIE: usize = 1;

#[inline]
fn sstatus_read() -> usize {
    let ret: usize;
    unsafe { asm!("csrr {}, sstatus", out(reg) ret) };
    ret
}

#[inline]
fn sstatus_write(x: usize) {
    unsafe { asm!("csrw sstatus, {}", in(reg) x) };
}

#[inline]
fn intr_get() -> bool {
    sstatus_read().get_bit(SSTATUS_SIE)
}

#[inline]
fn intr_set(on: bool) {
    let mut x = sstatus_read();
    x.set_bit(SSTATUS_SIE, on);
    sstatus_write(x);
}

/// 每个 hart 的关中断嵌套状态
struct Cpu {
    /// `push_off` 的嵌套深度
    noff: Cell<u8>,
    /// 第一次 `push_off` 之前中断是否开启
    intena: Cell<bool>,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            noff: Cell::new(0),
            intena: Cell::new(false),
        }
    }
}

struct CpuTable([Cpu; NCPU]);

// 每个 hart 只在关中断时访问自己的表项
unsafe impl Sync for CpuTable {}

static CPUS: CpuTable = CpuTable(array![_ => Cpu::new(); NCPU]);

/// 读取 tp 寄存器中保存的 hart 编号。
///
/// 启动代码在每个 hart 上把 mhartid 写入 tp，内核态下 tp 不会被改写。
#[inline]
pub fn cpu_id() -> usize {
    let id: usize;
    unsafe { asm!("mv {}, tp", out(reg) id) };
    id
}

/// 持有自旋锁期间中断关闭，不会发生切换，因此 hart 即上下文。
#[inline]
pub fn context_id() -> usize {
    cpu_id()
}

/// 关闭中断并记录嵌套深度。
///
/// # 功能说明
/// 与 `intr_off` 类似，但支持成对嵌套：多次 `push_off` 需要相同次数的 `pop_off`
/// 才能恢复中断。如果中断原本就是关闭的，全部弹出后仍保持关闭。
pub fn push_off() {
    let old = intr_get();
    intr_set(false);
    let c = &CPUS.0[cpu_id()];
    if c.noff.get() == 0 {
        c.intena.set(old);
    }
    c.noff.set(c.noff.get() + 1);
}

/// 撤销一次 `push_off`，最外层弹出时恢复原来的中断状态。
pub fn pop_off() {
    let c = &CPUS.0[cpu_id()];
    if intr_get() || c.noff.get() == 0 {
        fatal(Fault::PopOffMismatch);
    }
    c.noff.set(c.noff.get() - 1);
    if c.noff.get() == 0 && c.intena.get() {
        intr_set(true);
    }
}

#[inline]
pub fn relax() {
    core::hint::spin_loop();
}
