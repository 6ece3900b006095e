//! 平台相关的最小接口
//!
//! 核心只依赖以下几个原语：当前 hart 编号、当前执行上下文的身份、
//! 可嵌套的关中断/开中断，以及忙等待提示。
//! 裸机 RISC-V 上由寄存器实现；宿主环境（测试、模拟）下由线程局部状态实现，
//! 每个操作系统线程扮演一个运行在某个 hart 上的内核线程。

#[cfg(all(target_os = "none", target_arch = "riscv64"))]
mod riscv;
#[cfg(all(target_os = "none", target_arch = "riscv64"))]
pub use riscv::{context_id, cpu_id, pop_off, push_off, relax};

#[cfg(not(target_os = "none"))]
mod hosted;
#[cfg(not(target_os = "none"))]
pub use hosted::{bind_hart, context_id, cpu_id, pop_off, push_off, relax};

#[cfg(all(target_os = "none", not(target_arch = "riscv64")))]
compile_error!("xv6-kcore only supports bare-metal riscv64");
