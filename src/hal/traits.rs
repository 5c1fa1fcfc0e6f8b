//! 硬件抽象层 Trait 定义
//!
//! 运行时本身不依赖具体架构，只需要两样东西：
//! 一个"正在独占访问"的凭证（[`Guard`]），以及屏蔽单个中断线的能力（[`InterruptControl`]）。

/// 独占访问凭证
///
/// 值存活期间，与之竞争的中断不会运行。
/// [`InterruptQueue`](crate::intrusive::InterruptQueue) 的 `*_guarded` 方法以它作为参数，
/// 以此在类型上标明调用点已经屏蔽了中断。
pub trait Guard {}

impl Guard for critical_section::CriticalSection<'_> {}

/// 单个中断线的控制
///
/// 每种架构实现一次，例如 Cortex-M 的 NVIC。
pub trait InterruptControl {
    /// 中断号类型
    type Irq: Copy;

    /// 禁用特定中断
    fn disable_irq(irq: Self::Irq);

    /// 启用特定中断
    ///
    /// # Safety
    /// 启用中断可能打破依赖该中断被屏蔽的临界区。
    unsafe fn enable_irq(irq: Self::Irq);

    /// 检查特定中断是否启用
    fn is_irq_enabled(irq: Self::Irq) -> bool;
}
