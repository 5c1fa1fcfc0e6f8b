//! 中断线保护

use core::marker::PhantomData;

use super::traits::{Guard, InterruptControl};

/// 屏蔽单个中断线的作用域保护
///
/// 构造时禁用中断线，析构时恢复到构造前的状态，因此可以嵌套。
/// 与全局临界区相比，其他中断仍然可以运行。
pub struct IrqGuard<C: InterruptControl> {
    irq: C::Irq,
    was_enabled: bool,
    _marker: PhantomData<C>,
}

impl<C: InterruptControl> IrqGuard<C> {
    pub fn new(irq: C::Irq) -> Self {
        let was_enabled = C::is_irq_enabled(irq);
        C::disable_irq(irq);
        Self {
            irq,
            was_enabled,
            _marker: PhantomData,
        }
    }
}

impl<C: InterruptControl> Guard for IrqGuard<C> {}

impl<C: InterruptControl> Drop for IrqGuard<C> {
    fn drop(&mut self) {
        if self.was_enabled {
            // SAFETY: 恢复到构造前的状态
            unsafe { C::enable_irq(self.irq) };
        }
    }
}
