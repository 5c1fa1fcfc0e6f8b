//! Cortex-M3 实现
//!
//! - [`Nvic`]：通过 NVIC 屏蔽单个中断线
//! - 单核 `critical_section` 实现：保存并恢复 PRIMASK，允许嵌套

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use cortex_m::register::primask;
use critical_section::RawRestoreState;

use super::traits::InterruptControl;

/// 外部中断号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Irq(pub u16);

// SAFETY: 中断号由调用方按芯片手册给出
unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0
    }
}

pub struct Nvic;

impl InterruptControl for Nvic {
    type Irq = Irq;

    fn disable_irq(irq: Irq) {
        NVIC::mask(irq);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    unsafe fn enable_irq(irq: Irq) {
        unsafe { NVIC::unmask(irq) };
    }

    fn is_irq_enabled(irq: Irq) -> bool {
        NVIC::is_enabled(irq)
    }
}

struct CriticalSection;
critical_section::set_impl!(CriticalSection);

unsafe impl critical_section::Impl for CriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let was_active = primask::read().is_active();
        cortex_m::interrupt::disable();
        was_active
    }

    unsafe fn release(was_active: RawRestoreState) {
        if was_active {
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}
