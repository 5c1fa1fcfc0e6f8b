//! 硬件抽象层 (HAL)
//!
//! 提供与底层硬件交互的抽象接口。

pub mod guard;
pub mod traits;

#[cfg(all(feature = "cortex_m3", not(test), target_arch = "arm"))]
pub mod cortex_m3;

pub use guard::IrqGuard;
pub use traits::*;
