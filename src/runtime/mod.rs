//! # 异步运行时模块
//!
//! 执行器、唤醒器以及组合等待。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use neon_coro::runtime::Executor;
//!
//! let mut executor = Executor::new()?;
//! executor.spawn(task.as_ref())?;
//!
//! loop {
//!     executor.run_until_idle();
//! }
//! ```

pub mod executor;
pub mod select;
pub mod waker;

pub use executor::Executor;
pub use select::{Either, Either3, Either4, Select2, Select3, Select4, select2, select3, select4};
pub use waker::{TaskId, TaskWaker};
