//! # neon-coro
//!
//! 面向单片机的协作式协程运行时，库代码中不做任何堆分配。
//!
//! - [`intrusive`]: 侵入式链表与队列，包括中断与主循环共享的队列
//! - [`sync`]: 等待列表以及建立在其上的同步原语
//! - [`kernel`]: 协程生命周期与定时任务列表
//! - [`runtime`]: 执行器、唤醒器与 `select`
//! - [`hal`]: 临界区守卫与中断线控制

#![cfg_attr(not(test), no_std)]
#[cfg(test)]
extern crate std;

pub mod config;
pub mod error;
pub mod hal;
pub mod intrusive;
pub mod kernel;
pub mod runtime;
pub mod sync;

pub use error::{CoroError, Result};
pub use kernel::task::{Coroutine, Join, Resumable, TaskState};
pub use kernel::time::{Sleep, TimedTaskList};
pub use runtime::{Executor, TaskId};
