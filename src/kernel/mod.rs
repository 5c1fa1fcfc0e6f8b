//! 内核：协程生命周期与定时

pub mod task;
pub mod time;
