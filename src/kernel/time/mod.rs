pub mod timed_list;

pub use timed_list::{Sleep, TimedTaskList};
