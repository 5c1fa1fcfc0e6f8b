pub mod barrier;
pub mod event;
pub mod semaphore;
pub mod wait_list;

// 重新导出常用类型
pub use barrier::Barrier;
pub use event::Event;
pub use semaphore::{Acquire, Semaphore, SemaphoreGuard};
pub use wait_list::{Wait, WaitList};
