//! 侵入式容器
//!
//! 节点嵌入在元素内部，容器本身不分配内存。

pub mod interrupt;
pub mod list;
pub mod mpsc;
pub mod queue;

pub use interrupt::{InterruptQueue, PopResult, RemoveResult};
pub use list::{HasListNode, IntrusiveList, ListNode};
pub use mpsc::IntrusiveMpscQueue;
pub use queue::{HasQueueNode, IntrusiveQueue, QueueNode};
