//! 手动复位事件

use core::cell::Cell;
use core::pin::Pin;

use super::wait_list::WaitList;

/// 手动复位事件
///
/// `set` 之后一直保持触发状态，直到 `reset`。
pub struct Event {
    signaled: Cell<bool>,
    waiters: WaitList<()>,
}

impl Event {
    /// 创建未触发的事件
    pub const fn new() -> Self {
        Self {
            signaled: Cell::new(false),
            waiters: WaitList::new(),
        }
    }

    /// 触发事件并恢复所有等待者
    pub fn set(&self) {
        self.signaled.set(true);
        self.waiters.do_all();
    }

    pub fn reset(&self) {
        self.signaled.set(false);
    }

    pub fn is_set(&self) -> bool {
        self.signaled.get()
    }

    /// 等待事件触发，已触发时立即完成
    pub async fn until_signaled(self: Pin<&Self>) {
        if self.is_set() {
            return;
        }
        // SAFETY: 结构投影
        let waiters = unsafe { self.map_unchecked(|e| &e.waiters) };
        waiters.wait(()).await
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}
