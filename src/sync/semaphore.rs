//! # 计数信号量
//!
//! 许可不足时按先来后到排队。`post` 要么把许可直接交给最早的等待者，
//! 要么在没有等待者时增加计数，两者不会同时发生。

use core::future::Future;
use core::pin::Pin;
use core::cell::Cell;
use core::task::{Context, Poll};

use super::wait_list::{Wait, WaitList};

pub struct Semaphore {
    permits: Cell<usize>,
    waiters: WaitList<()>,
}

impl Semaphore {
    /// 创建带有 `permits` 个初始许可的信号量
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: Cell::new(permits),
            waiters: WaitList::new(),
        }
    }

    /// 当前可用许可数
    pub fn available(&self) -> usize {
        self.permits.get()
    }

    /// 不等待地获取许可
    pub fn try_acquire(&self) -> bool {
        let permits = self.permits.get();
        if permits == 0 {
            return false;
        }
        self.permits.set(permits - 1);
        true
    }

    /// 获取一个许可
    ///
    /// 首次轮询时有许可则立即完成，否则排队等待。
    pub fn acquire(self: Pin<&Self>) -> Acquire<'_> {
        // SAFETY: 结构投影
        let waiters = unsafe { self.map_unchecked(|s| &s.waiters) };
        Acquire {
            semaphore: self.get_ref(),
            wait: waiters.wait(()),
            state: AcquireState::Idle,
        }
    }

    /// 获取许可并返回在析构时归还许可的守卫
    pub async fn acquire_guard(self: Pin<&Self>) -> SemaphoreGuard<'_> {
        self.acquire().await;
        SemaphoreGuard::new(self.get_ref())
    }

    /// 归还一个许可
    pub fn post(&self) {
        if !self.waiters.do_first() {
            self.permits.set(self.permits.get() + 1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireState {
    Idle,
    Waiting,
    Acquired,
}

/// [`Semaphore::acquire`] 返回的 future
pub struct Acquire<'a> {
    semaphore: &'a Semaphore,
    wait: Wait<'a, ()>,
    state: AcquireState,
}

impl Future for Acquire<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // SAFETY: wait 不会被移出
        let this = unsafe { self.get_unchecked_mut() };
        match this.state {
            AcquireState::Idle if this.semaphore.try_acquire() => {
                this.state = AcquireState::Acquired;
                return Poll::Ready(());
            }
            AcquireState::Idle => this.state = AcquireState::Waiting,
            AcquireState::Waiting => {}
            AcquireState::Acquired => panic!("Acquire 完成后被再次轮询"),
        }
        let wait = unsafe { Pin::new_unchecked(&mut this.wait) };
        let poll = wait.poll(cx);
        if poll.is_ready() {
            this.state = AcquireState::Acquired;
        }
        poll
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        // 已经交到手上的许可转交给下一个等待者
        if self.wait.resumed_unobserved() {
            self.semaphore.post();
        }
    }
}

/// 析构时归还许可
#[must_use]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a Semaphore,
}

impl<'a> SemaphoreGuard<'a> {
    /// 为已经获取的许可创建守卫
    pub fn new(semaphore: &'a Semaphore) -> Self {
        Self { semaphore }
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.post();
    }
}
