//! # 协程
//!
//! [`Coroutine`] 独占持有一个 future，固定之后由执行器通过 [`Resumable`] 驱动。
//!
//! - 取消是同步的：future 在原地被丢弃，局部变量按声明的逆序析构，
//!   挂起点上的等待者随之脱链
//! - 正在执行时请求取消，取消推迟到本次轮询返回之后
//! - 句柄被丢弃时协程被取消
//! - 其他协程可以通过 [`Coroutine::join`] 等待它结束

use core::cell::{Cell, UnsafeCell};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use crate::sync::wait_list::{Wait, WaitList};

pub mod state;

pub use state::TaskState;

/// 执行器眼中的任务
pub trait Resumable {
    /// 执行一次，返回执行后的状态
    fn resume(self: Pin<&Self>, waker: &Waker) -> TaskState;

    fn state(&self) -> TaskState;
}

/// 协程句柄
pub struct Coroutine<F> {
    state: Cell<TaskState>,
    cancel_requested: Cell<bool>,
    future: UnsafeCell<Option<F>>,
    /// 最近一次执行时的唤醒器，外部取消后用它通知执行器
    waker: Cell<Option<Waker>>,
    joiners: WaitList<()>,
}

impl<F: Future<Output = ()>> Coroutine<F> {
    pub fn new(future: F) -> Self {
        Self {
            state: Cell::new(TaskState::Created),
            cancel_requested: Cell::new(false),
            future: UnsafeCell::new(Some(future)),
            waker: Cell::new(None),
            joiners: WaitList::new(),
        }
    }

    /// 执行到下一个挂起点
    ///
    /// 在执行过程中重入调用会被忽略，终止状态下不做任何事。
    pub fn resume(self: Pin<&Self>, waker: &Waker) -> TaskState {
        let state = self.state.get();
        if !matches!(state, TaskState::Created | TaskState::Suspended) {
            return state;
        }
        self.transition(TaskState::Running);
        self.waker.set(Some(waker.clone()));

        // SAFETY: 只有这里在 Running 状态下访问 future，重入的 resume 和 cancel 都不会触碰它
        let future = unsafe { &mut *self.future.get() };
        let poll = match future.as_mut() {
            // SAFETY: future 随协程一起固定，只会被原地丢弃
            Some(future) => unsafe { Pin::new_unchecked(future) }.poll(&mut Context::from_waker(waker)),
            None => Poll::Ready(()),
        };

        match poll {
            Poll::Ready(()) => self.teardown(TaskState::Finished),
            Poll::Pending if self.cancel_requested.get() => self.teardown(TaskState::Cancelled),
            Poll::Pending => self.transition(TaskState::Suspended),
        }
        self.state.get()
    }

    /// 等待协程结束，产出终止状态
    pub fn join(self: Pin<&Self>) -> Join<'_, F> {
        // SAFETY: 结构投影
        let joiners = unsafe { self.map_unchecked(|c| &c.joiners) };
        Join {
            coroutine: self.get_ref(),
            wait: joiners.wait(()),
        }
    }
}

impl<F> Coroutine<F> {
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state.get().is_terminal()
    }

    /// 取消协程
    ///
    /// # 返回值
    /// 协程此前是否处于未终止状态
    pub fn cancel(&self) -> bool {
        match self.state.get() {
            TaskState::Created | TaskState::Suspended => {
                self.teardown(TaskState::Cancelled);
                // 让执行器发现任务已终止并释放槽位
                if let Some(waker) = self.waker.take() {
                    waker.wake();
                }
                true
            }
            TaskState::Running => {
                self.cancel_requested.set(true);
                true
            }
            TaskState::Finished | TaskState::Cancelled => false,
        }
    }

    fn transition(&self, next: TaskState) {
        debug_assert!(self.state.get().can_transition_to(next), "非法状态转换");
        self.state.set(next);
    }

    /// 原地丢弃 future 并通知等待者
    fn teardown(&self, terminal: TaskState) {
        // 先进入终止状态，析构过程中的重入调用都会被忽略
        self.transition(terminal);
        self.cancel_requested.set(false);
        // SAFETY: 终止状态下没有其他地方访问 future；赋值会在原地析构旧值
        unsafe { *self.future.get() = None };
        if terminal == TaskState::Cancelled {
            log::debug!("协程已取消");
        }
        self.joiners.do_all();
    }
}

impl<F: Future<Output = ()>> Resumable for Coroutine<F> {
    fn resume(self: Pin<&Self>, waker: &Waker) -> TaskState {
        Coroutine::resume(self, waker)
    }

    fn state(&self) -> TaskState {
        self.state.get()
    }
}

/// 无内容的句柄，状态为 Finished
impl<F> Default for Coroutine<F> {
    fn default() -> Self {
        Self {
            state: Cell::new(TaskState::Finished),
            cancel_requested: Cell::new(false),
            future: UnsafeCell::new(None),
            waker: Cell::new(None),
            joiners: WaitList::new(),
        }
    }
}

impl<F> Drop for Coroutine<F> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// [`Coroutine::join`] 返回的 future
pub struct Join<'a, F> {
    coroutine: &'a Coroutine<F>,
    wait: Wait<'a, ()>,
}

impl<F> Future for Join<'_, F> {
    type Output = TaskState;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<TaskState> {
        // SAFETY: wait 不会被移出
        let this = unsafe { self.get_unchecked_mut() };
        let state = this.coroutine.state();
        if state.is_terminal() {
            return Poll::Ready(state);
        }
        let wait = unsafe { Pin::new_unchecked(&mut this.wait) };
        wait.poll(cx).map(|()| this.coroutine.state())
    }
}
