//! # 定时任务列表
//!
//! 按截止时间排序的等待列表。主循环周期性地调用
//! [`TimedTaskList::do_until`]，把截止时间已到的协程恢复出来；
//! 下一次需要醒来的时间由 [`TimedTaskList::first_time_or`] 给出，用于设置硬件定时器。
//!
//! 时间类型 `T` 只要求可比较、可复制，例如 tick 计数或 `core::time::Duration`。

use core::cell::Cell;
use core::future::Future;
use core::pin::{Pin, pin};
use core::task::{Context, Poll, Waker};

use crate::intrusive::list::{HasListNode, IntrusiveList, ListNode, Walker};

struct Sleeper<T> {
    node: ListNode,
    deadline: Cell<T>,
    waker: Cell<Option<Waker>>,
}

unsafe impl<T> HasListNode for Sleeper<T> {
    fn list_node(&self) -> &ListNode {
        &self.node
    }
}

/// 定时任务列表
pub struct TimedTaskList<T> {
    list: IntrusiveList<Sleeper<T>>,
}

impl<T: Ord + Copy> TimedTaskList<T> {
    pub const fn new() -> Self {
        Self {
            list: IntrusiveList::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.count()
    }

    /// 挂起到 `deadline`
    ///
    /// 首次轮询时按截止时间插入，截止时间相同的排在已有元素之后。
    pub fn sleep_until(self: Pin<&Self>, deadline: T) -> Sleep<'_, T> {
        Sleep {
            list: self,
            sleeper: Sleeper {
                node: ListNode::new(),
                deadline: Cell::new(deadline),
                waker: Cell::new(None),
            },
            state: SleepState::Idle,
        }
    }

    fn pinned_list(self: Pin<&Self>) -> Pin<&IntrusiveList<Sleeper<T>>> {
        // SAFETY: 结构投影
        unsafe { self.map_unchecked(|t| &t.list) }
    }

    /// 有序插入
    fn insert(self: Pin<&Self>, sleeper: Pin<&Sleeper<T>>) {
        let list = self.pinned_list();
        let deadline = sleeper.deadline.get();
        let anchor = list
            .iter()
            .find(|s| s.deadline.get() > deadline)
            .map(|s| s.list_node() as *const ListNode)
            .unwrap_or_else(|| list.end_anchor());
        // SAFETY: 睡眠者析构时先脱链
        unsafe { list.insert_before(anchor, sleeper) }
    }

    /// 最早的截止时间
    pub fn first_time(&self) -> Option<T> {
        self.list.front().map(|s| s.deadline.get())
    }

    /// 最早的截止时间与 `default` 中较早的一个，列表为空时为 `default`
    pub fn first_time_or(&self, default: T) -> T {
        match self.first_time() {
            Some(first) => first.min(default),
            None => default,
        }
    }

    /// 恢复截止时间不晚于 `now` 的所有睡眠者
    ///
    /// 只处理调用时已在列表中的睡眠者，返回恢复的个数。
    pub fn do_until(&self, now: T) -> usize {
        let due = self
            .list
            .iter()
            .take_while(|s| s.deadline.get() <= now)
            .count();

        let mut count = 0;
        while count < due {
            match self.list.front() {
                Some(first) if first.deadline.get() <= now => {
                    first.node.unlink();
                    if let Some(waker) = first.waker.take() {
                        waker.wake();
                    }
                    count += 1;
                }
                _ => break,
            }
        }
        if count > 0 {
            log::trace!("定时列表恢复 {} 个任务", count);
        }
        count
    }

    /// 按时间顺序访问所有截止时间
    pub fn visit_all(&self, mut visitor: impl FnMut(T)) {
        let Some(list) = self.list.pinned() else {
            return;
        };
        let mark = pin!(ListNode::new());
        let end = pin!(ListNode::new());
        let mut walker = Walker::new(list, mark.into_ref(), end.into_ref());
        while let Some(sleeper) = walker.next() {
            // SAFETY: 游标刚经过的元素是存活的睡眠者，先复制出截止时间再回调
            let deadline = unsafe { sleeper.as_ref() }.deadline.get();
            visitor(deadline);
        }
    }
}

impl<T: Ord + Copy> Default for TimedTaskList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SleepState {
    Idle,
    Linked,
    Done,
}

/// [`TimedTaskList::sleep_until`] 返回的 future
pub struct Sleep<'l, T> {
    list: Pin<&'l TimedTaskList<T>>,
    sleeper: Sleeper<T>,
    state: SleepState,
}

impl<T: Ord + Copy> Sleep<'_, T> {
    pub fn deadline(&self) -> T {
        self.sleeper.deadline.get()
    }

    /// 以新的截止时间重新计时
    ///
    /// 仍在列表中时立即按新时间重新排序，否则在下次轮询时重新插入。
    pub fn reset(self: Pin<&mut Self>, deadline: T) {
        // SAFETY: 不移动任何字段
        let this = unsafe { self.get_unchecked_mut() };
        let was_linked = this.sleeper.node.unlink();
        this.sleeper.deadline.set(deadline);
        if was_linked {
            this.list.insert(unsafe { Pin::new_unchecked(&this.sleeper) });
        } else {
            this.state = SleepState::Idle;
        }
    }
}

impl<T: Ord + Copy> Future for Sleep<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // SAFETY: 不移动任何字段
        let this = unsafe { self.get_unchecked_mut() };
        match this.state {
            SleepState::Idle => {
                this.sleeper.waker.set(Some(cx.waker().clone()));
                this.list.insert(unsafe { Pin::new_unchecked(&this.sleeper) });
                this.state = SleepState::Linked;
                Poll::Pending
            }
            SleepState::Linked if this.sleeper.node.is_linked() => {
                let waker = match this.sleeper.waker.take() {
                    Some(w) if w.will_wake(cx.waker()) => w,
                    _ => cx.waker().clone(),
                };
                this.sleeper.waker.set(Some(waker));
                Poll::Pending
            }
            SleepState::Linked => {
                this.state = SleepState::Done;
                Poll::Ready(())
            }
            SleepState::Done => panic!("Sleep 完成后被再次轮询"),
        }
    }
}
