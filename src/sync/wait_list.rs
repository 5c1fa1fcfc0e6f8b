//! # 等待列表
//!
//! 协程在等待列表上挂起，由驱动或其他协程恢复。每个等待者携带参数 `P`，
//! 恢复方可以按参数挑选要恢复的等待者，也可以通过参数把数据交还给等待者。
//!
//! ```text
//! 协程:   let p = list.wait(p).await;      ──>  链接到列表，挂起
//! 恢复方: list.do_first_if(|p| ...);         ──>  脱链，唤醒，协程得到 p
//! ```
//!
//! 等待者在首次轮询时才链接到列表，未完成的 [`Wait`] 被丢弃时自动脱链。
//! 等待列表只在主循环中使用，中断中需要恢复协程时通过唤醒器把任务送回就绪队列。

use core::cell::Cell;
use core::future::Future;
use core::pin::{Pin, pin};
use core::task::{Context, Poll, Waker};

use crate::intrusive::list::{HasListNode, IntrusiveList, ListNode, Walker};

struct Waiter<P> {
    node: ListNode,
    waker: Cell<Option<Waker>>,
    /// 恢复方在谓词执行期间会暂时取走参数
    params: Cell<Option<P>>,
}

unsafe impl<P> HasListNode for Waiter<P> {
    fn list_node(&self) -> &ListNode {
        &self.node
    }
}

impl<P> Waiter<P> {
    /// 脱链并唤醒，唤醒器先取出再调用
    fn resume(&self) {
        self.node.unlink();
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// 等待列表
pub struct WaitList<P> {
    list: IntrusiveList<Waiter<P>>,
    /// 正在执行恢复操作
    busy: Cell<bool>,
}

/// 恢复操作期间置位 `busy`
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<P> WaitList<P> {
    pub const fn new() -> Self {
        Self {
            list: IntrusiveList::new(),
            busy: Cell::new(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// 等待者个数，O(n)
    pub fn len(&self) -> usize {
        self.list.count()
    }

    /// 挂起当前协程，直到被恢复
    ///
    /// 返回的 future 完成时产出（可能已被恢复方修改的）参数。
    pub fn wait(self: Pin<&Self>, params: P) -> Wait<'_, P> {
        Wait {
            list: self,
            waiter: Waiter {
                node: ListNode::new(),
                waker: Cell::new(None),
                params: Cell::new(Some(params)),
            },
            state: WaitState::Idle,
        }
    }

    fn enter(&self) -> BusyGuard<'_> {
        assert!(!self.busy.replace(true), "不能在谓词中恢复同一个等待列表");
        BusyGuard(&self.busy)
    }

    /// 恢复最早的等待者
    ///
    /// # 返回值
    /// 是否恢复了等待者
    pub fn do_first(&self) -> bool {
        let _busy = self.enter();
        match self.list.pop_front() {
            Some(waiter) => {
                waiter.resume();
                true
            }
            None => false,
        }
    }

    /// 恢复全部等待者
    ///
    /// 只影响调用时已在列表中的等待者，返回恢复的个数。
    pub fn do_all(&self) -> usize {
        let _busy = self.enter();
        let Some(list) = self.list.pinned() else {
            return 0;
        };
        // 先整体摘到临时列表，期间新加入的等待者留在原列表
        let pending = pin!(IntrusiveList::<Waiter<P>>::new());
        let pending = pending.into_ref();
        pending.append(list.get_ref());

        let mut count = 0;
        while let Some(waiter) = pending.pop_front() {
            waiter.resume();
            count += 1;
        }
        count
    }

    /// 恢复第一个参数满足谓词的等待者
    ///
    /// 谓词通过 `&mut P` 可以把数据交还给等待者。
    ///
    /// # Panics
    /// 在谓词中调用同一列表的恢复操作。
    pub fn do_first_if(&self, mut predicate: impl FnMut(&mut P) -> bool) -> bool {
        let mut resumed = false;
        self.walk(|params| {
            let accept = predicate(params);
            resumed = accept;
            (accept, !accept)
        });
        resumed
    }

    /// 恢复所有参数满足谓词的等待者，返回恢复的个数
    pub fn do_all_if(&self, mut predicate: impl FnMut(&mut P) -> bool) -> usize {
        let mut count = 0;
        self.walk(|params| {
            let accept = predicate(params);
            count += accept as usize;
            (accept, true)
        });
        count
    }

    /// 按顺序访问所有等待者的参数，不恢复任何等待者
    pub fn visit_all(&self, mut visitor: impl FnMut(&P)) {
        self.walk(|params| {
            visitor(params);
            (false, true)
        });
    }

    /// 以游标遍历等待者
    ///
    /// `step` 返回（是否恢复，是否继续）。参数在回调期间从等待者中取出，
    /// 回调中等待者被丢弃时参数随之丢弃。
    fn walk(&self, mut step: impl FnMut(&mut P) -> (bool, bool)) {
        let _busy = self.enter();
        let Some(list) = self.list.pinned() else {
            return;
        };
        let mark = pin!(ListNode::new());
        let end = pin!(ListNode::new());
        let mut walker = Walker::new(list, mark.into_ref(), end.into_ref());

        while let Some(waiter) = walker.next() {
            // SAFETY: 游标刚经过的元素是存活的等待者
            let Some(mut params) = (unsafe { waiter.as_ref() }).params.take() else {
                continue;
            };
            let (resume, proceed) = step(&mut params);
            if !walker.current_linked() {
                continue;
            }
            // SAFETY: 仍在游标之前，说明回调期间没有脱链或释放
            let waiter = unsafe { waiter.as_ref() };
            waiter.params.set(Some(params));
            if resume {
                waiter.resume();
            }
            if !proceed {
                break;
            }
        }
    }
}

impl<P> Default for WaitList<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    /// 尚未轮询
    Idle,
    /// 已链接到列表
    Linked,
    /// 已产出参数
    Done,
}

/// [`WaitList::wait`] 返回的 future
pub struct Wait<'l, P> {
    list: Pin<&'l WaitList<P>>,
    waiter: Waiter<P>,
    state: WaitState,
}

impl<P> Wait<'_, P> {
    /// 已被恢复，但结果还没有被轮询取走
    pub fn resumed_unobserved(&self) -> bool {
        self.state == WaitState::Linked && !self.waiter.node.is_linked()
    }
}

impl<P> Future for Wait<'_, P> {
    type Output = P;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<P> {
        // SAFETY: 不移动任何字段，waiter 随 Wait 一起固定
        let this = unsafe { self.get_unchecked_mut() };
        match this.state {
            WaitState::Idle => {
                this.waiter.waker.set(Some(cx.waker().clone()));
                let list = unsafe { this.list.map_unchecked(|l| &l.list) };
                // SAFETY: 等待者析构时先脱链，列表中不会留下悬空节点
                unsafe { list.add(Pin::new_unchecked(&this.waiter)) };
                this.state = WaitState::Linked;
                Poll::Pending
            }
            WaitState::Linked if this.waiter.node.is_linked() => {
                let waker = this.waiter.waker.take();
                let waker = match waker {
                    Some(w) if w.will_wake(cx.waker()) => w,
                    _ => cx.waker().clone(),
                };
                this.waiter.waker.set(Some(waker));
                Poll::Pending
            }
            WaitState::Linked => {
                this.state = WaitState::Done;
                match this.waiter.params.take() {
                    Some(params) => Poll::Ready(params),
                    None => unreachable!("等待者参数缺失"),
                }
            }
            WaitState::Done => panic!("Wait 完成后被再次轮询"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use std::vec::Vec;

    fn poll_once<F: Future>(future: Pin<&mut F>) -> Poll<F::Output> {
        future.poll(&mut Context::from_waker(Waker::noop()))
    }

    #[test]
    fn test_do_first_fifo() {
        let list = pin!(WaitList::<u32>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait(1));
        let mut b = pin!(list.wait(2));

        // 首次轮询前不在列表中
        assert!(list.is_empty());
        assert!(poll_once(a.as_mut()).is_pending());
        assert!(poll_once(b.as_mut()).is_pending());
        assert_eq!(list.len(), 2);

        assert!(list.do_first());
        assert_eq!(poll_once(a.as_mut()), Poll::Ready(1));
        assert!(poll_once(b.as_mut()).is_pending());
        assert!(list.do_first());
        assert!(!list.do_first());
        assert_eq!(poll_once(b.as_mut()), Poll::Ready(2));
    }

    #[test]
    fn test_do_first_if_hands_back_data() {
        let list = pin!(WaitList::<(u32, u32)>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait((1, 0)));
        let mut b = pin!(list.wait((2, 0)));
        let _ = poll_once(a.as_mut());
        let _ = poll_once(b.as_mut());

        assert!(!list.do_first_if(|p| p.0 == 3));
        assert!(list.do_first_if(|p| {
            if p.0 == 2 {
                p.1 = 42;
                true
            } else {
                false
            }
        }));
        assert_eq!(poll_once(b.as_mut()), Poll::Ready((2, 42)));
        assert!(poll_once(a.as_mut()).is_pending());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_do_all_only_present_waiters() {
        let list = pin!(WaitList::<()>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait(()));
        let mut b = pin!(list.wait(()));
        let _ = poll_once(a.as_mut());
        let _ = poll_once(b.as_mut());

        assert_eq!(list.do_all(), 2);
        assert!(list.is_empty());
        assert_eq!(list.do_all(), 0);
        assert!(poll_once(a.as_mut()).is_ready());
        assert!(poll_once(b.as_mut()).is_ready());
    }

    #[test]
    fn test_do_all_if_and_visit() {
        let list = pin!(WaitList::<u32>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait(1));
        let mut b = pin!(list.wait(2));
        let mut c = pin!(list.wait(3));
        let _ = poll_once(a.as_mut());
        let _ = poll_once(b.as_mut());
        let _ = poll_once(c.as_mut());

        let mut seen = Vec::new();
        list.visit_all(|p| seen.push(*p));
        assert_eq!(seen, [1, 2, 3]);

        assert_eq!(list.do_all_if(|p| *p % 2 == 1), 2);
        assert_eq!(list.len(), 1);
        assert_eq!(poll_once(a.as_mut()), Poll::Ready(1));
        assert!(poll_once(b.as_mut()).is_pending());
        assert_eq!(poll_once(c.as_mut()), Poll::Ready(3));
    }

    #[test]
    fn test_drop_before_resume_unlinks() {
        let list = pin!(WaitList::<u32>::new());
        let list = list.into_ref();
        {
            let mut a = Box::pin(list.wait(1));
            let _ = poll_once(a.as_mut());
            assert_eq!(list.len(), 1);
        }
        assert!(list.is_empty());
        // 从未轮询过的 Wait 直接丢弃
        drop(list.wait(2));
        assert!(!list.do_first());
    }

    #[test]
    fn test_waiter_dropped_inside_predicate() {
        let list = pin!(WaitList::<u32>::new());
        let list = list.into_ref();
        let victim = RefCell::new(Some(Box::pin(list.wait(2))));
        let mut a = pin!(list.wait(1));
        let _ = poll_once(a.as_mut());
        if let Some(w) = victim.borrow_mut().as_mut() {
            let _ = poll_once(w.as_mut());
        }
        let mut c = pin!(list.wait(3));
        let _ = poll_once(c.as_mut());

        // 谓词执行期间丢弃下一个等待者，遍历继续到后面的元素
        let mut seen = Vec::new();
        let count = list.do_all_if(|p| {
            seen.push(*p);
            if *p == 1 {
                victim.borrow_mut().take();
            }
            *p == 3
        });
        assert_eq!(seen, [1, 3]);
        assert_eq!(count, 1);
        assert_eq!(poll_once(c.as_mut()), Poll::Ready(3));
        assert_eq!(list.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_reentrant_resume_panics() {
        let list = pin!(WaitList::<u32>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait(1));
        let _ = poll_once(a.as_mut());
        list.do_first_if(|_| list.do_first());
    }

    #[test]
    fn test_resumed_unobserved() {
        let list = pin!(WaitList::<()>::new());
        let list = list.into_ref();
        let mut a = pin!(list.wait(()));
        assert!(!a.resumed_unobserved());
        let _ = poll_once(a.as_mut());
        assert!(!a.resumed_unobserved());
        list.do_first();
        assert!(a.resumed_unobserved());
        let _ = poll_once(a.as_mut());
        assert!(!a.resumed_unobserved());
    }
}
