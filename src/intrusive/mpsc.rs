//! # 无锁多生产者单消费者队列
//!
//! 基于桩节点（stub）的侵入式 MPSC 队列，参见
//! <https://www.1024cores.net/home/lock-free-algorithms/queues/intrusive-mpsc-node-based-queue>
//!
//! ## 协议
//!
//! - 生产者：一次原子交换 `head`，再用 release 写入前一个节点的 `next`
//! - 消费者：沿 `tail.next` 前进，遇到桩节点时跳过；
//!   只剩一个节点时把桩节点重新压到它后面，再把它摘下
//! - 生产者交换了 `head` 但尚未完成链接时，消费者等待链接完成而不是报告队列为空
//!
//! 生产者可以在任意线程、核心或中断中运行；`pop` 同一时刻只能有一个消费者调用，
//! 这一前提不在运行时检查。
//!
//! 桩节点位于队列内部，因此队列必须固定（`Pin`）。`head`/`tail` 为空表示指向桩节点，
//! 这样 [`IntrusiveMpscQueue::new`] 可以是 `const fn`，队列可以直接作为 `static`。

use core::hint;
use core::marker::{PhantomData, PhantomPinned};
use core::pin::Pin;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use super::queue::{HasQueueNode, QueueNode};

/// 无锁 MPSC 队列
pub struct IntrusiveMpscQueue<'a, T, Tag = ()> {
    /// 最近入队的节点，生产者共享
    head: AtomicPtr<QueueNode>,
    /// 下一个出队的节点，仅消费者访问
    tail: AtomicPtr<QueueNode>,
    stub: QueueNode,
    _pin: PhantomPinned,
    _marker: PhantomData<(&'a T, fn() -> Tag)>,
}

impl<'a, T, Tag> IntrusiveMpscQueue<'a, T, Tag> {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
            stub: QueueNode::new(),
            _pin: PhantomPinned,
            _marker: PhantomData,
        }
    }

    fn stub(&self) -> *mut QueueNode {
        self.stub.as_ptr()
    }

    fn resolve(&self, node: *mut QueueNode) -> *mut QueueNode {
        if node.is_null() { self.stub() } else { node }
    }

    /// 队列是否为空（消费者视角）
    ///
    /// 正在入队但尚未完成交换的元素不计入。
    pub fn is_empty(self: Pin<&Self>) -> bool {
        let tail = self.resolve(self.tail.load(Ordering::Relaxed));
        tail == self.stub() && self.stub.next().is_null()
    }

    /// 入队第一步：交换 head，返回前一个节点
    fn swap_head(&self, node: *mut QueueNode) -> *mut QueueNode {
        unsafe { (*node).set_next(ptr::null_mut()) };
        self.resolve(self.head.swap(node, Ordering::AcqRel))
    }

    /// 入队第二步：链接前一个节点
    fn link(prev: *mut QueueNode, node: *mut QueueNode) {
        // SAFETY: prev 是队列中的节点或桩节点，在 'a 内有效
        unsafe { (*prev).set_next(node) };
    }

    fn push_node(&self, node: *mut QueueNode) {
        let prev = self.swap_head(node);
        Self::link(prev, node);
    }

    /// 等待生产者完成对 `node.next` 的链接
    fn wait_next(node: *mut QueueNode) -> *mut QueueNode {
        loop {
            let next = unsafe { (*node).next() };
            if !next.is_null() {
                return next;
            }
            hint::spin_loop();
        }
    }
}

impl<'a, T: HasQueueNode<Tag>, Tag> IntrusiveMpscQueue<'a, T, Tag> {
    /// 入队，可在任意上下文并发调用
    ///
    /// # Panics
    /// 元素已在某个队列中。
    pub fn push(self: Pin<&Self>, element: &'a T) {
        let node = element.queue_node();
        node.claim_atomic(element);
        self.push_node(node.as_ptr());
    }

    /// 出队，只能由唯一的消费者调用
    pub fn pop(self: Pin<&Self>) -> Option<&'a T> {
        let stub = self.stub();
        let mut tail = self.resolve(self.tail.load(Ordering::Relaxed));
        let mut next = unsafe { (*tail).next() };

        if tail == stub {
            if next.is_null() {
                return None;
            }
            // 跳过桩节点
            self.tail.store(next, Ordering::Relaxed);
            tail = next;
            next = unsafe { (*tail).next() };
        }

        if next.is_null() {
            let head = self.resolve(self.head.load(Ordering::Acquire));
            if tail == head {
                // tail 是最后一个节点：把桩节点压到它后面，使其可以被摘下
                self.push_node(stub);
            }
            // 桩节点或者抢先交换 head 的生产者很快会链接 tail.next
            next = Self::wait_next(tail);
        }

        self.tail.store(next, Ordering::Relaxed);
        // SAFETY: tail 是经由 push 绑定的元素节点，此时已与队列断开
        unsafe {
            let element = QueueNode::owner(tail);
            (*tail).release();
            Some(element)
        }
    }
}

impl<'a, T, Tag> Default for IntrusiveMpscQueue<'a, T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::pin::pin;
    use std::thread;
    use std::vec::Vec;

    struct Element {
        node: QueueNode,
        value: u32,
    }

    unsafe impl HasQueueNode for Element {
        fn queue_node(&self) -> &QueueNode {
            &self.node
        }
    }

    fn element(value: u32) -> Element {
        Element {
            node: QueueNode::new(),
            value,
        }
    }

    #[test]
    fn test_single_thread() {
        let (a, b, c) = (element(1), element(2), element(3));
        let queue = pin!(IntrusiveMpscQueue::<Element>::new());
        let queue = queue.into_ref();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());

        queue.push(&a);
        assert!(!queue.is_empty());
        queue.push(&b);
        assert_eq!(queue.pop().map(|e| e.value), Some(1));
        queue.push(&c);
        assert_eq!(queue.pop().map(|e| e.value), Some(2));
        assert_eq!(queue.pop().map(|e| e.value), Some(3));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());

        // 节点出队后可以重复使用
        queue.push(&a);
        queue.push(&b);
        let popped: Vec<u32> = core::iter::from_fn(|| queue.pop().map(|e| e.value)).collect();
        assert_eq!(popped, [1, 2]);
    }

    #[test]
    #[should_panic]
    fn test_push_twice() {
        let a = element(1);
        let queue = pin!(IntrusiveMpscQueue::<Element>::new());
        let queue = queue.into_ref();
        queue.push(&a);
        queue.push(&a);
    }

    #[test]
    fn test_pop_waits_for_pending_link() {
        let (a, b) = (element(1), element(2));
        let queue = pin!(IntrusiveMpscQueue::<Element>::new());
        let queue = queue.into_ref();
        queue.push(&a);

        // 模拟生产者停在两次写之间：head 已经指向 b，但 a.next 尚未链接
        b.node.claim_atomic(&b);
        let prev = queue.swap_head(b.node.as_ptr());
        assert_eq!(prev, a.node.as_ptr());

        thread::scope(|s| {
            let consumer = s.spawn(|| queue.pop().map(|e| e.value));
            // 消费者不能把 a 当成"队列为空"丢掉，它必须等到链接完成
            thread::sleep(std::time::Duration::from_millis(20));
            IntrusiveMpscQueue::<Element>::link(prev, b.node.as_ptr());
            assert_eq!(consumer.join().ok().flatten(), Some(1));
        });

        assert_eq!(queue.pop().map(|e| e.value), Some(2));
        assert!(queue.pop().is_none());
    }
}
