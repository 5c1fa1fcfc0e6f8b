//! # 侵入式单向队列
//!
//! [`QueueNode`] 是三种队列共用的节点：单上下文的 [`IntrusiveQueue`]、
//! 无锁的 [`IntrusiveMpscQueue`](super::mpsc::IntrusiveMpscQueue)
//! 以及中断与主循环之间的 [`InterruptQueue`](super::interrupt::InterruptQueue)。
//!
//! 队列通过生命周期 `'a` 借用元素，元素在队列存活期间不能被移动或释放。

use core::cell::Cell;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// 单向队列节点
pub struct QueueNode {
    next: AtomicPtr<QueueNode>,
    /// 入队时记录的所属元素
    owner: AtomicPtr<()>,
    queued: AtomicBool,
}

impl QueueNode {
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            owner: AtomicPtr::new(ptr::null_mut()),
            queued: AtomicBool::new(false),
        }
    }

    /// 节点当前是否在某个队列中
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }

    pub(crate) fn as_ptr(&self) -> *mut QueueNode {
        self as *const QueueNode as *mut QueueNode
    }

    /// 标记入队并记录所属元素，调用方需保证互斥
    pub(crate) fn claim<T>(&self, owner: &T) {
        assert!(!self.queued.load(Ordering::Relaxed), "节点已在队列中");
        self.queued.store(true, Ordering::Relaxed);
        self.bind(owner);
    }

    /// 原子地标记入队，供并发生产者使用
    pub(crate) fn claim_atomic<T>(&self, owner: &T) {
        assert!(!self.queued.swap(true, Ordering::AcqRel), "节点已在队列中");
        self.bind(owner);
    }

    fn bind<T>(&self, owner: &T) {
        self.owner.store(owner as *const T as *mut (), Ordering::Relaxed);
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
    }

    pub(crate) fn release(&self) {
        self.queued.store(false, Ordering::Release);
    }

    pub(crate) fn next(&self) -> *mut QueueNode {
        self.next.load(Ordering::Acquire)
    }

    pub(crate) fn set_next(&self, next: *mut QueueNode) {
        self.next.store(next, Ordering::Release);
    }

    /// # Safety
    /// `node` 必须是通过 `claim` 系列函数绑定到 `&'a T` 的节点。
    pub(crate) unsafe fn owner<'a, T>(node: *mut QueueNode) -> &'a T {
        unsafe { &*((*node).owner.load(Ordering::Relaxed) as *const T) }
    }
}

impl Default for QueueNode {
    fn default() -> Self {
        Self::new()
    }
}

/// 提供队列节点的元素
///
/// `Tag` 区分同一元素上的多个节点。
///
/// # Safety
/// `queue_node` 必须始终返回嵌入在 `self` 内部的同一个节点。
pub unsafe trait HasQueueNode<Tag = ()> {
    fn queue_node(&self) -> &QueueNode;
}

/// 单上下文 FIFO 队列
///
/// 入队和出队必须在同一个逻辑上下文（主循环）中调用。
pub struct IntrusiveQueue<'a, T, Tag = ()> {
    /// 队首，pop 从这里取
    first: Cell<*mut QueueNode>,
    /// 队尾，push 追加到这里
    last: Cell<*mut QueueNode>,
    _marker: PhantomData<(&'a T, fn() -> Tag)>,
}

impl<'a, T, Tag> IntrusiveQueue<'a, T, Tag> {
    pub const fn new() -> Self {
        Self {
            first: Cell::new(ptr::null_mut()),
            last: Cell::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.get().is_null()
    }

    /// 元素个数，O(n)
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut node = self.first.get();
        while !node.is_null() {
            count += 1;
            node = unsafe { (*node).next() };
        }
        count
    }

    /// 清空队列
    pub fn clear(&self) {
        let mut node = self.first.get();
        while !node.is_null() {
            // SAFETY: 队列中的节点在 'a 内有效
            unsafe {
                let next = (*node).next();
                (*node).release();
                node = next;
            }
        }
        self.first.set(ptr::null_mut());
        self.last.set(ptr::null_mut());
    }
}

impl<'a, T: HasQueueNode<Tag>, Tag> IntrusiveQueue<'a, T, Tag> {
    /// 追加到队尾
    ///
    /// # 返回值
    /// 入队前队列是否为空
    ///
    /// # Panics
    /// 元素已在某个队列中。
    pub fn push(&self, element: &'a T) -> bool {
        let node = element.queue_node();
        node.claim(element);
        let last = self.last.get();
        let was_empty = last.is_null();
        if was_empty {
            self.first.set(node.as_ptr());
        } else {
            unsafe { (*last).set_next(node.as_ptr()) };
        }
        self.last.set(node.as_ptr());
        was_empty
    }

    /// 取出队首元素
    pub fn pop(&self) -> Option<&'a T> {
        let first = self.first.get();
        if first.is_null() {
            return None;
        }
        // SAFETY: 队列中的节点在 'a 内有效
        unsafe {
            let next = (*first).next();
            self.first.set(next);
            if next.is_null() {
                self.last.set(ptr::null_mut());
            }
            let element = QueueNode::owner(first);
            (*first).release();
            Some(element)
        }
    }

    /// 从队列任意位置移除元素，O(n)
    ///
    /// 元素不在队列中时不做任何事。
    pub fn remove(&self, element: &T) -> bool {
        let target = element.queue_node().as_ptr();
        let mut prev: *mut QueueNode = ptr::null_mut();
        let mut node = self.first.get();
        while !node.is_null() {
            // SAFETY: 队列中的节点在 'a 内有效
            let next = unsafe { (*node).next() };
            if node == target {
                if prev.is_null() {
                    self.first.set(next);
                } else {
                    unsafe { (*prev).set_next(next) };
                }
                if next.is_null() {
                    self.last.set(prev);
                }
                unsafe { (*node).release() };
                return true;
            }
            prev = node;
            node = next;
        }
        false
    }

    pub fn contains(&self, element: &T) -> bool {
        let target = element.queue_node().as_ptr();
        let mut node = self.first.get();
        while !node.is_null() {
            if node == target {
                return true;
            }
            node = unsafe { (*node).next() };
        }
        false
    }

    pub fn front(&self) -> Option<&'a T> {
        let first = self.first.get();
        (!first.is_null()).then(|| unsafe { QueueNode::owner(first) })
    }

    pub fn back(&self) -> Option<&'a T> {
        let last = self.last.get();
        (!last.is_null()).then(|| unsafe { QueueNode::owner(last) })
    }
}

impl<'a, T, Tag> Default for IntrusiveQueue<'a, T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}
