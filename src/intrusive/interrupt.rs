//! # 中断队列
//!
//! 单核上主循环与中断处理程序之间交接元素的 FIFO。
//! 典型用法：驱动在主循环中把传输请求 `push_guarded` 进队列，
//! 中断处理程序在传输完成时用 `pop_if_then` 摘下队首并启动下一个请求。
//!
//! `head`/`tail` 使用普通的 acquire/release 读写，不使用读-改-写原子操作；
//! 互斥由调用方持有的 [`Guard`] 保证（或者调用本身就在中断中）。

use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use super::queue::{HasQueueNode, QueueNode};
use crate::hal::traits::Guard;

/// 条件出队的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopResult {
    /// 队列为空
    Empty,
    /// 谓词拒绝了队首元素
    Rejected,
    /// 队首元素已出队
    Popped,
    /// 队首元素已出队，并且访问了新的队首
    PoppedAndVisited,
}

impl PopResult {
    /// 数值形式：-1, 0, 1, 2
    pub fn code(self) -> i32 {
        match self {
            PopResult::Empty => -1,
            PopResult::Rejected => 0,
            PopResult::Popped => 1,
            PopResult::PoppedAndVisited => 2,
        }
    }
}

/// 移除元素的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveResult {
    NotFound,
    /// 元素位于队首，但不允许移除队首
    Rejected,
    Removed,
}

impl RemoveResult {
    /// 数值形式：-1, 0, 1
    pub fn code(self) -> i32 {
        match self {
            RemoveResult::NotFound => -1,
            RemoveResult::Rejected => 0,
            RemoveResult::Removed => 1,
        }
    }
}

/// 中断队列
pub struct InterruptQueue<'a, T, Tag = ()> {
    /// 队首，pop 从这里取
    head: AtomicPtr<QueueNode>,
    /// 队尾，push 追加到这里
    tail: AtomicPtr<QueueNode>,
    _marker: PhantomData<(&'a T, fn() -> Tag)>,
}

impl<'a, T, Tag> InterruptQueue<'a, T, Tag> {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            tail: AtomicPtr::new(ptr::null_mut()),
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire).is_null()
    }

    /// 队列为空或者只有一个元素
    pub fn is_empty_or_one(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    /// 清空队列
    pub fn clear(&self) {
        let mut node = self.head.load(Ordering::Acquire);
        while !node.is_null() {
            unsafe {
                let next = (*node).next();
                (*node).release();
                node = next;
            }
        }
        self.tail.store(ptr::null_mut(), Ordering::Release);
        self.head.store(ptr::null_mut(), Ordering::Release);
    }

    /// 摘下队首节点，调用方已确认 `head` 非空且 `next` 为其后继
    fn detach_front(&self, head: *mut QueueNode, next: *mut QueueNode) {
        self.head.store(next, Ordering::Release);
        if next.is_null() {
            self.tail.store(ptr::null_mut(), Ordering::Release);
        }
        unsafe { (*head).release() };
    }

    /// 摘下 `prev` 的后继 `node`
    fn detach_after(&self, prev: *mut QueueNode, node: *mut QueueNode) {
        unsafe {
            let next = (*node).next();
            (*prev).set_next(next);
            if next.is_null() {
                self.tail.store(prev, Ordering::Release);
            }
            (*node).release();
        }
    }

    /// 在 `head` 之后查找 `target` 并摘下
    fn remove_behind_front(&self, head: *mut QueueNode, target: *mut QueueNode) -> RemoveResult {
        let mut current = head;
        loop {
            let next = unsafe { (*current).next() };
            if next.is_null() {
                return RemoveResult::NotFound;
            }
            if next == target {
                self.detach_after(current, next);
                return RemoveResult::Removed;
            }
            current = next;
        }
    }
}

impl<'a, T: HasQueueNode<Tag>, Tag> InterruptQueue<'a, T, Tag> {
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
        let node = node.as_ptr();

        let prev = self.tail.load(Ordering::Acquire);
        let was_empty = prev.is_null();
        if was_empty {
            self.head.store(node, Ordering::Release);
        } else {
            unsafe { (*prev).set_next(node) };
        }
        self.tail.store(node, Ordering::Release);
        was_empty
    }

    /// 持有保护期间追加到队尾
    pub fn push_guarded<G: Guard>(&self, _guard: &G, element: &'a T) -> bool {
        self.push(element)
    }

    /// 访问队首元素（如果存在）
    pub fn visit_first(&self, visitor: impl FnOnce(&'a T)) {
        if let Some(front) = self.front() {
            visitor(front);
        }
    }

    pub fn front(&self) -> Option<&'a T> {
        let head = self.head.load(Ordering::Acquire);
        (!head.is_null()).then(|| unsafe { QueueNode::owner(head) })
    }

    pub fn back(&self) -> Option<&'a T> {
        let tail = self.tail.load(Ordering::Acquire);
        (!tail.is_null()).then(|| unsafe { QueueNode::owner(tail) })
    }

    /// 取出队首元素
    pub fn pop(&self) -> Option<&'a T> {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            return None;
        }
        unsafe {
            let element = QueueNode::owner(head);
            self.detach_front(head, (*head).next());
            Some(element)
        }
    }

    /// 谓词接受时取出队首元素
    pub fn pop_if(&self, predicate: impl FnOnce(&'a T) -> bool) -> PopResult {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            return PopResult::Empty;
        }
        // 谓词可能改写节点，先读取后继
        let next = unsafe { (*head).next() };
        if !predicate(unsafe { QueueNode::owner(head) }) {
            return PopResult::Rejected;
        }
        self.detach_front(head, next);
        PopResult::Popped
    }

    /// 谓词接受时取出队首元素，然后访问新的队首
    pub fn pop_if_then(
        &self,
        predicate: impl FnOnce(&'a T) -> bool,
        next_visitor: impl FnOnce(&'a T),
    ) -> PopResult {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            return PopResult::Empty;
        }
        let next = unsafe { (*head).next() };
        if !predicate(unsafe { QueueNode::owner(head) }) {
            return PopResult::Rejected;
        }
        self.detach_front(head, next);
        if next.is_null() {
            return PopResult::Popped;
        }
        next_visitor(unsafe { QueueNode::owner(next) });
        PopResult::PoppedAndVisited
    }

    /// 移除元素
    ///
    /// `remove_front` 为 false 时拒绝移除队首元素，
    /// 例如中断正在处理队首请求，不能从主循环中撤回。
    pub fn remove(&self, element: &T, remove_front: bool) -> RemoveResult {
        self.remove_with(element, |_| remove_front, |_| {})
    }

    pub fn remove_guarded<G: Guard>(&self, _guard: &G, element: &T, remove_front: bool) -> RemoveResult {
        self.remove(element, remove_front)
    }

    /// 移除元素，队首元素由谓词决定
    ///
    /// 队首被移除后，`next_visitor` 在新的队首上调用（用于启动下一次传输）。
    /// 队首之后的元素总是被移除。
    pub fn remove_with(
        &self,
        element: &T,
        front_predicate: impl FnOnce(&'a T) -> bool,
        next_visitor: impl FnOnce(&'a T),
    ) -> RemoveResult {
        let head = self.head.load(Ordering::Acquire);
        if head.is_null() {
            return RemoveResult::NotFound;
        }
        let target = element.queue_node().as_ptr();
        if head != target {
            return self.remove_behind_front(head, target);
        }

        if !front_predicate(unsafe { QueueNode::owner(head) }) {
            return RemoveResult::Rejected;
        }
        let next = unsafe { (*head).next() };
        self.detach_front(head, next);
        if !next.is_null() {
            next_visitor(unsafe { QueueNode::owner(next) });
        }
        RemoveResult::Removed
    }

    pub fn remove_with_guarded<G: Guard>(
        &self,
        _guard: &G,
        element: &T,
        front_predicate: impl FnOnce(&'a T) -> bool,
        next_visitor: impl FnOnce(&'a T),
    ) -> RemoveResult {
        self.remove_with(element, front_predicate, next_visitor)
    }

    /// 移除第一个被谓词接受的元素（任意位置）
    pub fn remove_if(&self, mut predicate: impl FnMut(&'a T) -> bool) -> bool {
        let mut prev: *mut QueueNode = ptr::null_mut();
        let mut current = self.head.load(Ordering::Acquire);
        while !current.is_null() {
            // 谓词可能改写节点，先读取后继
            let next = unsafe { (*current).next() };
            if predicate(unsafe { QueueNode::owner(current) }) {
                if prev.is_null() {
                    self.detach_front(current, next);
                } else {
                    unsafe { (*prev).set_next(next) };
                    if next.is_null() {
                        self.tail.store(prev, Ordering::Release);
                    }
                    unsafe { (*current).release() };
                }
                return true;
            }
            prev = current;
            current = next;
        }
        false
    }
}

impl<'a, T, Tag> Default for InterruptQueue<'a, T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}
