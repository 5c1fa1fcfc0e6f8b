//! # 侵入式双向环形链表
//!
//! 链表节点 [`ListNode`] 嵌入在元素内部，链表头部自带一个哨兵节点，
//! 所有节点与哨兵构成一个环。链表本身不拥有元素，只串联元素的引用。
//!
//! ## 约定
//!
//! - 链表和元素在链接之前都必须被固定（`Pin`）
//! - 节点析构时自动脱链，链表析构时会把剩余节点全部脱链
//! - 没有所属元素的节点是"标记节点"，供遍历游标使用，所有元素操作都会跳过它们
//!
//! ```text
//!   ┌──────────────────────────────────────────┐
//!   └─> [哨兵] <──> [A] <──> [B] <──> [C] <────┘
//! ```

use core::cell::Cell;
use core::marker::{PhantomData, PhantomPinned};
use core::pin::Pin;
use core::ptr::{self, NonNull};

/// 双向链表节点
///
/// 新建的节点处于未链接状态（前驱、后继均为空）。
pub struct ListNode {
    prev: Cell<*const ListNode>,
    next: Cell<*const ListNode>,
    /// 所属元素，标记节点和哨兵为空
    owner: Cell<*const ()>,
    _pin: PhantomPinned,
}

impl ListNode {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(ptr::null()),
            next: Cell::new(ptr::null()),
            owner: Cell::new(ptr::null()),
            _pin: PhantomPinned,
        }
    }

    /// 节点当前是否在某个链表中
    pub fn is_linked(&self) -> bool {
        !self.next.get().is_null()
    }

    /// 从所在链表中移除
    ///
    /// 未链接的节点调用此函数没有任何效果。
    ///
    /// # 返回值
    /// 节点之前是否处于链接状态
    pub fn unlink(&self) -> bool {
        let next = self.next.get();
        if next.is_null() {
            return false;
        }
        let prev = self.prev.get();
        // SAFETY: 已链接节点的邻居都是固定且存活的节点，节点和链表析构时都会先脱链
        unsafe {
            (*prev).next.set(next);
            (*next).prev.set(prev);
        }
        self.prev.set(ptr::null());
        self.next.set(ptr::null());
        true
    }

    fn is_marker(&self) -> bool {
        self.owner.get().is_null()
    }

    /// 链接到 `anchor` 之前
    ///
    /// # Safety
    /// `self` 未链接且已固定，`anchor` 位于一个已成环的链表中。
    unsafe fn link_before(&self, anchor: *const ListNode) {
        unsafe {
            let prev = (*anchor).prev.get();
            self.prev.set(prev);
            self.next.set(anchor);
            (*prev).next.set(self as *const ListNode);
            (*anchor).prev.set(self as *const ListNode);
        }
    }

    /// 链接到 `anchor` 之后
    ///
    /// # Safety
    /// 同 [`ListNode::link_before`]。
    unsafe fn link_after(&self, anchor: *const ListNode) {
        unsafe {
            let next = (*anchor).next.get();
            self.prev.set(anchor);
            self.next.set(next);
            (*next).prev.set(self as *const ListNode);
            (*anchor).next.set(self as *const ListNode);
        }
    }
}

impl Default for ListNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ListNode {
    fn drop(&mut self) {
        self.unlink();
    }
}

/// 提供链表节点的元素
///
/// `Tag` 用于区分同一个元素上的多个节点，使一个元素可以同时位于多个链表中。
///
/// # Safety
/// `list_node` 必须始终返回嵌入在 `self` 内部的同一个节点。
pub unsafe trait HasListNode<Tag = ()> {
    fn list_node(&self) -> &ListNode;
}

/// 侵入式双向环形链表
pub struct IntrusiveList<T, Tag = ()> {
    head: ListNode,
    _marker: PhantomData<(*const T, fn() -> Tag)>,
}

impl<T, Tag> IntrusiveList<T, Tag> {
    pub const fn new() -> Self {
        Self {
            head: ListNode::new(),
            _marker: PhantomData,
        }
    }

    fn sentinel(&self) -> *const ListNode {
        &self.head
    }

    /// 返回哨兵，必要时先让哨兵自成环
    fn ring(self: Pin<&Self>) -> *const ListNode {
        let head = &self.get_ref().head;
        if head.next.get().is_null() {
            head.prev.set(head);
            head.next.set(head);
        }
        head
    }

    /// `from` 之后的第一个元素节点
    fn element_after(&self, from: *const ListNode) -> Option<*const ListNode> {
        let sentinel = self.sentinel();
        // SAFETY: from 是本链表中的节点或哨兵，环上的节点都存活
        let mut node = unsafe { (*from).next.get() };
        while !node.is_null() && node != sentinel {
            if unsafe { !(*node).is_marker() } {
                return Some(node);
            }
            node = unsafe { (*node).next.get() };
        }
        None
    }

    /// `from` 之前的第一个元素节点
    fn element_before(&self, from: *const ListNode) -> Option<*const ListNode> {
        let sentinel = self.sentinel();
        let mut node = unsafe { (*from).prev.get() };
        while !node.is_null() && node != sentinel {
            if unsafe { !(*node).is_marker() } {
                return Some(node);
            }
            node = unsafe { (*node).prev.get() };
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.element_after(self.sentinel()).is_none()
    }

    /// 已建立环的链表一定被固定过，可以重新取得固定引用
    pub(crate) fn pinned(&self) -> Option<Pin<&Self>> {
        if self.head.next.get().is_null() {
            return None;
        }
        // SAFETY: 环只能经由 `ring(self: Pin<&Self>)` 建立，固定后直到析构都不会移动
        Some(unsafe { Pin::new_unchecked(self) })
    }

    /// 元素个数，O(n)
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut node = self.sentinel();
        while let Some(next) = self.element_after(node) {
            count += 1;
            node = next;
        }
        count
    }

    /// 把 `other` 中的全部节点按顺序拼接到本链表末尾，O(1)
    ///
    /// 之后 `other` 为空。
    pub fn append(self: Pin<&Self>, other: &Self) {
        let first = other.head.next.get();
        if first.is_null() || first == other.sentinel() {
            return;
        }
        let last = other.head.prev.get();
        let sentinel = self.ring();
        // SAFETY: first..last 是 other 环上的一段，拼接后 other 的哨兵被重置为空环
        unsafe {
            let tail = (*sentinel).prev.get();
            (*tail).next.set(first);
            (*first).prev.set(tail);
            (*last).next.set(sentinel);
            (*sentinel).prev.set(last);
        }
        other.head.prev.set(ptr::null());
        other.head.next.set(ptr::null());
    }

    /// 移除全部节点
    pub fn clear(&self) {
        let sentinel = self.sentinel();
        let mut node = self.head.next.get();
        while !node.is_null() && node != sentinel {
            // SAFETY: 环上的节点都存活，先读出后继再重置
            unsafe {
                let next = (*node).next.get();
                (*node).prev.set(ptr::null());
                (*node).next.set(ptr::null());
                node = next;
            }
        }
        self.head.prev.set(ptr::null());
        self.head.next.set(ptr::null());
    }
}

impl<T: HasListNode<Tag>, Tag> IntrusiveList<T, Tag> {
    /// # Safety
    /// `node` 必须是本链表中的元素节点。
    unsafe fn element<'a>(node: *const ListNode) -> Pin<&'a T> {
        unsafe { Pin::new_unchecked(&*((*node).owner.get() as *const T)) }
    }

    /// 在链表末尾（哨兵之前）追加元素
    ///
    /// # Panics
    /// 元素的节点已经在某个链表中。
    ///
    /// # Safety
    /// 在通过本链表取得的引用（`front`、`iter` 等）存活期间，元素不得被释放。
    pub unsafe fn add(self: Pin<&Self>, element: Pin<&T>) {
        let sentinel = self.ring();
        unsafe { self.insert_before(sentinel, element) }
    }

    /// 把元素插入到 `anchor` 之前
    ///
    /// # Safety
    /// 同 [`IntrusiveList::add`]，且 `anchor` 是本链表的哨兵或元素节点。
    pub(crate) unsafe fn insert_before(self: Pin<&Self>, anchor: *const ListNode, element: Pin<&T>) {
        self.ring();
        let node = element.list_node();
        assert!(!node.is_linked(), "节点已在链表中");
        node.owner.set(element.get_ref() as *const T as *const ());
        unsafe { node.link_before(anchor) }
    }

    /// 链表哨兵，供有序插入时作为末尾锚点
    pub(crate) fn end_anchor(self: Pin<&Self>) -> *const ListNode {
        self.ring()
    }

    pub fn front(&self) -> Option<Pin<&T>> {
        self.element_after(self.sentinel())
            .map(|node| unsafe { Self::element(node) })
    }

    pub fn back(&self) -> Option<Pin<&T>> {
        self.element_before(self.sentinel())
            .map(|node| unsafe { Self::element(node) })
    }

    /// 移除并返回第一个元素
    pub fn pop_front(&self) -> Option<Pin<&T>> {
        let node = self.element_after(self.sentinel())?;
        // SAFETY: node 是本链表中存活的元素节点
        unsafe {
            (*node).unlink();
            Some(Self::element(node))
        }
    }

    /// 按下标取元素，O(n)
    ///
    /// # Panics
    /// 下标越界。
    pub fn get(&self, index: usize) -> Pin<&T> {
        match self.iter().nth(index) {
            Some(element) => element,
            None => panic!("链表下标越界: {}", index),
        }
    }

    pub fn contains(&self, element: Pin<&T>) -> bool {
        let node = element.list_node() as *const ListNode;
        self.iter().any(|e| ptr::eq(e.list_node(), node))
    }

    /// 移除元素
    ///
    /// 元素未链接时不做任何事，重复移除是安全的。
    pub fn remove(&self, element: Pin<&T>) -> bool {
        let node = element.list_node();
        if !node.is_linked() {
            return false;
        }
        debug_assert!(self.contains(element), "节点不在此链表中");
        node.unlink()
    }

    /// 让 `new` 原地接替 `old` 在链表中的位置，O(1)
    ///
    /// 之后 `old` 处于未链接状态。`old` 未链接时返回 `false`。
    ///
    /// # Safety
    /// 同 [`IntrusiveList::add`]，针对 `new`。
    pub unsafe fn replace(&self, old: Pin<&T>, new: Pin<&T>) -> bool {
        let old_node = old.list_node();
        let new_node = new.list_node();
        assert!(!new_node.is_linked(), "替换节点已在链表中");
        if !old_node.is_linked() {
            return false;
        }
        new_node.owner.set(new.get_ref() as *const T as *const ());
        unsafe { new_node.link_after(old_node) };
        old_node.unlink();
        true
    }

    pub fn iter(&self) -> Iter<'_, T, Tag> {
        Iter {
            list: self,
            cursor: self.sentinel(),
        }
    }
}

impl<T, Tag> Default for IntrusiveList<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag> Drop for IntrusiveList<T, Tag> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// 链表迭代器
///
/// 迭代期间不要移除当前元素之后的元素，需要边遍历边修改时使用 [`Walker`]。
pub struct Iter<'a, T, Tag = ()> {
    list: &'a IntrusiveList<T, Tag>,
    cursor: *const ListNode,
}

impl<'a, T: HasListNode<Tag>, Tag> Iterator for Iter<'a, T, Tag> {
    type Item = Pin<&'a T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.element_after(self.cursor)?;
        self.cursor = node;
        Some(unsafe { IntrusiveList::<T, Tag>::element(node) })
    }
}

impl<'a, T: HasListNode<Tag>, Tag> IntoIterator for &'a IntrusiveList<T, Tag> {
    type Item = Pin<&'a T>;
    type IntoIter = Iter<'a, T, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 游标式遍历器
///
/// 遍历开始时在链表头尾各插入一个标记节点，每取出一个元素就把游标挪到它后面。
/// 回调期间链表可以被任意增删（包括释放当前元素），遍历只覆盖开始时已在链表中的元素。
pub(crate) struct Walker<'l, T, Tag = ()> {
    list: Pin<&'l IntrusiveList<T, Tag>>,
    mark: Pin<&'l ListNode>,
    end: Pin<&'l ListNode>,
    current: *const ListNode,
}

impl<'l, T: HasListNode<Tag>, Tag> Walker<'l, T, Tag> {
    /// `mark` 与 `end` 必须是未链接的节点，遍历结束后由它们各自的析构脱链
    pub(crate) fn new(
        list: Pin<&'l IntrusiveList<T, Tag>>,
        mark: Pin<&'l ListNode>,
        end: Pin<&'l ListNode>,
    ) -> Self {
        assert!(!mark.is_linked() && !end.is_linked(), "游标节点已在链表中");
        let sentinel = list.ring();
        // SAFETY: 两个标记节点已固定且未链接，哨兵已成环
        unsafe {
            mark.link_after(sentinel);
            end.link_before(sentinel);
        }
        Self {
            list,
            mark,
            end,
            current: ptr::null(),
        }
    }

    /// 前进到下一个元素
    pub(crate) fn next(&mut self) -> Option<NonNull<T>> {
        let sentinel = self.list.sentinel();
        let end = self.end.get_ref() as *const ListNode;
        loop {
            let node = self.mark.next.get();
            if node.is_null() || node == end || node == sentinel {
                self.current = ptr::null();
                return None;
            }
            self.mark.unlink();
            // SAFETY: node 是环上存活的节点
            unsafe {
                self.mark.link_after(node);
                if !(*node).is_marker() {
                    self.current = node;
                    return NonNull::new((*node).owner.get() as *mut T);
                }
            }
        }
    }

    /// 当前元素是否仍紧挨在游标之前，即没有在回调中被移除或释放
    pub(crate) fn current_linked(&self) -> bool {
        !self.current.is_null() && self.mark.prev.get() == self.current
    }
}
