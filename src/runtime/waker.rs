//! # 任务唤醒器
//!
//! 每个执行器槽位对应一个静态的 [`Slot`]，唤醒就是把槽位压入全局就绪队列。
//! 就绪队列是无锁 MPSC 队列，所以唤醒可以发生在任意线程、核心或中断中；
//! 真正的恢复由主循环中的执行器完成。
//!
//! Waker 的数据字是 `(代数 << TASK_INDEX_BITS) | 槽位下标`。
//! 槽位被释放时代数加一，之前发出的 Waker 随之失效。

use core::pin::Pin;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use core::task::{RawWaker, RawWakerVTable, Waker};

use crate::config::{MAX_TASKS, TASK_INDEX_BITS};
use crate::intrusive::mpsc::IntrusiveMpscQueue;
use crate::intrusive::queue::{HasQueueNode, QueueNode};

const INDEX_MASK: usize = (1 << TASK_INDEX_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> TASK_INDEX_BITS;

/// 执行器槽位的唤醒记录
pub(crate) struct Slot {
    node: QueueNode,
    generation: AtomicUsize,
    /// 已在就绪队列中
    queued: AtomicBool,
}

impl Slot {
    const fn new() -> Self {
        Self {
            node: QueueNode::new(),
            generation: AtomicUsize::new(0),
            queued: AtomicBool::new(false),
        }
    }

    pub(crate) fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    /// 使该槽位已发出的 Waker 全部失效
    pub(crate) fn retire(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// 出队后清除排队标记，之后的唤醒会再次入队
    pub(crate) fn dequeued(&self) {
        self.queued.store(false, Ordering::Release);
    }

    /// 在 `SLOTS` 中的下标
    pub(crate) fn index(&self) -> usize {
        // SAFETY: Slot 只存在于 SLOTS 中
        unsafe { (self as *const Slot).offset_from(SLOTS.as_ptr()) as usize }
    }
}

unsafe impl HasQueueNode for Slot {
    fn queue_node(&self) -> &QueueNode {
        &self.node
    }
}

pub(crate) static SLOTS: [Slot; MAX_TASKS] = [const { Slot::new() }; MAX_TASKS];

static READY: IntrusiveMpscQueue<'static, Slot> = IntrusiveMpscQueue::new();

/// 全局就绪队列
pub(crate) fn ready_queue() -> Pin<&'static IntrusiveMpscQueue<'static, Slot>> {
    Pin::static_ref(&READY)
}

/// 槽位下标加代数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId {
    index: usize,
    generation: usize,
}

impl TaskId {
    pub(crate) fn current(index: usize) -> Self {
        Self {
            index,
            generation: SLOTS[index].generation() & GENERATION_MASK,
        }
    }

    /// 执行器槽位下标
    pub fn index(&self) -> usize {
        self.index
    }

    fn to_word(self) -> usize {
        (self.generation << TASK_INDEX_BITS) | self.index
    }

    fn from_word(word: usize) -> Self {
        Self {
            index: word & INDEX_MASK,
            generation: word >> TASK_INDEX_BITS,
        }
    }
}

/// 把任务送回就绪队列
///
/// 失效的 Waker 和已在队列中的任务都被忽略。
pub(crate) fn schedule(id: TaskId) {
    let Some(slot) = SLOTS.get(id.index) else {
        return;
    };
    if slot.generation() & GENERATION_MASK != id.generation {
        return;
    }
    if slot.queued.swap(true, Ordering::AcqRel) {
        return;
    }
    ready_queue().push(slot);
}

/// 任务唤醒器
pub struct TaskWaker;

impl TaskWaker {
    /// 创建指向某个执行器槽位的 Waker
    pub fn new(id: TaskId) -> Waker {
        let raw = RawWaker::new(id.to_word() as *const (), &VTABLE);
        // SAFETY: 数据字只是一个整数，vtable 中的函数都不解引用它
        unsafe { Waker::from_raw(raw) }
    }
}

const VTABLE: RawWakerVTable = RawWakerVTable::new(clone_waker, wake, wake_by_ref, drop_waker);

unsafe fn clone_waker(data: *const ()) -> RawWaker {
    RawWaker::new(data, &VTABLE)
}

unsafe fn wake(data: *const ()) {
    schedule(TaskId::from_word(data as usize));
}

unsafe fn wake_by_ref(data: *const ()) {
    schedule(TaskId::from_word(data as usize));
}

unsafe fn drop_waker(_data: *const ()) {}
