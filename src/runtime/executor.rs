//! # 协程执行器
//!
//! 主循环中的执行器，借用已固定的协程并在它们被唤醒时恢复执行。
//!
//! ## 设计原则
//!
//! - **不分配**: 任务表是定长数组，就绪队列是全局静态的侵入式队列
//! - **单实例**: 就绪队列是全局的，同一时刻只能存在一个执行器
//! - **可从中断唤醒**: 唤醒只是一次无锁入队，恢复发生在 [`Executor::run_until_idle`]
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let blink = pin!(Coroutine::new(blink_task(&timers)));
//! let mut executor = Executor::new()?;
//! executor.spawn(blink.into_ref())?;
//!
//! loop {
//!     timers.do_until(now());
//!     executor.run_until_idle();
//!     wait_for_interrupt();
//! }
//! ```

use core::pin::Pin;
use core::ptr;

use spin::{Mutex, MutexGuard};

use super::waker::{SLOTS, TaskId, TaskWaker, ready_queue, schedule};
use crate::config::MAX_TASKS;
use crate::error::{CoroError, Result};
use crate::kernel::task::{Resumable, TaskState};

/// 执行器租约
static LEASE: Mutex<()> = Mutex::new(());

/// 协程执行器
pub struct Executor<'a> {
    tasks: [Option<Pin<&'a dyn Resumable>>; MAX_TASKS],
    _lease: MutexGuard<'static, ()>,
}

impl<'a> Executor<'a> {
    /// 创建执行器
    ///
    /// # 错误
    /// 已经存在另一个执行器时返回 [`CoroError::ExecutorBusy`]。
    pub fn new() -> Result<Self> {
        let lease = LEASE.try_lock().ok_or(CoroError::ExecutorBusy)?;
        // 清掉上一个执行器留下的失效唤醒
        drain_ready_queue();
        Ok(Self {
            tasks: [None; MAX_TASKS],
            _lease: lease,
        })
    }

    /// 添加任务，任务会在下一次 `run_once` 时开始执行
    ///
    /// # 错误
    /// - [`CoroError::InvalidTaskState`]: 任务已结束或正在执行
    /// - [`CoroError::TaskAlreadySpawned`]: 同一个任务已在本执行器中
    /// - [`CoroError::TaskSlotsFull`]: 没有空闲槽位
    pub fn spawn(&mut self, task: Pin<&'a dyn Resumable>) -> Result<TaskId> {
        if !matches!(task.state(), TaskState::Created | TaskState::Suspended) {
            return Err(CoroError::InvalidTaskState);
        }
        let spawned = self
            .tasks
            .iter()
            .flatten()
            .any(|t| ptr::addr_eq(t.get_ref(), task.get_ref()));
        if spawned {
            return Err(CoroError::TaskAlreadySpawned);
        }
        let index = self
            .tasks
            .iter()
            .position(Option::is_none)
            .ok_or(CoroError::TaskSlotsFull)?;

        self.tasks[index] = Some(task);
        let id = TaskId::current(index);
        schedule(id);
        log::debug!("任务 {} 已加入执行器", index);
        Ok(id)
    }

    /// 恢复一个就绪任务
    ///
    /// # 返回值
    /// 就绪队列是否非空
    pub fn run_once(&mut self) -> bool {
        let Some(slot) = ready_queue().pop() else {
            return false;
        };
        slot.dequeued();
        let index = slot.index();

        let Some(task) = self.tasks[index] else {
            // 槽位已释放，唤醒已失效
            return true;
        };
        let waker = TaskWaker::new(TaskId::current(index));
        let state = task.resume(&waker);
        if state.is_terminal() {
            match state {
                TaskState::Cancelled => log::debug!("任务 {} 已取消", index),
                _ => log::debug!("任务 {} 已完成", index),
            }
            self.release(index);
        }
        true
    }

    /// 恢复就绪任务直到就绪队列为空，返回恢复的次数
    pub fn run_until_idle(&mut self) -> usize {
        let mut count = 0;
        while self.run_once() {
            count += 1;
        }
        count
    }

    /// 尚未结束的任务个数
    pub fn task_count(&self) -> usize {
        self.tasks.iter().flatten().count()
    }

    fn release(&mut self, index: usize) {
        self.tasks[index] = None;
        SLOTS[index].retire();
        log::trace!("槽位 {} 已释放", index);
    }
}

impl Drop for Executor<'_> {
    fn drop(&mut self) {
        for index in 0..MAX_TASKS {
            if self.tasks[index].is_some() {
                self.release(index);
            }
        }
        drain_ready_queue();
    }
}

fn drain_ready_queue() {
    while let Some(slot) = ready_queue().pop() {
        slot.dequeued();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::pin::pin;
    use serial_test::serial;

    use crate::kernel::task::Coroutine;
    use crate::sync::Barrier;

    #[test]
    #[serial]
    fn test_single_executor() {
        let first = Executor::new();
        assert!(first.is_ok());
        assert_eq!(Executor::new().err(), Some(CoroError::ExecutorBusy));
        drop(first);
        assert!(Executor::new().is_ok());
    }

    #[test]
    #[serial]
    fn test_run_simple() {
        let counter = Cell::new(0);
        let task = pin!(Coroutine::new(async {
            counter.set(counter.get() + 1);
        }));
        let task = task.into_ref();

        let Ok(mut executor) = Executor::new() else {
            panic!("执行器被占用");
        };
        assert!(executor.spawn(task).is_ok());
        assert_eq!(executor.task_count(), 1);
        assert_eq!(executor.run_until_idle(), 1);
        assert_eq!(counter.get(), 1);
        assert_eq!(task.state(), TaskState::Finished);
        assert_eq!(executor.task_count(), 0);
        assert!(!executor.run_once());
    }

    #[test]
    #[serial]
    fn test_spawn_errors() {
        let barrier = pin!(Barrier::<()>::new());
        let barrier = barrier.into_ref();
        let task = pin!(Coroutine::new(async {
            barrier.wait(()).await;
        }));
        let task = task.into_ref();
        let done = pin!(Coroutine::new(async {}));
        let done = done.into_ref();
        done.resume(core::task::Waker::noop());

        let Ok(mut executor) = Executor::new() else {
            panic!("执行器被占用");
        };
        assert!(executor.spawn(task).is_ok());
        assert_eq!(executor.spawn(task).err(), Some(CoroError::TaskAlreadySpawned));
        assert_eq!(executor.spawn(done).err(), Some(CoroError::InvalidTaskState));
        executor.run_until_idle();
        assert_eq!(task.state(), TaskState::Suspended);

        barrier.do_all();
        assert_eq!(executor.run_until_idle(), 1);
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    #[serial]
    fn test_slots_full() {
        let tasks: [_; MAX_TASKS + 1] = core::array::from_fn(|_| Coroutine::new(core::future::pending::<()>()));
        let tasks = pin!(tasks);
        let tasks = tasks.into_ref();

        let Ok(mut executor) = Executor::new() else {
            panic!("执行器被占用");
        };
        for i in 0..MAX_TASKS {
            // SAFETY: 数组已固定，元素随之固定
            let task = unsafe { tasks.map_unchecked(|t| &t[i]) };
            assert!(executor.spawn(task).is_ok());
        }
        let last = unsafe { tasks.map_unchecked(|t| &t[MAX_TASKS]) };
        assert_eq!(executor.spawn(last).err(), Some(CoroError::TaskSlotsFull));
        assert_eq!(executor.run_until_idle(), MAX_TASKS);
    }

    #[test]
    #[serial]
    fn test_external_cancel_releases_slot() {
        let task = pin!(Coroutine::new(core::future::pending::<()>()));
        let task = task.into_ref();

        let Ok(mut executor) = Executor::new() else {
            panic!("执行器被占用");
        };
        let Ok(id) = executor.spawn(task) else {
            panic!("添加任务失败");
        };
        executor.run_until_idle();
        assert_eq!(executor.task_count(), 1);

        // 取消会唤醒执行器，执行器随后释放槽位
        assert!(task.cancel());
        assert_eq!(executor.run_until_idle(), 1);
        assert_eq!(executor.task_count(), 0);

        // 旧的唤醒器已失效
        TaskWaker::new(id).wake();
        assert!(!executor.run_once());
    }
}
