//! # 协程状态
//!
//! ## 状态转换图
//!
//! ```text
//!                    ┌─────────┐
//!                    │ Created │───────────────┐
//!                    └────┬────┘               │
//!                         │ resume()           │
//!                         ▼                    │
//!                    ┌─────────┐               │
//!          ┌────────►│ Running │               │ cancel()
//!          │         └────┬────┘               │
//!          │ resume()     │ Pending            │
//!          │              ▼                    ▼
//!          │        ┌───────────┐  cancel() ┌───────────┐
//!          └────────│ Suspended │──────────►│ Cancelled │
//!                   └───────────┘           └───────────┘
//!
//!   Running ──Ready──► Finished        Running ──cancel()──► 本次轮询返回后 Cancelled
//! ```

/// 协程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 已创建，尚未执行
    Created,
    /// 正在执行
    Running,
    /// 在某个等待点挂起
    Suspended,
    /// 正常结束
    Finished,
    /// 被取消
    Cancelled,
}

impl TaskState {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Cancelled)
    }

    /// 是否可以转换到 `next`
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Created, Cancelled)
                | (Running, Suspended)
                | (Running, Finished)
                | (Running, Cancelled)
                | (Suspended, Running)
                | (Suspended, Cancelled)
        )
    }
}
