#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroError {
    // 任务相关
    TaskSlotsFull,
    TaskAlreadySpawned,
    InvalidTaskState,

    // 执行器相关
    ExecutorBusy,
}

impl core::fmt::Display for CoroError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            // 任务相关
            CoroError::TaskSlotsFull => write!(f, "Task slots full"),
            CoroError::TaskAlreadySpawned => write!(f, "Task already spawned"),
            CoroError::InvalidTaskState => write!(f, "Invalid task state"),

            // 执行器相关
            CoroError::ExecutorBusy => write!(f, "Another executor is running"),
        }
    }
}

pub type Result<T> = core::result::Result<T, CoroError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CoroError::TaskSlotsFull.to_string(), "Task slots full");
        assert_eq!(CoroError::ExecutorBusy.to_string(), "Another executor is running");
    }
}
