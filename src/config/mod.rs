// 运行时配置
pub const MAX_TASKS: usize = 32; // 执行器可同时管理的任务数
pub const TASK_INDEX_BITS: u32 = 8; // Waker 数据字中槽位索引所占的位数，其余位存放代数

const _: () = assert!(MAX_TASKS <= 1 << TASK_INDEX_BITS);
