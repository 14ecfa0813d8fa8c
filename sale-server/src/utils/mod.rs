//! 工具模块 - 通用工具函数
//!
//! # 内容
//!
//! - 日志初始化（stdout / 滚动文件）
//! - 指数退避重试（confirmation 流水线与库存补偿共用）

pub mod logger;
pub mod retry;

pub use logger::{cleanup_old_logs, init_logger, init_logger_with_file};
pub use retry::{RetryPolicy, retry_if, retry_with_backoff};
