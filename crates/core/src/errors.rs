use std::sync::Arc;

use thiserror::Error;

/// 调度器配置错误类型定义
///
/// 只在注册任务、解析配置时同步返回，任务运行期间的错误不会经过这里。
#[derive(Debug, Error)]
pub enum DcronError {
    #[error("任务key不能为空")]
    EmptyKey,

    #[error("任务key重复: {key}")]
    DuplicateKey { key: String },

    #[error("无效的CRON表达式: {key} => {expr} - {message}")]
    InvalidCron {
        key: String,
        expr: String,
        message: String,
    },

    #[error("无效的时区: {name} - {message}")]
    InvalidTimezone { name: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, DcronError>;

/// 单次执行尝试的失败原因，记录在 [`Task`](crate::Task) 上
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("{0}")]
    Failed(Arc<anyhow::Error>),

    #[error("{message}: {backtrace}")]
    Panicked { message: String, backtrace: String },
}

impl RunError {
    pub fn is_panic(&self) -> bool {
        matches!(self, RunError::Panicked { .. })
    }
}

impl From<anyhow::Error> for RunError {
    fn from(err: anyhow::Error) -> Self {
        RunError::Failed(Arc::new(err))
    }
}

/// 执行上下文结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("执行上下文已取消")]
    Cancelled,

    #[error("执行上下文已超过截止时间")]
    DeadlineExceeded,
}
