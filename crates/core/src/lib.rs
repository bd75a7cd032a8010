//! 分布式定时任务执行引擎
//!
//! 多个进程注册相同的任务和CRON表达式，通过可插拔的 [`Lock`] 保证同一次触发
//! 最多只有一个进程真正执行；每个进程仍然在本地记录执行结果、重试和统计信息。

pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod job;
pub mod lock;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod statistics;
pub mod task;

pub use self::config::{AppConfig, CronConfig, JobConfig, ObservabilityConfig};
pub use context::ExecutionContext;
pub use registry::{parse_timezone, Cron, StopHandle};
pub use engine::Executor;
pub use errors::*;
pub use job::{run_fn, AfterFn, BeforeFn, Job, JobEntry, RunFn, RunFuture, DEFAULT_RETRY_TIMES};
pub use lock::Lock;
pub use retry::RetryInterval;
pub use schedule::{CronSchedule, Occurrence};
pub use statistics::{Statistics, StatisticsSnapshot};
pub use task::Task;

pub use chrono_tz::Tz;
pub use tokio_util::sync::CancellationToken;
