use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::ExecutionContext;
use crate::errors::{DcronError, Result};
use crate::retry::RetryInterval;
use crate::schedule::CronSchedule;
use crate::statistics::{Statistics, StatisticsSnapshot};
use crate::task::Task;

/// 运行函数返回的 future
pub type RunFuture = BoxFuture<'static, anyhow::Result<()>>;

/// 运行函数：接收本次触发的执行上下文和当前 Task 的快照
pub type RunFn = Arc<dyn Fn(ExecutionContext, Task) -> RunFuture + Send + Sync>;

/// before 钩子：返回 `true` 表示跳过本次触发
pub type BeforeFn = Arc<dyn Fn(&Task) -> bool + Send + Sync>;

/// after 钩子：观察最终的 Task
pub type AfterFn = Arc<dyn Fn(&Task) + Send + Sync>;

/// 默认尝试次数，即只执行一次不重试
pub const DEFAULT_RETRY_TIMES: u32 = 1;

/// 把异步闭包包装成 [`RunFn`]
pub fn run_fn<F, Fut>(f: F) -> RunFn
where
    F: Fn(ExecutionContext, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, task| -> RunFuture { Box::pin(f(ctx, task)) })
}

/// 任务定义构建器
pub struct Job {
    key: String,
    spec: String,
    run: Option<RunFn>,
    retry_times: u32,
    retry_interval: Option<RetryInterval>,
    no_lock: bool,
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
}

impl Job {
    /// 创建新的任务定义，未设置运行函数时每次执行都直接成功
    pub fn new(key: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            spec: spec.into(),
            run: None,
            retry_times: DEFAULT_RETRY_TIMES,
            retry_interval: None,
            no_lock: false,
            before: None,
            after: None,
        }
    }

    /// 设置运行函数
    pub fn run<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ExecutionContext, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.run = Some(run_fn(f));
        self
    }

    /// 直接使用已经包装好的 [`RunFn`]
    pub fn run_boxed(mut self, run: RunFn) -> Self {
        self.run = Some(run);
        self
    }

    /// 设置最大尝试次数（包含首次执行）
    pub fn retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    /// 设置重试间隔策略
    pub fn retry_interval(mut self, retry_interval: RetryInterval) -> Self {
        self.retry_interval = Some(retry_interval);
        self
    }

    /// 不使用分布式锁，每个进程都会执行
    pub fn no_lock(mut self) -> Self {
        self.no_lock = true;
        self
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn after<F>(mut self, f: F) -> Self
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("spec", &self.spec)
            .field("retry_times", &self.retry_times)
            .field("no_lock", &self.no_lock)
            .finish_non_exhaustive()
    }
}

/// 已注册的任务
///
/// 注册后配置不再变化，只有统计计数器会被执行引擎更新。
pub struct JobEntry {
    key: String,
    schedule: CronSchedule,
    pub(crate) run: Option<RunFn>,
    pub(crate) retry_times: u32,
    pub(crate) retry_interval: Option<RetryInterval>,
    pub(crate) no_lock: bool,
    pub(crate) before: Option<BeforeFn>,
    pub(crate) after: Option<AfterFn>,
    pub(crate) statistics: Statistics,
}

impl JobEntry {
    /// 校验任务定义：key不能为空，CRON表达式必须合法
    pub fn try_from_job(job: Job) -> Result<Self> {
        if job.key.is_empty() {
            return Err(DcronError::EmptyKey);
        }
        let schedule = CronSchedule::parse(&job.key, &job.spec)?;

        Ok(Self {
            key: job.key,
            schedule,
            run: job.run,
            retry_times: job.retry_times,
            retry_interval: job.retry_interval,
            no_lock: job.no_lock,
            before: job.before,
            after: job.after,
            statistics: Statistics::new(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn spec(&self) -> &str {
        self.schedule.expr()
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn retry_times(&self) -> u32 {
        self.retry_times
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry")
            .field("key", &self.key)
            .field("spec", &self.spec())
            .field("retry_times", &self.retry_times)
            .field("no_lock", &self.no_lock)
            .field("statistics", &self.statistics())
            .finish_non_exhaustive()
    }
}
