use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::ExecutionContext;
use crate::errors::RunError;
use crate::job::{JobEntry, RunFn};
use crate::lock::Lock;
use crate::task::Task;

/// 任务执行引擎
///
/// 每次触发调用一次 [`execute`](Self::execute)。执行过程：
///
/// 1. 以 `next_at` 为截止时间派生执行上下文
/// 2. before 钩子决定是否跳过
/// 3. 需要加锁时抢占分布式锁，没抢到视为错过
/// 4. 在截止时间内按重试策略多次尝试运行函数，结束后释放锁
/// 5. 调用 after 钩子并记录任务级统计
///
/// 运行函数的错误和 panic 都只记录在 Task 和统计计数器上，不会向外传播。
/// 钩子中的 panic 不做处理。
#[derive(Clone)]
pub struct Executor {
    hostname: String,
    lock: Option<Arc<dyn Lock>>,
    root: CancellationToken,
}

impl Executor {
    pub fn new(hostname: String, lock: Option<Arc<dyn Lock>>, root: CancellationToken) -> Self {
        Self {
            hostname,
            lock,
            root,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// 执行一次触发，返回最终的 Task
    pub async fn execute(
        &self,
        job: &JobEntry,
        planned_at: DateTime<Utc>,
        next_at: DateTime<Utc>,
    ) -> Task {
        let mut task = Task::new(job.key(), planned_at, next_at);
        job.statistics.incr_total_task();

        let ctx = ExecutionContext::with_deadline_at(&self.root, next_at);

        if let Some(before) = &job.before {
            if before(&task) {
                task.skipped = true;
                job.statistics.incr_skipped_task();
                info!(task = %task.key, "任务被before钩子跳过");
            }
        }

        if !task.skipped {
            let lock = if job.no_lock { None } else { self.lock.as_ref() };

            let admitted = match lock {
                Some(lock) => lock.lock(&ctx, &task.key, &self.hostname).await,
                None => true,
            };

            if admitted {
                self.attempt(job, &ctx, &mut task).await;

                if let Some(lock) = lock {
                    lock.unlock(&ctx, &task.key, &self.hostname).await;
                    debug!(task = %task.key, hostname = %self.hostname, "已释放任务锁");
                }
            } else {
                task.missed = true;
                job.statistics.incr_missed_task();
                info!(task = %task.key, "未获得任务锁，本次触发已错过");
            }
        }

        if let Some(after) = &job.after {
            after(&task);
        }

        if !task.skipped && !task.missed {
            // 未设置运行函数视为空操作成功；尝试次数为0时既不算成功也不算失败
            if job.run.is_none() || (task.tried_times > 0 && task.outcome.is_none()) {
                job.statistics.incr_passed_task();
            } else if task.tried_times > 0 {
                job.statistics.incr_failed_task();
            }
        }

        ctx.cancel();
        task
    }

    async fn attempt(&self, job: &JobEntry, ctx: &ExecutionContext, task: &mut Task) {
        task.begin_at = Some(Utc::now());

        let Some(run) = job.run.as_ref() else {
            debug!(task = %task.key, "未设置运行函数，跳过执行");
            task.end_at = Some(Utc::now());
            return;
        };

        for i in 0..job.retry_times {
            info!(
                task = %task.key,
                attempt = i + 1,
                max_attempts = job.retry_times,
                "开始执行任务"
            );

            task.outcome = safe_run(run, ctx, task.clone()).await.err();
            job.statistics.incr_total_run();
            if i > 0 {
                job.statistics.incr_retried_run();
            }
            task.tried_times += 1;

            let err = match &task.outcome {
                None => {
                    job.statistics.incr_passed_run();
                    info!(task = %task.key, "任务执行成功");
                    break;
                }
                Some(err) => err,
            };
            error!(task = %task.key, error = %err, "任务执行出错");
            job.statistics.incr_failed_run();

            if ctx.err().is_some() {
                break;
            }
            if let Some(retry_interval) = &job.retry_interval {
                let interval = retry_interval.interval(task.tried_times);
                if ctx.deadline().saturating_duration_since(Instant::now()) < interval {
                    break;
                }
                info!(
                    task = %task.key,
                    sleep_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                    "重试前等待"
                );
                tokio::time::sleep(interval).await;
            }
        }

        task.end_at = Some(Utc::now());
    }
}

/// 执行运行函数，把 panic 转换为错误
async fn safe_run(run: &RunFn, ctx: &ExecutionContext, task: Task) -> Result<(), RunError> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| run(ctx.clone(), task))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panic_error(payload)),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result.map_err(RunError::from),
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> RunError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知的panic".to_string()
    };

    RunError::Panicked {
        message,
        backtrace: Backtrace::force_capture().to_string(),
    }
}
