use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::CronConfig;
use crate::engine::Executor;
use crate::errors::{DcronError, Result};
use crate::job::{Job, JobEntry};
use crate::lock::Lock;
use crate::statistics::StatisticsSnapshot;

/// 分布式定时任务注册表
///
/// 所有进程注册相同的任务，配置了 [`Lock`] 时同一次触发只有抢到锁的进程会执行，
/// 其余进程记为错过。
pub struct Cron {
    hostname: String,
    lock: Option<Arc<dyn Lock>>,
    timezone: Tz,
    root: CancellationToken,
    jobs: RwLock<Vec<Arc<JobEntry>>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    stop: CancellationToken,
    tracker: TaskTracker,
    handle: Handle,
}

/// [`Cron::stop`] 返回的句柄，用于等待正在执行的触发结束
#[derive(Debug)]
pub struct StopHandle {
    tracker: Option<TaskTracker>,
}

impl StopHandle {
    /// 等待所有正在执行的触发结束
    pub async fn wait(self) {
        if let Some(tracker) = self.tracker {
            tracker.wait().await;
        }
    }

    /// 带超时的等待，超时返回 `false`
    pub async fn wait_timeout(self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

impl Cron {
    pub fn new() -> Self {
        Self {
            hostname: default_hostname(),
            lock: None,
            timezone: Tz::UTC,
            root: CancellationToken::new(),
            jobs: RwLock::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// 根据配置创建
    pub fn from_config(config: &CronConfig) -> Result<Self> {
        let mut cron = Self::new();
        if let Some(hostname) = &config.hostname {
            cron = cron.with_hostname(hostname.clone());
        }
        if let Some(name) = &config.timezone {
            cron = cron.with_timezone(parse_timezone(name)?);
        }
        Ok(cron)
    }

    /// 设置主机名，作为持有锁的标识
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// 设置分布式锁
    pub fn with_lock(mut self, lock: Arc<dyn Lock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// 设置CRON表达式使用的时区
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// 设置根上下文，取消后所有执行中的上下文都会取消，调度也随之停止
    pub fn with_context(mut self, parent: CancellationToken) -> Self {
        self.root = parent.child_token();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn lock(&self) -> Option<Arc<dyn Lock>> {
        self.lock.clone()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn root_context(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 创建执行引擎
    pub fn executor(&self) -> Executor {
        Executor::new(self.hostname.clone(), self.lock.clone(), self.root.clone())
    }

    /// 注册任务
    ///
    /// 任意一个任务校验失败时整批都不会注册。
    pub fn add_jobs(&self, jobs: impl IntoIterator<Item = Job>) -> Result<()> {
        let mut registered = self.jobs.write().unwrap_or_else(PoisonError::into_inner);

        let mut entries: Vec<Arc<JobEntry>> = Vec::new();
        for job in jobs {
            let entry = JobEntry::try_from_job(job)?;
            let duplicated = registered
                .iter()
                .chain(entries.iter())
                .any(|j| j.key() == entry.key());
            if duplicated {
                return Err(DcronError::DuplicateKey {
                    key: entry.key().to_string(),
                });
            }
            entries.push(Arc::new(entry));
        }

        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.as_ref() {
            for entry in &entries {
                self.spawn_schedule_loop(running, Arc::clone(entry));
            }
        }

        for entry in &entries {
            info!(task = %entry.key(), spec = %entry.spec(), "注册任务");
        }
        registered.extend(entries);
        Ok(())
    }

    /// 已注册的任务
    pub fn jobs(&self) -> Vec<Arc<JobEntry>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn job(&self, key: &str) -> Option<Arc<JobEntry>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|j| j.key() == key)
            .cloned()
    }

    /// 所有任务统计之和
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|j| j.statistics())
            .sum()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 开始调度，必须在 Tokio 运行时中调用
    ///
    /// 已经在运行时什么都不做并返回 `false`。
    pub fn start(&self) -> bool {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            debug!("调度器已经在运行");
            return false;
        }

        let state = Running {
            stop: self.root.child_token(),
            tracker: TaskTracker::new(),
            handle: Handle::current(),
        };
        for job in jobs.iter() {
            self.spawn_schedule_loop(&state, Arc::clone(job));
        }
        *running = Some(state);

        info!(hostname = %self.hostname, timezone = %self.timezone.name(), "调度器已启动");
        true
    }

    /// 停止调度，不会中断正在执行的触发
    pub fn stop(&self) -> StopHandle {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match running {
            Some(running) => {
                running.stop.cancel();
                running.tracker.close();
                info!("调度器已停止，等待执行中的任务结束");
                StopHandle {
                    tracker: Some(running.tracker),
                }
            }
            None => StopHandle { tracker: None },
        }
    }

    /// 启动并阻塞到根上下文被取消，然后停止并等待执行中的触发结束
    ///
    /// 已经通过 [`start`](Self::start) 启动时直接返回。
    pub async fn run(&self) {
        if !self.start() {
            return;
        }
        self.root.cancelled().await;
        self.stop().wait().await;
    }

    fn spawn_schedule_loop(&self, running: &Running, job: Arc<JobEntry>) {
        let fut = schedule_loop(
            self.executor(),
            job,
            self.timezone,
            running.stop.clone(),
            running.tracker.clone(),
            running.handle.clone(),
        );
        running.tracker.spawn_on(fut, &running.handle);
    }
}

impl Default for Cron {
    fn default() -> Self {
        Self::new()
    }
}

/// 单个任务的调度循环：睡到下一次触发时间，然后在独立的任务中执行
async fn schedule_loop(
    executor: Executor,
    job: Arc<JobEntry>,
    timezone: Tz,
    stop: CancellationToken,
    tracker: TaskTracker,
    handle: Handle,
) {
    let mut from = Utc::now();
    loop {
        let Some(occurrence) = job.schedule().occurrence_after(from, timezone) else {
            warn!(task = %job.key(), "没有后续的执行时间，停止调度");
            break;
        };

        let wait = (occurrence.planned_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let executor = executor.clone();
        let entry = Arc::clone(&job);
        tracker.spawn_on(
            async move {
                executor
                    .execute(&entry, occurrence.planned_at, occurrence.next_at)
                    .await;
            },
            &handle,
        );

        if !occurrence.has_next {
            debug!(task = %job.key(), "最后一次触发已派发");
            break;
        }
        from = resume_from(occurrence.planned_at, Utc::now());
    }
}

/// 下一次计算触发时间的起点
///
/// 进程停顿或主机挂起后从当前时间继续，错过的触发不再补发。
fn resume_from(planned_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    planned_at.max(now)
}

fn default_hostname() -> String {
    hostname::get()
        .unwrap_or_else(|_| "unknown".into())
        .to_string_lossy()
        .to_string()
}

/// 解析IANA时区名称，例如 `Asia/Shanghai`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|e| DcronError::InvalidTimezone {
        name: name.to_string(),
        message: e.to_string(),
    })
}
