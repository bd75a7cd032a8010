use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dcron_core::{AppConfig, Cron, ExecutionContext, Job, JobConfig, RetryInterval, Task};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 根据配置创建注册表并注册所有Shell任务
pub fn build_cron(config: &AppConfig) -> Result<Cron> {
    config.validate().context("配置校验失败")?;

    let cron = Cron::from_config(&config.cron)?;
    cron.add_jobs(config.jobs.iter().map(shell_job))
        .context("注册任务失败")?;

    info!(
        hostname = %cron.hostname(),
        timezone = %cron.timezone().name(),
        jobs = config.jobs.len(),
        "注册表已创建"
    );
    Ok(cron)
}

/// 把任务配置转换为执行 `sh -c <command>` 的任务
pub fn shell_job(config: &JobConfig) -> Job {
    let command: Arc<str> = Arc::from(config.command.as_str());

    let mut job = Job::new(config.key.clone(), config.spec.clone())
        .run(move |ctx, task| run_shell(ctx, task, Arc::clone(&command)))
        .retry_times(config.retry_times);

    if let Some(ms) = config.retry_interval_ms {
        job = job.retry_interval(RetryInterval::fixed(Duration::from_millis(ms)));
    }
    if config.no_lock {
        job = job.no_lock();
    }
    job
}

/// 执行Shell命令，触发的上下文结束时终止子进程
async fn run_shell(ctx: ExecutionContext, task: Task, command: Arc<str>) -> Result<()> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command.as_ref())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("启动命令失败: {command}"))?;

    debug!(task = %task.key, pid = ?child.id(), "子进程已启动");

    let output = tokio::select! {
        output = child.wait_with_output() => output.context("等待子进程结束失败")?,
        _ = ctx.done() => {
            warn!(task = %task.key, "执行上下文已结束，终止子进程");
            return Err(anyhow::anyhow!("命令被中断: {:?}", ctx.err()));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(task = %task.key, stdout = %stdout.trim_end(), "命令输出");
    }

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    match output.status.code() {
        Some(code) => Err(anyhow::anyhow!("命令退出码 {code}: {}", stderr.trim_end())),
        None => Err(anyhow::anyhow!("命令被信号终止: {}", stderr.trim_end())),
    }
}
