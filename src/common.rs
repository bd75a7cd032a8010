use std::time::Duration;

use anyhow::{Context, Result};
use dcron_core::{AppConfig, ObservabilityConfig};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::app::build_cron;

/// 停止调度后等待执行中触发结束的最长时间
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 命令行启动参数，未指定的项使用配置文件中的值
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    pub config_path: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub hostname: Option<String>,
}

/// 按日志配置安装全局订阅器，设置了 `RUST_LOG` 时以环境变量为准
pub fn init_logging(observability: &ObservabilityConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&observability.log_level)
            .with_context(|| format!("无效的日志级别: {}", observability.log_level))?,
    };

    let fmt_layer = match observability.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer().json().boxed(),
        "pretty" => tracing_subscriber::fmt::layer().pretty().boxed(),
        other => return Err(anyhow::anyhow!("不支持的日志格式: {other}")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .with_context(|| format!("初始化{}日志格式失败", observability.log_format))
}

/// 加载应用配置并应用命令行覆盖项
pub fn load_config(startup_config: &StartupConfig) -> Result<AppConfig> {
    let path = startup_config.config_path.as_deref();
    let mut config = AppConfig::load(path)
        .with_context(|| format!("加载配置文件失败: {}", path.unwrap_or("<默认路径>")))?;

    if let Some(hostname) = &startup_config.hostname {
        config.cron.hostname = Some(hostname.clone());
    }
    if let Some(level) = &startup_config.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &startup_config.log_format {
        config.observability.log_format = format.clone();
    }

    config.validate()?;
    Ok(config)
}

/// 启动调度并阻塞到收到关闭信号
pub async fn start_application(startup_config: StartupConfig) -> Result<()> {
    let config = load_config(&startup_config)?;
    init_logging(&config.observability)?;

    info!("启动分布式定时任务执行引擎");
    if let Some(path) = &startup_config.config_path {
        info!("配置文件: {path}");
    }

    let cron = build_cron(&config)?;
    cron.start();

    wait_for_shutdown_signal().await;

    info!("收到关闭信号，停止调度...");

    if cron.stop().wait_timeout(SHUTDOWN_TIMEOUT).await {
        info!("所有执行中的任务已结束");
    } else {
        warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "等待执行中的任务超时，强制退出");
    }

    for job in cron.jobs() {
        let stats = job.statistics();
        info!(
            task = %job.key(),
            total_task = stats.total_task,
            passed_task = stats.passed_task,
            failed_task = stats.failed_task,
            skipped_task = stats.skipped_task,
            missed_task = stats.missed_task,
            total_run = stats.total_run,
            retried_run = stats.retried_run,
            "任务统计"
        );
    }
    let total = cron.statistics();
    info!(
        total_task = total.total_task,
        passed_task = total.passed_task,
        failed_task = total.failed_task,
        "分布式定时任务执行引擎已退出"
    );
    Ok(())
}

/// 等待关闭信号
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let file = config_file(
            r#"
[cron]
hostname = "from-file"

[[jobs]]
key = "echo"
spec = "*/10 * * * * *"
command = "echo hi"
"#,
        );
        let startup = StartupConfig {
            config_path: Some(file.path().to_string_lossy().into_owned()),
            log_level: Some("debug".to_string()),
            log_format: Some("json".to_string()),
            hostname: Some("from-cli".to_string()),
        };

        let config = load_config(&startup).unwrap();

        assert_eq!(config.cron.hostname.as_deref(), Some("from-cli"));
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.jobs.len(), 1);
    }

    #[test]
    fn test_load_config_rejects_bad_override() {
        let file = config_file("");
        let startup = StartupConfig {
            config_path: Some(file.path().to_string_lossy().into_owned()),
            log_format: Some("xml".to_string()),
            ..Default::default()
        };

        assert!(load_config(&startup).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let startup = StartupConfig {
            config_path: Some("/nonexistent/dcron.toml".to_string()),
            ..Default::default()
        };

        assert!(load_config(&startup).is_err());
    }

    #[test]
    fn test_init_logging_rejects_unknown_format() {
        let observability = ObservabilityConfig {
            log_level: "info".to_string(),
            log_format: "xml".to_string(),
        };
        assert!(init_logging(&observability).is_err());
    }
}
