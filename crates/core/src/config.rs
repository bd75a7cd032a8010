use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{DcronError, Result};
use crate::job::DEFAULT_RETRY_TIMES;
use crate::schedule::CronSchedule;

/// 注册表配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CronConfig {
    /// 持有锁时使用的标识，默认取本机主机名
    pub hostname: Option<String>,
    /// IANA时区名称，默认UTC
    pub timezone: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `json` 或 `pretty`
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Shell任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub key: String,
    pub spec: String,
    /// 通过 `sh -c` 执行的命令
    pub command: String,
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// 重试间隔（毫秒），不设置则立即重试
    #[serde(default)]
    pub retry_interval_ms: Option<u64>,
    #[serde(default)]
    pub no_lock: bool,
}

fn default_retry_times() -> u32 {
    DEFAULT_RETRY_TIMES
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cron: CronConfig,
    pub observability: ObservabilityConfig,
    pub jobs: Vec<JobConfig>,
}

impl AppConfig {
    /// 从TOML文件加载配置，`DCRON__` 前缀的环境变量可以覆盖文件中的值，
    /// 例如 `DCRON__CRON__HOSTNAME=node-1`
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/dcron.toml", "dcron.toml", "/etc/dcron/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DCRON")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.observability.validate()?;

        let mut keys = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !keys.insert(job.key.as_str()) {
                return Err(DcronError::DuplicateKey {
                    key: job.key.clone(),
                });
            }
        }
        Ok(())
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(DcronError::Configuration(format!("无效的日志级别: {other}")));
            }
        }
        match self.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(DcronError::Configuration(format!("不支持的日志格式: {other}"))),
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(DcronError::EmptyKey);
        }
        if self.command.trim().is_empty() {
            return Err(DcronError::Configuration(format!(
                "任务 {} 的命令不能为空",
                self.key
            )));
        }
        CronSchedule::parse(&self.key, &self.spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[cron]
hostname = "node-1"
timezone = "Asia/Shanghai"

[observability]
log_level = "debug"
log_format = "json"

[[jobs]]
key = "cleanup"
spec = "0 */5 * * * *"
command = "echo cleanup"
retry_times = 3
retry_interval_ms = 500

[[jobs]]
key = "report"
spec = "0 0 9 * * *"
command = "echo report"
no_lock = true
"#;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
        assert!(config.cron.hostname.is_none());
        assert!(config.jobs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.cron.hostname.as_deref(), Some("node-1"));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].retry_times, 3);
        assert_eq!(config.jobs[0].retry_interval_ms, Some(500));
        assert_eq!(config.jobs[1].retry_times, DEFAULT_RETRY_TIMES);
        assert!(config.jobs[1].no_lock);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let serialized = config.to_toml().unwrap();
        assert_eq!(AppConfig::from_toml(&serialized).unwrap(), config);
    }

    #[test]
    fn test_invalid_job_rejected() {
        let toml_str = r#"
[[jobs]]
key = "broken"
spec = "* * * * *"
command = "true"
"#;
        let err = AppConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let toml_str = r#"
[[jobs]]
key = "same"
spec = "* * * * * *"
command = "true"

[[jobs]]
key = "same"
spec = "*/2 * * * * *"
command = "true"
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        let config = AppConfig {
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "xml".to_string(),
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DcronError::Configuration(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.cron.timezone.as_deref(), Some("Asia/Shanghai"));
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.jobs[0].key, "cleanup");
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/dcron.toml")).is_err());
    }
}
