use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::errors::{DcronError, Result};

/// CRON表达式解析和调度工具
///
/// 表达式带秒字段（6或7段），例如 `*/5 * * * * *` 表示每5秒一次。
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

/// 一次触发的时间区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub planned_at: DateTime<Utc>,
    /// 没有下一次触发时等于 `planned_at`
    pub next_at: DateTime<Utc>,
    /// 本次之后是否还有触发
    pub has_next: bool,
}

impl CronSchedule {
    /// 解析CRON表达式，`key` 只用于错误信息
    pub fn parse(key: &str, expr: &str) -> Result<Self> {
        let schedule = Schedule::from_str(expr).map_err(|e| DcronError::InvalidCron {
            key: key.to_string(),
            expr: expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// 获取 `from` 之后的下一次执行时间，按 `tz` 时区解释表达式
    pub fn next_after(&self, from: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&tz))
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// 获取 `from` 之后的下一次触发，以及它之后的那一次
    pub fn occurrence_after(&self, from: DateTime<Utc>, tz: Tz) -> Option<Occurrence> {
        let planned_at = self.next_after(from, tz)?;
        let next = self.next_after(planned_at, tz);
        Some(Occurrence {
            planned_at,
            next_at: next.unwrap_or(planned_at),
            has_next: next.is_some(),
        })
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, tz: Tz, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&tz))
            .take(count)
            .map(|dt| dt.with_timezone(&Utc))
            .collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate(expr: &str) -> Result<()> {
        Self::parse("", expr).map(|_| ())
    }
}
