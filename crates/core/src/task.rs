use chrono::{DateTime, Utc};

use crate::errors::RunError;

/// 某个任务的一次触发
///
/// 每次触发独立创建，依次传给 before 钩子、运行函数和 after 钩子。
#[derive(Debug, Clone)]
pub struct Task {
    /// 所属任务的key
    pub key: String,
    /// 计划触发时间
    pub planned_at: DateTime<Utc>,
    /// 下一次触发时间，同时也是本次执行的截止时间
    pub next_at: DateTime<Utc>,
    /// 开始执行时间，只有真正进入执行阶段才会设置
    pub begin_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    /// 已尝试次数
    pub tried_times: u32,
    /// 最后一次尝试的结果
    pub outcome: Option<RunError>,
    /// 被 before 钩子跳过
    pub skipped: bool,
    /// 未获得分布式锁
    pub missed: bool,
}

impl Task {
    pub fn new(key: impl Into<String>, planned_at: DateTime<Utc>, next_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            planned_at,
            next_at,
            begin_at: None,
            end_at: None,
            tried_times: 0,
            outcome: None,
            skipped: false,
            missed: false,
        }
    }

    /// 是否进入过执行阶段
    pub fn attempted(&self) -> bool {
        self.begin_at.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.tried_times > 0 && self.outcome.is_none()
    }
}
