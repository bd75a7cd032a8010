use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ContextError;

/// 单次触发的执行上下文
///
/// 由注册表的根上下文派生：根上下文取消会传递到这里。截止时间是本次触发的
/// `next_at`，到期后 [`err`](Self::err) 返回 [`ContextError::DeadlineExceeded`]。
/// 引擎不会强行中断运行函数，运行函数需要自行监听 [`done`](Self::done)。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    token: CancellationToken,
    deadline: Instant,
}

impl ExecutionContext {
    /// 从父上下文派生一个带截止时间的上下文
    pub fn with_deadline(parent: &CancellationToken, deadline: Instant) -> Self {
        Self {
            token: parent.child_token(),
            deadline,
        }
    }

    /// 截止时间为墙上时间的版本，早于当前时间的截止时间视为已到期
    pub fn with_deadline_at(parent: &CancellationToken, deadline: DateTime<Utc>) -> Self {
        let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Self::with_deadline(parent, Instant::now() + remaining)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// 距离截止时间的剩余时长
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 上下文仍然有效时返回 `None`
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// 等待上下文被取消或到期
    pub async fn done(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 用于派生更深一层的上下文
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
