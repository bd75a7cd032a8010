use std::iter::Sum;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 任务统计计数器
///
/// 每个计数器单独原子递增；读取快照时不保证多个字段之间的一致性。
#[derive(Debug, Default)]
pub struct Statistics {
    total_task: AtomicU64,
    skipped_task: AtomicU64,
    missed_task: AtomicU64,
    passed_task: AtomicU64,
    failed_task: AtomicU64,
    total_run: AtomicU64,
    passed_run: AtomicU64,
    failed_run: AtomicU64,
    retried_run: AtomicU64,
}

/// 统计计数器的只读快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// 观察到的全部触发次数
    pub total_task: u64,
    /// 被 before 钩子跳过的触发
    pub skipped_task: u64,
    /// 未抢到锁的触发
    pub missed_task: u64,
    pub passed_task: u64,
    pub failed_task: u64,
    /// 每次尝试执行都计数
    pub total_run: u64,
    pub passed_run: u64,
    pub failed_run: u64,
    /// 首次之后的重试次数
    pub retried_run: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr_total_task(&self) {
        self.total_task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_skipped_task(&self) {
        self.skipped_task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_missed_task(&self) {
        self.missed_task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_passed_task(&self) {
        self.passed_task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_failed_task(&self) {
        self.failed_task.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_total_run(&self) {
        self.total_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_passed_run(&self) {
        self.passed_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_failed_run(&self) {
        self.failed_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_retried_run(&self) {
        self.retried_run.fetch_add(1, Ordering::Relaxed);
    }

    /// 读取当前计数
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_task: self.total_task.load(Ordering::Relaxed),
            skipped_task: self.skipped_task.load(Ordering::Relaxed),
            missed_task: self.missed_task.load(Ordering::Relaxed),
            passed_task: self.passed_task.load(Ordering::Relaxed),
            failed_task: self.failed_task.load(Ordering::Relaxed),
            total_run: self.total_run.load(Ordering::Relaxed),
            passed_run: self.passed_run.load(Ordering::Relaxed),
            failed_run: self.failed_run.load(Ordering::Relaxed),
            retried_run: self.retried_run.load(Ordering::Relaxed),
        }
    }
}

impl Add for StatisticsSnapshot {
    type Output = StatisticsSnapshot;

    fn add(self, rhs: Self) -> Self::Output {
        StatisticsSnapshot {
            total_task: self.total_task + rhs.total_task,
            skipped_task: self.skipped_task + rhs.skipped_task,
            missed_task: self.missed_task + rhs.missed_task,
            passed_task: self.passed_task + rhs.passed_task,
            failed_task: self.failed_task + rhs.failed_task,
            total_run: self.total_run + rhs.total_run,
            passed_run: self.passed_run + rhs.passed_run,
            failed_run: self.failed_run + rhs.failed_run,
            retried_run: self.retried_run + rhs.retried_run,
        }
    }
}

impl Sum for StatisticsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(StatisticsSnapshot::default(), |acc, s| acc + s)
    }
}
