use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 重试间隔策略
///
/// 纯函数：输入刚刚完成的尝试序号（从1开始），返回下一次尝试之前需要等待的时长。
#[derive(Clone)]
pub struct RetryInterval(Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl RetryInterval {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// 固定间隔
    pub fn fixed(interval: Duration) -> Self {
        Self::new(move |_| interval)
    }

    /// 指数退避：`base * multiplier^(attempt-1)`，不超过 `max`
    pub fn exponential(base: Duration, max: Duration, multiplier: f64) -> Self {
        Self::new(move |attempt| {
            let exponent = attempt.saturating_sub(1) as i32;
            let secs = base.as_secs_f64() * multiplier.powi(exponent);
            if !secs.is_finite() || secs >= max.as_secs_f64() {
                max
            } else {
                Duration::from_secs_f64(secs.max(0.0))
            }
        })
    }

    /// 计算第 `attempt` 次尝试之后的等待时长
    pub fn interval(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }
}

impl fmt::Debug for RetryInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetryInterval").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_interval() {
        let policy = RetryInterval::fixed(Duration::from_millis(200));
        assert_eq!(policy.interval(1), Duration::from_millis(200));
        assert_eq!(policy.interval(7), Duration::from_millis(200));
    }

    #[test]
    fn test_exponential_interval() {
        let policy =
            RetryInterval::exponential(Duration::from_secs(1), Duration::from_secs(10), 2.0);
        assert_eq!(policy.interval(1), Duration::from_secs(1));
        assert_eq!(policy.interval(2), Duration::from_secs(2));
        assert_eq!(policy.interval(3), Duration::from_secs(4));
        assert_eq!(policy.interval(4), Duration::from_secs(8));
        assert_eq!(policy.interval(5), Duration::from_secs(10));
        assert_eq!(policy.interval(200), Duration::from_secs(10));
    }

    #[test]
    fn test_custom_interval() {
        let policy = RetryInterval::new(|attempt| Duration::from_millis(attempt as u64 * 100));
        assert_eq!(policy.interval(3), Duration::from_millis(300));
    }
}
