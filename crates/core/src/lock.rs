use async_trait::async_trait;

use crate::context::ExecutionContext;

/// 分布式锁接口
///
/// 可以基于 Redis、SQL 等共享存储实现，例如 Redis 的
/// `SET key value NX PX 60000`。
///
/// - 同一个 `key` 在整个集群中同一时刻最多只能授予一个调用方，不同 `key` 之间
///   必须能并发调用。
/// - `identity` 只是持有者标识，用于排查问题，不参与竞争。
/// - 授予的锁至少要保留一个调度周期，持有者崩溃后其他进程不会立即拿到锁并重复执行。
/// - 底层存储的临时故障应当映射为返回 `false`（即本次触发被视为错过），不要抛出错误。
#[async_trait]
pub trait Lock: Send + Sync {
    /// key不存在时写入并返回 `true`，否则什么都不做并返回 `false`
    async fn lock(&self, ctx: &ExecutionContext, key: &str, identity: &str) -> bool;

    /// 删除key，尽力而为，失败不能影响本次触发
    async fn unlock(&self, ctx: &ExecutionContext, key: &str, identity: &str);
}
