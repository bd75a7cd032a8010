use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dcron_core::{CancellationToken, Cron, Job, Lock, StatisticsSnapshot, Task};
use dcron_testing_utils::{InMemoryLock, MockLock, RunCounter};

const EVERY_SECOND: &str = "* * * * * *";

#[tokio::test]
async fn test_start_schedules_and_stop_halts() {
    let counter = RunCounter::new();
    let cron = Cron::new().with_hostname("node-1");
    cron.add_jobs([Job::new("tick", EVERY_SECOND).run_boxed(counter.succeeding())])
        .unwrap();

    assert!(cron.start());
    assert!(cron.is_running());
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(cron.stop().wait_timeout(Duration::from_secs(5)).await);
    assert!(!cron.is_running());

    let fired = counter.calls();
    assert!(fired >= 2, "expected at least 2 firings, got {fired}");
    let stats = cron.statistics();
    assert_eq!(stats.total_task, u64::from(fired));
    assert_eq!(stats.passed_task, u64::from(fired));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(counter.calls(), fired);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_execution() {
    let finished = Arc::new(AtomicU32::new(0));
    let finished_in_run = Arc::clone(&finished);
    let cron = Cron::new();
    cron.add_jobs([Job::new("slow", EVERY_SECOND).run(move |_ctx, _task| {
        let finished = Arc::clone(&finished_in_run);
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })])
    .unwrap();

    cron.start();
    // 等到第一次触发开始执行
    while cron.statistics().total_task == 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cron.stop().wait().await;

    let stats = cron.statistics();
    assert_eq!(u64::from(finished.load(Ordering::SeqCst)), stats.total_task);
    assert_eq!(stats.passed_task, stats.total_task);
}

#[tokio::test]
async fn test_start_twice_keeps_single_loop() {
    let counter = RunCounter::new();
    let cron = Cron::new();
    cron.add_jobs([Job::new("once", EVERY_SECOND).run_boxed(counter.succeeding())])
        .unwrap();

    assert!(cron.start());
    assert!(!cron.start());
    tokio::time::sleep(Duration::from_millis(2200)).await;
    cron.stop().wait().await;

    // 每秒只能触发一次，重复启动不会产生第二个调度循环
    assert!(counter.calls() <= 3, "got {} firings", counter.calls());
}

#[tokio::test]
async fn test_jobs_added_while_running_are_scheduled() {
    let counter = RunCounter::new();
    let cron = Cron::new();
    cron.start();

    cron.add_jobs([Job::new("late", EVERY_SECOND).run_boxed(counter.succeeding())])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cron.stop().wait().await;

    assert!(counter.calls() >= 1);
    assert_eq!(cron.job("late").unwrap().statistics().total_task, u64::from(counter.calls()));
}

#[tokio::test]
async fn test_run_returns_after_root_cancelled() {
    let parent = CancellationToken::new();
    let counter = RunCounter::new();
    let cron = Cron::new().with_context(parent.clone());
    cron.add_jobs([Job::new("tick", EVERY_SECOND).run_boxed(counter.succeeding())])
        .unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        parent.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), cron.run())
        .await
        .expect("run returns once the root context is cancelled");
    canceller.await.unwrap();

    assert!(!cron.is_running());
    assert!(counter.calls() >= 1);
}

#[tokio::test]
async fn test_run_on_started_registry_returns_immediately() {
    let cron = Cron::new();
    assert!(cron.start());

    tokio::time::timeout(Duration::from_millis(100), cron.run())
        .await
        .expect("run does nothing when already started");
    assert!(cron.is_running());
    cron.stop().wait().await;
}

#[tokio::test]
async fn test_root_cancellation_reaches_run_fn() {
    let parent = CancellationToken::new();
    let outcomes = Arc::new(Mutex::new(Vec::<Task>::new()));
    let recorded = Arc::clone(&outcomes);
    let cron = Cron::new().with_context(parent.clone());
    cron.add_jobs([Job::new("waiting", EVERY_SECOND)
        .run(|ctx, _task| async move {
            ctx.done().await;
            Err(anyhow::anyhow!("stopped: {:?}", ctx.err()))
        })
        .after(move |task| recorded.lock().unwrap().push(task.clone()))])
    .unwrap();

    cron.start();
    while cron.statistics().total_task == 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    parent.cancel();
    assert!(cron.stop().wait_timeout(Duration::from_secs(2)).await);

    let outcomes = outcomes.lock().unwrap();
    assert!(!outcomes.is_empty());
    let last = outcomes.last().unwrap();
    assert!(last.outcome.as_ref().unwrap().to_string().contains("Cancelled"));
}

#[tokio::test]
async fn test_registry_locks_with_hostname() {
    let lock = MockLock::granting();
    let cron = Cron::new()
        .with_hostname("node-7")
        .with_lock(Arc::new(lock.clone()));
    cron.add_jobs([Job::new("locked", EVERY_SECOND)]).unwrap();

    cron.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    cron.stop().wait().await;

    let calls = lock.lock_calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|c| c.key == "locked" && c.identity == "node-7"));
    assert_eq!(lock.unlock_count(), calls.len());
}

#[tokio::test]
async fn test_shared_lock_admits_one_node_per_firing() {
    let lock: Arc<dyn Lock> =
        Arc::new(InMemoryLock::new(Duration::from_millis(800)).hold_until_expiry());
    let ran = Arc::new(AtomicU32::new(0));

    let nodes: Vec<Cron> = ["node-a", "node-b", "node-c"]
        .into_iter()
        .map(|hostname| {
            let ran = Arc::clone(&ran);
            let cron = Cron::new()
                .with_hostname(hostname)
                .with_lock(Arc::clone(&lock));
            cron.add_jobs([Job::new("shared", EVERY_SECOND).run(move |_ctx, _task| {
                ran.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })])
            .unwrap();
            cron
        })
        .collect();

    for node in &nodes {
        node.start();
    }
    tokio::time::sleep(Duration::from_millis(3500)).await;
    for node in &nodes {
        node.stop().wait().await;
    }

    let total = nodes.iter().map(Cron::statistics).sum::<StatisticsSnapshot>();
    assert_eq!(total.total_task, total.passed_task + total.missed_task);
    assert_eq!(u64::from(ran.load(Ordering::SeqCst)), total.passed_task);
    assert!(total.passed_task >= 2);
    // 三个节点每次触发只有一个能执行
    assert!(total.missed_task >= 2 * total.passed_task - 2);
}
