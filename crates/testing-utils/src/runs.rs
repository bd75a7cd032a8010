//! Run-function helpers

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dcron_core::{run_fn, RunFn};

/// Counts invocations
#[derive(Debug, Clone, Default)]
pub struct RunCounter {
    calls: Arc<AtomicU32>,
}

impl RunCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) -> u32 {
        self.calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// A run function that always succeeds
    pub fn succeeding(&self) -> RunFn {
        let counter = self.clone();
        run_fn(move |_ctx, _task| {
            counter.hit();
            async { Ok(()) }
        })
    }
}

/// Fails the first `failures` calls, then succeeds
#[derive(Debug, Clone)]
pub struct FlakyRun {
    failures: u32,
    counter: RunCounter,
}

impl FlakyRun {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            counter: RunCounter::new(),
        }
    }

    pub fn calls(&self) -> u32 {
        self.counter.calls()
    }

    pub fn run_fn(&self) -> RunFn {
        let failures = self.failures;
        let counter = self.counter.clone();
        run_fn(move |_ctx, _task| {
            let call = counter.hit();
            async move {
                if call <= failures {
                    Err(anyhow::anyhow!("flaky failure #{call}"))
                } else {
                    Ok(())
                }
            }
        })
    }
}

/// Always returns an error
#[derive(Debug, Clone, Default)]
pub struct AlwaysFail {
    counter: RunCounter,
}

impl AlwaysFail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.counter.calls()
    }

    pub fn run_fn(&self) -> RunFn {
        let counter = self.counter.clone();
        run_fn(move |_ctx, _task| {
            let call = counter.hit();
            async move { Err(anyhow::anyhow!("failure #{call}")) }
        })
    }
}
