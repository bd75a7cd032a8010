//! Mock implementations of the lock port
//!
//! `MockLock` answers every call with a fixed value and records the calls;
//! `InMemoryLock` behaves like `SET key value NX PX ttl` so several
//! registries in one process can share it as if it were a remote store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dcron_core::{ExecutionContext, Lock};
use tokio::time::Instant;

/// A recorded lock/unlock call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCall {
    pub key: String,
    pub identity: String,
}

/// Mock lock with a fixed answer
#[derive(Debug, Clone)]
pub struct MockLock {
    grant: bool,
    lock_calls: Arc<Mutex<Vec<LockCall>>>,
    unlock_calls: Arc<Mutex<Vec<LockCall>>>,
}

impl MockLock {
    pub fn granting() -> Self {
        Self::new(true)
    }

    pub fn denying() -> Self {
        Self::new(false)
    }

    fn new(grant: bool) -> Self {
        Self {
            grant,
            lock_calls: Arc::new(Mutex::new(Vec::new())),
            unlock_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn lock_calls(&self) -> Vec<LockCall> {
        self.lock_calls.lock().unwrap().clone()
    }

    pub fn unlock_calls(&self) -> Vec<LockCall> {
        self.unlock_calls.lock().unwrap().clone()
    }

    pub fn lock_count(&self) -> usize {
        self.lock_calls.lock().unwrap().len()
    }

    pub fn unlock_count(&self) -> usize {
        self.unlock_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Lock for MockLock {
    async fn lock(&self, _ctx: &ExecutionContext, key: &str, identity: &str) -> bool {
        self.lock_calls.lock().unwrap().push(LockCall {
            key: key.to_string(),
            identity: identity.to_string(),
        });
        self.grant
    }

    async fn unlock(&self, _ctx: &ExecutionContext, key: &str, identity: &str) {
        self.unlock_calls.lock().unwrap().push(LockCall {
            key: key.to_string(),
            identity: identity.to_string(),
        });
    }
}

/// In-process lock with expiry
#[derive(Debug, Clone)]
pub struct InMemoryLock {
    ttl: Duration,
    /// Keep grants until they expire instead of deleting them on unlock,
    /// the way a store keyed by occurrence would.
    hold_until_expiry: bool,
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl InMemoryLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            hold_until_expiry: false,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn hold_until_expiry(mut self) -> Self {
        self.hold_until_expiry = true;
        self
    }

    /// Current holder of `key`, if the grant has not expired
    pub fn holder(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(identity, _)| identity.clone())
    }
}

#[async_trait]
impl Lock for InMemoryLock {
    async fn lock(&self, _ctx: &ExecutionContext, key: &str, identity: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return false;
            }
        }
        entries.insert(key.to_string(), (identity.to_string(), now + self.ttl));
        true
    }

    async fn unlock(&self, _ctx: &ExecutionContext, key: &str, identity: &str) {
        if self.hold_until_expiry {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).is_some_and(|(holder, _)| holder == identity) {
            entries.remove(key);
        }
    }
}
