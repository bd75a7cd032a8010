//! Test doubles for the execution engine.

pub mod mocks;
pub mod runs;

pub use mocks::{InMemoryLock, LockCall, MockLock};
pub use runs::{AlwaysFail, FlakyRun, RunCounter};
