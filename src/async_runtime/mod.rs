//! Async runtime module
//!
//! This module holds a reference scheduler that drives tasks on readiness
//! notifications, and awaitables that bridge to other runtimes.

pub mod executor;
#[cfg(feature = "async-runtime")]
pub mod oneshot;

pub use executor::{Scheduler, TaskOutcome, Tick};
#[cfg(feature = "async-runtime")]
pub use oneshot::OneshotAwaitable;
