//! # Lux Coro
//!
//! A stackless coroutine task driver for request-per-task event loops:
//! - Explicit, re-entrant stepping driven by a reactor (no native threads)
//! - Nested coroutine calls on an explicit frame stack
//! - Failures unwound across frames like a native call stack
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//! - `coroutine`: Coroutine frames, awaitables and the per-request `Task`
//! - `async_runtime`: A reference scheduler (task and I/O-callback tables)
//! - `runtime`: Values exchanged with coroutines and their bounded rendering
//! - `config`: Per-task configuration
//! - `error`: Error handling and diagnostics

pub mod async_runtime;
pub mod config;
pub mod coroutine;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use async_runtime::{Scheduler, TaskOutcome};
pub use config::{RunMode, TaskConfig, TimeoutDelivery};
pub use coroutine::{Awaitable, Coroutine, Handler, Resume, Resumption, Suspend, Task, TaskId};
pub use error::{CoroError, CoroResult, Diagnostic};
pub use runtime::Value;

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
