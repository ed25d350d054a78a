//! Coroutine task driver
//!
//! Coroutine bodies are explicit state machines ([`Coroutine`]) wrapped in
//! resumable [`Frame`]s. A [`Task`] owns a request's frames and advances them
//! one step at a time on behalf of a reactor.

pub mod awaitable;
pub mod context;
pub mod frame;
pub mod task;

pub use awaitable::{AwaitState, Awaitable, Completer, Deferred, Immediate, TIMEOUT_CODE};
pub use context::{Handler, LogContext, RequestContext, SchedulerHooks, TaskId};
pub use frame::{from_fn, named, Coroutine, Frame, Resume, Resumption, Suspend};
pub use task::Task;
