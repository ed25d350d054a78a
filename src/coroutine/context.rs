//! Request identity and collaborator contracts
//!
//! A task talks to three collaborators it does not own the implementation of:
//! the request context (identity and logging), the handler that owns the
//! request, and the scheduler that keeps identity-keyed registrations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CoroError;

/// Identity of a task, shared with the reactor's registrations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    /// Generate a new process-unique TaskId
    pub fn generate() -> Self {
        TaskId(format!("task-{}", NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        TaskId(id)
    }
}

/// Per-request identity and logging
pub trait RequestContext {
    fn identity(&self) -> TaskId;

    fn log_warning(&self, message: &str);
}

/// Request context that logs through `tracing`
#[derive(Debug, Clone)]
pub struct LogContext {
    id: TaskId,
}

impl LogContext {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self { id: id.into() }
    }

    /// Context with a freshly generated identity
    pub fn generated() -> Self {
        Self::new(TaskId::generate())
    }
}

impl RequestContext for LogContext {
    fn identity(&self) -> TaskId {
        self.id.clone()
    }

    fn log_warning(&self, message: &str) {
        tracing::warn!(task.id = %self.id, "{}", message);
    }
}

/// The owner of a request, notified of failures no frame could absorb
pub trait Handler {
    fn on_unrecoverable_failure(&mut self, failure: CoroError);

    /// Tear the handler down; only called by tasks that own its lifecycle
    fn teardown(&mut self) {}
}

/// Identity-keyed registrations the reactor keeps for a task
pub trait SchedulerHooks {
    /// Drop the task-table entry
    fn forget_task(&mut self, id: &TaskId);

    /// Drop any pending I/O callback entry
    fn forget_io_callback(&mut self, id: &TaskId);
}
