//! Error handling and diagnostics for coroutine tasks
//!
//! This module provides the failure type that flows through coroutine frames
//! (timeouts, injected failures, failures raised by coroutine bodies) and the
//! errors reported by the scheduler.

pub mod diagnostic;

pub use diagnostic::Diagnostic;

/// Result type alias for task operations
pub type CoroResult<T> = Result<T, CoroError>;

/// Main error type for coroutine tasks
///
/// Failures are cloned when the driver offers the same wrapped failure to
/// several enclosing frames in turn, so every variant owns its data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoroError {
    /// An awaited operation did not complete in its allotted window
    #[error("Timeout: {message}")]
    Timeout { message: String, code: i64 },

    /// A coroutine body raised a failure
    #[error("{message}")]
    Raised { message: String, code: i64 },

    /// A failure deposited by the task's owner, raised at the next resumption
    #[error("Injected: {message}")]
    Injected { message: String, code: i64 },

    /// A failure enriched with a rendering of the value the task was suspended on
    #[error("{message}")]
    Wrapped {
        message: String,
        code: i64,
        #[source]
        cause: Box<CoroError>,
    },

    /// No frame absorbed the failure and no handler was registered
    #[error("Unhandled failure in task {task}: {cause}")]
    Unhandled {
        task: String,
        #[source]
        cause: Box<CoroError>,
    },

    /// A task with the same identity is already registered
    #[error("Task {task} is already registered")]
    DuplicateTask { task: String },

    /// No task is registered under this identity
    #[error("Unknown task {task}")]
    UnknownTask { task: String },

    /// Driver invariant violated (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoroError {
    /// Create a new timeout failure
    pub fn timeout(message: impl Into<String>, code: i64) -> Self {
        Self::Timeout {
            message: message.into(),
            code,
        }
    }

    /// Create a failure raised by a coroutine body
    pub fn raised(message: impl Into<String>, code: i64) -> Self {
        Self::Raised {
            message: message.into(),
            code,
        }
    }

    /// Create an externally injected failure
    pub fn injected(message: impl Into<String>, code: i64) -> Self {
        Self::Injected {
            message: message.into(),
            code,
        }
    }

    /// Wrap a failure with a diagnostic message, keeping its code
    pub fn wrapped(message: impl Into<String>, cause: CoroError) -> Self {
        Self::Wrapped {
            message: message.into(),
            code: cause.code(),
            cause: Box::new(cause),
        }
    }

    /// Mark a failure as unhandled by task `task`
    pub fn unhandled(task: impl Into<String>, cause: CoroError) -> Self {
        Self::Unhandled {
            task: task.into(),
            cause: Box::new(cause),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error kind as a string
    pub fn kind(&self) -> &str {
        match self {
            Self::Timeout { .. } => "Timeout",
            Self::Raised { .. } => "Raised",
            Self::Injected { .. } => "Injected",
            Self::Wrapped { .. } => "Task Failure",
            Self::Unhandled { .. } => "Unhandled Failure",
            Self::DuplicateTask { .. } => "Duplicate Task",
            Self::UnknownTask { .. } => "Unknown Task",
            Self::Internal { .. } => "Internal Error",
        }
    }

    /// Get the error message, without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout { message, .. }
            | Self::Raised { message, .. }
            | Self::Injected { message, .. }
            | Self::Wrapped { message, .. }
            | Self::Internal { message } => message,
            Self::Unhandled { cause, .. } => cause.message(),
            Self::DuplicateTask { task } | Self::UnknownTask { task } => task,
        }
    }

    /// Get the numeric failure code (0 when the failure carries none)
    pub fn code(&self) -> i64 {
        match self {
            Self::Timeout { code, .. }
            | Self::Raised { code, .. }
            | Self::Injected { code, .. }
            | Self::Wrapped { code, .. } => *code,
            Self::Unhandled { cause, .. } => cause.code(),
            _ => 0,
        }
    }

    /// Get the wrapped cause, if any
    pub fn cause(&self) -> Option<&CoroError> {
        match self {
            Self::Wrapped { cause, .. } | Self::Unhandled { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Walk the cause chain down to the failure that started it
    pub fn root_cause(&self) -> &CoroError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// Whether the root of this failure is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_creation() {
        let err = CoroError::raised("boom", 7);

        assert_eq!(err.kind(), "Raised");
        assert_eq!(err.message(), "boom");
        assert_eq!(err.code(), 7);
        assert!(err.cause().is_none());
    }

    #[test]
    fn test_wrapped_keeps_code_and_cause() {
        let inner = CoroError::timeout("read timed out", 504);
        let err = CoroError::wrapped("Yield <awaitable> message: read timed out", inner.clone());

        assert_eq!(err.code(), 504);
        assert_eq!(err.cause(), Some(&inner));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Yield <awaitable> message: read timed out");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(CoroError::timeout("too slow", 0).to_string(), "Timeout: too slow");
        assert_eq!(
            CoroError::unhandled("req-1", CoroError::raised("boom", 0)).to_string(),
            "Unhandled failure in task req-1: boom"
        );
        assert_eq!(
            CoroError::DuplicateTask { task: "req-1".to_string() }.to_string(),
            "Task req-1 is already registered"
        );
    }

    #[test]
    fn test_root_cause() {
        let err = CoroError::unhandled(
            "req-9",
            CoroError::wrapped(
                "outer",
                CoroError::wrapped("inner", CoroError::injected("cancelled", 3)),
            ),
        );

        assert_eq!(err.root_cause(), &CoroError::injected("cancelled", 3));
        assert_eq!(err.code(), 3);
        assert!(!err.is_timeout());
    }
}
