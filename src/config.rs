//! Task configuration
//!
//! Knobs that change how a [`Task`](crate::coroutine::Task) reacts to
//! timeouts, who tears down its handler, and how much of a yielded value ends
//! up in diagnostics.

/// Deployment mode of the process driving the tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Long-running server: the reactor owns handler teardown
    #[default]
    Server,
    /// One-shot console run: the task tears its handler down on destroy
    Console,
}

impl RunMode {
    /// Whether `Task::destroy` is responsible for `Handler::teardown`
    pub fn task_owns_handler(self) -> bool {
        matches!(self, RunMode::Console)
    }
}

/// How a timed-out awaitable is reported to the coroutine awaiting it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutDelivery {
    /// Raise the wrapped timeout failure at the yield point
    #[default]
    Raise,
    /// Log the timeout, release the awaitable and resume with `false`
    SendFalse,
}

/// Bounds for rendering yielded values into diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLimits {
    /// Nesting depth past which containers collapse to a type tag
    pub max_depth: usize,
    /// Elements rendered per container before eliding the rest
    pub max_items: usize,
    /// Characters kept from a string before truncating
    pub max_string_len: usize,
}

impl Default for DumpLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_items: 16,
            max_string_len: 256,
        }
    }
}

/// Per-task configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskConfig {
    pub mode: RunMode,
    pub timeout_delivery: TimeoutDelivery,
    pub dump: DumpLimits,
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout_delivery(mut self, delivery: TimeoutDelivery) -> Self {
        self.timeout_delivery = delivery;
        self
    }

    pub fn with_dump_limits(mut self, dump: DumpLimits) -> Self {
        self.dump = dump;
        self
    }
}
