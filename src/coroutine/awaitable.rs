//! Awaitable operations
//!
//! An awaitable is a pending asynchronous operation a coroutine suspends on.
//! The task driver never waits on one; it only polls it when the reactor says
//! something about it changed.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use crate::error::CoroError;
use crate::runtime::Value;

/// Failure code carried by timeouts of the built-in awaitables
pub const TIMEOUT_CODE: i64 = 504;

/// Outcome of polling an awaitable
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitState {
    /// The operation has not produced a result yet
    Pending,
    /// The operation completed; `Nil` is a legitimate result
    Ready(Value),
    /// The operation's window elapsed
    TimedOut,
}

/// A pending operation a coroutine can suspend on
pub trait Awaitable {
    /// Whether the operation's allotted window has elapsed
    fn is_timed_out(&self) -> bool;

    /// Take the result if one is available
    fn result(&mut self) -> Option<Value>;

    /// Materialize the timeout as a failure to raise into the coroutine
    fn timeout_failure(&self) -> CoroError {
        CoroError::timeout(format!("{} timed out", self.name()), TIMEOUT_CODE)
    }

    /// Cleanup hook, called when the operation is abandoned
    fn release(&mut self) {}

    /// Short name used when rendering the operation in diagnostics
    fn name(&self) -> &str {
        "awaitable"
    }

    /// Structured description of the operation for diagnostics
    fn describe(&self) -> Value {
        Value::Nil
    }

    /// Poll the operation. A timeout always wins over an available result.
    fn poll_state(&mut self) -> AwaitState {
        if self.is_timed_out() {
            return AwaitState::TimedOut;
        }
        match self.result() {
            Some(value) => AwaitState::Ready(value),
            None => AwaitState::Pending,
        }
    }
}

/// An operation that is already complete
#[derive(Debug, Clone)]
pub struct Immediate {
    value: Option<Value>,
}

impl Immediate {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

impl Awaitable for Immediate {
    fn is_timed_out(&self) -> bool {
        false
    }

    fn result(&mut self) -> Option<Value> {
        self.value.take()
    }

    fn name(&self) -> &str {
        "immediate"
    }

    fn describe(&self) -> Value {
        self.value.clone().unwrap_or(Value::Nil)
    }
}

#[derive(Debug, Default)]
struct Slot {
    result: Option<Value>,
    timed_out: bool,
    deadline: Option<Instant>,
    released: bool,
}

/// The awaiting side of a one-shot operation completed by an event source
///
/// Created together with its [`Completer`] by [`Deferred::new`]. Both halves
/// share a single-threaded slot.
#[derive(Debug)]
pub struct Deferred {
    label: String,
    slot: Rc<RefCell<Slot>>,
}

/// The completing side of a [`Deferred`]
#[derive(Debug, Clone)]
pub struct Completer {
    slot: Rc<RefCell<Slot>>,
}

impl Deferred {
    pub fn new(label: impl Into<String>) -> (Deferred, Completer) {
        let slot = Rc::new(RefCell::new(Slot::default()));
        let deferred = Deferred {
            label: label.into(),
            slot: slot.clone(),
        };
        (deferred, Completer { slot })
    }

    /// Time the operation out once `deadline` has passed
    pub fn with_deadline(self, deadline: Instant) -> Self {
        self.slot.borrow_mut().deadline = Some(deadline);
        self
    }
}

impl Awaitable for Deferred {
    fn is_timed_out(&self) -> bool {
        let slot = self.slot.borrow();
        slot.timed_out || slot.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn result(&mut self) -> Option<Value> {
        self.slot.borrow_mut().result.take()
    }

    fn timeout_failure(&self) -> CoroError {
        CoroError::timeout(format!("{} timed out", self.label), TIMEOUT_CODE)
    }

    fn release(&mut self) {
        self.slot.borrow_mut().released = true;
    }

    fn name(&self) -> &str {
        "deferred"
    }

    fn describe(&self) -> Value {
        Value::from(self.label.as_str())
    }
}

impl Completer {
    /// Deliver the operation's result
    pub fn complete(&self, value: impl Into<Value>) {
        self.slot.borrow_mut().result = Some(value.into());
    }

    /// Mark the operation as timed out
    pub fn time_out(&self) {
        self.slot.borrow_mut().timed_out = true;
    }

    /// Whether the awaiting side abandoned the operation
    pub fn is_released(&self) -> bool {
        self.slot.borrow().released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_immediate_is_ready_once() {
        let mut op = Immediate::new(42_i64);
        assert_eq!(op.poll_state(), AwaitState::Ready(Value::Int(42)));
        assert_eq!(op.poll_state(), AwaitState::Pending);
    }

    #[test]
    fn test_nil_result_is_not_pending() {
        let (mut op, done) = Deferred::new("lookup");
        assert_eq!(op.poll_state(), AwaitState::Pending);
        done.complete(Value::Nil);
        assert_eq!(op.poll_state(), AwaitState::Ready(Value::Nil));
    }

    #[test]
    fn test_timeout_wins_over_result() {
        let (mut op, done) = Deferred::new("lookup");
        done.complete(1_i64);
        done.time_out();
        assert_eq!(op.poll_state(), AwaitState::TimedOut);
        assert_eq!(op.timeout_failure(), CoroError::timeout("lookup timed out", TIMEOUT_CODE));
    }

    #[test]
    fn test_deadline() {
        let (mut op, _done) = Deferred::new("slow");
        op = op.with_deadline(Instant::now());
        assert!(op.is_timed_out());

        let (op, _done) = Deferred::new("fast");
        let op = op.with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!op.is_timed_out());
    }

    #[test]
    fn test_release_is_visible_to_completer() {
        let (mut op, done) = Deferred::new("lookup");
        assert!(!done.is_released());
        op.release();
        assert!(done.is_released());
    }
}
