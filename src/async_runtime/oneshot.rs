//! Awaitables backed by tokio channels
//!
//! Lets work running on a tokio runtime (or any thread) complete an operation
//! a coroutine task is suspended on. The task side only ever polls.

use std::time::Instant;

use tokio::sync::oneshot::{self, error::TryRecvError};

use crate::coroutine::{AwaitState, Awaitable};
use crate::runtime::Value;

/// Awaits a value sent through a tokio oneshot channel
///
/// A sender dropped without sending counts as a timeout.
#[derive(Debug)]
pub struct OneshotAwaitable {
    label: String,
    receiver: oneshot::Receiver<Value>,
    deadline: Option<Instant>,
    closed: bool,
}

impl OneshotAwaitable {
    pub fn new(label: impl Into<String>, receiver: oneshot::Receiver<Value>) -> Self {
        Self {
            label: label.into(),
            receiver,
            deadline: None,
            closed: false,
        }
    }

    /// Create the awaitable together with the sender that completes it
    pub fn channel(label: impl Into<String>) -> (Self, oneshot::Sender<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self::new(label, rx), tx)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Awaitable for OneshotAwaitable {
    fn is_timed_out(&self) -> bool {
        self.closed || self.past_deadline()
    }

    fn result(&mut self) -> Option<Value> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                self.closed = true;
                None
            }
        }
    }

    fn poll_state(&mut self) -> AwaitState {
        if self.is_timed_out() {
            return AwaitState::TimedOut;
        }
        match self.result() {
            Some(value) => AwaitState::Ready(value),
            None if self.closed => AwaitState::TimedOut,
            None => AwaitState::Pending,
        }
    }

    fn release(&mut self) {
        self.receiver.close();
    }

    fn name(&self) -> &str {
        "oneshot"
    }

    fn describe(&self) -> Value {
        Value::from(self.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::{from_fn, LogContext, Resume, Resumption, Suspend, Task};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_value_sent_from_tokio_task() {
        let (mut op, tx) = OneshotAwaitable::channel("rpc");
        assert_eq!(op.poll_state(), AwaitState::Pending);

        tokio::spawn(async move { tx.send(Value::Int(5)) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(op.poll_state(), AwaitState::Ready(Value::Int(5)));
    }

    #[test]
    fn test_dropped_sender_times_out() {
        let (mut op, tx) = OneshotAwaitable::channel("rpc");
        drop(tx);
        assert_eq!(op.poll_state(), AwaitState::TimedOut);
        assert!(op.is_timed_out());
    }

    #[test]
    fn test_release_closes_channel() {
        let (mut op, tx) = OneshotAwaitable::channel("rpc");
        op.release();
        assert!(tx.is_closed());
    }

    #[test]
    fn test_task_resumes_with_sent_value() {
        let (op, tx) = OneshotAwaitable::channel("rpc");
        let mut op = Some(op);
        let body = from_fn(move |input| match input {
            Resumption::Start => Ok(Resume::Yield(Suspend::await_on(op.take().unwrap()))),
            Resumption::Send(value) => Ok(Resume::Return(value)),
            Resumption::Throw(err) => Err(err),
        });
        let mut task = Task::new(body, LogContext::new("req-1"));

        task.step().unwrap();
        assert!(!task.is_finished());

        std::thread::spawn(move || tx.send(Value::from("pong")))
            .join()
            .unwrap()
            .unwrap();
        task.step().unwrap();

        assert_eq!(task.return_value(), Some(&Value::from("pong")));
    }
}
