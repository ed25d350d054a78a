//! Resumable coroutine frames
//!
//! A coroutine body is an explicit state machine: each call to
//! [`Coroutine::resume`] runs it from its last suspension point to the next
//! one. [`Frame`] wraps a body with the bookkeeping the task driver needs to
//! peek at what it yielded without resuming it.

use std::fmt;
use std::mem;

use super::awaitable::Awaitable;
use crate::config::DumpLimits;
use crate::error::{CoroError, CoroResult};
use crate::runtime::Value;

/// What a coroutine is resumed with
#[derive(Debug)]
pub enum Resumption {
    /// First resumption; run to the first suspension point
    Start,
    /// The value of the expression the coroutine suspended on
    Send(Value),
    /// A failure raised at the suspension point
    Throw(CoroError),
}

/// What a coroutine suspended on
pub enum Suspend {
    /// A nested coroutine whose return value resumes this one
    Call(Box<dyn Coroutine>),
    /// A pending operation whose result resumes this one
    Await(Box<dyn Awaitable>),
    /// A plain value, sent straight back on the next step
    Value(Value),
}

impl Suspend {
    pub fn call(body: impl Coroutine + 'static) -> Self {
        Suspend::Call(Box::new(body))
    }

    pub fn await_on(op: impl Awaitable + 'static) -> Self {
        Suspend::Await(Box::new(op))
    }

    /// Render for log lines and failure messages
    pub fn dump(&self, limits: &DumpLimits) -> String {
        match self {
            Suspend::Call(body) => format!("<coroutine {}>", body.name()),
            Suspend::Await(op) => match op.describe() {
                Value::Nil => format!("<{}>", op.name()),
                described => format!("<{} {}>", op.name(), described.dump(limits)),
            },
            Suspend::Value(value) => value.dump(limits),
        }
    }
}

impl fmt::Debug for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(&DumpLimits::default()))
    }
}

/// Result of running a coroutine to its next suspension point
#[derive(Debug)]
pub enum Resume {
    Yield(Suspend),
    Return(Value),
}

/// A coroutine body
///
/// Returning `Err` from `resume` means the body raised; a body that receives
/// [`Resumption::Throw`] either handles it and keeps going, or returns it.
pub trait Coroutine {
    fn resume(&mut self, input: Resumption) -> CoroResult<Resume>;

    fn name(&self) -> &str {
        "coroutine"
    }
}

impl<F> Coroutine for F
where
    F: FnMut(Resumption) -> CoroResult<Resume>,
{
    fn resume(&mut self, input: Resumption) -> CoroResult<Resume> {
        self(input)
    }
}

/// Build a coroutine from a closure
///
/// Only pins down the closure's signature so callers need no annotations.
pub fn from_fn<F>(body: F) -> F
where
    F: FnMut(Resumption) -> CoroResult<Resume>,
{
    body
}

/// A closure-backed coroutine with a name
pub struct Named<F> {
    name: String,
    body: F,
}

/// Give a closure coroutine a name for diagnostics
pub fn named<F>(name: impl Into<String>, body: F) -> Named<F>
where
    F: FnMut(Resumption) -> CoroResult<Resume>,
{
    Named {
        name: name.into(),
        body,
    }
}

impl<F> Coroutine for Named<F>
where
    F: FnMut(Resumption) -> CoroResult<Resume>,
{
    fn resume(&mut self, input: Resumption) -> CoroResult<Resume> {
        (self.body)(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

enum FrameState {
    /// Not started yet
    Fresh,
    /// Suspended; the yielded value has not been consumed
    Suspended(Suspend),
    /// Suspended; the driver took the yielded value and owes a resumption
    Detached,
    Returned(Value),
    Failed,
}

/// A resumable handle around a coroutine body
pub struct Frame {
    body: Box<dyn Coroutine>,
    state: FrameState,
}

impl Frame {
    pub fn new(body: Box<dyn Coroutine>) -> Self {
        Self {
            body,
            state: FrameState::Fresh,
        }
    }

    pub fn name(&self) -> &str {
        self.body.name()
    }

    /// Run a fresh body to its first suspension point
    fn prime(&mut self) -> CoroResult<()> {
        if matches!(self.state, FrameState::Fresh) {
            self.drive(Resumption::Start)?;
        }
        Ok(())
    }

    fn drive(&mut self, input: Resumption) -> CoroResult<()> {
        match self.body.resume(input) {
            Ok(Resume::Yield(suspend)) => {
                self.state = FrameState::Suspended(suspend);
                Ok(())
            }
            Ok(Resume::Return(value)) => {
                self.state = FrameState::Returned(value);
                Ok(())
            }
            Err(err) => {
                self.state = FrameState::Failed;
                Err(err)
            }
        }
    }

    /// The value most recently yielded, starting the body if needed
    ///
    /// Does not resume a body that already started.
    pub fn peek_yielded(&mut self) -> CoroResult<Option<&mut Suspend>> {
        self.prime()?;
        match &mut self.state {
            FrameState::Suspended(suspend) => Ok(Some(suspend)),
            _ => Ok(None),
        }
    }

    /// Take the yielded value, leaving the frame owed a resumption
    pub fn take_yielded(&mut self) -> Option<Suspend> {
        match mem::replace(&mut self.state, FrameState::Detached) {
            FrameState::Suspended(suspend) => Some(suspend),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Resume with `value` as the result of the suspension point
    ///
    /// A terminal frame ignores the value.
    pub fn resume_with(&mut self, value: Value) -> CoroResult<()> {
        self.prime()?;
        if self.is_terminal() {
            return Ok(());
        }
        self.drive(Resumption::Send(value))
    }

    /// Raise `err` at the suspension point
    ///
    /// Returns `Ok` if the body handled it, the failure it raised otherwise.
    /// A terminal frame cannot handle anything and hands `err` straight back.
    pub fn throw_into(&mut self, err: CoroError) -> CoroResult<()> {
        self.prime()?;
        if self.is_terminal() {
            return Err(err);
        }
        self.abandon_awaitable();
        self.drive(Resumption::Throw(err))
    }

    /// Run the cleanup hook of the awaitable this frame is suspended on
    fn abandon_awaitable(&mut self) {
        if let FrameState::Suspended(Suspend::Await(op)) = &mut self.state {
            op.release();
        }
    }

    /// Whether the body has no more continuations
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, FrameState::Returned(_) | FrameState::Failed)
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, FrameState::Failed)
    }

    pub fn return_value(&self) -> Option<&Value> {
        match &self.state {
            FrameState::Returned(value) => Some(value),
            _ => None,
        }
    }

    /// Take the return value, `Nil` if the body did not return one
    pub fn take_return_value(&mut self) -> Value {
        match &mut self.state {
            FrameState::Returned(value) => mem::replace(value, Value::Nil),
            _ => Value::Nil,
        }
    }

    /// Abandon the frame for good; it will never be resumed again
    pub(crate) fn abandon(&mut self) {
        self.abandon_awaitable();
        self.state = FrameState::Failed;
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            FrameState::Fresh => "fresh".to_string(),
            FrameState::Suspended(suspend) => format!("suspended on {:?}", suspend),
            FrameState::Detached => "resuming".to_string(),
            FrameState::Returned(value) => format!("returned {}", value),
            FrameState::Failed => "failed".to_string(),
        };
        f.debug_struct("Frame")
            .field("name", &self.name())
            .field("state", &state)
            .finish()
    }
}
