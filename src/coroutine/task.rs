//! The per-request task driver
//!
//! A [`Task`] advances one request's coroutine each time the reactor tells it
//! something changed about the operation it is suspended on. Nested coroutine
//! calls are kept on an explicit frame stack, and failures unwind through that
//! stack the way they would through a native call stack.

use std::fmt;
use std::mem;

use super::awaitable::{AwaitState, Awaitable};
use super::context::{Handler, RequestContext, SchedulerHooks, TaskId};
use super::frame::{Coroutine, Frame, Suspend};
use crate::config::{TaskConfig, TimeoutDelivery};
use crate::error::{CoroError, CoroResult};
use crate::runtime::Value;

/// One in-flight request's coroutine, driven one step at a time
pub struct Task {
    /// Unset once the task is destroyed
    id: Option<TaskId>,
    /// Top of the logical call chain
    active: Option<Frame>,
    /// Callers suspended beneath `active`, innermost last
    stack: Vec<Frame>,
    /// Failure to raise into `active` on the next step
    pending: Option<CoroError>,
    handler: Option<Box<dyn Handler>>,
    context: Box<dyn RequestContext>,
    config: TaskConfig,
    destroyed: bool,
    /// Last failure no frame absorbed
    last_failure: Option<CoroError>,
}

impl Task {
    pub fn new(body: impl Coroutine + 'static, context: impl RequestContext + 'static) -> Self {
        Self::from_boxed(Box::new(body), context)
    }

    pub fn from_boxed(body: Box<dyn Coroutine>, context: impl RequestContext + 'static) -> Self {
        Self {
            id: Some(context.identity()),
            active: Some(Frame::new(body)),
            stack: Vec::new(),
            pending: None,
            handler: None,
            context: Box::new(context),
            config: TaskConfig::default(),
            destroyed: false,
            last_failure: None,
        }
    }

    /// Attach the owner that receives failures no frame absorbs
    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// The task's identity; `None` after [`Task::destroy`]
    pub fn id(&self) -> Option<&TaskId> {
        self.id.as_ref()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Number of callers suspended beneath the active frame
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn active_frame(&self) -> Option<&Frame> {
        self.active.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The value the outermost coroutine returned, once finished
    pub fn return_value(&self) -> Option<&Value> {
        if !self.stack.is_empty() {
            return None;
        }
        self.active.as_ref().and_then(Frame::return_value)
    }

    /// The last failure handed to the handler or surfaced from `step`
    pub fn last_failure(&self) -> Option<&CoroError> {
        self.last_failure.as_ref()
    }

    /// Raise `failure` into the active frame on the next step, instead of
    /// resuming it with the awaited result
    pub fn set_pending_failure(&mut self, failure: CoroError) {
        self.pending = Some(failure);
    }

    /// Whether the whole call chain has run to completion
    pub fn is_finished(&self) -> bool {
        self.stack.is_empty() && self.active.as_ref().map_or(true, Frame::is_terminal)
    }

    /// Drive the coroutine by at most one resumption
    ///
    /// Failures raised by coroutines are unwound through the frame stack and
    /// then handed to the handler. Only when there is no handler and no frame
    /// takes the failure does this return `Err`, with a
    /// [`CoroError::Unhandled`] for the reactor to report.
    pub fn step(&mut self) -> CoroResult<()> {
        if self.destroyed || self.active.is_none() {
            return Ok(());
        }
        let Some(id) = self.id.clone() else {
            return Ok(());
        };
        let _span = tracing::debug_span!("step", task.id = %id, depth = self.stack.len()).entered();

        let mut yielded = None;
        let failure = match self.advance(&mut yielded) {
            Ok(()) => return Ok(()),
            Err(failure) => failure,
        };

        self.pending = None;
        let (wrapped, absorbed) = self.handle_exception(failure, yielded.as_deref());
        if absorbed {
            tracing::debug!(failure = %wrapped, "failure absorbed by an enclosing frame");
            return Ok(());
        }

        self.last_failure = Some(wrapped.clone());
        if let Some(handler) = self.handler.as_mut() {
            handler.on_unrecoverable_failure(wrapped);
            return Ok(());
        }

        // last resort: give whatever frame is left one more chance
        let Some(frame) = self.active.as_mut() else {
            return Err(CoroError::unhandled(id.as_str(), wrapped));
        };
        match frame.throw_into(wrapped) {
            Ok(()) => {
                self.last_failure = None;
                self.unwind_returns()
                    .map_err(|err| CoroError::unhandled(id.as_str(), err))
            }
            Err(err) => Err(CoroError::unhandled(id.as_str(), err)),
        }
    }

    /// One resumption of the active frame. `yielded` receives a rendering of
    /// the value the frame was suspended on, for failure messages.
    fn advance(&mut self, yielded: &mut Option<String>) -> CoroResult<()> {
        let limits = self.config.dump;
        let Some(frame) = self.active.as_mut() else {
            return Ok(());
        };

        if let Some(failure) = self.pending.take() {
            tracing::debug!(%failure, "raising injected failure");
            frame.throw_into(failure)?;
            return self.unwind_returns();
        }

        let Some(suspend) = frame.peek_yielded()? else {
            // the frame already ran to completion
            return self.unwind_returns();
        };
        *yielded = Some(suspend.dump(&limits));

        match suspend {
            Suspend::Call(_) => {
                let Some(Suspend::Call(body)) = frame.take_yielded() else {
                    return Err(CoroError::internal("nested call vanished from its frame"));
                };
                let caller = mem::replace(frame, Frame::new(body));
                self.stack.push(caller);
                tracing::trace!(depth = self.stack.len(), "entered nested coroutine");
                return Ok(());
            }
            Suspend::Await(op) => match op.poll_state() {
                AwaitState::Pending => return Ok(()),
                AwaitState::Ready(value) => {
                    frame.take_yielded();
                    frame.resume_with(value)?;
                }
                AwaitState::TimedOut => {
                    let raw = op.timeout_failure();
                    let Some(Suspend::Await(op)) = frame.take_yielded() else {
                        return Err(CoroError::internal("awaitable vanished from its frame"));
                    };
                    let wrapped =
                        Self::handle_timeout(self.context.as_ref(), raw, yielded.as_deref(), op);
                    match self.config.timeout_delivery {
                        TimeoutDelivery::Raise => frame.throw_into(wrapped)?,
                        TimeoutDelivery::SendFalse => frame.resume_with(Value::Bool(false))?,
                    }
                }
            },
            Suspend::Value(_) => {
                let Some(Suspend::Value(value)) = frame.take_yielded() else {
                    return Err(CoroError::internal("yielded value vanished from its frame"));
                };
                frame.resume_with(value)?;
            }
        }

        self.unwind_returns()
    }

    /// Hand finished frames' return values to their callers until a frame
    /// suspends again or the outermost one finishes
    fn unwind_returns(&mut self) -> CoroResult<()> {
        while let Some(frame) = self.active.as_mut() {
            if !frame.is_terminal() {
                break;
            }
            let Some(caller) = self.stack.pop() else {
                break;
            };
            let value = frame.take_return_value();
            self.active.insert(caller).resume_with(value)?;
        }
        Ok(())
    }

    /// Wrap a timeout for delivery, warn about it and release the awaitable
    fn handle_timeout(
        context: &dyn RequestContext,
        failure: CoroError,
        yielded: Option<&str>,
        mut op: Box<dyn Awaitable>,
    ) -> CoroError {
        let message = match yielded {
            Some(yielded) => format!("Yield {} message: {}", yielded, failure.message()),
            None => format!("message: {}", failure.message()),
        };
        context.log_warning(&message);
        op.release();
        CoroError::wrapped(message, failure)
    }

    /// Wrap `failure` and offer it to each suspended caller, innermost first
    ///
    /// Returns the wrapped failure and whether some caller absorbed it. A
    /// caller that absorbs the failure and then returns hands its value on to
    /// its own caller as usual.
    fn handle_exception(&mut self, failure: CoroError, yielded: Option<&str>) -> (CoroError, bool) {
        let mut wrapped = Self::wrap(failure, yielded);

        while let Some(caller) = self.stack.pop() {
            let frame = self.active.insert(caller);
            if let Err(rejected) = frame.throw_into(wrapped.clone()) {
                tracing::trace!(frame = frame.name(), failure = %rejected, "caller rethrew");
                continue;
            }
            match self.unwind_returns() {
                Ok(()) => return (wrapped, true),
                Err(next) => wrapped = Self::wrap(next, None),
            }
        }

        (wrapped, false)
    }

    fn wrap(failure: CoroError, yielded: Option<&str>) -> CoroError {
        if matches!(failure, CoroError::Wrapped { .. }) {
            return failure;
        }
        let message = match yielded {
            Some(yielded) => format!("Yield {} message: {}", yielded, failure.message()),
            None => failure.message().to_string(),
        };
        CoroError::wrapped(message, failure)
    }

    /// Cancel the task and drop everything it holds
    ///
    /// Idempotent: only the first call has any effect. Must not be called
    /// from inside [`Task::step`] of the same task.
    pub fn destroy(&mut self, hooks: &mut dyn SchedulerHooks) {
        let Some(id) = self.id.take() else {
            return;
        };
        tracing::debug!(task.id = %id, finished = self.is_finished(), "destroying task");

        hooks.forget_task(&id);
        hooks.forget_io_callback(&id);

        if self.config.mode.task_owns_handler() {
            if let Some(handler) = self.handler.as_mut() {
                handler.teardown();
            }
        }

        for mut frame in self.active.take().into_iter().chain(self.stack.drain(..)) {
            frame.abandon();
        }
        self.handler = None;
        self.pending = None;
        self.destroyed = true;
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("active", &self.active)
            .field("depth", &self.stack.len())
            .field("pending", &self.pending)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
