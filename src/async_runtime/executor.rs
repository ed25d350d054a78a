//! Reference scheduler
//!
//! This module implements a single-threaded reactor for [`Task`]s: it keeps
//! the task table and the I/O-callback table keyed by task identity, and
//! steps a task exactly once per readiness notification.

use std::collections::{HashMap, VecDeque};
use std::mem;

use crate::coroutine::{SchedulerHooks, Task, TaskId};
use crate::error::{CoroError, CoroResult};
use crate::runtime::Value;

/// How a task left the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Value),
    Failed(CoroError),
    Cancelled,
}

/// Counters for one scheduler pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Tasks stepped
    pub polled: usize,
    /// Tasks that ran to completion
    pub completed: usize,
    /// Tasks that ended with a failure
    pub failed: usize,
    /// Whether wake-ups arrived during the pass
    pub has_remaining: bool,
}

/// Identity-keyed registrations, cleared by [`Task::destroy`]
#[derive(Default)]
struct Registry {
    tasks: HashMap<TaskId, Task>,
    /// Readiness notifications not yet delivered to a step
    io_callbacks: HashMap<TaskId, usize>,
}

impl SchedulerHooks for Registry {
    fn forget_task(&mut self, id: &TaskId) {
        self.tasks.remove(id);
    }

    fn forget_io_callback(&mut self, id: &TaskId) {
        self.io_callbacks.remove(id);
    }
}

/// Single-threaded scheduler driving one task per in-flight request
#[derive(Default)]
pub struct Scheduler {
    registry: Registry,
    ready_queue: VecDeque<TaskId>,
    outcomes: HashMap<TaskId, TaskOutcome>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and schedule its first step
    pub fn spawn(&mut self, task: Task) -> CoroResult<TaskId> {
        let id = task
            .id()
            .cloned()
            .ok_or_else(|| CoroError::internal("cannot spawn a destroyed task"))?;
        if self.registry.tasks.contains_key(&id) {
            return Err(CoroError::DuplicateTask { task: id.to_string() });
        }

        tracing::debug!(task.id = %id, "spawned task");
        self.outcomes.remove(&id);
        self.registry.tasks.insert(id.clone(), task);
        self.wake(&id)?;
        Ok(id)
    }

    /// Record that the operation task `id` awaits changed state
    pub fn wake(&mut self, id: &TaskId) -> CoroResult<()> {
        if !self.registry.tasks.contains_key(id) {
            return Err(CoroError::UnknownTask { task: id.to_string() });
        }

        let pending = self.registry.io_callbacks.entry(id.clone()).or_insert(0);
        *pending += 1;
        if *pending == 1 {
            self.ready_queue.push_back(id.clone());
        }
        Ok(())
    }

    /// Raise `failure` into task `id` on its next step
    pub fn fail(&mut self, id: &TaskId, failure: CoroError) -> CoroResult<()> {
        let task = self
            .registry
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoroError::UnknownTask { task: id.to_string() })?;
        task.set_pending_failure(failure);
        self.wake(id)
    }

    /// Step every task woken before this call exactly once
    pub fn tick(&mut self) -> Tick {
        let mut tick = Tick::default();

        for _ in 0..self.ready_queue.len() {
            let Some(id) = self.ready_queue.pop_front() else {
                break;
            };
            if self.registry.io_callbacks.remove(&id).is_none() {
                // cancelled after it was woken
                continue;
            }
            self.drive(&id, &mut tick);
        }

        tick.has_remaining = !self.ready_queue.is_empty();
        tracing::debug!(tick.polled, tick.completed, tick.failed, tick.has_remaining);
        tick
    }

    /// Step every live task once, woken or not
    ///
    /// Timeouts are polled properties of awaitables, so a task whose deadline
    /// passed only notices when it is stepped.
    pub fn poll_all(&mut self) -> Tick {
        let mut tick = Tick::default();
        let mut ids: Vec<TaskId> = self.registry.tasks.keys().cloned().collect();
        ids.sort();

        for id in ids {
            self.registry.io_callbacks.remove(&id);
            self.drive(&id, &mut tick);
        }

        self.ready_queue
            .retain(|id| self.registry.io_callbacks.contains_key(id));
        tick.has_remaining = !self.ready_queue.is_empty();
        tracing::debug!(tick.polled, tick.completed, tick.failed, "polled all tasks");
        tick
    }

    fn drive(&mut self, id: &TaskId, tick: &mut Tick) {
        // checked out so it can be destroyed against the registry
        let Some(mut task) = self.registry.tasks.remove(id) else {
            return;
        };
        tick.polled += 1;

        let outcome = match task.step() {
            Ok(()) if !task.is_finished() => {
                self.registry.tasks.insert(id.clone(), task);
                return;
            }
            Ok(()) => match task.last_failure() {
                Some(failure) if task.return_value().is_none() => {
                    TaskOutcome::Failed(failure.clone())
                }
                _ => TaskOutcome::Completed(task.return_value().cloned().unwrap_or(Value::Nil)),
            },
            Err(err) => {
                tracing::error!(task.id = %id, error = %err, "task failed with no handler");
                TaskOutcome::Failed(err)
            }
        };

        match outcome {
            TaskOutcome::Failed(_) => tick.failed += 1,
            _ => tick.completed += 1,
        }
        task.destroy(&mut self.registry);
        self.outcomes.insert(id.clone(), outcome);
    }

    /// Cancel task `id`; returns whether it was registered
    pub fn cancel(&mut self, id: &TaskId) -> bool {
        let Some(mut task) = self.registry.tasks.remove(id) else {
            return false;
        };
        tracing::debug!(task.id = %id, "cancelling task");
        task.destroy(&mut self.registry);
        self.outcomes.insert(id.clone(), TaskOutcome::Cancelled);
        true
    }

    /// Cancel every task
    pub fn clear(&mut self) {
        let ids: Vec<TaskId> = self.registry.tasks.keys().cloned().collect();
        for id in ids {
            self.cancel(&id);
        }
        self.ready_queue.clear();
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.registry.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.tasks.is_empty()
    }

    /// Readiness notifications recorded for `id` and not yet delivered
    pub fn pending_callbacks(&self, id: &TaskId) -> usize {
        self.registry.io_callbacks.get(id).copied().unwrap_or(0)
    }

    /// Check if all tasks are complete
    pub fn all_tasks_complete(&self) -> bool {
        self.registry.tasks.is_empty() && self.ready_queue.is_empty()
    }

    pub fn outcome(&self, id: &TaskId) -> Option<&TaskOutcome> {
        self.outcomes.get(id)
    }

    /// Remove and return how task `id` ended
    pub fn take_outcome(&mut self, id: &TaskId) -> Option<TaskOutcome> {
        self.outcomes.remove(id)
    }

    /// Remove and return every recorded outcome, ordered by task id
    pub fn drain_outcomes(&mut self) -> Vec<(TaskId, TaskOutcome)> {
        let mut drained: Vec<_> = self.outcomes.drain().collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }

    /// Remove completed tasks and return them with their return values
    pub fn completed_tasks(&mut self) -> Vec<(TaskId, Value)> {
        let mut done = Vec::new();
        self.outcomes.retain(|id, outcome| match outcome {
            TaskOutcome::Completed(value) => {
                done.push((id.clone(), mem::replace(value, Value::Nil)));
                false
            }
            _ => true,
        });
        done.sort_by(|a, b| a.0.cmp(&b.0));
        done
    }

    /// Remove failed tasks and return them with their failures
    pub fn failed_tasks(&mut self) -> Vec<(TaskId, CoroError)> {
        let mut failed = Vec::new();
        self.outcomes.retain(|id, outcome| match outcome {
            TaskOutcome::Failed(err) => {
                failed.push((id.clone(), err.clone()));
                false
            }
            _ => true,
        });
        failed.sort_by(|a, b| a.0.cmp(&b.0));
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::{
        from_fn, Deferred, Handler, Immediate, LogContext, Resume, Resumption, Suspend,
    };
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Instant;

    /// Awaits `op` and returns its result
    fn awaiting(id: &str, op: Deferred) -> Task {
        let mut op = Some(op);
        let body = from_fn(move |input| match input {
            Resumption::Start => Ok(Resume::Yield(Suspend::await_on(
                op.take().ok_or_else(|| CoroError::internal("restarted"))?,
            ))),
            Resumption::Send(value) => Ok(Resume::Return(value)),
            Resumption::Throw(err) => Err(err),
        });
        Task::new(body, LogContext::new(id))
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<CoroError>>>);

    impl Handler for Recorder {
        fn on_unrecoverable_failure(&mut self, failure: CoroError) {
            self.0.borrow_mut().push(failure);
        }
    }

    #[test]
    fn test_spawn_and_complete() {
        let mut scheduler = Scheduler::new();
        let (op, done) = Deferred::new("rpc");
        let id = scheduler.spawn(awaiting("req-1", op)).unwrap();

        let tick = scheduler.tick();
        assert_eq!(tick.polled, 1);
        assert_eq!(tick.completed, 0);
        assert!(scheduler.contains(&id));

        done.complete("ok");
        scheduler.wake(&id).unwrap();
        let tick = scheduler.tick();
        assert_eq!(tick.completed, 1);

        assert!(!scheduler.contains(&id));
        assert!(scheduler.all_tasks_complete());
        assert_eq!(scheduler.outcome(&id), Some(&TaskOutcome::Completed(Value::from("ok"))));
        assert_eq!(scheduler.completed_tasks(), vec![(id.clone(), Value::from("ok"))]);
        assert_eq!(scheduler.outcome(&id), None);
    }

    #[test]
    fn test_duplicate_and_unknown_tasks() {
        let mut scheduler = Scheduler::new();
        let (a, _) = Deferred::new("a");
        let (b, _) = Deferred::new("b");
        scheduler.spawn(awaiting("req-1", a)).unwrap();

        assert_eq!(
            scheduler.spawn(awaiting("req-1", b)),
            Err(CoroError::DuplicateTask { task: "req-1".to_string() })
        );
        assert_eq!(
            scheduler.wake(&TaskId::from("nope")),
            Err(CoroError::UnknownTask { task: "nope".to_string() })
        );
    }

    #[test]
    fn test_wakeups_coalesce_into_one_step() {
        let mut scheduler = Scheduler::new();
        let (op, _done) = Deferred::new("rpc");
        let id = scheduler.spawn(awaiting("req-1", op)).unwrap();
        scheduler.wake(&id).unwrap();
        scheduler.wake(&id).unwrap();
        assert_eq!(scheduler.pending_callbacks(&id), 3);

        let tick = scheduler.tick();
        assert_eq!(tick.polled, 1);
        assert_eq!(scheduler.pending_callbacks(&id), 0);
        assert_eq!(scheduler.tick().polled, 0);
    }

    #[test]
    fn test_injected_failure_reaches_handler() {
        let mut scheduler = Scheduler::new();
        let handler = Recorder::default();
        let (op, _done) = Deferred::new("rpc");
        let id = scheduler
            .spawn(awaiting("req-1", op).with_handler(handler.clone()))
            .unwrap();
        scheduler.tick();

        scheduler.fail(&id, CoroError::injected("client went away", 499)).unwrap();
        let tick = scheduler.tick();

        assert_eq!(tick.failed, 1);
        assert_eq!(handler.0.borrow().len(), 1);
        let failed = scheduler.failed_tasks();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].1.root_cause(), &CoroError::injected("client went away", 499));
    }

    #[test]
    fn test_unhandled_failure_is_recorded() {
        let mut scheduler = Scheduler::new();
        let body = from_fn(|_input| Err(CoroError::raised("boom", 1)));
        let id = scheduler.spawn(Task::new(body, LogContext::new("req-x"))).unwrap();

        let tick = scheduler.tick();

        assert_eq!(tick.failed, 1);
        assert!(!scheduler.contains(&id));
        assert!(matches!(
            scheduler.outcome(&id),
            Some(TaskOutcome::Failed(CoroError::Unhandled { .. }))
        ));
    }

    #[test]
    fn test_poll_all_notices_deadlines() {
        let mut scheduler = Scheduler::new();
        let handler = Recorder::default();
        let (op, done) = Deferred::new("rpc");
        let id = scheduler
            .spawn(
                awaiting("req-1", op.with_deadline(Instant::now())).with_handler(handler.clone()),
            )
            .unwrap();

        let tick = scheduler.poll_all();

        assert_eq!(tick.polled, 1);
        assert_eq!(tick.failed, 1);
        assert!(done.is_released());
        assert!(handler.0.borrow()[0].is_timeout());
        assert!(scheduler.tick().polled == 0);
        assert!(matches!(scheduler.outcome(&id), Some(TaskOutcome::Failed(_))));
    }

    #[test]
    fn test_cancel_and_clear() {
        let mut scheduler = Scheduler::new();
        let (a, a_done) = Deferred::new("a");
        let (b, b_done) = Deferred::new("b");
        let a_id = scheduler.spawn(awaiting("req-a", a)).unwrap();
        let b_id = scheduler.spawn(awaiting("req-b", b)).unwrap();
        scheduler.tick();

        assert!(scheduler.cancel(&a_id));
        assert!(!scheduler.cancel(&a_id));
        assert!(a_done.is_released());
        assert_eq!(scheduler.outcome(&a_id), Some(&TaskOutcome::Cancelled));

        scheduler.wake(&b_id).unwrap();
        scheduler.clear();
        assert!(scheduler.is_empty());
        assert!(b_done.is_released());
        assert_eq!(scheduler.pending_callbacks(&b_id), 0);
        assert_eq!(scheduler.tick().polled, 0);
    }

    #[test]
    fn test_outcomes_are_drained() {
        let mut scheduler = Scheduler::new();
        for n in 0..100 {
            let body = from_fn(move |_input| Ok(Resume::Return(Value::Int(n))));
            let id = format!("req-{:03}", n);
            scheduler.spawn(Task::new(body, LogContext::new(id.as_str()))).unwrap();
        }
        let (op, _done) = Deferred::new("slow");
        let cancelled = scheduler.spawn(awaiting("req-slow", op)).unwrap();

        assert_eq!(scheduler.tick().completed, 100);
        assert!(scheduler.cancel(&cancelled));
        assert_eq!(scheduler.outcomes.len(), 101);

        assert_eq!(scheduler.take_outcome(&cancelled), Some(TaskOutcome::Cancelled));
        assert_eq!(scheduler.take_outcome(&cancelled), None);

        let drained = scheduler.drain_outcomes();
        assert_eq!(drained.len(), 100);
        assert_eq!(
            drained[0],
            (TaskId::from("req-000"), TaskOutcome::Completed(Value::Int(0)))
        );
        assert!(scheduler.outcomes.is_empty());
        assert!(scheduler.completed_tasks().is_empty());
    }

    #[test]
    fn test_tasks_are_independent() {
        let mut scheduler = Scheduler::new();
        let first = from_fn(|input| match input {
            Resumption::Start => Ok(Resume::Yield(Suspend::await_on(Immediate::new(1_i64)))),
            Resumption::Send(value) => Ok(Resume::Return(value)),
            Resumption::Throw(err) => Err(err),
        });
        let (op, _done) = Deferred::new("slow");
        scheduler.spawn(Task::new(first, LogContext::new("req-1"))).unwrap();
        scheduler.spawn(awaiting("req-2", op)).unwrap();

        let tick = scheduler.tick();

        assert_eq!(tick.polled, 2);
        assert_eq!(tick.completed, 1);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.completed_tasks(), vec![(TaskId::from("req-1"), Value::Int(1))]);
    }
}
