use crate::error::PoolError;
use crate::handle::TaskSlot;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Scheduling priority of a task. Lower values are dequeued first.
pub type TaskPriority = i64;

/// Lifecycle position of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
  Queued,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl TaskState {
  pub(crate) const QUEUED: u8 = 0;
  pub(crate) const RUNNING: u8 = 1;
  pub(crate) const COMPLETED: u8 = 2;
  pub(crate) const FAILED: u8 = 3;
  pub(crate) const CANCELLED: u8 = 4;

  pub(crate) fn from_raw(raw: u8) -> Self {
    match raw {
      Self::QUEUED => TaskState::Queued,
      Self::RUNNING => TaskState::Running,
      Self::COMPLETED => TaskState::Completed,
      Self::FAILED => TaskState::Failed,
      _ => TaskState::Cancelled,
    }
  }

  /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
  }
}

/// Why a task that was run did not produce a value.
#[derive(Error, Debug, Clone)]
pub enum TaskFailure {
  /// The action panicked; carries the panic message when it was a string.
  #[error("task panicked: {0}")]
  Panicked(String),

  /// The action of a fallible submission returned `Err`.
  #[error("task returned an error: {0}")]
  Errored(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl TaskFailure {
  pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "non-string panic payload".to_string()
    };
    TaskFailure::Panicked(message)
  }

  pub fn is_panic(&self) -> bool {
    matches!(self, TaskFailure::Panicked(_))
  }
}

/// Terminal result of a task, as observed through its handle.
#[derive(Debug, Clone)]
pub enum Outcome<R> {
  Completed(R),
  Failed(TaskFailure),
  Cancelled,
}

impl<R> Outcome<R> {
  pub fn is_completed(&self) -> bool {
    matches!(self, Outcome::Completed(_))
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, Outcome::Failed(_))
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Outcome::Cancelled)
  }

  /// The produced value, if the task completed.
  pub fn value(&self) -> Option<&R> {
    match self {
      Outcome::Completed(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_result(&self) -> Result<&R, PoolError> {
    match self {
      Outcome::Completed(v) => Ok(v),
      Outcome::Failed(failure) => Err(PoolError::TaskFailed(failure.clone())),
      Outcome::Cancelled => Err(PoolError::TaskCancelled),
    }
  }

  pub fn into_result(self) -> Result<R, PoolError> {
    match self {
      Outcome::Completed(v) => Ok(v),
      Outcome::Failed(failure) => Err(PoolError::TaskFailed(failure)),
      Outcome::Cancelled => Err(PoolError::TaskCancelled),
    }
  }

  pub(crate) fn terminal_state(&self) -> u8 {
    match self {
      Outcome::Completed(_) => TaskState::COMPLETED,
      Outcome::Failed(_) => TaskState::FAILED,
      Outcome::Cancelled => TaskState::CANCELLED,
    }
  }
}

/// What a worker learned from running (or discarding) one dequeued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunReport {
  pub(crate) status: crate::notifier::TaskCompletionStatus,
  pub(crate) run_time: Option<Duration>,
}

/// Type-erased unit of work held by the queue.
///
/// The queue and workers only need to identify a task, claim it, and run it;
/// the result type stays inside the concrete `ManagedTask`.
pub(crate) trait ScheduledWork: Send {
  fn task_id(&self) -> u64;

  fn priority(&self) -> TaskPriority;

  /// Atomically moves the task from `Queued` to `Running`. Fails if the
  /// submitter cancelled it first.
  fn try_claim(&self) -> bool;

  /// Runs a claimed task to completion and resolves its handle. Never unwinds.
  fn run(self: Box<Self>) -> RunReport;
}

/// Internal representation of a task managed by the pool.
pub(crate) struct ManagedTask<R, F>
where
  R: Send + Sync + 'static,
  F: FnOnce() -> Result<R, TaskFailure> + Send + 'static,
{
  pub(crate) slot: Arc<TaskSlot<R>>,
  pub(crate) action: F,
}

impl<R, F> fmt::Debug for ManagedTask<R, F>
where
  R: Send + Sync + 'static,
  F: FnOnce() -> Result<R, TaskFailure> + Send + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManagedTask")
      .field("task_id", &self.slot.task_id)
      .field("priority", &self.slot.priority)
      .finish_non_exhaustive()
  }
}

impl<R, F> ScheduledWork for ManagedTask<R, F>
where
  R: Send + Sync + 'static,
  F: FnOnce() -> Result<R, TaskFailure> + Send + 'static,
{
  fn task_id(&self) -> u64 {
    self.slot.task_id
  }

  fn priority(&self) -> TaskPriority {
    self.slot.priority
  }

  fn try_claim(&self) -> bool {
    self.slot.try_claim()
  }

  fn run(self: Box<Self>) -> RunReport {
    let ManagedTask { slot, action } = *self;
    let started = Instant::now();

    let outcome = match panic::catch_unwind(AssertUnwindSafe(action)) {
      Ok(Ok(value)) => Outcome::Completed(value),
      Ok(Err(failure)) => Outcome::Failed(failure),
      Err(payload) => Outcome::Failed(TaskFailure::from_panic(payload)),
    };
    let run_time = started.elapsed();
    let status = crate::notifier::TaskCompletionStatus::from(&outcome);

    slot.resolve(outcome);
    RunReport {
      status,
      run_time: Some(run_time),
    }
  }
}
