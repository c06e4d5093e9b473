use crate::error::PoolError;
use crate::task::{Outcome, TaskPriority, TaskState};

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// Resolution slot shared between the submitter's handle(s) and the one
/// party that resolves the task (a worker, or a successful canceller).
///
/// `state` is the single source of truth for ownership: the worker's
/// `Queued -> Running` and the canceller's `Queued -> Cancelled` are both
/// compare-and-swap attempts, so exactly one of them wins.
pub(crate) struct TaskSlot<R> {
  pub(crate) task_id: u64,
  pub(crate) priority: TaskPriority,
  state: AtomicU8,
  outcome: OnceLock<Outcome<R>>,
  wait_lock: Mutex<()>,
  resolved: Condvar,
  async_waiters: Notify,
}

impl<R> TaskSlot<R> {
  pub(crate) fn new(task_id: u64, priority: TaskPriority) -> Self {
    Self {
      task_id,
      priority,
      state: AtomicU8::new(TaskState::QUEUED),
      outcome: OnceLock::new(),
      wait_lock: Mutex::new(()),
      resolved: Condvar::new(),
      async_waiters: Notify::new(),
    }
  }

  /// Once an outcome is published it decides the state, so `state()` is
  /// terminal exactly when `outcome()` is `Some`.
  pub(crate) fn state(&self) -> TaskState {
    match self.outcome.get() {
      Some(outcome) => TaskState::from_raw(outcome.terminal_state()),
      None => match TaskState::from_raw(self.state.load(Ordering::Acquire)) {
        // A won cancel is visible before its outcome is stored.
        TaskState::Cancelled => TaskState::Queued,
        other => other,
      },
    }
  }

  pub(crate) fn try_claim(&self) -> bool {
    self
      .state
      .compare_exchange(TaskState::QUEUED, TaskState::RUNNING, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  pub(crate) fn cancel(&self) -> bool {
    let won = self
      .state
      .compare_exchange(TaskState::QUEUED, TaskState::CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();
    if won {
      self.resolve(Outcome::Cancelled);
    }
    won
  }

  pub(crate) fn outcome(&self) -> Option<&Outcome<R>> {
    self.outcome.get()
  }

  /// Stores the terminal outcome and wakes every waiter. Only the party that
  /// won the state CAS calls this, so the slot is written exactly once.
  pub(crate) fn resolve(&self, outcome: Outcome<R>) {
    let terminal = outcome.terminal_state();
    if self.outcome.set(outcome).is_err() {
      tracing::warn!(task_id = %self.task_id, "Task outcome was already set; ignoring second resolution.");
      return;
    }
    self.state.store(terminal, Ordering::Release);

    // Taking the lock orders this wakeup after any waiter's emptiness check.
    let _guard = self.wait_lock.lock();
    self.resolved.notify_all();
    self.async_waiters.notify_waiters();
  }

  fn wait(&self) -> &Outcome<R> {
    if let Some(outcome) = self.outcome.get() {
      return outcome;
    }
    let mut guard = self.wait_lock.lock();
    loop {
      if let Some(outcome) = self.outcome.get() {
        return outcome;
      }
      self.resolved.wait(&mut guard);
    }
  }

  fn wait_until(&self, deadline: Instant) -> Option<&Outcome<R>> {
    if let Some(outcome) = self.outcome.get() {
      return Some(outcome);
    }
    let mut guard = self.wait_lock.lock();
    loop {
      if let Some(outcome) = self.outcome.get() {
        return Some(outcome);
      }
      if self.resolved.wait_until(&mut guard, deadline).timed_out() {
        return self.outcome.get();
      }
    }
  }

  async fn wait_async(&self) -> &Outcome<R> {
    loop {
      // Registered before the check so a resolution in between still wakes us.
      let notified = self.async_waiters.notified();
      if let Some(outcome) = self.outcome.get() {
        return outcome;
      }
      notified.await;
    }
  }
}

/// A handle to a task submitted to the `PriorityPoolManager`.
///
/// Allows for requesting cancellation of the task and waiting for its outcome,
/// either blocking or from async code. Cloned handles observe the same task, and
/// every clone may wait concurrently; the stored outcome is returned by
/// reference as many times as asked.
pub struct TaskHandle<R: Send + Sync + 'static> {
  pub(crate) slot: Arc<TaskSlot<R>>,
}

impl<R: Send + Sync + 'static> Clone for TaskHandle<R> {
  fn clone(&self) -> Self {
    Self {
      slot: self.slot.clone(),
    }
  }
}

impl<R: Send + Sync + 'static> fmt::Debug for TaskHandle<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("task_id", &self.slot.task_id)
      .field("priority", &self.slot.priority)
      .field("state", &self.slot.state())
      .finish()
  }
}

impl<R: Send + Sync + 'static> TaskHandle<R> {
  pub(crate) fn new(slot: Arc<TaskSlot<R>>) -> Self {
    Self { slot }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.slot.task_id
  }

  pub fn priority(&self) -> TaskPriority {
    self.slot.priority
  }

  pub fn state(&self) -> TaskState {
    self.slot.state()
  }

  /// Returns `true` once an outcome is available to `wait`.
  pub fn is_done(&self) -> bool {
    self.slot.outcome().is_some()
  }

  pub fn is_running(&self) -> bool {
    self.slot.state() == TaskState::Running
  }

  pub fn is_cancelled(&self) -> bool {
    self.slot.state() == TaskState::Cancelled
  }

  /// Requests cancellation of this task.
  ///
  /// Succeeds only while no worker has claimed the task; the action then never
  /// runs and the outcome becomes `Cancelled`. Returns `false` if a worker got
  /// there first (the task runs normally) or the task was already cancelled.
  /// A task that is already executing is never interrupted.
  pub fn cancel(&self) -> bool {
    let cancelled = self.slot.cancel();
    tracing::debug!(task_id = %self.slot.task_id, cancelled, "TaskHandle: Cancellation requested.");
    cancelled
  }

  /// Returns the outcome if the task has already reached a terminal state.
  pub fn try_outcome(&self) -> Option<&Outcome<R>> {
    self.slot.outcome()
  }

  /// Blocks until the task reaches a terminal state and returns its outcome.
  pub fn wait(&self) -> &Outcome<R> {
    self.slot.wait()
  }

  /// Like [`wait`](Self::wait), but gives up after `timeout`, returning `None`
  /// if the task is still queued or running.
  pub fn wait_timeout(&self, timeout: Duration) -> Option<&Outcome<R>> {
    self.slot.wait_until(Instant::now() + timeout)
  }

  /// Blocks until the task finishes and returns a reference to its value.
  ///
  /// # Errors
  /// Returns `PoolError::TaskFailed` if the action panicked or returned an error.
  /// Returns `PoolError::TaskCancelled` if the task was cancelled before running.
  pub fn result(&self) -> Result<&R, PoolError> {
    self.wait().as_result()
  }

  /// Waits for the outcome without blocking the calling async task's thread.
  pub async fn await_outcome(&self) -> &Outcome<R> {
    self.slot.wait_async().await
  }

  /// Async counterpart of [`result`](Self::result).
  pub async fn await_result(&self) -> Result<&R, PoolError> {
    self.await_outcome().await.as_result()
  }
}
