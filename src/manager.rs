use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::{TaskHandle, TaskSlot};
use crate::notifier::{CompletionNotifier, TaskCompletionInfo, TaskCompletionStatus};
use crate::task::{ManagedTask, RunReport, TaskFailure, TaskPriority};
use crate::task_queue::TaskQueue;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, trace, warn};

lazy_static::lazy_static! {
  static ref NEXT_POOL_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A fixed-size pool of worker threads that run submitted closures in
/// ascending priority order (lower value first, FIFO among equals).
///
/// Dropping the manager performs [`shutdown`](Self::shutdown): every task
/// accepted before the shutdown still runs, then all workers are joined.
pub struct PriorityPoolManager {
  pool_name: Arc<String>,
  worker_count: usize,
  queue: Arc<TaskQueue>,
  active_tasks: Arc<AtomicUsize>,
  notifier: Arc<CompletionNotifier>,
  worker_thread_ids: Vec<ThreadId>,
  worker_join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PriorityPoolManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PriorityPoolManager")
      .field("pool_name", &self.pool_name)
      .field("worker_count", &self.worker_count)
      .field("queued", &self.queued_task_count())
      .field("active", &self.active_task_count())
      .field("shut_down", &self.is_shutdown())
      .finish()
  }
}

impl PriorityPoolManager {
  /// Starts a pool with `worker_count` workers, or one per logical CPU when `None`.
  pub fn new(worker_count: Option<usize>, pool_name: &str) -> Result<Self, PoolError> {
    let config = PoolConfig {
      worker_count,
      ..PoolConfig::new(pool_name)
    };
    Self::with_config(config)
  }

  pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
    config.validate()?;
    let worker_count = config.resolved_worker_count();
    let pool_name = Arc::new(config.pool_name.clone());
    let queue = Arc::new(TaskQueue::new());
    let active_tasks = Arc::new(AtomicUsize::new(0));
    let notifier_thread_name = format!(
      "{}-notifier",
      config.thread_name_prefix.as_deref().unwrap_or(&config.pool_name)
    );
    let notifier = CompletionNotifier::new(pool_name.clone(), notifier_thread_name);

    let mut worker_join_handles = Vec::with_capacity(worker_count);
    for worker_index in 0..worker_count {
      let mut builder = thread::Builder::new().name(config.worker_thread_name(worker_index));
      if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
      }

      let worker_pool_name = pool_name.clone();
      let worker_queue = queue.clone();
      let worker_active_tasks = active_tasks.clone();
      let worker_notifier = notifier.clone();
      let spawn_result = builder.spawn(move || {
        Self::run_worker_loop(
          worker_pool_name,
          worker_index,
          worker_queue,
          worker_active_tasks,
          worker_notifier,
        )
      });

      match spawn_result {
        Ok(handle) => worker_join_handles.push(handle),
        Err(spawn_error) => {
          error!(pool_name = %*pool_name, worker = worker_index, "Failed to spawn worker thread: {}", spawn_error);
          // Stop the workers that did start before reporting the failure.
          queue.close();
          for handle in worker_join_handles {
            let _ = handle.join();
          }
          return Err(PoolError::WorkerSpawnFailed(spawn_error.to_string()));
        }
      }
    }

    info!(pool_name = %*pool_name, worker_count, "Priority pool started.");
    let worker_thread_ids = worker_join_handles.iter().map(|h| h.thread().id()).collect();
    Ok(Self {
      pool_name,
      worker_count,
      queue,
      active_tasks,
      notifier,
      worker_thread_ids,
      worker_join_handles: Mutex::new(worker_join_handles),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Number of tasks currently executing on a worker.
  pub fn active_task_count(&self) -> usize {
    self.active_tasks.load(AtomicOrdering::Acquire)
  }

  /// Returns the current number of entries in the pending queue. Tasks
  /// cancelled while queued are counted until a worker discards them.
  pub fn queued_task_count(&self) -> usize {
    self.queue.len()
  }

  pub fn is_shutdown(&self) -> bool {
    self.queue.is_closed()
  }

  /// Registers a handler invoked (on the pool's notifier thread) for every
  /// task that reaches a terminal state after registration.
  pub fn add_completion_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.notifier.add_handler(handler);
  }

  /// Queues `action` at `priority` and returns its handle without blocking.
  ///
  /// A panic inside `action` is captured as `Outcome::Failed(TaskFailure::Panicked)`.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once `shutdown` has started.
  pub fn submit<R, F>(&self, priority: TaskPriority, action: F) -> Result<TaskHandle<R>, PoolError>
  where
    R: Send + Sync + 'static,
    F: FnOnce() -> R + Send + 'static,
  {
    self.enqueue(priority, move || Ok(action()))
  }

  /// Like [`submit`](Self::submit) for actions that report failure through
  /// `Result`; an `Err` is captured as `Outcome::Failed(TaskFailure::Errored)`.
  pub fn submit_fallible<R, E, F>(&self, priority: TaskPriority, action: F) -> Result<TaskHandle<R>, PoolError>
  where
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: FnOnce() -> Result<R, E> + Send + 'static,
  {
    self.enqueue(priority, move || action().map_err(|e| TaskFailure::Errored(Arc::new(e))))
  }

  fn enqueue<R, F>(&self, priority: TaskPriority, action: F) -> Result<TaskHandle<R>, PoolError>
  where
    R: Send + Sync + 'static,
    F: FnOnce() -> Result<R, TaskFailure> + Send + 'static,
  {
    let task_id = NEXT_POOL_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let slot = Arc::new(TaskSlot::new(task_id, priority));
    let managed_task = ManagedTask {
      slot: slot.clone(),
      action,
    };

    debug!(pool_name = %self.pool_name, %task_id, priority, "Submitting task to queue.");
    match self.queue.push(priority, Box::new(managed_task)) {
      Ok(()) => Ok(TaskHandle::new(slot)),
      Err(e) => {
        warn!(pool_name = %self.pool_name, %task_id, "Submit: Attempted to submit task to a pool that is shutting down.");
        Err(e)
      }
    }
  }

  /// Stops accepting tasks, lets the workers drain everything already queued,
  /// and blocks until every worker (and the notifier) has exited.
  ///
  /// Safe to call more than once and from several threads; later calls wait
  /// for the first one to finish joining and draining completion events, then
  /// return `Ok(())`. Called from inside a pool task or a completion handler,
  /// it only stops new submissions and returns at once.
  ///
  /// # Errors
  /// Returns `PoolError::WorkerPanicked` if a worker thread died instead of
  /// exiting through its loop.
  pub fn shutdown(&self) -> Result<(), PoolError> {
    if self.queue.close() {
      info!(
        pool_name = %self.pool_name,
        queued = self.queue.len(),
        "Initiating pool shutdown. Queued tasks will be drained before workers exit."
      );
    } else {
      trace!(pool_name = %self.pool_name, "Shutdown already in progress or completed.");
    }

    if self.worker_thread_ids.contains(&thread::current().id()) {
      warn!(
        pool_name = %self.pool_name,
        "Shutdown called from inside a pool task. Workers will drain and exit, but are not joined by this call."
      );
      return Ok(());
    }
    if self.notifier.is_notifier_thread() {
      warn!(
        pool_name = %self.pool_name,
        "Shutdown called from a completion handler. Workers will drain and exit, but are not joined by this call."
      );
      return Ok(());
    }

    let mut first_failure = None;
    // Held across the joins and the notifier drain so concurrent callers
    // return only after workers are gone and every event was delivered.
    let mut handles = self.worker_join_handles.lock();
    for handle in handles.drain(..) {
      let worker_name = handle.thread().name().unwrap_or("<unnamed>").to_string();
      if handle.join().is_err() {
        error!(pool_name = %self.pool_name, worker = %worker_name, "Worker thread terminated abnormally.");
        first_failure.get_or_insert(PoolError::WorkerPanicked(worker_name));
      }
    }
    self.notifier.close_and_join();
    drop(handles);

    match first_failure {
      Some(failure) => Err(failure),
      None => {
        debug!(pool_name = %self.pool_name, "Pool shutdown completed.");
        Ok(())
      }
    }
  }

  fn run_worker_loop(
    pool_name: Arc<String>,
    worker_index: usize,
    queue: Arc<TaskQueue>,
    active_tasks: Arc<AtomicUsize>,
    notifier: Arc<CompletionNotifier>,
  ) {
    let _span = info_span!("priority_pool_worker", pool_name = %*pool_name, worker = worker_index).entered();
    debug!("Worker loop started.");

    while let Some(work) = queue.pop() {
      let task_id = work.task_id();
      if !work.try_claim() {
        debug!(%task_id, "Dequeued task already cancelled; discarding.");
        notifier.notify(
          task_id,
          work.priority(),
          RunReport {
            status: TaskCompletionStatus::Cancelled,
            run_time: None,
          },
        );
        continue;
      }

      let priority = work.priority();
      trace!(%task_id, priority, "Claimed task.");
      active_tasks.fetch_add(1, AtomicOrdering::AcqRel);
      let report = work.run();
      active_tasks.fetch_sub(1, AtomicOrdering::AcqRel);

      match report.status {
        TaskCompletionStatus::Panicked => error!(%task_id, "Task panicked during execution."),
        TaskCompletionStatus::Failed => debug!(%task_id, "Task returned an error."),
        _ => trace!(%task_id, run_time = ?report.run_time, "Task executed successfully."),
      }
      notifier.notify(task_id, priority, report);
    }

    debug!("Task queue closed and drained. Worker loop stopped.");
  }
}

impl Drop for PriorityPoolManager {
  fn drop(&mut self) {
    if !self.queue.is_closed() {
      info!(
        pool_name = %*self.pool_name,
        "PriorityPoolManager dropped without explicit shutdown. Shutting down and draining queued tasks."
      );
    }
    if let Err(e) = self.shutdown() {
      error!(pool_name = %*self.pool_name, "Shutdown during drop failed: {}", e);
    }
  }
}
