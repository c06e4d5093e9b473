use crate::task::{Outcome, RunReport, TaskPriority};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, SystemTime};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, info_span, trace, warn};

// --- Public Event Structs for Handlers ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCompletionStatus {
  Success,
  Failed,
  Panicked,
  Cancelled,
}

impl<R> From<&Outcome<R>> for TaskCompletionStatus {
  fn from(outcome: &Outcome<R>) -> Self {
    match outcome {
      Outcome::Completed(_) => TaskCompletionStatus::Success,
      Outcome::Failed(failure) if failure.is_panic() => TaskCompletionStatus::Panicked,
      Outcome::Failed(_) => TaskCompletionStatus::Failed,
      Outcome::Cancelled => TaskCompletionStatus::Cancelled,
    }
  }
}

#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
  pub task_id: u64,
  pub priority: TaskPriority,
  pub pool_name: Arc<String>,
  pub status: TaskCompletionStatus,
  pub completion_time: SystemTime,
  /// Time spent executing the action; `None` for tasks that never ran.
  pub run_time: Option<Duration>,
}

// --- Internal Message (crate-public) ---
#[derive(Debug)]
pub(crate) struct InternalCompletionMessage {
  pub(crate) task_id: u64,
  pub(crate) priority: TaskPriority,
  pub(crate) report: RunReport,
  pub(crate) completion_time: SystemTime,
}

type CompletionHandler = Arc<dyn Fn(TaskCompletionInfo) + Send + Sync + 'static>;

// --- CompletionNotifier Struct ---

struct NotifierInternalState {
  internal_rx_for_init: Option<Receiver<InternalCompletionMessage>>,
  worker_join_handle: Option<JoinHandle<()>>,
}

/// Delivers task completion events to registered handlers on a dedicated
/// thread, so slow or panicking handlers never stall pool workers.
pub(crate) struct CompletionNotifier {
  handlers: Arc<RwLock<Vec<CompletionHandler>>>,
  init_once: Once,
  sender: Mutex<Option<Sender<InternalCompletionMessage>>>,
  internal_state_for_init: Mutex<NotifierInternalState>,
  worker_thread_id: OnceLock<ThreadId>,
  pool_name: Arc<String>,
  thread_name: String,
}

impl fmt::Debug for CompletionNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let handler_count = self.handlers.try_read().map_or(0, |guard| guard.len());
    f.debug_struct("CompletionNotifier")
      .field("pool_name", &self.pool_name)
      .field("handler_count", &handler_count)
      .field("initialized", &self.init_once.is_completed())
      .finish()
  }
}

impl CompletionNotifier {
  pub(crate) fn new(pool_name: Arc<String>, thread_name: String) -> Arc<Self> {
    let (tx, rx) = unbounded();
    Arc::new(Self {
      handlers: Arc::new(RwLock::new(Vec::new())),
      init_once: Once::new(),
      sender: Mutex::new(Some(tx)),
      internal_state_for_init: Mutex::new(NotifierInternalState {
        internal_rx_for_init: Some(rx),
        worker_join_handle: None,
      }),
      worker_thread_id: OnceLock::new(),
      pool_name,
      thread_name,
    })
  }

  fn ensure_worker_initialized(&self) {
    self.init_once.call_once(|| {
      let mut state_guard = self.internal_state_for_init.lock();
      let Some(rx_to_use) = state_guard.internal_rx_for_init.take() else {
        warn!(pool_name = %*self.pool_name, "Notifier initialization: receiver already taken.");
        return;
      };
      info!(pool_name = %*self.pool_name, "First completion handler added. Initializing notification worker.");

      let worker_handlers = self.handlers.clone();
      let worker_pool_name = self.pool_name.clone();
      let spawn_result = thread::Builder::new()
        .name(self.thread_name.clone())
        .spawn(move || Self::run_notification_worker_loop(rx_to_use, worker_handlers, worker_pool_name));

      match spawn_result {
        Ok(handle) => {
          let _ = self.worker_thread_id.set(handle.thread().id());
          state_guard.worker_join_handle = Some(handle);
        }
        Err(e) => {
          error!(pool_name = %*self.pool_name, "Failed to spawn notification worker: {}. Completion events will be dropped.", e);
        }
      }
    });
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.ensure_worker_initialized();
    let mut handlers_guard = self.handlers.write();
    handlers_guard.push(Arc::new(handler));
    info!(pool_name = %*self.pool_name, "Notifier: Added new completion handler. Total handlers: {}", handlers_guard.len());
  }

  /// Queues a completion event. Events are dropped until the first handler is
  /// registered, and after the notifier is closed.
  pub(crate) fn notify(&self, task_id: u64, priority: TaskPriority, report: RunReport) {
    if !self.init_once.is_completed() {
      return;
    }
    let guard = self.sender.lock();
    let Some(tx) = guard.as_ref() else {
      trace!(pool_name = %*self.pool_name, %task_id, "Notifier closed, dropping completion event.");
      return;
    };
    let message = InternalCompletionMessage {
      task_id,
      priority,
      report,
      completion_time: SystemTime::now(),
    };
    if tx.send(message).is_err() {
      warn!(pool_name = %*self.pool_name, %task_id, "Notification worker is gone; completion event lost.");
    }
  }

  fn run_notification_worker_loop(
    queue_rx: Receiver<InternalCompletionMessage>,
    handlers_list_arc: Arc<RwLock<Vec<CompletionHandler>>>,
    pool_name: Arc<String>,
  ) {
    let _span = info_span!("notification_worker_loop", pool_name = %*pool_name).entered();
    info!("Notification worker started.");

    // Ends once every sender is dropped and the channel is drained.
    for internal_msg in queue_rx.iter() {
      let handlers: Vec<CompletionHandler> = handlers_list_arc.read().clone();
      if handlers.is_empty() {
        trace!(task_id = %internal_msg.task_id, "No completion handlers registered, dropping notification.");
        continue;
      }

      let public_info = TaskCompletionInfo {
        task_id: internal_msg.task_id,
        priority: internal_msg.priority,
        pool_name: pool_name.clone(),
        status: internal_msg.report.status,
        completion_time: internal_msg.completion_time,
        run_time: internal_msg.report.run_time,
      };
      debug!(task_id = %public_info.task_id, status = ?public_info.status, "Dispatching notification to {} handlers.", handlers.len());

      for handler in handlers {
        let info = public_info.clone();
        if panic::catch_unwind(AssertUnwindSafe(|| handler(info))).is_err() {
          error!(task_id = %public_info.task_id, "A completion handler panicked during execution.");
        }
      }
    }

    info!("Notification worker stopped (input queue closed and drained).");
  }

  /// Returns `true` when called from inside a completion handler.
  pub(crate) fn is_notifier_thread(&self) -> bool {
    self.worker_thread_id.get() == Some(&thread::current().id())
  }

  /// Closes the event channel, lets the worker drain it, and joins the worker.
  pub(crate) fn close_and_join(&self) {
    drop(self.sender.lock().take());

    let handle_option = self.internal_state_for_init.lock().worker_join_handle.take();
    let Some(handle) = handle_option else {
      trace!(pool_name = %*self.pool_name, "Notifier: Worker was not initialized or already joined.");
      return;
    };
    if handle.thread().id() == thread::current().id() {
      warn!(pool_name = %*self.pool_name, "Notifier: Shutdown requested from a completion handler; not joining the notifier thread.");
      return;
    }
    info!(pool_name = %*self.pool_name, "Notifier: Waiting for notification worker to join.");
    if handle.join().is_err() {
      error!(pool_name = %*self.pool_name, "Notifier: Notification worker terminated abnormally.");
    } else {
      debug!(pool_name = %*self.pool_name, "Notifier: Notification worker successfully joined.");
    }
  }
}
