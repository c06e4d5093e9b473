use priority_orchestra::{PoolConfig, PriorityPoolManager, TaskCompletionInfo, TaskCompletionStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,priority_orchestra=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[derive(Debug)]
struct Rejected;

impl std::fmt::Display for Rejected {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("rejected")
  }
}

impl std::error::Error for Rejected {}

// Registers a handler that records every event in arrival order.
fn collect_completions(manager: &PriorityPoolManager) -> Arc<Mutex<Vec<TaskCompletionInfo>>> {
  let received = Arc::new(Mutex::new(Vec::new()));
  let received_clone = received.clone();
  manager.add_completion_handler(move |info| {
    tracing::info!("Handler received completion: {:?}", info);
    received_clone.lock().unwrap().push(info);
  });
  received
}

fn find(received: &[TaskCompletionInfo], task_id: u64) -> &TaskCompletionInfo {
  received
    .iter()
    .find(|info| info.task_id == task_id)
    .unwrap_or_else(|| panic!("No completion event for task {}", task_id))
}

#[test]
fn test_notification_on_success() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_success";
  tracing::info!("Starting test: {}", pool_name);
  let manager = PriorityPoolManager::new(Some(1), pool_name).unwrap();
  let received = collect_completions(&manager);
  let before = SystemTime::now();

  let handle = manager
    .submit(7, || {
      thread::sleep(Duration::from_millis(10));
      "success_output"
    })
    .unwrap();
  assert!(handle.wait().is_completed());
  manager.shutdown().unwrap();

  let received = received.lock().unwrap();
  assert_eq!(received.len(), 1);
  let info = &received[0];
  assert_eq!(info.task_id, handle.id());
  assert_eq!(info.priority, 7);
  assert_eq!(info.pool_name.as_str(), pool_name);
  assert_eq!(info.status, TaskCompletionStatus::Success);
  assert!(info.completion_time >= before);
  assert!(info.run_time.map_or(false, |d| d >= Duration::from_millis(10)));
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_notification_on_panic_and_error() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_failures";
  tracing::info!("Starting test: {}", pool_name);
  let manager = PriorityPoolManager::new(Some(1), pool_name).unwrap();
  let received = collect_completions(&manager);

  let panicking = manager.submit(0, || -> u32 { panic!("Task intentionally panicked!") }).unwrap();
  let erroring = manager.submit_fallible(1, || -> Result<u32, Rejected> { Err(Rejected) }).unwrap();
  assert!(panicking.wait().is_failed());
  assert!(erroring.wait().is_failed());
  manager.shutdown().unwrap();

  let received = received.lock().unwrap();
  assert_eq!(find(&received, panicking.id()).status, TaskCompletionStatus::Panicked);
  assert_eq!(find(&received, erroring.id()).status, TaskCompletionStatus::Failed);
  assert!(received.iter().all(|info| info.run_time.is_some()));
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_notification_on_cancelled_queued_task() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_cancel_queued";
  tracing::info!("Starting test: {}", pool_name);
  let manager = PriorityPoolManager::new(Some(1), pool_name).unwrap();
  let received = collect_completions(&manager);

  let (started_tx, started_rx) = mpsc::channel();
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let blocker = manager
    .submit(0, move || {
      started_tx.send(()).unwrap();
      let _ = release_rx.recv();
    })
    .unwrap();
  started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

  let victim = manager.submit(3, || "never").unwrap();
  assert!(victim.cancel());
  release_tx.send(()).unwrap();
  manager.shutdown().unwrap();

  let received = received.lock().unwrap();
  assert_eq!(received.len(), 2);
  assert_eq!(find(&received, blocker.id()).status, TaskCompletionStatus::Success);
  let cancelled = find(&received, victim.id());
  assert_eq!(cancelled.status, TaskCompletionStatus::Cancelled);
  assert_eq!(cancelled.priority, 3);
  assert!(cancelled.run_time.is_none());
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_multiple_handlers_and_panicking_handler() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_multi_handlers";
  tracing::info!("Starting test: {}", pool_name);
  let manager = PriorityPoolManager::new(Some(2), pool_name).unwrap();

  let first_count = Arc::new(AtomicUsize::new(0));
  let second_count = Arc::new(AtomicUsize::new(0));
  let first_clone = first_count.clone();
  let second_clone = second_count.clone();
  manager.add_completion_handler(move |_| {
    first_clone.fetch_add(1, Ordering::SeqCst);
  });
  manager.add_completion_handler(|info| panic!("Handler intentionally panicked on task {}", info.task_id));
  manager.add_completion_handler(move |_| {
    second_clone.fetch_add(1, Ordering::SeqCst);
  });

  let handles: Vec<_> = (0..6).map(|i| manager.submit(i, move || i * 2).unwrap()).collect();
  for handle in &handles {
    assert!(handle.wait().is_completed());
  }
  manager.shutdown().unwrap();

  assert_eq!(first_count.load(Ordering::SeqCst), handles.len());
  assert_eq!(second_count.load(Ordering::SeqCst), handles.len());
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_handler_runs_off_worker_threads() {
  setup_tracing_for_test();
  let config = PoolConfig::new("notifier_test_thread").worker_count(1).thread_name_prefix("ntf");
  let manager = PriorityPoolManager::with_config(config).unwrap();

  let handler_thread = Arc::new(Mutex::new(None));
  let handler_thread_clone = handler_thread.clone();
  manager.add_completion_handler(move |_| {
    *handler_thread_clone.lock().unwrap() = thread::current().name().map(str::to_string);
  });

  manager.submit(0, || ()).unwrap().wait();
  manager.shutdown().unwrap();

  assert_eq!(handler_thread.lock().unwrap().as_deref(), Some("ntf-notifier"));
}

#[test]
fn test_all_notifications_delivered_before_shutdown_returns() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_drain_on_shutdown";
  tracing::info!("Starting test: {}", pool_name);
  let manager = PriorityPoolManager::new(Some(3), pool_name).unwrap();

  let delivered = Arc::new(AtomicUsize::new(0));
  let delivered_clone = delivered.clone();
  manager.add_completion_handler(move |_| {
    // Slow handler so events pile up behind the workers.
    thread::sleep(Duration::from_millis(2));
    delivered_clone.fetch_add(1, Ordering::SeqCst);
  });

  let task_count = 30;
  for i in 0..task_count {
    manager.submit(i % 4, || ()).unwrap();
  }
  manager.shutdown().unwrap();

  assert_eq!(delivered.load(Ordering::SeqCst), task_count as usize);
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_no_events_for_tasks_finished_before_registration() {
  setup_tracing_for_test();
  let manager = PriorityPoolManager::new(Some(1), "notifier_test_late_handler").unwrap();

  let early = manager.submit(0, || 1).unwrap();
  early.wait();

  let received = collect_completions(&manager);
  let late = manager.submit(0, || 2).unwrap();
  late.wait();
  manager.shutdown().unwrap();

  let received = received.lock().unwrap();
  assert_eq!(received.len(), 1);
  assert_eq!(received[0].task_id, late.id());
}

#[test]
fn test_concurrent_shutdowns_both_wait_for_delivery() {
  setup_tracing_for_test();
  let pool_name = "notifier_test_concurrent_shutdown";
  tracing::info!("Starting test: {}", pool_name);
  let manager = Arc::new(PriorityPoolManager::new(Some(2), pool_name).unwrap());

  let delivered = Arc::new(AtomicUsize::new(0));
  let delivered_clone = delivered.clone();
  manager.add_completion_handler(move |_| {
    thread::sleep(Duration::from_millis(20));
    delivered_clone.fetch_add(1, Ordering::SeqCst);
  });

  let task_count = 20;
  for i in 0..task_count {
    manager.submit(i, || ()).unwrap();
  }

  let barrier = Arc::new(Barrier::new(2));
  let callers: Vec<_> = (0..2)
    .map(|_| {
      let manager = manager.clone();
      let barrier = barrier.clone();
      let delivered = delivered.clone();
      thread::spawn(move || {
        barrier.wait();
        manager.shutdown().unwrap();
        delivered.load(Ordering::SeqCst)
      })
    })
    .collect();

  for caller in callers {
    assert_eq!(caller.join().unwrap(), task_count as usize);
  }
  tracing::info!("Finished test: {}", pool_name);
}

#[test]
fn test_shutdown_from_completion_handler_does_not_deadlock() {
  setup_tracing_for_test();
  let manager = Arc::new(PriorityPoolManager::new(Some(1), "notifier_test_handler_shutdown").unwrap());

  let weak_manager = Arc::downgrade(&manager);
  let (done_tx, done_rx) = mpsc::channel();
  let done_tx = Mutex::new(done_tx);
  manager.add_completion_handler(move |_| {
    if let Some(manager) = weak_manager.upgrade() {
      let result = manager.shutdown();
      let _ = done_tx.lock().unwrap().send(result.is_ok());
    }
  });

  manager.submit(0, || ()).unwrap();
  assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
  assert!(manager.is_shutdown());
  manager.shutdown().unwrap();
}
