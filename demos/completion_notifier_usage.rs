use priority_orchestra::{PriorityPoolManager, TaskCompletionInfo, TaskCompletionStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn my_notified_task(id: usize, delay_ms: u64, should_panic: bool) -> String {
  info!(
    "NotifiedTask {}: Starting, will sleep for {}ms. Panic: {}",
    id, delay_ms, should_panic
  );
  thread::sleep(Duration::from_millis(delay_ms));
  if should_panic {
    panic!("NotifiedTask {} panicked!", id);
  }
  format!("NotifiedTask {} finished successfully after {}ms", id, delay_ms)
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Completion Notifier Usage Example ---");

  let manager = PriorityPoolManager::new(Some(2), "notifier_pool").expect("Failed to start pool");

  let successes = Arc::new(AtomicUsize::new(0));
  let failures = Arc::new(AtomicUsize::new(0));
  let successes_clone = successes.clone();
  let failures_clone = failures.clone();

  manager.add_completion_handler(move |info: TaskCompletionInfo| {
    info!(
      "HANDLER: Task {} (priority {}) in pool '{}' finished with {:?} after {:?}",
      info.task_id, info.priority, info.pool_name, info.status, info.run_time
    );
    match info.status {
      TaskCompletionStatus::Success => successes_clone.fetch_add(1, Ordering::SeqCst),
      _ => failures_clone.fetch_add(1, Ordering::SeqCst),
    };
  });

  let mut handles = Vec::new();
  for i in 0..6 {
    let should_panic = i == 3;
    match manager.submit(i as i64 % 3, move || my_notified_task(i, 100 + i as u64 * 20, should_panic)) {
      Ok(handle) => handles.push(handle),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }
  // Cancelled before a worker reaches it; still reported to handlers.
  let cancelled = manager
    .submit(10, || my_notified_task(99, 0, false))
    .expect("Failed to submit task");
  info!("Cancelled task {}: {}", cancelled.id(), cancelled.cancel());

  // Shutdown returns only after every pending notification was delivered.
  manager.shutdown().expect("Pool shutdown failed");
  info!(
    "Handler totals: {} succeeded, {} did not",
    successes.load(Ordering::SeqCst),
    failures.load(Ordering::SeqCst)
  );
  info!("--- Completion Notifier Usage Example End ---");
}
