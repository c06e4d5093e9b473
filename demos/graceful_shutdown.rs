use priority_orchestra::{PriorityPoolManager, TaskHandle};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn work_task_fn(id: usize, duration_ms: u64) -> String {
  info!("Task {} starting (will run for {}ms)", id, duration_ms);
  thread::sleep(Duration::from_millis(duration_ms));
  let result = format!("Task {} finished after {}ms", id, duration_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let manager = Arc::new(PriorityPoolManager::new(Some(2), "graceful_shutdown_pool").expect("Failed to start pool"));

  // With 2 workers, tasks 0 and 1 start and tasks 2..5 wait in the queue.
  let mut handles: Vec<TaskHandle<String>> = Vec::new();
  for i in 0..6 {
    match manager.submit(i as i64, move || work_task_fn(i, 500)) {
      Ok(handle) => handles.push(handle),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }
  info!(
    "All tasks submitted. Queue size: {}, Active: {}",
    manager.queued_task_count(),
    manager.active_task_count()
  );

  thread::sleep(Duration::from_millis(100));
  let manager_for_shutdown = manager.clone();
  let shutdown_jh = thread::spawn(move || {
    info!("Calling pool.shutdown()...");
    manager_for_shutdown.shutdown().expect("Graceful shutdown failed");
    info!("Pool shutdown call completed.");
  });

  thread::sleep(Duration::from_millis(50));
  info!("Attempting to submit task after shutdown initiated...");
  match manager.submit(0, || work_task_fn(99, 100)) {
    Ok(_) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(e) => info!("Late submission correctly failed: {:?}", e),
  }

  shutdown_jh.join().expect("Shutdown thread panicked");

  // Every task accepted before shutdown was drained, so all results are ready.
  for handle in &handles {
    match handle.try_outcome() {
      Some(outcome) => info!("Task {} outcome: {:?}", handle.id(), outcome),
      None => tracing::error!("Task {} still pending after shutdown", handle.id()),
    }
  }
  info!("--- Graceful Shutdown Example End ---");
}
