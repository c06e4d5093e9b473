use priority_orchestra::{PoolError, PriorityPoolManager};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Individual Task Cancellation Example ---");

  let manager = PriorityPoolManager::new(Some(1), "cancellation_pool").expect("Failed to start pool");

  let (started_tx, started_rx) = mpsc::channel();
  let long_running = manager
    .submit(0, move || {
      started_tx.send(()).ok();
      info!("Long running task: working for 1s");
      thread::sleep(Duration::from_secs(1));
      "long running task done"
    })
    .expect("Failed to submit long running task");
  started_rx.recv().expect("Long running task never started");

  let queued = manager
    .submit(1, || "this never runs")
    .expect("Failed to submit queued task");

  info!("Queued task state before cancel: {:?}", queued.state());
  info!("Cancelling queued task {}: {}", queued.id(), queued.cancel());
  info!("Cancelling running task {}: {}", long_running.id(), long_running.cancel());

  match queued.result() {
    Err(PoolError::TaskCancelled) => info!("Queued task {} reports cancellation.", queued.id()),
    other => tracing::error!("Unexpected result for cancelled task: {:?}", other),
  }
  match long_running.result() {
    Ok(value) => info!("Running task {} completed anyway: {}", long_running.id(), value),
    Err(e) => tracing::error!("Running task failed: {:?}", e),
  }

  manager.shutdown().expect("Pool shutdown failed");
  info!("--- Individual Task Cancellation Example End ---");
}
