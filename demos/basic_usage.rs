use priority_orchestra::{PriorityPoolManager, TaskHandle};
use std::thread;
use std::time::Duration;
use tracing::info;

fn my_task_fn(id: usize, delay_ms: u64) -> String {
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  thread::sleep(Duration::from_millis(delay_ms));
  let result = format!("Task {} finished successfully after {}ms", id, delay_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  let manager = PriorityPoolManager::new(Some(2), "basic_pool").expect("Failed to start pool");

  let mut handles: Vec<TaskHandle<String>> = Vec::new();

  for i in 0..5 {
    // Alternate sleep times for variety
    let sleep_duration: u64 = 500 + (i as u64 % 3 * 250);
    match manager.submit(0, move || my_task_fn(i, sleep_duration)) {
      Ok(handle) => {
        info!("Submitted task {} with handle id {}", i, handle.id());
        handles.push(handle);
      }
      Err(e) => {
        tracing::error!("Failed to submit task {}: {:?}", i, e);
      }
    }
  }

  info!("All tasks submitted. Waiting for results...");

  for handle in &handles {
    match handle.result() {
      Ok(result) => info!("Result for task {}: {}", handle.id(), result),
      Err(e) => info!("Error for task {}: {:?}", handle.id(), e),
    }
  }

  info!("All task results processed. Shutting down pool.");
  manager.shutdown().expect("Pool shutdown failed");
  info!("Pool shutdown complete.");
  info!("--- Basic Usage Example End ---");
}
