use priority_orchestra::PriorityPoolManager;
use std::sync::{Arc, Barrier, Mutex};
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Priority Ordering Example ---");

  // A single worker makes the execution order fully determined by the queue.
  let manager = PriorityPoolManager::new(Some(1), "priority_pool").expect("Failed to start pool");
  let order = Arc::new(Mutex::new(Vec::new()));

  // Hold the worker until everything below is queued.
  let gate = Arc::new(Barrier::new(2));
  let worker_gate = gate.clone();
  manager
    .submit(i64::MIN, move || {
      worker_gate.wait();
    })
    .expect("Failed to submit gate task");

  let jobs = [(5, "report"), (1, "urgent"), (3, "normal"), (1, "urgent-2"), (-10, "critical")];
  for (priority, label) in jobs {
    let order = order.clone();
    manager
      .submit(priority, move || {
        info!("Running '{}' (priority {})", label, priority);
        order.lock().unwrap().push(label);
      })
      .expect("Failed to submit task");
    info!("Queued '{}' with priority {}", label, priority);
  }
  info!("Queued tasks: {}", manager.queued_task_count());
  gate.wait();

  manager.shutdown().expect("Pool shutdown failed");
  // Lower values first; equal priorities keep submission order.
  info!("Execution order: {:?}", order.lock().unwrap());
  info!("--- Priority Ordering Example End ---");
}
