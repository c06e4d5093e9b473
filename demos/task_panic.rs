use priority_orchestra::{Outcome, PriorityPoolManager, TaskFailure};
use tracing::info;

#[derive(Debug)]
struct InvalidInput(i32);

impl std::fmt::Display for InvalidInput {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "input {} is negative", self.0)
  }
}

impl std::error::Error for InvalidInput {}

fn checked_sqrt(input: i32) -> Result<f64, InvalidInput> {
  if input < 0 {
    return Err(InvalidInput(input));
  }
  Ok((input as f64).sqrt())
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let manager = PriorityPoolManager::new(Some(1), "panic_pool").expect("Failed to start pool");

  let panicking = manager
    .submit(0, || -> f64 { panic!("This task panics on purpose") })
    .expect("Failed to submit panicking task");
  let erroring = manager
    .submit_fallible(1, || checked_sqrt(-4))
    .expect("Failed to submit erroring task");
  let healthy = manager
    .submit_fallible(2, || checked_sqrt(16))
    .expect("Failed to submit healthy task");

  for (label, handle) in [("panicking", &panicking), ("erroring", &erroring), ("healthy", &healthy)] {
    match handle.wait() {
      Outcome::Completed(value) => info!("{} task completed with {}", label, value),
      Outcome::Failed(TaskFailure::Panicked(msg)) => info!("{} task panicked: {}", label, msg),
      Outcome::Failed(failure) => info!("{} task failed: {}", label, failure),
      Outcome::Cancelled => info!("{} task was cancelled", label),
    }
  }

  // The single worker survived the panic.
  manager.shutdown().expect("Pool shutdown failed");
  info!("--- Task Panic Example End ---");
}
