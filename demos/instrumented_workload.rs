use priority_orchestra::stopwatch::{timed, CheckpointTimer};
use priority_orchestra::tracker::ResourceTracker;
use priority_orchestra::PriorityPoolManager;
use std::time::{Duration, Instant};
use tracing::info;

fn busy_work(id: usize, iterations: u64) -> u64 {
  let mut acc = id as u64;
  for i in 0..iterations {
    acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
  }
  acc
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Instrumented Workload Example ---");

  let mut tracker = ResourceTracker::new(Duration::from_millis(100));
  tracker.start().expect("Failed to start resource tracker");
  let mut checkpoints = CheckpointTimer::new(true);

  let manager = PriorityPoolManager::new(None, "instrumented_pool").expect("Failed to start pool");
  checkpoints.checkpoint_and_log("pool startup", false);

  let handles: Vec<_> = (0..32)
    .map(|i| {
      let submitted_at = Instant::now();
      let handle = manager
        .submit((i % 4) as i64, move || busy_work(i, 5_000_000))
        .expect("Failed to submit task");
      (submitted_at, handle)
    })
    .collect();
  checkpoints.checkpoint_and_log("submission", true);

  let mut latencies = Vec::with_capacity(handles.len());
  for (submitted_at, handle) in &handles {
    handle.wait();
    latencies.push(submitted_at.elapsed());
  }
  checkpoints.checkpoint_and_log("workload", true);

  timed("pool shutdown", || manager.shutdown().expect("Pool shutdown failed"));

  let samples = tracker.stop().expect("Failed to stop resource tracker");
  let peak_cpu = samples.cpu_percent.iter().cloned().fold(0.0f32, f32::max);
  let peak_memory = samples.memory_percent.iter().cloned().fold(0.0f32, f32::max);
  info!(
    "Collected {} resource samples. Peak CPU {:.1}%, peak memory {:.1}%",
    samples.len(),
    peak_cpu,
    peak_memory
  );

  latencies.sort();
  info!(
    "Submit-to-completion latency: min {:?}, median {:?}, max {:?}",
    latencies[0],
    latencies[latencies.len() / 2],
    latencies[latencies.len() - 1]
  );

  let (offsets, labels) = checkpoints.as_lists();
  for (offset, label) in offsets.iter().zip(labels) {
    info!("checkpoint '{}' at {:?}", label, offset);
  }
  info!("--- Instrumented Workload Example End ---");
}
