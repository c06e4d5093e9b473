//! Background sampling of system memory and CPU load, for observing a pool
//! under load from the outside. The pool itself never depends on this.

use crate::error::InstrumentError;

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
  Initialized,
  Running,
  Stopped,
}

/// Parallel series collected by a `ResourceTracker`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSamples {
  /// Offset of each sample from `start()`.
  pub timestamps: Vec<Duration>,
  /// System memory in use, in percent of total.
  pub memory_percent: Vec<f32>,
  /// Global CPU usage, in percent.
  pub cpu_percent: Vec<f32>,
}

impl ResourceSamples {
  pub fn len(&self) -> usize {
    self.timestamps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timestamps.is_empty()
  }
}

/// Samples memory and CPU usage on a background thread between `start()` and
/// `stop()`. Each tracker runs once; create another for a new measurement.
#[derive(Debug)]
pub struct ResourceTracker {
  interval: Duration,
  state: TrackerState,
  stop_tx: Option<Sender<()>>,
  sampler: Option<JoinHandle<ResourceSamples>>,
  samples: Option<ResourceSamples>,
}

impl ResourceTracker {
  /// Creates a tracker that samples every `interval` once started.
  ///
  /// The first sample is taken after `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`
  /// so that its CPU reading is meaningful. Intervals shorter than that
  /// constant give noisy CPU values; memory readings are unaffected.
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      state: TrackerState::Initialized,
      stop_tx: None,
      sampler: None,
      samples: None,
    }
  }

  pub fn state(&self) -> TrackerState {
    self.state
  }

  pub fn start(&mut self) -> Result<(), InstrumentError> {
    if self.state != TrackerState::Initialized {
      return Err(InstrumentError::AlreadyStarted);
    }
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let interval = self.interval;

    let sampler = thread::Builder::new()
      .name("resource-tracker".to_string())
      .spawn(move || {
        let _span = info_span!("resource_tracker").entered();
        let started = Instant::now();
        let mut system = System::new();
        let mut samples = ResourceSamples::default();

        // CPU usage is a delta between two refreshes; prime it so the first
        // sample is a real reading. A stop during priming still yields one sample.
        system.refresh_cpu_usage();
        let stop_requested = !matches!(
          stop_rx.recv_timeout(MINIMUM_CPU_UPDATE_INTERVAL),
          Err(RecvTimeoutError::Timeout)
        );
        loop {
          system.refresh_memory();
          system.refresh_cpu_usage();
          let total = system.total_memory();
          let memory = if total == 0 {
            0.0
          } else {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
          };
          samples.timestamps.push(started.elapsed());
          samples.memory_percent.push(memory);
          samples.cpu_percent.push(system.global_cpu_usage());

          if stop_requested || !matches!(stop_rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout)) {
            break;
          }
        }
        debug!(samples = samples.len(), "Resource sampling stopped.");
        samples
      })
      .map_err(|e| {
        warn!("Failed to spawn resource tracker thread: {}", e);
        InstrumentError::SamplerSpawnFailed(e.to_string())
      })?;

    self.stop_tx = Some(stop_tx);
    self.sampler = Some(sampler);
    self.state = TrackerState::Running;
    Ok(())
  }

  /// Stops sampling (waiting at most one interval) and returns the series.
  pub fn stop(&mut self) -> Result<&ResourceSamples, InstrumentError> {
    if self.state != TrackerState::Running {
      return Err(InstrumentError::NotRunning);
    }
    if let Some(stop_tx) = self.stop_tx.take() {
      let _ = stop_tx.send(());
    }
    self.state = TrackerState::Stopped;
    let samples = match self.sampler.take().map(JoinHandle::join) {
      Some(Ok(samples)) => samples,
      _ => return Err(InstrumentError::SamplerPanicked),
    };
    Ok(self.samples.insert(samples))
  }

  pub fn results(&self) -> Result<&ResourceSamples, InstrumentError> {
    match (&self.state, &self.samples) {
      (TrackerState::Stopped, Some(samples)) => Ok(samples),
      _ => Err(InstrumentError::NotStopped),
    }
  }
}

impl Drop for ResourceTracker {
  fn drop(&mut self) {
    if self.state == TrackerState::Running {
      let _ = self.stop();
    }
  }
}
