//! Elapsed-time helpers for instrumenting pool workloads from the outside,
//! e.g. submit-to-completion latency.

use crate::error::InstrumentError;

use std::fmt;
use std::time::{Duration, Instant};

use tracing::info;

/// Measures the time between its creation and [`stop`](Self::stop), or its drop.
///
/// A named timer logs its reading at info level when dropped.
#[derive(Debug)]
pub struct ContextTimer {
  name: Option<String>,
  start_time: Instant,
  stop_time: Option<Instant>,
}

impl ContextTimer {
  pub fn start(name: Option<&str>) -> Self {
    Self {
      name: name.map(str::to_string),
      start_time: Instant::now(),
      stop_time: None,
    }
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  /// Freezes the reading. Later calls keep the first stop time.
  pub fn stop(&mut self) -> Duration {
    *self.stop_time.get_or_insert_with(Instant::now) - self.start_time
  }

  /// Time since start, or the frozen reading once stopped.
  pub fn elapsed(&self) -> Duration {
    match self.stop_time {
      Some(stop) => stop - self.start_time,
      None => self.start_time.elapsed(),
    }
  }
}

impl fmt::Display for ContextTimer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let secs = self.elapsed().as_secs_f64();
    match &self.name {
      Some(name) => write!(f, "{}: {:.3} s", name, secs),
      None => write!(f, "{:.3} s", secs),
    }
  }
}

impl Drop for ContextTimer {
  fn drop(&mut self) {
    if self.stop_time.is_none() {
      self.stop();
      if self.name.is_some() {
        info!(target: "priority_orchestra::stopwatch", "{}", self);
      }
    }
  }
}

/// Runs `f` inside a timer named `name` and returns its value.
pub fn timed<T>(name: &str, f: impl FnOnce() -> T) -> T {
  let _timer = ContextTimer::start(Some(name));
  f()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
  pub name: String,
  pub timestamp: Instant,
}

/// Records a sequence of named instants, starting with `"start"`.
#[derive(Debug, Default)]
pub struct CheckpointTimer {
  checkpoints: Vec<Checkpoint>,
}

impl CheckpointTimer {
  pub fn new(start_now: bool) -> Self {
    let mut timer = Self::default();
    if start_now {
      timer.checkpoint("start");
    }
    timer
  }

  pub fn start(&mut self) -> Result<(), InstrumentError> {
    if !self.checkpoints.is_empty() {
      return Err(InstrumentError::AlreadyStarted);
    }
    self.checkpoint("start");
    Ok(())
  }

  pub fn checkpoint(&mut self, name: &str) {
    self.checkpoints.push(Checkpoint {
      name: name.to_string(),
      timestamp: Instant::now(),
    });
  }

  /// Records a checkpoint and logs the time since the previous one (and,
  /// with `include_total`, since the first). Returns `(since_last, total)`.
  pub fn checkpoint_and_log(&mut self, name: &str, include_total: bool) -> (Duration, Duration) {
    self.checkpoint(name);
    let now = self.checkpoints[self.checkpoints.len() - 1].timestamp;
    let previous = self
      .checkpoints
      .len()
      .checked_sub(2)
      .map_or(now, |i| self.checkpoints[i].timestamp);
    let since_last = now - previous;
    let total = now - self.checkpoints[0].timestamp;

    if include_total {
      info!(
        target: "priority_orchestra::stopwatch",
        "{} done in {:.3} s ({:.3} s total)",
        name,
        since_last.as_secs_f64(),
        total.as_secs_f64()
      );
    } else {
      info!(target: "priority_orchestra::stopwatch", "{} done in {:.3} s", name, since_last.as_secs_f64());
    }
    (since_last, total)
  }

  pub fn checkpoints(&self) -> &[Checkpoint] {
    &self.checkpoints
  }

  /// Offsets from the first checkpoint, and the checkpoint labels.
  pub fn as_lists(&self) -> (Vec<Duration>, Vec<String>) {
    let Some(first) = self.checkpoints.first() else {
      return (Vec::new(), Vec::new());
    };
    self
      .checkpoints
      .iter()
      .map(|cp| (cp.timestamp - first.timestamp, cp.name.clone()))
      .unzip()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn test_context_timer_freezes_on_stop() {
    let mut timer = ContextTimer::start(Some("work"));
    thread::sleep(Duration::from_millis(10));
    let stopped = timer.stop();
    assert!(stopped >= Duration::from_millis(10));
    thread::sleep(Duration::from_millis(5));
    assert_eq!(timer.elapsed(), stopped);
    assert_eq!(timer.stop(), stopped);
    assert!(timer.to_string().starts_with("work: "));
    assert!(timer.to_string().ends_with(" s"));
  }

  #[test]
  fn test_unnamed_timer_display() {
    let timer = ContextTimer::start(None);
    assert!(timer.name().is_none());
    assert!(!timer.to_string().contains(':'));
  }

  #[test]
  fn test_timed_returns_value() {
    assert_eq!(timed("answer", || 6 * 7), 42);
  }

  #[test]
  fn test_checkpoint_timer_sequence() {
    let mut timer = CheckpointTimer::new(true);
    assert_eq!(timer.start(), Err(InstrumentError::AlreadyStarted));

    thread::sleep(Duration::from_millis(5));
    let (first_leg, total) = timer.checkpoint_and_log("load", true);
    assert!(first_leg >= Duration::from_millis(5));
    assert_eq!(first_leg, total);

    let (second_leg, total) = timer.checkpoint_and_log("run", false);
    assert!(total >= first_leg + second_leg);

    let (offsets, labels) = timer.as_lists();
    assert_eq!(labels, vec!["start", "load", "run"]);
    assert_eq!(offsets[0], Duration::ZERO);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
  }

  #[test]
  fn test_deferred_start() {
    let mut timer = CheckpointTimer::new(false);
    assert_eq!(timer.as_lists(), (Vec::new(), Vec::new()));
    timer.start().unwrap();
    assert_eq!(timer.checkpoints().len(), 1);
    assert_eq!(timer.checkpoints()[0].name, "start");
  }
}
