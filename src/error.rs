use crate::task::TaskFailure;
use thiserror::Error;

/// Errors that can occur within the `priority_orchestra` pool.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
  #[error("Worker count must be at least 1, got {0}")]
  InvalidWorkerCount(usize),

  #[error("Failed to spawn pool worker thread: {0}")]
  WorkerSpawnFailed(String),

  #[error("Pool worker thread '{0}' terminated abnormally")]
  WorkerPanicked(String),

  #[error("Task failed: {0}")]
  TaskFailed(#[from] TaskFailure),

  #[error("Task was cancelled")]
  TaskCancelled,

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,
}

/// Misuse of the instrumentation helpers (`ResourceTracker`, `CheckpointTimer`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
  #[error("Can only start once")]
  AlreadyStarted,

  #[error("Can only stop if already running")]
  NotRunning,

  #[error("Can only get results after stopping")]
  NotStopped,

  #[error("Failed to spawn sampler thread: {0}")]
  SamplerSpawnFailed(String),

  #[error("Sampler thread terminated abnormally")]
  SamplerPanicked,
}
