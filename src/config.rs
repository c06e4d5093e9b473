use crate::error::PoolError;

/// Construction options for a `PriorityPoolManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
  /// Name used in logs, completion notifications and worker thread names.
  pub pool_name: String,
  /// Number of worker threads. `None` means one per logical CPU.
  pub worker_count: Option<usize>,
  /// Prefix for worker thread names; defaults to the pool name.
  pub thread_name_prefix: Option<String>,
  /// Stack size for worker threads, in bytes. `None` keeps the platform default.
  pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      pool_name: "priority_pool".to_string(),
      worker_count: None,
      thread_name_prefix: None,
      stack_size: None,
    }
  }
}

impl PoolConfig {
  pub fn new(pool_name: &str) -> Self {
    Self {
      pool_name: pool_name.to_string(),
      ..Self::default()
    }
  }

  pub fn worker_count(mut self, worker_count: usize) -> Self {
    self.worker_count = Some(worker_count);
    self
  }

  pub fn thread_name_prefix(mut self, prefix: &str) -> Self {
    self.thread_name_prefix = Some(prefix.to_string());
    self
  }

  pub fn stack_size(mut self, bytes: usize) -> Self {
    self.stack_size = Some(bytes);
    self
  }

  pub fn validate(&self) -> Result<(), PoolError> {
    match self.worker_count {
      Some(0) => Err(PoolError::InvalidWorkerCount(0)),
      _ => Ok(()),
    }
  }

  /// The worker count the pool will actually start.
  pub fn resolved_worker_count(&self) -> usize {
    self.worker_count.unwrap_or_else(num_cpus::get)
  }

  pub(crate) fn worker_thread_name(&self, index: usize) -> String {
    let prefix = self.thread_name_prefix.as_deref().unwrap_or(&self.pool_name);
    format!("{}-worker-{}", prefix, index)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_to_cpu_count() {
    let config = PoolConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.resolved_worker_count(), num_cpus::get());
  }

  #[test]
  fn test_zero_workers_rejected() {
    let config = PoolConfig::new("zero").worker_count(0);
    assert!(matches!(config.validate(), Err(PoolError::InvalidWorkerCount(0))));
  }

  #[test]
  fn test_thread_names() {
    let config = PoolConfig::new("render");
    assert_eq!(config.worker_thread_name(2), "render-worker-2");
    let config = config.thread_name_prefix("gfx").stack_size(1 << 20).worker_count(4);
    assert_eq!(config.worker_thread_name(0), "gfx-worker-0");
    assert_eq!(config.stack_size, Some(1 << 20));
    assert_eq!(config.resolved_worker_count(), 4);
  }
}
