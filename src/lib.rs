//! A fixed-size thread pool that runs submitted closures in priority order,
//! with cancellable result handles and a draining shutdown.

mod config;
mod error;
mod handle;
mod manager;
mod notifier;
pub mod stopwatch;
mod task;
mod task_queue;
pub mod tracker;

pub use config::PoolConfig;
pub use error::{InstrumentError, PoolError};
pub use handle::TaskHandle;
pub use manager::PriorityPoolManager;
pub use notifier::{TaskCompletionInfo, TaskCompletionStatus};
pub use task::{Outcome, TaskFailure, TaskPriority, TaskState};
