use crate::error::PoolError;
use crate::task::{ScheduledWork, TaskPriority};

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use parking_lot::{Condvar, Mutex};

/// One pending task in the heap, keyed by `(priority, seq)`.
///
/// `seq` is assigned under the queue lock in insertion order, so tasks of
/// equal priority are dequeued FIFO.
pub(crate) struct QueueEntry {
  priority: TaskPriority,
  seq: u64,
  work: Box<dyn ScheduledWork>,
}

impl fmt::Debug for QueueEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueEntry")
      .field("task_id", &self.work.task_id())
      .field("priority", &self.priority)
      .field("seq", &self.seq)
      .finish()
  }
}

impl PartialEq for QueueEntry {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority && self.seq == other.seq
  }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for QueueEntry {
  // `BinaryHeap` is a max-heap; reverse so the smallest (priority, seq) is on top.
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .priority
      .cmp(&self.priority)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

#[derive(Debug, Default)]
struct QueueInner {
  heap: BinaryHeap<QueueEntry>,
  next_seq: u64,
  closed: bool,
}

/// The shared work queue: a mutex-guarded binary heap plus a condvar that
/// idle workers park on.
///
/// Closing the queue rejects further pushes; `pop` keeps handing out the
/// remaining entries and reports the stop condition only once the queue is
/// both closed and empty, so every accepted task is drained before workers exit.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
  inner: Mutex<QueueInner>,
  available: Condvar,
}

impl TaskQueue {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Inserts a task and wakes at most one idle worker.
  pub(crate) fn push(&self, priority: TaskPriority, work: Box<dyn ScheduledWork>) -> Result<(), PoolError> {
    let mut inner = self.inner.lock();
    if inner.closed {
      return Err(PoolError::PoolShuttingDown);
    }
    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.heap.push(QueueEntry { priority, seq, work });
    drop(inner);

    self.available.notify_one();
    Ok(())
  }

  /// Blocks until an entry is available and removes the minimum one.
  ///
  /// Returns `None` once the queue is closed and fully drained: the worker's
  /// stop signal.
  pub(crate) fn pop(&self) -> Option<Box<dyn ScheduledWork>> {
    let mut inner = self.inner.lock();
    loop {
      if let Some(entry) = inner.heap.pop() {
        return Some(entry.work);
      }
      if inner.closed {
        return None;
      }
      self.available.wait(&mut inner);
    }
  }

  /// Stops accepting new entries and wakes every parked worker.
  /// Returns `false` if the queue was already closed.
  pub(crate) fn close(&self) -> bool {
    let mut inner = self.inner.lock();
    let newly_closed = !inner.closed;
    inner.closed = true;
    drop(inner);

    self.available.notify_all();
    newly_closed
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.inner.lock().closed
  }

  /// Number of entries still in the heap, including cancelled tasks that no
  /// worker has discarded yet.
  pub(crate) fn len(&self) -> usize {
    self.inner.lock().heap.len()
  }
}
