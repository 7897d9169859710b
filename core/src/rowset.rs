// rowflow/src/rowset.rs

//! Bounded, blocking row queues connecting one producer copy to one consumer copy.
//!
//! A `RowSet` is the only thing step threads share. `put` blocks while the queue
//! holds `capacity` rows, `get` blocks while it is empty and not yet done. Both
//! return `RowSetError::Cancelled` as soon as the row set is interrupted, which is
//! how pipeline-wide cancellation reaches a blocked thread.

use crate::error::RowSetError;
use crate::row::{Row, RowMeta};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{event, Level};

/// Identifies the hop end points a row set was allocated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowSetId {
  pub from_step: String,
  pub from_copy: usize,
  pub to_step: String,
  pub to_copy: usize,
}

impl RowSetId {
  pub fn new(from_step: impl Into<String>, from_copy: usize, to_step: impl Into<String>, to_copy: usize) -> Self {
    Self {
      from_step: from_step.into(),
      from_copy,
      to_step: to_step.into(),
      to_copy,
    }
  }
}

impl fmt::Display for RowSetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}.{} - {}.{}",
      self.from_step, self.from_copy, self.to_step, self.to_copy
    )
  }
}

/// Wake-up signal shared by all input row sets of one consumer copy.
///
/// Every put, `set_done` and interrupt on an attached row set bumps the
/// generation, so a consumer reading from several inputs can sleep until
/// anything changes without polling.
#[derive(Debug, Default)]
pub struct InputSignal {
  generation: Mutex<u64>,
  changed: Condvar,
}

impl InputSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> u64 {
    *self.generation.lock()
  }

  pub fn notify(&self) {
    let mut generation = self.generation.lock();
    *generation = generation.wrapping_add(1);
    self.changed.notify_all();
  }

  /// Blocks until the generation differs from `seen`.
  pub fn wait_for_change(&self, seen: u64) {
    let mut generation = self.generation.lock();
    while *generation == seen {
      self.changed.wait(&mut generation);
    }
  }
}

struct RowSetState {
  buffer: VecDeque<(Arc<RowMeta>, Row)>,
  done: bool,
  interrupted: bool,
}

pub struct RowSet {
  id: RowSetId,
  capacity: usize,
  state: Mutex<RowSetState>,
  not_empty: Condvar,
  not_full: Condvar,
  signal: Option<Arc<InputSignal>>,
}

impl RowSet {
  /// Creates a row set holding at most `capacity` rows (at least one).
  pub fn new(id: RowSetId, capacity: usize) -> Self {
    Self::build(id, capacity, None)
  }

  pub(crate) fn with_signal(id: RowSetId, capacity: usize, signal: Arc<InputSignal>) -> Self {
    Self::build(id, capacity, Some(signal))
  }

  fn build(id: RowSetId, capacity: usize, signal: Option<Arc<InputSignal>>) -> Self {
    let capacity = capacity.max(1);
    Self {
      id,
      capacity,
      state: Mutex::new(RowSetState {
        buffer: VecDeque::with_capacity(capacity.min(1024)),
        done: false,
        interrupted: false,
      }),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
      signal,
    }
  }

  pub fn id(&self) -> &RowSetId {
    &self.id
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Adds a row, blocking while the row set is full.
  ///
  /// Fails with `PutAfterDone` if the producer already signalled end-of-stream and
  /// with `Cancelled` if the row set was interrupted.
  pub fn put(&self, meta: Arc<RowMeta>, row: Row) -> Result<(), RowSetError> {
    {
      let mut state = self.state.lock();
      self.wait_for_room_locked(&mut state)?;
      state.buffer.push_back((meta, row));
    }
    self.not_empty.notify_one();
    self.notify_signal();
    Ok(())
  }

  /// Blocks until at least one more row fits.
  ///
  /// A row set has a single producer, so room observed here is still there when
  /// that producer calls `put`.
  pub fn wait_for_room(&self) -> Result<(), RowSetError> {
    let mut state = self.state.lock();
    self.wait_for_room_locked(&mut state)
  }

  fn wait_for_room_locked(&self, state: &mut parking_lot::MutexGuard<'_, RowSetState>) -> Result<(), RowSetError> {
    loop {
      if state.interrupted {
        return Err(RowSetError::Cancelled);
      }
      if state.done {
        event!(Level::ERROR, row_set = %self.id, "Attempt to put a row after the row set was marked done.");
        return Err(RowSetError::PutAfterDone {
          row_set: self.id.to_string(),
        });
      }
      if state.buffer.len() < self.capacity {
        return Ok(());
      }
      self.not_full.wait(state);
    }
  }

  /// Takes the next row, blocking while the row set is empty and not done.
  ///
  /// Returns `Ok(None)` once the row set is done and drained; it keeps returning
  /// `Ok(None)` after that.
  pub fn get(&self) -> Result<Option<(Arc<RowMeta>, Row)>, RowSetError> {
    let mut state = self.state.lock();
    loop {
      if state.interrupted {
        return Err(RowSetError::Cancelled);
      }
      if let Some(entry) = state.buffer.pop_front() {
        drop(state);
        self.not_full.notify_one();
        return Ok(Some(entry));
      }
      if state.done {
        return Ok(None);
      }
      self.not_empty.wait(&mut state);
    }
  }

  /// Takes the next row if one is buffered.
  pub fn try_get(&self) -> Option<(Arc<RowMeta>, Row)> {
    let entry = self.state.lock().buffer.pop_front();
    if entry.is_some() {
      self.not_full.notify_one();
    }
    entry
  }

  /// Marks end-of-stream. Idempotent; wakes every waiter.
  pub fn set_done(&self) {
    {
      let mut state = self.state.lock();
      if state.done {
        return;
      }
      state.done = true;
    }
    self.not_empty.notify_all();
    self.not_full.notify_all();
    self.notify_signal();
  }

  /// Makes every current and future blocking call fail with `Cancelled`.
  pub fn interrupt(&self) {
    self.state.lock().interrupted = true;
    self.not_empty.notify_all();
    self.not_full.notify_all();
    self.notify_signal();
  }

  pub fn is_done(&self) -> bool {
    self.state.lock().done
  }

  pub fn is_empty(&self) -> bool {
    self.state.lock().buffer.is_empty()
  }

  /// Done and drained: no row will ever come out of this row set again.
  pub fn is_finished(&self) -> bool {
    let state = self.state.lock();
    state.done && state.buffer.is_empty()
  }

  pub fn is_interrupted(&self) -> bool {
    self.state.lock().interrupted
  }

  pub fn len(&self) -> usize {
    self.state.lock().buffer.len()
  }

  fn notify_signal(&self) {
    if let Some(signal) = &self.signal {
      signal.notify();
    }
  }
}

impl fmt::Debug for RowSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RowSet")
      .field("id", &self.id)
      .field("capacity", &self.capacity)
      .field("len", &self.len())
      .field("done", &self.is_done())
      .finish()
  }
}
