// rowflow/src/runtime/control.rs

//! Pipeline-wide cancellation shared by every step copy of one run.

use crate::rowset::{InputSignal, RowSet};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{event, Level};

/// First unrecoverable failure of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureCause {
  pub step_name: String,
  pub copy: usize,
  pub message: String,
}

/// Shared between the orchestrator and all step threads of a run.
///
/// Cancelling interrupts every registered row set and input signal, so threads
/// blocked in `put`/`get` wake up immediately instead of draining their backlog.
#[derive(Debug, Default)]
pub struct RunControl {
  cancelled: AtomicBool,
  safe_stop: AtomicBool,
  stopped_early: AtomicBool,
  failure: Mutex<Option<FailureCause>>,
  row_sets: RwLock<Vec<Arc<RowSet>>>,
  signals: RwLock<Vec<Arc<InputSignal>>>,
}

impl RunControl {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn register(&self, row_sets: impl IntoIterator<Item = Arc<RowSet>>, signals: impl IntoIterator<Item = Arc<InputSignal>>) {
    self.row_sets.write().extend(row_sets);
    self.signals.write().extend(signals);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::Acquire)
  }

  pub fn is_safe_stopped(&self) -> bool {
    self.safe_stop.load(Ordering::Acquire)
  }

  /// True once a source gave up producing because of a safe stop.
  pub fn has_stopped_early(&self) -> bool {
    self.stopped_early.load(Ordering::Acquire)
  }

  pub(crate) fn record_early_stop(&self) {
    self.stopped_early.store(true, Ordering::Release);
  }

  pub fn has_failed(&self) -> bool {
    self.failure.lock().is_some()
  }

  pub fn failure(&self) -> Option<FailureCause> {
    self.failure.lock().clone()
  }

  /// Immediate stop requested from outside the pipeline.
  pub fn stop(&self) {
    event!(Level::INFO, "Stop requested; cancelling all step copies.");
    self.cancel();
  }

  /// Ask sources to stop producing; the rest of the pipeline drains normally.
  pub fn stop_safely(&self) {
    event!(Level::INFO, "Safe stop requested; sources will stop producing rows.");
    self.safe_stop.store(true, Ordering::Release);
    for signal in self.signals.read().iter() {
      signal.notify();
    }
  }

  /// Records a step failure (the first one wins) and cancels the run.
  pub fn fail(&self, step_name: &str, copy: usize, message: impl Into<String>) {
    {
      let mut failure = self.failure.lock();
      if failure.is_none() {
        *failure = Some(FailureCause {
          step_name: step_name.to_string(),
          copy,
          message: message.into(),
        });
      }
    }
    self.cancel();
  }

  fn cancel(&self) {
    if self.cancelled.swap(true, Ordering::AcqRel) {
      return;
    }
    let row_sets = self.row_sets.read();
    event!(Level::DEBUG, row_sets = row_sets.len(), "Interrupting row sets.");
    for row_set in row_sets.iter() {
      row_set.interrupt();
    }
    for signal in self.signals.read().iter() {
      signal.notify();
    }
  }
}
