// rowflow/src/runtime/stats.rs

use crate::core::control::StepState;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Counters of one step copy. Only the copy's own thread writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
  pub lines_read: u64,
  pub lines_written: u64,
  pub lines_rejected: u64,
  pub errors: u64,
}

/// Final state and counters of one step copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
  pub step_name: String,
  pub copy: usize,
  pub state: StepState,
  pub rows_read: u64,
  pub rows_written: u64,
  pub rows_rejected: u64,
  pub errors: u64,
  #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
  pub elapsed: Duration,
}

impl StepReport {
  pub(crate) fn new(step_name: &str, copy: usize, state: StepState, stats: StepStats, elapsed: Duration) -> Self {
    Self {
      step_name: step_name.to_string(),
      copy,
      state,
      rows_read: stats.lines_read,
      rows_written: stats.lines_written,
      rows_rejected: stats.lines_rejected,
      errors: stats.errors,
      elapsed,
    }
  }

  pub fn elapsed_ms(&self) -> u128 {
    self.elapsed.as_millis()
  }

  pub fn is_failed(&self) -> bool {
    self.state == StepState::Failed
  }
}

pub(crate) fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}
