// rowflow/src/core/control.rs

//! Signals for driving the step loop and the states a step copy or a run ends in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one `process_row` iteration of the step runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
  /// More work may follow; call again.
  Continue,
  /// Input is exhausted (or the source has no more rows). Outputs are marked done.
  Done,
}

/// Lifecycle of one step copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
  Created,
  Initialized,
  Running,
  /// All input processed and outputs marked done.
  Done,
  /// The copy hit an unrecoverable error (or its `init` failed).
  Failed,
  /// The copy stopped because the run was cancelled, not because of its own error.
  Cancelled,
}

impl StepState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, StepState::Done | StepState::Failed | StepState::Cancelled)
  }
}

impl fmt::Display for StepState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      StepState::Created => "CREATED",
      StepState::Initialized => "INITIALIZED",
      StepState::Running => "RUNNING",
      StepState::Done => "DONE",
      StepState::Failed => "FAILED",
      StepState::Cancelled => "CANCELLED",
    };
    f.write_str(label)
  }
}

/// Terminal state of a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
  /// Every step finished. Rows may still have been rejected to error handling.
  Success,
  /// At least one step could not continue.
  Failed,
  /// The run was stopped on request before finishing.
  Cancelled,
}

impl fmt::Display for RunState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      RunState::Success => "SUCCESS",
      RunState::Failed => "FAILED",
      RunState::Cancelled => "CANCELLED",
    };
    f.write_str(label)
  }
}
