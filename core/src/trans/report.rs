// rowflow/src/trans/report.rs

use crate::core::control::RunState;
use crate::error::EngineResult;
use crate::runtime::stats::{serialize_millis, StepReport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one pipeline run, available once every step thread was joined.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id: Uuid,
  pub trans_name: String,
  pub state: RunState,
  /// First unrecoverable failure, if any.
  pub failure: Option<String>,
  pub started_at: DateTime<Utc>,
  #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
  pub elapsed: Duration,
  /// One entry per step copy.
  pub steps: Vec<StepReport>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.state == RunState::Success
  }

  /// Reports of every copy of `step_name`.
  pub fn step(&self, step_name: &str) -> impl Iterator<Item = &StepReport> + '_ {
    let step_name = step_name.to_string();
    self.steps.iter().filter(move |r| r.step_name == step_name)
  }

  pub fn rows_read(&self, step_name: &str) -> u64 {
    self.step(step_name).map(|r| r.rows_read).sum()
  }

  pub fn rows_written(&self, step_name: &str) -> u64 {
    self.step(step_name).map(|r| r.rows_written).sum()
  }

  pub fn rows_rejected(&self, step_name: &str) -> u64 {
    self.step(step_name).map(|r| r.rows_rejected).sum()
  }

  pub fn errors(&self, step_name: &str) -> u64 {
    self.step(step_name).map(|r| r.errors).sum()
  }

  /// Rows routed to error handling across the whole run.
  pub fn total_rejected(&self) -> u64 {
    self.steps.iter().map(|r| r.rows_rejected).sum()
  }

  pub fn total_errors(&self) -> u64 {
    self.steps.iter().map(|r| r.errors).sum()
  }

  pub fn to_json(&self) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}
