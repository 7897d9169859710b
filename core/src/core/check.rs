// rowflow/src/core/check.rs

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
  Ok,
  Warning,
  Error,
}

/// One finding of a pre-flight check of a step's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
  pub status: CheckStatus,
  pub step_name: String,
  pub message: String,
}

impl CheckResult {
  pub fn ok(step_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(CheckStatus::Ok, step_name, message)
  }

  pub fn warning(step_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(CheckStatus::Warning, step_name, message)
  }

  pub fn error(step_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(CheckStatus::Error, step_name, message)
  }

  fn new(status: CheckStatus, step_name: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      status,
      step_name: step_name.into(),
      message: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.status == CheckStatus::Error
  }
}

impl fmt::Display for CheckResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:?}] {}: {}", self.status, self.step_name, self.message)
  }
}
