// rowflow/src/core/context.rs

//! Defines `StepContext`, the view of the running pipeline a step copy gets in
//! every lifecycle call.

use crate::core::variables::Variables;
use crate::error::StepError;
use crate::runtime::control::RunControl;
use std::sync::Arc;

/// Identity of a step copy plus the run-wide services it may use.
///
/// Owned by the copy's runner. Step code never sees other copies' state or the
/// row sets; rows come in and go out through the runtime.
#[derive(Debug, Clone)]
pub struct StepContext {
  step_name: Arc<str>,
  copy: usize,
  copies: usize,
  variables: Arc<Variables>,
  control: Arc<RunControl>,
}

impl StepContext {
  pub fn new(step_name: &str, copy: usize, copies: usize, variables: Arc<Variables>, control: Arc<RunControl>) -> Self {
    Self {
      step_name: Arc::from(step_name),
      copy,
      copies,
      variables,
      control,
    }
  }

  /// Context for driving a step outside of a pipeline, e.g. in unit tests.
  pub fn standalone(step_name: &str) -> Self {
    Self::new(step_name, 0, 1, Arc::new(Variables::new()), Arc::new(RunControl::new()))
  }

  pub fn step_name(&self) -> &str {
    &self.step_name
  }

  /// Zero-based index of this copy among the step's parallel copies.
  pub fn copy(&self) -> usize {
    self.copy
  }

  pub fn copies(&self) -> usize {
    self.copies
  }

  pub fn variables(&self) -> &Variables {
    &self.variables
  }

  /// Resolves placeholders; unresolved ones are left as they are.
  pub fn substitute(&self, text: &str) -> String {
    self.variables.substitute(text)
  }

  /// Resolves placeholders of a required setting; any unresolved placeholder is a configuration error.
  pub fn substitute_required(&self, setting: &str, text: &str) -> Result<String, StepError> {
    self.variables.substitute_strict(text).map_err(|e| {
      StepError::config(format!(
        "setting '{}' of step '{}': {}",
        setting, self.step_name, e
      ))
    })
  }

  /// The run is being cancelled; long-running work should return promptly.
  pub fn is_stopped(&self) -> bool {
    self.control.is_cancelled()
  }

  /// Sources should stop producing new rows.
  pub fn is_safe_stopped(&self) -> bool {
    self.control.is_safe_stopped()
  }

  pub(crate) fn control(&self) -> &Arc<RunControl> {
    &self.control
  }
}
