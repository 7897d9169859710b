// rowflow/src/core/binding.rs

//! One-shot resolution of configured field references against an input layout.

use crate::error::StepError;
use crate::row::RowMeta;
use tracing::{event, Level};

/// Resolves field names to positions in the layout a step bound to.
///
/// A missing required field is a configuration error; a missing optional field
/// resolves to `None`, which disables whatever feature needed it.
pub struct FieldBinder<'a> {
  step_name: &'a str,
  meta: &'a RowMeta,
}

impl<'a> FieldBinder<'a> {
  pub fn new(step_name: &'a str, meta: &'a RowMeta) -> Self {
    Self { step_name, meta }
  }

  pub fn required(&self, field: &str) -> Result<usize, StepError> {
    self.meta.index_of(field).ok_or_else(|| {
      event!(Level::ERROR, step_name = %self.step_name, %field, "Required field not found in input layout.");
      StepError::config(format!(
        "field '{}' required by step '{}' is not present in the input row",
        field, self.step_name
      ))
    })
  }

  pub fn required_all<S: AsRef<str>>(&self, fields: &[S]) -> Result<Vec<usize>, StepError> {
    fields.iter().map(|f| self.required(f.as_ref())).collect()
  }

  pub fn optional(&self, field: Option<&str>) -> Option<usize> {
    let field = field?;
    let position = self.meta.index_of(field);
    if position.is_none() {
      event!(Level::DEBUG, step_name = %self.step_name, %field, "Optional field not found; feature disabled.");
    }
    position
  }
}
