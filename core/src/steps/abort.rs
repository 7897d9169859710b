// rowflow/src/steps/abort.rs

//! `abort`: passes rows through until more than `row_threshold` rows were read,
//! then fails, which cancels the whole run.

use crate::core::context::StepContext;
use crate::core::settings::Settings;
use crate::core::step::{RowBuffer, StepInstance, StepMeta, TransformStep};
use crate::error::StepError;
use crate::row::{Row, RowMeta};
use tracing::{event, Level};

pub const STEP_TYPE: &str = "abort";

#[derive(Debug, Clone, Default)]
pub struct AbortMeta {
  row_threshold: u64,
  message: Option<String>,
}

impl AbortMeta {
  /// Aborts on the first row read after `row_threshold` rows.
  pub fn new(row_threshold: u64) -> Self {
    Self {
      row_threshold,
      message: None,
    }
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn from_settings(_step_name: &str, settings: &Settings) -> Result<Self, StepError> {
    let row_threshold = match settings.int("row_threshold")? {
      Some(n) if n < 0 => return Err(StepError::config("'row_threshold' must not be negative")),
      Some(n) => n as u64,
      None => 0,
    };
    Ok(Self {
      row_threshold,
      message: settings.text("message"),
    })
  }
}

impl StepMeta for AbortMeta {
  fn step_type(&self) -> &str {
    STEP_TYPE
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(AbortStep {
      meta: self.clone(),
      message: String::new(),
      seen: 0,
    })
  }
}

struct AbortStep {
  meta: AbortMeta,
  message: String,
  seen: u64,
}

impl TransformStep for AbortStep {
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    self.message = match &self.meta.message {
      Some(message) => ctx.substitute(message),
      None => format!("row threshold of {} reached", self.meta.row_threshold),
    };
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    self.seen += 1;
    if self.seen > self.meta.row_threshold {
      event!(Level::ERROR, rows = self.seen, "Aborting the run: {}", self.message);
      return Err(StepError::fatal(anyhow::anyhow!("aborted: {}", self.message)));
    }
    out.push(row.clone());
    Ok(())
  }
}
