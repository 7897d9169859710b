// rowflow/src/steps/dummy.rs

//! `dummy`: passes every row through unchanged.

use crate::core::context::StepContext;
use crate::core::step::{RowBuffer, StepInstance, StepMeta, TransformStep};
use crate::error::StepError;
use crate::row::{Row, RowMeta};

pub const STEP_TYPE: &str = "dummy";

#[derive(Debug, Clone, Copy, Default)]
pub struct DummyMeta;

impl StepMeta for DummyMeta {
  fn step_type(&self) -> &str {
    STEP_TYPE
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(DummyStep)
  }
}

struct DummyStep;

impl TransformStep for DummyStep {
  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    out.push(row.clone());
    Ok(())
  }
}
