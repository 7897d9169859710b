// rowflow/src/core/step.rs

//! The capability interface every step kind implements.
//!
//! A step kind provides a [`StepMeta`]: immutable configuration shared by all
//! parallel copies, able to describe its output layout, pre-flight check itself
//! and create per-copy runtime state. That state is either a [`SourceStep`]
//! (generates rows) or a [`TransformStep`] (consumes rows). The runtime owns the
//! loop around them: reading input, binding on the first row, routing output and
//! error rows, and releasing resources.

use crate::core::check::CheckResult;
use crate::core::context::StepContext;
use crate::error::StepError;
use crate::row::{Row, RowMeta};

/// Immutable configuration of one step, shared read-only by all of its copies.
pub trait StepMeta: Send + Sync + std::fmt::Debug {
  /// Registry identifier of the step kind.
  fn step_type(&self) -> &str;

  /// Layout of the rows this step emits when fed rows of layout `input`.
  /// Sources receive an empty layout.
  fn output_fields(&self, _step_name: &str, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  /// Pre-flight validation against the expected input layout (`None` for steps without input).
  fn check(&self, _step_name: &str, _input: Option<&RowMeta>) -> Vec<CheckResult> {
    Vec::new()
  }

  /// Creates the private runtime state of one copy.
  fn create_step(&self) -> StepInstance;
}

/// Per-copy state of a step that consumes rows.
pub trait TransformStep: Send {
  /// Validates static configuration and opens long-lived resources.
  fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
    Ok(())
  }

  /// Called exactly once, with the layout of the first row. Resolves field
  /// references, performs one-time setup and returns the output layout.
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError>;

  /// Transforms one row into zero or more output rows.
  ///
  /// Rows pushed to `out` are only forwarded if this returns `Ok`.
  fn process_row(&mut self, ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError>;

  /// Called once at end-of-stream, only if at least one row was bound.
  fn finish(&mut self, _ctx: &StepContext, _out: &mut RowBuffer) -> Result<(), StepError> {
    Ok(())
  }

  /// Releases resources. Called on every exit path.
  fn dispose(&mut self, _ctx: &StepContext) {}
}

/// Per-copy state of a step without input.
pub trait SourceStep: Send {
  fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
    Ok(())
  }

  /// One-time setup before the first row; returns the output layout.
  fn open(&mut self, ctx: &StepContext) -> Result<RowMeta, StepError>;

  /// Next generated row, or `None` once the source is exhausted.
  fn next_row(&mut self, ctx: &StepContext) -> Result<Option<Row>, StepError>;

  fn dispose(&mut self, _ctx: &StepContext) {}
}

/// Runtime state of one step copy.
pub enum StepInstance {
  Source(Box<dyn SourceStep>),
  Transform(Box<dyn TransformStep>),
}

impl StepInstance {
  pub fn source(step: impl SourceStep + 'static) -> Self {
    StepInstance::Source(Box::new(step))
  }

  pub fn transform(step: impl TransformStep + 'static) -> Self {
    StepInstance::Transform(Box::new(step))
  }

  pub fn is_source(&self) -> bool {
    matches!(self, StepInstance::Source(_))
  }

  pub(crate) fn init(&mut self, ctx: &StepContext) -> Result<(), StepError> {
    match self {
      StepInstance::Source(step) => step.init(ctx),
      StepInstance::Transform(step) => step.init(ctx),
    }
  }

  pub(crate) fn dispose(&mut self, ctx: &StepContext) {
    match self {
      StepInstance::Source(step) => step.dispose(ctx),
      StepInstance::Transform(step) => step.dispose(ctx),
    }
  }
}

impl std::fmt::Debug for StepInstance {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StepInstance::Source(_) => f.write_str("StepInstance::Source"),
      StepInstance::Transform(_) => f.write_str("StepInstance::Transform"),
    }
  }
}

/// Output rows collected during one `process_row` call.
#[derive(Debug, Default)]
pub struct RowBuffer {
  rows: Vec<Row>,
}

impl RowBuffer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, row: Row) {
    self.rows.push(row);
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn rows(&self) -> &[Row] {
    &self.rows
  }

  pub(crate) fn clear(&mut self) {
    self.rows.clear();
  }

  pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Row> {
    self.rows.drain(..)
  }
}
