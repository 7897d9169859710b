// rowflow/src/steps/row_collector.rs

//! `row_collector`: keeps every row it receives in memory and passes it on.
//!
//! All copies of a collector share the same store, so a test or a caller can
//! read the rows back once the run has finished.

use crate::core::context::StepContext;
use crate::core::step::{RowBuffer, StepInstance, StepMeta, TransformStep};
use crate::error::StepError;
use crate::row::{Row, RowMeta};
use parking_lot::Mutex;
use std::sync::Arc;

pub const STEP_TYPE: &str = "row_collector";

#[derive(Debug, Default)]
struct Collected {
  layout: Option<RowMeta>,
  rows: Vec<Row>,
  binds: usize,
}

/// Cloning shares the store.
#[derive(Debug, Clone, Default)]
pub struct RowCollectorMeta {
  store: Arc<Mutex<Collected>>,
}

impl RowCollectorMeta {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rows received so far, in arrival order.
  pub fn rows(&self) -> Vec<Row> {
    self.store.lock().rows.clone()
  }

  pub fn len(&self) -> usize {
    self.store.lock().rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Layout of the rows, once a copy has bound.
  pub fn layout(&self) -> Option<RowMeta> {
    self.store.lock().layout.clone()
  }

  /// Number of times a copy bound to its input.
  pub fn binds(&self) -> usize {
    self.store.lock().binds
  }
}

impl StepMeta for RowCollectorMeta {
  fn step_type(&self) -> &str {
    STEP_TYPE
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(RowCollectorStep {
      store: self.store.clone(),
    })
  }
}

struct RowCollectorStep {
  store: Arc<Mutex<Collected>>,
}

impl TransformStep for RowCollectorStep {
  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    let mut store = self.store.lock();
    store.binds += 1;
    if store.layout.is_none() {
      store.layout = Some(input.clone());
    }
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    self.store.lock().rows.push(row.clone());
    out.push(row.clone());
    Ok(())
  }
}
