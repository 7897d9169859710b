// rowflow/src/runtime/io.rs

//! Reading rows from the input row sets of a step copy and routing emitted rows
//! to its output row sets.

use crate::error::RowSetError;
use crate::row::{Row, RowMeta};
use crate::rowset::{InputSignal, RowSet};
use crate::runtime::control::RunControl;
use crate::trans::meta::Distribution;
use std::sync::Arc;

/// The input side of one step copy.
///
/// With several inputs, rows are read from the current row set until it runs
/// dry, then from the next one. Finished row sets drop out of the rotation.
#[derive(Debug)]
pub struct InputGate {
  inputs: Vec<Arc<RowSet>>,
  signal: Arc<InputSignal>,
  current: usize,
}

impl InputGate {
  pub fn new(inputs: Vec<Arc<RowSet>>, signal: Arc<InputSignal>) -> Self {
    Self {
      inputs,
      signal,
      current: 0,
    }
  }

  /// No input row sets at all.
  pub fn is_empty(&self) -> bool {
    self.inputs.is_empty()
  }

  /// Next row from any input; `Ok(None)` once every input is done and drained.
  pub fn get_row(&mut self, control: &RunControl) -> Result<Option<(Arc<RowMeta>, Row)>, RowSetError> {
    if self.inputs.len() == 1 {
      if control.is_cancelled() {
        return Err(RowSetError::Cancelled);
      }
      let row = self.inputs[0].get()?;
      if row.is_none() {
        self.inputs.clear();
      }
      return Ok(row);
    }

    loop {
      if control.is_cancelled() {
        return Err(RowSetError::Cancelled);
      }
      // Read the generation before looking at the queues so a put racing
      // with the scan below still wakes us.
      let seen = self.signal.current();

      for offset in 0..self.inputs.len() {
        let index = (self.current + offset) % self.inputs.len();
        if let Some(entry) = self.inputs[index].try_get() {
          self.current = index;
          return Ok(Some(entry));
        }
      }

      let before = self.inputs.len();
      self.inputs.retain(|rs| !rs.is_finished());
      if self.inputs.is_empty() {
        return Ok(None);
      }
      if self.inputs.len() != before {
        self.current = 0;
        continue;
      }

      self.signal.wait_for_change(seen);
    }
  }
}

/// Output row sets of one hop, as seen from one producer copy.
#[derive(Debug)]
pub struct OutputHop {
  target_step: String,
  distribution: Distribution,
  row_sets: Vec<Arc<RowSet>>,
  next: usize,
}

impl OutputHop {
  pub fn new(target_step: impl Into<String>, distribution: Distribution, row_sets: Vec<Arc<RowSet>>) -> Self {
    Self {
      target_step: target_step.into(),
      distribution,
      row_sets,
      next: 0,
    }
  }

  pub fn target_step(&self) -> &str {
    &self.target_step
  }

  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.row_sets
  }

  fn targets_for_next_row(&mut self) -> &[Arc<RowSet>] {
    match self.distribution {
      _ if self.row_sets.len() <= 1 => &self.row_sets,
      Distribution::CopyToAll => &self.row_sets,
      Distribution::RoundRobin => {
        let index = self.next % self.row_sets.len();
        self.next = self.next.wrapping_add(1);
        &self.row_sets[index..=index]
      }
    }
  }
}

/// Fans emitted rows out over all output hops of a step copy.
#[derive(Debug, Default)]
pub struct OutputRouter {
  hops: Vec<OutputHop>,
  scratch: Vec<Arc<RowSet>>,
}

impl OutputRouter {
  pub fn new(hops: Vec<OutputHop>) -> Self {
    Self {
      hops,
      scratch: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.hops.iter().all(|h| h.row_sets.is_empty())
  }

  pub fn hops(&self) -> &[OutputHop] {
    &self.hops
  }

  /// Emits one row to every hop: to all targets, or to the next one in turn.
  ///
  /// With several target row sets the call first waits until every one of them
  /// has room and only then puts the row, so a cancellation never leaves the
  /// row in some targets but not in others.
  pub fn emit(&mut self, meta: &Arc<RowMeta>, row: Row) -> Result<(), RowSetError> {
    self.scratch.clear();
    for hop in &mut self.hops {
      self.scratch.extend(hop.targets_for_next_row().iter().cloned());
    }

    match self.scratch.len() {
      0 => Ok(()),
      1 => self.scratch[0].put(meta.clone(), row),
      _ => {
        for row_set in &self.scratch {
          row_set.wait_for_room()?;
        }
        for row_set in &self.scratch {
          row_set.put(meta.clone(), row.clone())?;
        }
        Ok(())
      }
    }
  }

  /// Signals end-of-stream on every output row set.
  pub fn set_done(&self) {
    for row_set in self.hops.iter().flat_map(|h| h.row_sets.iter()) {
      row_set.set_done();
    }
  }
}
