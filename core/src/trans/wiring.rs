// rowflow/src/trans/wiring.rs

//! Allocation of row sets for every hop of a pipeline.
//!
//! For a hop between a producer with `n` copies and a consumer with `m` copies,
//! equal copy counts above one pair copy `i` with copy `i`; every other
//! combination gets one row set per (producer copy, consumer copy) pair.

use crate::rowset::{InputSignal, RowSet, RowSetId};
use crate::runtime::io::OutputHop;
use crate::trans::meta::{Distribution, TransMeta};
use std::collections::HashMap;
use std::sync::Arc;

/// Row sets and hops of one step copy.
#[derive(Debug, Default)]
pub(crate) struct CopyWiring {
  pub signal: Arc<InputSignal>,
  pub inputs: Vec<Arc<RowSet>>,
  pub outputs: Vec<OutputHop>,
  pub error_outputs: Vec<OutputHop>,
}

#[derive(Debug, Default)]
pub(crate) struct Wiring {
  copies: HashMap<(String, usize), CopyWiring>,
  row_sets: Vec<Arc<RowSet>>,
}

struct Edge<'a> {
  from: &'a str,
  from_copies: usize,
  to: &'a str,
  to_copies: usize,
  distribution: Distribution,
  is_error: bool,
}

impl Wiring {
  pub fn build(meta: &TransMeta, capacity: usize) -> Self {
    let copies_of = |name: &str| meta.step(name).map_or(1, |s| s.copies.max(1));

    let normal = meta.enabled_hops().map(|hop| Edge {
      from: &hop.from,
      from_copies: copies_of(&hop.from),
      to: &hop.to,
      to_copies: copies_of(&hop.to),
      distribution: hop.distribution,
      is_error: false,
    });
    let errors = meta.steps.iter().filter_map(|step| {
      step.active_error_handling().map(|e| Edge {
        from: &step.name,
        from_copies: step.copies.max(1),
        to: &e.target_step,
        to_copies: copies_of(&e.target_step),
        distribution: Distribution::RoundRobin,
        is_error: true,
      })
    });
    let edges: Vec<Edge<'_>> = normal.chain(errors).collect();

    let mut wiring = Wiring::default();
    for step in &meta.steps {
      for copy in 0..step.copies.max(1) {
        wiring.copies.insert((step.name.clone(), copy), CopyWiring::default());
      }
    }
    for edge in &edges {
      wiring.connect(edge, capacity);
    }
    wiring
  }

  fn connect(&mut self, edge: &Edge<'_>, capacity: usize) {
    let paired = edge.from_copies == edge.to_copies && edge.from_copies > 1;
    for from_copy in 0..edge.from_copies {
      let to_copies: Vec<usize> = if paired {
        vec![from_copy]
      } else {
        (0..edge.to_copies).collect()
      };

      let mut targets = Vec::with_capacity(to_copies.len());
      for to_copy in to_copies {
        let consumer = self.copy_mut(edge.to, to_copy);
        let row_set = Arc::new(RowSet::with_signal(
          RowSetId::new(edge.from, from_copy, edge.to, to_copy),
          capacity,
          consumer.signal.clone(),
        ));
        consumer.inputs.push(row_set.clone());
        self.row_sets.push(row_set.clone());
        targets.push(row_set);
      }

      let hop = OutputHop::new(edge.to, edge.distribution, targets);
      let producer = self.copy_mut(edge.from, from_copy);
      if edge.is_error {
        producer.error_outputs.push(hop);
      } else {
        producer.outputs.push(hop);
      }
    }
  }

  fn copy_mut(&mut self, step: &str, copy: usize) -> &mut CopyWiring {
    self.copies.entry((step.to_string(), copy)).or_default()
  }

  pub fn row_sets(&self) -> &[Arc<RowSet>] {
    &self.row_sets
  }

  pub fn signals(&self) -> Vec<Arc<InputSignal>> {
    self.copies.values().map(|c| c.signal.clone()).collect()
  }

  /// Hands the wiring of one copy over to its runner.
  pub fn take(&mut self, step: &str, copy: usize) -> CopyWiring {
    self.copies.remove(&(step.to_string(), copy)).unwrap_or_default()
  }
}
