// rowflow/src/trans/meta.rs

//! Pipeline metadata: steps, hops and per-step error handling, plus the graph
//! validation that runs before anything is instantiated.

use crate::core::settings::{Setting, Settings};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Default capacity of a row set, in rows.
pub const DEFAULT_ROW_SET_CAPACITY: usize = 10_000;

/// How a hop spreads rows over the copies of its target step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
  /// Each row goes to exactly one target copy, strictly in turn by row index.
  #[default]
  RoundRobin,
  /// Each row goes to every target copy.
  CopyToAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopMeta {
  pub from: String,
  pub to: String,
  #[serde(default)]
  pub distribution: Distribution,
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl HopMeta {
  pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
    Self {
      from: from.into(),
      to: to.into(),
      distribution: Distribution::RoundRobin,
      enabled: true,
    }
  }

  pub fn copy_to_all(mut self) -> Self {
    self.distribution = Distribution::CopyToAll;
    self
  }

  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }
}

/// Error handling of one step: where rejected rows go, how they are tagged and
/// how many may be rejected before the step gives up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepErrorMeta {
  pub target_step: String,
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_code_field")]
  pub code_field: String,
  #[serde(default = "default_description_field")]
  pub description_field: String,
  #[serde(default = "default_field_name_field")]
  pub field_name_field: String,
  /// Optional extra field carrying the number of problems found in the row.
  #[serde(default)]
  pub nr_errors_field: Option<String>,
  /// Fail the step once more than this many rows were rejected.
  #[serde(default)]
  pub max_errors: Option<u64>,
  /// Fail the step once more than this share (in percent) of the rows read was rejected.
  #[serde(default)]
  pub max_percent_errors: Option<u8>,
  /// Rows to read before the percentage limit applies.
  #[serde(default)]
  pub min_percent_rows: u64,
}

impl StepErrorMeta {
  pub fn new(target_step: impl Into<String>) -> Self {
    Self {
      target_step: target_step.into(),
      enabled: true,
      code_field: default_code_field(),
      description_field: default_description_field(),
      field_name_field: default_field_name_field(),
      nr_errors_field: None,
      max_errors: None,
      max_percent_errors: None,
      min_percent_rows: 0,
    }
  }

  pub fn with_max_errors(mut self, max_errors: u64) -> Self {
    self.max_errors = Some(max_errors);
    self
  }

  pub fn with_max_percent_errors(mut self, percent: u8, min_rows: u64) -> Self {
    self.max_percent_errors = Some(percent);
    self.min_percent_rows = min_rows;
    self
  }

  pub fn with_nr_errors_field(mut self, name: impl Into<String>) -> Self {
    self.nr_errors_field = Some(name.into());
    self
  }
}

fn default_true() -> bool {
  true
}

fn default_copies() -> usize {
  1
}

fn default_code_field() -> String {
  "error_code".to_string()
}

fn default_description_field() -> String {
  "error_description".to_string()
}

fn default_field_name_field() -> String {
  "error_field".to_string()
}

/// One node of the pipeline graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
  pub name: String,
  pub step_type: String,
  #[serde(default)]
  pub settings: Settings,
  #[serde(default = "default_copies")]
  pub copies: usize,
  #[serde(default)]
  pub error_handling: Option<StepErrorMeta>,
}

impl StepDefinition {
  pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      step_type: step_type.into(),
      settings: Settings::new(),
      copies: 1,
      error_handling: None,
    }
  }

  pub fn with_setting(mut self, name: impl Into<String>, setting: impl Into<Setting>) -> Self {
    self.settings.set(name, setting);
    self
  }

  pub fn with_settings(mut self, settings: Settings) -> Self {
    self.settings = settings;
    self
  }

  pub fn with_copies(mut self, copies: usize) -> Self {
    self.copies = copies;
    self
  }

  pub fn with_error_handling(mut self, error_handling: StepErrorMeta) -> Self {
    self.error_handling = Some(error_handling);
    self
  }

  /// Error handling settings if error handling is switched on.
  pub fn active_error_handling(&self) -> Option<&StepErrorMeta> {
    self.error_handling.as_ref().filter(|e| e.enabled)
  }
}

/// A pipeline definition ("transformation").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransMeta {
  pub name: String,
  /// Row set capacity for this pipeline; the engine default applies when unset.
  #[serde(default)]
  pub row_set_capacity: Option<usize>,
  #[serde(default)]
  pub steps: Vec<StepDefinition>,
  #[serde(default)]
  pub hops: Vec<HopMeta>,
}

impl TransMeta {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      row_set_capacity: None,
      steps: Vec::new(),
      hops: Vec::new(),
    }
  }

  pub fn from_json(json: &str) -> EngineResult<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn to_json(&self) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn with_step(mut self, step: StepDefinition) -> Self {
    self.steps.push(step);
    self
  }

  pub fn with_hop(mut self, hop: HopMeta) -> Self {
    self.hops.push(hop);
    self
  }

  pub fn with_row_set_capacity(mut self, capacity: usize) -> Self {
    self.row_set_capacity = Some(capacity);
    self
  }

  pub fn add_step(&mut self, step: StepDefinition) {
    self.steps.push(step);
  }

  pub fn add_hop(&mut self, hop: HopMeta) {
    self.hops.push(hop);
  }

  pub fn step(&self, name: &str) -> Option<&StepDefinition> {
    self.steps.iter().find(|s| s.name == name)
  }

  pub fn enabled_hops(&self) -> impl Iterator<Item = &HopMeta> {
    self.hops.iter().filter(|h| h.enabled)
  }

  /// Steps feeding `name` through normal hops.
  pub fn previous_steps(&self, name: &str) -> Vec<&StepDefinition> {
    self
      .enabled_hops()
      .filter(|h| h.to == name)
      .filter_map(|h| self.step(&h.from))
      .collect()
  }

  /// Steps whose error channel points at `name`.
  pub fn error_sources(&self, name: &str) -> Vec<&StepDefinition> {
    self
      .steps
      .iter()
      .filter(|s| s.active_error_handling().is_some_and(|e| e.target_step == name))
      .collect()
  }

  /// True when the step has neither normal nor error input.
  pub fn is_input_less(&self, name: &str) -> bool {
    self.previous_steps(name).is_empty() && self.error_sources(name).is_empty()
  }

  fn invalid(&self, message: impl Into<String>) -> EngineError {
    EngineError::InvalidPipeline {
      trans_name: self.name.clone(),
      message: message.into(),
    }
  }

  /// Structural validation of the graph.
  pub fn validate(&self) -> EngineResult<()> {
    if self.row_set_capacity == Some(0) {
      return Err(self.invalid("row set capacity must be at least 1"));
    }

    let mut names = HashSet::new();
    for step in &self.steps {
      if step.name.trim().is_empty() {
        return Err(self.invalid("a step has an empty name"));
      }
      if !names.insert(step.name.as_str()) {
        return Err(self.invalid(format!("duplicate step name '{}'", step.name)));
      }
      if step.copies == 0 {
        return Err(self.invalid(format!("step '{}' must run at least one copy", step.name)));
      }
    }

    let mut pairs = HashSet::new();
    for hop in self.enabled_hops() {
      for end in [&hop.from, &hop.to] {
        if !names.contains(end.as_str()) {
          return Err(EngineError::StepNotFound { step_name: end.clone() });
        }
      }
      if hop.from == hop.to {
        return Err(self.invalid(format!("step '{}' has a hop to itself", hop.from)));
      }
      if !pairs.insert((hop.from.as_str(), hop.to.as_str())) {
        return Err(self.invalid(format!("duplicate hop '{}' -> '{}'", hop.from, hop.to)));
      }
    }

    for step in &self.steps {
      if let Some(error_meta) = step.active_error_handling() {
        let target = error_meta.target_step.as_str();
        if !names.contains(target) {
          return Err(EngineError::StepNotFound {
            step_name: target.to_string(),
          });
        }
        if target == step.name {
          return Err(self.invalid(format!("step '{}' sends its errors to itself", step.name)));
        }
        if pairs.contains(&(step.name.as_str(), target)) {
          return Err(self.invalid(format!(
            "step '{}' has both a normal hop and an error hop to '{}'",
            step.name, target
          )));
        }
        let mut error_fields = HashSet::new();
        let field_names = [
          Some(&error_meta.code_field),
          Some(&error_meta.description_field),
          Some(&error_meta.field_name_field),
          error_meta.nr_errors_field.as_ref(),
        ];
        for field in field_names.into_iter().flatten() {
          if !error_fields.insert(field.as_str()) {
            return Err(self.invalid(format!(
              "error field name '{}' of step '{}' is used twice",
              field, step.name
            )));
          }
        }
        if error_meta.max_percent_errors.is_some_and(|p| p > 100) {
          return Err(self.invalid(format!(
            "maximum error percentage of step '{}' exceeds 100",
            step.name
          )));
        }
      }
    }

    self.topological_order().map(|_| ())
  }

  /// Step names ordered so that every step comes after the steps feeding it
  /// (normal and error hops). Fails on cycles.
  pub fn topological_order(&self) -> EngineResult<Vec<&str>> {
    let mut indegree: HashMap<&str, usize> = self.steps.iter().map(|s| (s.name.as_str(), 0)).collect();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

    let error_edges = self
      .steps
      .iter()
      .filter_map(|s| s.active_error_handling().map(|e| (s.name.as_str(), e.target_step.as_str())));
    let normal_edges = self.enabled_hops().map(|h| (h.from.as_str(), h.to.as_str()));

    for (from, to) in normal_edges.chain(error_edges) {
      edges.entry(from).or_default().push(to);
      if let Some(d) = indegree.get_mut(to) {
        *d += 1;
      }
    }

    let mut queue: VecDeque<&str> = self
      .steps
      .iter()
      .map(|s| s.name.as_str())
      .filter(|n| indegree.get(n) == Some(&0))
      .collect();
    let mut order = Vec::with_capacity(self.steps.len());

    while let Some(name) = queue.pop_front() {
      order.push(name);
      for next in edges.get(name).into_iter().flatten() {
        if let Some(d) = indegree.get_mut(next) {
          *d -= 1;
          if *d == 0 {
            queue.push_back(next);
          }
        }
      }
    }

    if order.len() != self.steps.len() {
      let looping: Vec<&str> = self
        .steps
        .iter()
        .map(|s| s.name.as_str())
        .filter(|n| !order.contains(n))
        .collect();
      return Err(self.invalid(format!("the hops form a loop through: {}", looping.join(", "))));
    }
    Ok(order)
  }
}
