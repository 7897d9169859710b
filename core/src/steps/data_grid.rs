// rowflow/src/steps/data_grid.rs

//! `data_grid`: a source emitting a literal set of rows.
//!
//! Settings: `fields` (list of `{"name", "type"}`) and `rows` (list of lists of
//! JSON scalars, converted to the field types).

use crate::core::context::StepContext;
use crate::core::settings::Settings;
use crate::core::step::{SourceStep, StepInstance, StepMeta};
use crate::error::StepError;
use crate::row::{Row, RowMeta, Value, ValueMeta, ValueType};
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub const STEP_TYPE: &str = "data_grid";

#[derive(Debug, Clone)]
pub struct DataGridMeta {
  layout: RowMeta,
  rows: Arc<[Row]>,
}

impl DataGridMeta {
  pub fn new(layout: RowMeta, rows: Vec<Row>) -> Result<Self, StepError> {
    if let Some(bad) = rows.iter().position(|r| r.len() != layout.len()) {
      return Err(StepError::config(format!(
        "grid row {} has {} values, expected {}",
        bad + 1,
        rows[bad].len(),
        layout.len()
      )));
    }
    Ok(Self {
      layout,
      rows: rows.into(),
    })
  }

  pub fn from_settings(step_name: &str, settings: &Settings) -> Result<Self, StepError> {
    let fields: Vec<ValueMeta> = settings
      .parse("fields")?
      .ok_or_else(|| StepError::config(format!("step '{}' needs a 'fields' setting", step_name)))?;
    let layout = RowMeta::from_fields(fields)?;
    let raw_rows: Vec<Vec<JsonValue>> = settings.parse("rows")?.unwrap_or_default();

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (row_index, raw) in raw_rows.iter().enumerate() {
      if raw.len() != layout.len() {
        return Err(StepError::config(format!(
          "grid row {} of step '{}' has {} values, expected {}",
          row_index + 1,
          step_name,
          raw.len(),
          layout.len()
        )));
      }
      let values = raw
        .iter()
        .zip(layout.fields())
        .map(|(cell, field)| {
          json_to_value(cell, field.value_type).map_err(|e| {
            StepError::config(format!("grid row {}, field '{}': {}", row_index + 1, field.name, e))
          })
        })
        .collect::<Result<Vec<_>, _>>()?;
      rows.push(Row::new(values));
    }
    Self::new(layout, rows)
  }

  pub fn layout(&self) -> &RowMeta {
    &self.layout
  }

  pub fn row_count(&self) -> usize {
    self.rows.len()
  }
}

fn json_to_value(cell: &JsonValue, value_type: ValueType) -> Result<Value, String> {
  match (cell, value_type) {
    (JsonValue::Null, _) => Ok(Value::Null),
    (JsonValue::String(s), t) => t.parse(s),
    (JsonValue::Bool(b), ValueType::Boolean) => Ok(Value::Boolean(*b)),
    (JsonValue::Number(n), ValueType::Integer) => n.as_i64().map(Value::Integer).ok_or_else(|| format!("{} is not an integer", n)),
    (JsonValue::Number(n), ValueType::Number) => n.as_f64().map(Value::Number).ok_or_else(|| format!("{} is not a number", n)),
    (other, t) => t.parse(&other.to_string()),
  }
}

impl StepMeta for DataGridMeta {
  fn step_type(&self) -> &str {
    STEP_TYPE
  }

  fn output_fields(&self, _step_name: &str, _input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(self.layout.clone())
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::source(DataGridStep {
      layout: self.layout.clone(),
      rows: self.rows.clone(),
      next: 0,
    })
  }
}

struct DataGridStep {
  layout: RowMeta,
  rows: Arc<[Row]>,
  next: usize,
}

impl SourceStep for DataGridStep {
  fn open(&mut self, _ctx: &StepContext) -> Result<RowMeta, StepError> {
    Ok(self.layout.clone())
  }

  fn next_row(&mut self, _ctx: &StepContext) -> Result<Option<Row>, StepError> {
    let row = self.rows.get(self.next).cloned();
    self.next += 1;
    Ok(row)
  }
}
