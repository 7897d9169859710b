// rowflow/src/steps/add_constants.rs

//! `add_constants`: appends constant fields to every row.
//!
//! Setting `constants` is a list of `{"name", "type", "value", "required"}`.
//! Values may contain `${VAR}` / `%%VAR%%` placeholders; they are resolved and
//! converted once, when the step binds. An unresolved placeholder stays literal
//! unless the constant is `required`.

use crate::core::check::CheckResult;
use crate::core::context::StepContext;
use crate::core::settings::Settings;
use crate::core::step::{RowBuffer, StepInstance, StepMeta, TransformStep};
use crate::error::StepError;
use crate::row::{Row, RowMeta, Value, ValueMeta, ValueType};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{event, Level};

pub const STEP_TYPE: &str = "add_constants";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Constant {
  pub name: String,
  #[serde(rename = "type", default = "default_type")]
  pub value_type: ValueType,
  #[serde(default)]
  pub value: String,
  #[serde(default)]
  pub required: bool,
}

fn default_type() -> ValueType {
  ValueType::String
}

impl Constant {
  pub fn new(name: impl Into<String>, value_type: ValueType, value: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      value_type,
      value: value.into(),
      required: false,
    }
  }

  /// Every placeholder in the value must resolve.
  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }
}

#[derive(Debug, Clone)]
pub struct AddConstantsMeta {
  constants: Arc<[Constant]>,
}

impl AddConstantsMeta {
  pub fn new(constants: Vec<Constant>) -> Result<Self, StepError> {
    if constants.is_empty() {
      return Err(StepError::config("at least one constant is required"));
    }
    Ok(Self {
      constants: constants.into(),
    })
  }

  pub fn from_settings(step_name: &str, settings: &Settings) -> Result<Self, StepError> {
    let constants: Vec<Constant> = settings
      .parse("constants")?
      .ok_or_else(|| StepError::config(format!("step '{}' needs a 'constants' setting", step_name)))?;
    Self::new(constants)
  }

  fn appended_fields(&self, step_name: &str) -> impl Iterator<Item = ValueMeta> + '_ {
    let origin = step_name.to_string();
    self
      .constants
      .iter()
      .map(move |c| ValueMeta::new(c.name.as_str(), c.value_type).with_origin(origin.as_str()))
  }
}

impl StepMeta for AddConstantsMeta {
  fn step_type(&self) -> &str {
    STEP_TYPE
  }

  fn output_fields(&self, step_name: &str, input: &RowMeta) -> Result<RowMeta, StepError> {
    let mut output = input.clone();
    for field in self.appended_fields(step_name) {
      output.push(field)?;
    }
    Ok(output)
  }

  fn check(&self, step_name: &str, input: Option<&RowMeta>) -> Vec<CheckResult> {
    let mut results = Vec::new();
    match input {
      None => results.push(CheckResult::warning(step_name, "step receives no input rows")),
      Some(input) => {
        for constant in self.constants.iter() {
          if input.index_of(&constant.name).is_some() {
            results.push(CheckResult::error(
              step_name,
              format!("constant '{}' clashes with an input field", constant.name),
            ));
          }
        }
      }
    }
    for constant in self.constants.iter() {
      if !constant.value.contains("${") && !constant.value.contains("%%") {
        if let Err(e) = constant.value_type.parse(&constant.value) {
          results.push(CheckResult::error(step_name, format!("constant '{}': {}", constant.name, e)));
        }
      }
    }
    if results.is_empty() {
      results.push(CheckResult::ok(step_name, "constants are valid"));
    }
    results
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(AddConstantsStep {
      meta: self.clone(),
      values: Vec::new(),
    })
  }
}

struct AddConstantsStep {
  meta: AddConstantsMeta,
  values: Vec<Value>,
}

impl TransformStep for AddConstantsStep {
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    let output = self.meta.output_fields(ctx.step_name(), input)?;
    self.values = self
      .meta
      .constants
      .iter()
      .map(|c| {
        let text = if c.required {
          ctx.substitute_required(&c.name, &c.value)?
        } else {
          ctx.substitute(&c.value)
        };
        c.value_type
          .parse(&text)
          .map_err(|e| StepError::config(format!("constant '{}': {}", c.name, e)))
      })
      .collect::<Result<_, _>>()?;
    event!(Level::DEBUG, constants = self.values.len(), "Constant values resolved.");
    Ok(output)
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    out.push(row.extended(self.values.iter().cloned()));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::variables::Variables;
  use crate::runtime::control::RunControl;

  #[test]
  fn constants_are_substituted_once_and_appended() {
    let meta = AddConstantsMeta::new(vec![
      Constant::new("region", ValueType::String, "${REGION}"),
      Constant::new("batch", ValueType::Integer, "7"),
    ])
    .unwrap();
    let ctx = StepContext::new(
      "tag",
      0,
      1,
      Arc::new(Variables::new().with("REGION", "eu")),
      Arc::new(RunControl::new()),
    );
    let input = RowMeta::from_fields([ValueMeta::new("id", ValueType::Integer)]).unwrap();

    let StepInstance::Transform(mut step) = meta.create_step() else {
      panic!("add_constants must be a transform");
    };
    let output = step.bind(&ctx, &input).unwrap();
    assert_eq!(output.names().collect::<Vec<_>>(), vec!["id", "region", "batch"]);

    let mut out = RowBuffer::new();
    step.process_row(&ctx, &Row::new(vec![Value::Integer(1)]), &mut out).unwrap();
    assert_eq!(out.rows()[0].values(), &[Value::Integer(1), Value::from("eu"), Value::Integer(7)]);
  }

  #[test]
  fn unresolved_variable_stays_literal() {
    let meta = AddConstantsMeta::new(vec![Constant::new("note", ValueType::String, "cost ${UNSET_VAR}")]).unwrap();
    let StepInstance::Transform(mut step) = meta.create_step() else {
      panic!("add_constants must be a transform");
    };
    let ctx = StepContext::standalone("tag");
    step.bind(&ctx, &RowMeta::new()).unwrap();

    let mut out = RowBuffer::new();
    step.process_row(&ctx, &Row::new(Vec::new()), &mut out).unwrap();
    assert_eq!(out.rows()[0].values(), &[Value::from("cost ${UNSET_VAR}")]);
  }

  #[test]
  fn unresolved_variable_in_required_constant_is_a_config_error() {
    let meta =
      AddConstantsMeta::new(vec![Constant::new("region", ValueType::String, "${MISSING}").required()]).unwrap();
    let StepInstance::Transform(mut step) = meta.create_step() else {
      panic!("add_constants must be a transform");
    };
    let err = step.bind(&StepContext::standalone("tag"), &RowMeta::new()).unwrap_err();
    assert!(matches!(err, StepError::Config { .. }));
  }

  #[test]
  fn required_flag_is_read_from_settings() {
    let settings = Settings::new().with(
      "constants",
      serde_json::json!([{"name": "region", "value": "${MISSING}", "required": true}, {"name": "note", "value": "x"}]),
    );
    let meta = AddConstantsMeta::from_settings("tag", &settings).unwrap();
    assert!(meta.constants[0].required);
    assert!(!meta.constants[1].required);
  }

  #[test]
  fn check_flags_clashing_names() {
    let meta = AddConstantsMeta::new(vec![Constant::new("id", ValueType::Integer, "1")]).unwrap();
    let input = RowMeta::from_fields([ValueMeta::new("id", ValueType::Integer)]).unwrap();
    let results = meta.check("tag", Some(&input));
    assert!(results.iter().any(CheckResult::is_error));
  }
}
