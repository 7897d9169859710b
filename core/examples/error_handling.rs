// rowflow/examples/error_handling.rs

use rowflow::steps::{DataGridMeta, RowCollectorMeta};
use rowflow::{
  EngineResult, FieldBinder, HopMeta, Row, RowBuffer, RowError, RowMeta, StepContext, StepDefinition, StepError,
  StepErrorMeta, StepInstance, StepMeta, StepRegistry, Trans, TransMeta, TransformStep, Value, ValueMeta, ValueType,
};
use std::sync::Arc;
use tracing::info;

/// Rejects rows whose `email` has no '@'.
#[derive(Debug)]
struct ValidateEmailMeta;

impl StepMeta for ValidateEmailMeta {
  fn step_type(&self) -> &str {
    "validate_email"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(ValidateEmail { email: 0 })
  }
}

struct ValidateEmail {
  email: usize,
}

impl TransformStep for ValidateEmail {
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    self.email = FieldBinder::new(ctx.step_name(), input).required("email")?;
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    match row[self.email].as_str() {
      Some(address) if address.contains('@') => {
        out.push(row.clone());
        Ok(())
      }
      _ => Err(RowError::new("EMAIL01", "not an e-mail address").with_field("email").into()),
    }
  }
}

fn main() -> EngineResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Error Handling Example ---");

  let layout = RowMeta::from_fields([
    ValueMeta::new("id", ValueType::Integer),
    ValueMeta::new("email", ValueType::String),
  ])?;
  let rows = vec![
    Row::new(vec![Value::Integer(1), Value::from("ada@example.com")]),
    Row::new(vec![Value::Integer(2), Value::from("not-an-address")]),
    Row::new(vec![Value::Integer(3), Value::from("grace@example.com")]),
  ];

  let registry = StepRegistry::with_builtins();
  let grid = DataGridMeta::new(layout, rows).map_err(|source| rowflow::EngineError::StepConfiguration {
    step_name: "contacts".to_string(),
    source,
  })?;
  registry.register_meta("contacts", Arc::new(grid));
  registry.register_meta("validate_email", Arc::new(ValidateEmailMeta));
  let valid = RowCollectorMeta::new();
  let rejected = RowCollectorMeta::new();
  registry.register_meta("valid", Arc::new(valid.clone()));
  registry.register_meta("rejected", Arc::new(rejected.clone()));

  let meta = TransMeta::new("contacts")
    .with_step(StepDefinition::new("contacts", "contacts"))
    .with_step(StepDefinition::new("validate", "validate_email").with_error_handling(StepErrorMeta::new("rejected")))
    .with_step(StepDefinition::new("valid", "valid"))
    .with_step(StepDefinition::new("rejected", "rejected"))
    .with_hop(HopMeta::new("contacts", "validate"))
    .with_hop(HopMeta::new("validate", "valid"));

  let report = Trans::new(meta, Arc::new(registry)).run()?;

  info!("Run state: {} ({} row(s) rejected)", report.state, report.total_rejected());
  for row in valid.rows() {
    info!("valid: {}", row[1]);
  }
  for row in rejected.rows() {
    info!("rejected: {} [{}] {}", row[1], row[2], row[3]);
  }
  Ok(())
}
