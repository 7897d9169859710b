// rowflow/examples/basic_pipeline.rs

use rowflow::{EngineResult, HopMeta, StepDefinition, StepRegistry, Trans, TransMeta, Variables};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

fn main() -> EngineResult<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Pipeline Example ---");

  // A literal grid, tagged with a constant and passed through two copies of a dummy step.
  let meta = TransMeta::new("basic")
    .with_step(
      StepDefinition::new("cities", "data_grid")
        .with_setting("fields", json!([{"name": "city", "type": "string"}, {"name": "population", "type": "integer"}]))
        .with_setting("rows", json!([["Lyon", 522000], ["Graz", 291000], ["Turku", 201000]])),
    )
    .with_step(
      StepDefinition::new("tag", "add_constants")
        .with_setting("constants", json!([{"name": "load_date", "type": "date", "value": "${LOAD_DATE}"}])),
    )
    .with_step(StepDefinition::new("pass", "dummy").with_copies(2))
    .with_step(StepDefinition::new("out", "row_collector"))
    .with_hop(HopMeta::new("cities", "tag"))
    .with_hop(HopMeta::new("tag", "pass"))
    .with_hop(HopMeta::new("pass", "out"));

  let trans = Trans::new(meta, Arc::new(StepRegistry::with_builtins()))
    .with_variables(Variables::new().with("LOAD_DATE", "2024-05-01"));

  for finding in trans.check()? {
    info!("check: {}", finding);
  }

  let report = trans.run()?;
  info!("Run finished: {}", report.state);
  println!("{}", report.to_json()?);
  Ok(())
}
