// rowflow/src/steps/mod.rs

//! Built-in step types.

pub mod abort;
pub mod add_constants;
pub mod data_grid;
pub mod dummy;
pub mod row_collector;

pub use abort::AbortMeta;
pub use add_constants::{AddConstantsMeta, Constant};
pub use data_grid::DataGridMeta;
pub use dummy::DummyMeta;
pub use row_collector::RowCollectorMeta;

use crate::core::settings::Settings;
use crate::core::step::StepMeta;
use crate::error::StepError;
use crate::registry::StepRegistry;
use std::sync::Arc;

type MetaResult = Result<Arc<dyn StepMeta>, StepError>;

/// Registers every built-in step type.
pub fn register_builtins(registry: &StepRegistry) {
  registry.register(data_grid::STEP_TYPE, |name: &str, settings: &Settings| -> MetaResult {
    Ok(Arc::new(DataGridMeta::from_settings(name, settings)?))
  });
  registry.register(dummy::STEP_TYPE, |_: &str, _: &Settings| -> MetaResult { Ok(Arc::new(DummyMeta)) });
  registry.register(add_constants::STEP_TYPE, |name: &str, settings: &Settings| -> MetaResult {
    Ok(Arc::new(AddConstantsMeta::from_settings(name, settings)?))
  });
  registry.register(abort::STEP_TYPE, |name: &str, settings: &Settings| -> MetaResult {
    Ok(Arc::new(AbortMeta::from_settings(name, settings)?))
  });
  registry.register(row_collector::STEP_TYPE, |_: &str, _: &Settings| -> MetaResult {
    Ok(Arc::new(RowCollectorMeta::new()))
  });
}
