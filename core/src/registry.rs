// rowflow/src/registry.rs

//! Defines `StepRegistry`, the explicit table mapping step type identifiers to
//! the factories that build their `StepMeta` from settings.
//!
//! There is no global registry: an orchestrator is handed the registry it should
//! resolve step types against.

use crate::core::settings::Settings;
use crate::core::step::StepMeta;
use crate::error::{EngineError, EngineResult, StepError};
use crate::trans::meta::StepDefinition;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Builds the immutable step configuration for one step of a pipeline.
pub trait StepFactory: Send + Sync {
  fn create(&self, step_name: &str, settings: &Settings) -> Result<Arc<dyn StepMeta>, StepError>;
}

impl<F> StepFactory for F
where
  F: Fn(&str, &Settings) -> Result<Arc<dyn StepMeta>, StepError> + Send + Sync,
{
  fn create(&self, step_name: &str, settings: &Settings) -> Result<Arc<dyn StepMeta>, StepError> {
    self(step_name, settings)
  }
}

/// Registry of step types.
#[derive(Default)]
pub struct StepRegistry {
  factories: RwLock<HashMap<String, Arc<dyn StepFactory>>>,
}

impl StepRegistry {
  /// Creates an empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a registry holding the built-in step types.
  pub fn with_builtins() -> Self {
    let registry = Self::new();
    crate::steps::register_builtins(&registry);
    registry
  }

  /// Registers (or replaces) the factory for `step_type`.
  pub fn register<F>(&self, step_type: impl Into<String>, factory: F)
  where
    F: StepFactory + 'static,
  {
    let step_type = step_type.into();
    event!(Level::DEBUG, step_type = %step_type, "Registering step type.");
    if self.factories.write().insert(step_type.clone(), Arc::new(factory)).is_some() {
      event!(Level::WARN, step_type = %step_type, "Step type was already registered; factory replaced.");
    }
  }

  /// Registers a ready-made configuration under `step_type`; every step of that
  /// type shares it, whatever its settings.
  pub fn register_meta(&self, step_type: impl Into<String>, meta: Arc<dyn StepMeta>) {
    self.register(step_type, move |_: &str, _: &Settings| -> Result<Arc<dyn StepMeta>, StepError> {
      Ok(meta.clone())
    });
  }

  pub fn contains(&self, step_type: &str) -> bool {
    self.factories.read().contains_key(step_type)
  }

  /// Registered step type identifiers, sorted.
  pub fn step_types(&self) -> Vec<String> {
    let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
    types.sort();
    types
  }

  /// Builds the configuration object for one step definition.
  #[instrument(
    name = "StepRegistry::create_meta",
    skip_all,
    fields(step_name = %definition.name, step_type = %definition.step_type),
    err(Display)
  )]
  pub fn create_meta(&self, definition: &StepDefinition) -> EngineResult<Arc<dyn StepMeta>> {
    let factory = self
      .factories
      .read()
      .get(&definition.step_type)
      .cloned()
      .ok_or_else(|| {
        event!(Level::ERROR, "No factory registered for step type.");
        EngineError::UnknownStepType {
          step_name: definition.name.clone(),
          step_type: definition.step_type.clone(),
        }
      })?;

    factory
      .create(&definition.name, &definition.settings)
      .map_err(|source| EngineError::StepConfiguration {
        step_name: definition.name.clone(),
        source,
      })
  }
}

impl std::fmt::Debug for StepRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepRegistry").field("step_types", &self.step_types()).finish()
  }
}
