// rowflow/src/config.rs

//! Engine-wide settings: built-in defaults, then an optional `rowflow.toml`,
//! then `ROWFLOW_*` environment variables.

use crate::error::EngineResult;
use crate::trans::meta::DEFAULT_ROW_SET_CAPACITY;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Row set capacity used by pipelines that do not set their own.
  pub row_set_capacity: usize,
  /// Initialise all step copies concurrently before starting them.
  pub init_in_parallel: bool,
  /// Prepended to step thread names (`<prefix><step>.<copy>`).
  pub thread_name_prefix: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      row_set_capacity: DEFAULT_ROW_SET_CAPACITY,
      init_in_parallel: true,
      thread_name_prefix: String::new(),
    }
  }
}

impl EngineConfig {
  /// Loads `rowflow.toml` from the working directory (if present) and the environment.
  pub fn load() -> EngineResult<Self> {
    Self::load_from("rowflow.toml")
  }

  pub fn load_from<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
    let config = Config::builder()
      .add_source(File::from(path.as_ref()).required(false))
      .add_source(
        Environment::with_prefix("ROWFLOW")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;
    let loaded: EngineConfig = config.try_deserialize()?;
    Ok(loaded.normalized())
  }

  pub fn with_row_set_capacity(mut self, capacity: usize) -> Self {
    self.row_set_capacity = capacity;
    self
  }

  pub fn with_init_in_parallel(mut self, parallel: bool) -> Self {
    self.init_in_parallel = parallel;
    self
  }

  pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.thread_name_prefix = prefix.into();
    self
  }

  fn normalized(mut self) -> Self {
    if self.row_set_capacity == 0 {
      self.row_set_capacity = DEFAULT_ROW_SET_CAPACITY;
    }
    self
  }
}
