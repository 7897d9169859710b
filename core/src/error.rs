// rowflow/src/error.rs

//! Error types for the engine.
//!
//! `EngineError` covers orchestration problems (bad metadata, unknown step types,
//! configuration loading). `StepError` is what step code returns from its
//! lifecycle methods and carries the three tiers the runtime dispatches on:
//! configuration errors, per-row errors and unrecoverable errors.

use crate::row::Row;
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Unknown step type '{step_type}' for step '{step_name}'")]
  UnknownStepType { step_name: String, step_type: String },

  #[error("Invalid pipeline '{trans_name}': {message}")]
  InvalidPipeline { trans_name: String, message: String },

  #[error("Configuration error for step '{step_name}': {source}")]
  StepConfiguration {
    step_name: String,
    #[source]
    source: StepError,
  },

  #[error("Pipeline metadata could not be read: {0}")]
  Metadata(#[from] serde_json::Error),

  #[error("Engine configuration could not be loaded: {0}")]
  Config(#[from] config::ConfigError),

  #[error(transparent)]
  DuplicateField(#[from] DuplicateFieldError),

  #[error("Internal engine error: {0}")]
  Internal(String),
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;

/// Raised when a row layout would contain the same field name twice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Duplicate field name '{0}' in row layout")]
pub struct DuplicateFieldError(pub String);

/// Failure of a blocking row set operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowSetError {
  /// A producer tried to add a row after signalling end-of-stream.
  #[error("Row set '{row_set}' is done; no more rows can be added")]
  PutAfterDone { row_set: String },

  /// The pipeline was cancelled while the caller was blocked (or about to block).
  #[error("Row set operation interrupted by cancellation")]
  Cancelled,
}

/// A single row that could not be processed.
///
/// When error handling is enabled for the step, the runtime turns this into an
/// error record on the error channel and moves on to the next row.
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct RowError {
  pub code: String,
  pub message: String,
  /// Name of the offending field, when one can be singled out.
  pub field: Option<String>,
  /// Number of distinct problems found in the row.
  pub nr_errors: u64,
  /// Row to report instead of the input row. Sources use it, since they have no input row.
  pub row: Option<Row>,
  #[source]
  pub source: Option<AnyhowError>,
}

impl RowError {
  pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      code: code.into(),
      message: message.into(),
      field: None,
      nr_errors: 1,
      row: None,
      source: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }

  pub fn with_nr_errors(mut self, nr_errors: u64) -> Self {
    self.nr_errors = nr_errors;
    self
  }

  pub fn with_row(mut self, row: Row) -> Self {
    self.row = Some(row);
    self
  }

  pub fn with_source(mut self, source: impl Into<AnyhowError>) -> Self {
    self.source = Some(source.into());
    self
  }
}

#[derive(Debug, Error)]
pub enum StepError {
  /// Missing or invalid settings, or a required field reference that does not
  /// resolve against the input layout. Always fatal.
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// One row could not be transformed. Recoverable through the error channel.
  #[error("Row error: {0}")]
  Row(#[from] RowError),

  /// Anything the step cannot continue after.
  #[error("Unrecoverable step error: {source}")]
  Fatal {
    #[source]
    source: AnyhowError,
  },

  #[error(transparent)]
  RowSet(#[from] RowSetError),
}

impl StepError {
  pub fn config(message: impl Into<String>) -> Self {
    StepError::Config { message: message.into() }
  }

  pub fn row(code: impl Into<String>, message: impl Into<String>) -> Self {
    StepError::Row(RowError::new(code, message))
  }

  pub fn fatal(source: impl Into<AnyhowError>) -> Self {
    StepError::Fatal { source: source.into() }
  }

  /// True when the error only means the run is being cancelled.
  pub fn is_cancellation(&self) -> bool {
    matches!(self, StepError::RowSet(RowSetError::Cancelled))
  }
}

// Step implementations use `?` on arbitrary errors; those are unrecoverable
// unless the step explicitly wraps them in a `RowError`.
impl From<AnyhowError> for StepError {
  fn from(err: AnyhowError) -> Self {
    if err.downcast_ref::<StepError>().is_some() {
      return match err.downcast::<StepError>() {
        Ok(step_err) => step_err,
        Err(err) => StepError::Fatal { source: err },
      };
    }
    StepError::Fatal { source: err }
  }
}

impl From<DuplicateFieldError> for StepError {
  fn from(err: DuplicateFieldError) -> Self {
    StepError::Config { message: err.to_string() }
  }
}
