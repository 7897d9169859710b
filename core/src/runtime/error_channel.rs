// rowflow/src/runtime/error_channel.rs

//! Routing of rejected rows to a step's error hop, and the rejection limits.

use crate::error::{DuplicateFieldError, RowError, StepError};
use crate::row::{Row, RowMeta, Value, ValueMeta, ValueType};
use crate::runtime::io::OutputRouter;
use crate::runtime::stats::StepStats;
use crate::trans::meta::StepErrorMeta;
use std::sync::Arc;
use tracing::{event, Level};

/// Layout of error rows: the input layout followed by the error fields.
pub fn error_layout(input: &RowMeta, settings: &StepErrorMeta) -> Result<RowMeta, DuplicateFieldError> {
  let mut layout = input.clone();
  layout.push(ValueMeta::new(settings.code_field.as_str(), ValueType::String))?;
  layout.push(ValueMeta::new(settings.description_field.as_str(), ValueType::String))?;
  layout.push(ValueMeta::new(settings.field_name_field.as_str(), ValueType::String))?;
  if let Some(nr_errors_field) = &settings.nr_errors_field {
    layout.push(ValueMeta::new(nr_errors_field.as_str(), ValueType::Integer))?;
  }
  Ok(layout)
}

/// A row that could not be processed, with its cause.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
  pub row: Row,
  pub meta: Arc<RowMeta>,
  pub code: String,
  pub description: String,
  pub field: Option<String>,
  pub nr_errors: u64,
}

impl ErrorRecord {
  pub fn new(row: Row, meta: Arc<RowMeta>, error: &RowError) -> Self {
    let description = match &error.source {
      Some(source) => format!("{}: {:#}", error.message, source),
      None => error.message.clone(),
    };
    Self {
      row,
      meta,
      code: error.code.clone(),
      description,
      field: error.field.clone(),
      nr_errors: error.nr_errors,
    }
  }

  /// The original values followed by the error fields.
  pub fn to_row(&self, settings: &StepErrorMeta) -> Row {
    let mut extra = vec![
      Value::from(self.code.as_str()),
      Value::from(self.description.as_str()),
      Value::from(self.field.clone()),
    ];
    if settings.nr_errors_field.is_some() {
      extra.push(Value::Integer(self.nr_errors as i64));
    }
    self.row.extended(extra)
  }
}

/// The error side of a step copy.
#[derive(Debug)]
pub struct ErrorChannel {
  settings: StepErrorMeta,
  router: OutputRouter,
  layout: Option<(Arc<RowMeta>, Arc<RowMeta>)>,
}

impl ErrorChannel {
  pub fn new(settings: StepErrorMeta, router: OutputRouter) -> Self {
    Self {
      settings,
      router,
      layout: None,
    }
  }

  pub fn settings(&self) -> &StepErrorMeta {
    &self.settings
  }

  fn layout_for(&mut self, input: &Arc<RowMeta>) -> Result<Arc<RowMeta>, StepError> {
    if let Some((cached_input, layout)) = &self.layout {
      if Arc::ptr_eq(cached_input, input) || cached_input.same_layout(input) {
        return Ok(layout.clone());
      }
    }
    let layout = Arc::new(error_layout(input, &self.settings)?);
    self.layout = Some((input.clone(), layout.clone()));
    Ok(layout)
  }

  /// Emits one error row and checks the rejection limits.
  ///
  /// `processed` is the number of rows the copy has handled so far, used for
  /// the percentage limit.
  pub fn reject(&mut self, record: ErrorRecord, stats: &mut StepStats, processed: u64) -> Result<(), StepError> {
    let layout = self.layout_for(&record.meta)?;
    let row = record.to_row(&self.settings);
    event!(
      Level::DEBUG,
      code = %record.code,
      field = ?record.field,
      target = %self.settings.target_step,
      "Routing row to error handling: {}", record.description
    );
    self.router.emit(&layout, row)?;
    stats.lines_rejected += 1;
    self.verify_limits(stats.lines_rejected, processed)
  }

  fn verify_limits(&self, rejected: u64, processed: u64) -> Result<(), StepError> {
    if let Some(max_errors) = self.settings.max_errors {
      if rejected > max_errors {
        return Err(StepError::fatal(anyhow::anyhow!(
          "too many rejected rows: {} exceeds the maximum of {}",
          rejected,
          max_errors
        )));
      }
    }

    if let Some(max_percent) = self.settings.max_percent_errors {
      if processed > 0 && processed >= self.settings.min_percent_rows {
        let percent = (rejected * 100).div_ceil(processed);
        if percent > u64::from(max_percent) {
          return Err(StepError::fatal(anyhow::anyhow!(
            "too many rejected rows: {}% of {} rows exceeds the maximum of {}%",
            percent,
            processed,
            max_percent
          )));
        }
      }
    }
    Ok(())
  }

  pub fn set_done(&self) {
    self.router.set_done();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rowset::{RowSet, RowSetId};
  use crate::runtime::io::OutputHop;
  use crate::trans::meta::Distribution;

  fn input() -> Arc<RowMeta> {
    Arc::new(RowMeta::from_fields([ValueMeta::new("email", ValueType::String)]).unwrap())
  }

  fn channel(settings: StepErrorMeta) -> (ErrorChannel, Arc<RowSet>) {
    let rs = Arc::new(RowSet::new(RowSetId::new("send", 0, "errors", 0), 100));
    let router = OutputRouter::new(vec![OutputHop::new("errors", Distribution::RoundRobin, vec![rs.clone()])]);
    (ErrorChannel::new(settings, router), rs)
  }

  #[test]
  fn error_rows_extend_the_input_row() {
    let (mut channel, rs) = channel(StepErrorMeta::new("errors").with_nr_errors_field("problems"));
    let error = RowError::new("MAIL01", "unreachable host").with_field("email").with_nr_errors(2);
    let record = ErrorRecord::new(Row::new(vec![Value::from("a@b.c")]), input(), &error);
    let mut stats = StepStats::default();

    channel.reject(record, &mut stats, 1).unwrap();

    let (meta, row) = rs.try_get().unwrap();
    assert_eq!(
      meta.names().collect::<Vec<_>>(),
      vec!["email", "error_code", "error_description", "error_field", "problems"]
    );
    assert_eq!(row[1], Value::from("MAIL01"));
    assert_eq!(row[2], Value::from("unreachable host"));
    assert_eq!(row[3], Value::from("email"));
    assert_eq!(row[4], Value::Integer(2));
    assert_eq!(stats.lines_rejected, 1);
  }

  #[test]
  fn clashing_error_field_is_a_config_error() {
    let mut settings = StepErrorMeta::new("errors");
    settings.code_field = "email".to_string();
    let (mut channel, _rs) = channel(settings);
    let record = ErrorRecord::new(Row::new(vec![Value::Null]), input(), &RowError::new("E", "x"));
    let err = channel.reject(record, &mut StepStats::default(), 1).unwrap_err();
    assert!(matches!(err, StepError::Config { .. }));
  }

  #[test]
  fn max_errors_allows_exactly_the_limit() {
    let (mut channel, _rs) = channel(StepErrorMeta::new("errors").with_max_errors(2));
    let mut stats = StepStats::default();
    for n in 1..=2 {
      let record = ErrorRecord::new(Row::new(vec![Value::Null]), input(), &RowError::new("E", "x"));
      channel.reject(record, &mut stats, n).unwrap();
    }
    let record = ErrorRecord::new(Row::new(vec![Value::Null]), input(), &RowError::new("E", "x"));
    let err = channel.reject(record, &mut stats, 3).unwrap_err();
    assert!(matches!(err, StepError::Fatal { .. }));
  }

  #[test]
  fn percentage_limit_waits_for_minimum_rows() {
    let (channel, _rs) = channel(StepErrorMeta::new("errors").with_max_percent_errors(10, 20));
    // 1 of 5 is 20%, but fewer than 20 rows have been seen.
    assert!(channel.verify_limits(1, 5).is_ok());
    assert!(channel.verify_limits(2, 20).is_ok());
    assert!(channel.verify_limits(3, 20).is_err());
  }
}
