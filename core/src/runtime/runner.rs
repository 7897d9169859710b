// rowflow/src/runtime/runner.rs

//! The execution loop of one step copy: `init`, then `process_row` until the
//! copy is done, then `dispose`.

use crate::core::context::StepContext;
use crate::core::control::{ProcessOutcome, StepState};
use crate::core::step::{RowBuffer, SourceStep, StepInstance, TransformStep};
use crate::error::{RowError, RowSetError, StepError};
use crate::row::{Row, RowMeta};
use crate::runtime::error_channel::{ErrorChannel, ErrorRecord};
use crate::runtime::io::{InputGate, OutputRouter};
use crate::runtime::stats::{StepReport, StepStats};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{event, span, Level};

/// Layouts fixed when the first row was seen.
#[derive(Debug)]
struct Binding {
  input: Arc<RowMeta>,
  output: Arc<RowMeta>,
}

/// Everything a copy moves rows through, apart from the step itself.
#[derive(Debug)]
struct Dataflow {
  ctx: StepContext,
  input: InputGate,
  output: OutputRouter,
  errors: Option<ErrorChannel>,
  stats: StepStats,
  binding: Option<Binding>,
  buffer: RowBuffer,
}

/// Drives one step copy. Owned by the copy's thread once the run starts.
#[derive(Debug)]
pub struct StepRunner {
  instance: StepInstance,
  flow: Dataflow,
  state: StepState,
  disposed: bool,
}

impl StepRunner {
  pub fn new(
    ctx: StepContext,
    instance: StepInstance,
    input: InputGate,
    output: OutputRouter,
    errors: Option<ErrorChannel>,
  ) -> Self {
    Self {
      instance,
      flow: Dataflow {
        ctx,
        input,
        output,
        errors,
        stats: StepStats::default(),
        binding: None,
        buffer: RowBuffer::new(),
      },
      state: StepState::Created,
      disposed: false,
    }
  }

  pub fn ctx(&self) -> &StepContext {
    &self.flow.ctx
  }

  pub fn state(&self) -> StepState {
    self.state
  }

  pub fn stats(&self) -> StepStats {
    self.flow.stats
  }

  /// True once the copy has bound its input (or opened, for sources).
  pub fn is_bound(&self) -> bool {
    self.flow.binding.is_some()
  }

  /// Layout the copy bound to on its first row.
  pub fn input_layout(&self) -> Option<&RowMeta> {
    self.flow.binding.as_ref().map(|b| b.input.as_ref())
  }

  /// Runs the step's `init`. A panic counts as a failed init.
  pub fn init(&mut self) -> Result<(), StepError> {
    let ctx = &self.flow.ctx;
    let instance = &mut self.instance;
    let result = match panic::catch_unwind(AssertUnwindSafe(|| instance.init(ctx))) {
      Ok(result) => result,
      Err(payload) => Err(StepError::fatal(anyhow::anyhow!(
        "step panicked during init: {}",
        panic_message(payload.as_ref())
      ))),
    };
    match result {
      Ok(()) => {
        self.state = StepState::Initialized;
        event!(Level::DEBUG, step_name = self.flow.ctx.step_name(), copy = self.flow.ctx.copy(), "Step copy initialized.");
        Ok(())
      }
      Err(e) => {
        self.state = StepState::Failed;
        self.flow.stats.errors += 1;
        event!(Level::ERROR, step_name = self.flow.ctx.step_name(), copy = self.flow.ctx.copy(), error = %e, "Step copy failed to initialize.");
        Err(e)
      }
    }
  }

  /// One iteration of the loop: handle one input row (or generate one row).
  pub fn process_row(&mut self) -> Result<ProcessOutcome, StepError> {
    if self.flow.ctx.control().is_cancelled() {
      return Err(RowSetError::Cancelled.into());
    }
    match &mut self.instance {
      StepInstance::Transform(step) => self.flow.transform_once(step.as_mut()),
      StepInstance::Source(step) => self.flow.generate_once(step.as_mut()),
    }
  }

  /// Runs the copy to completion and disposes it. Never panics out.
  pub fn run(mut self) -> StepReport {
    let step_span = span!(
      Level::INFO,
      "step",
      step_name = self.flow.ctx.step_name(),
      copy = self.flow.ctx.copy()
    );
    let _step_span_guard = step_span.enter();
    let started = Instant::now();

    if self.state == StepState::Created {
      if let Err(e) = self.init() {
        self.flow.ctx.control().fail(self.flow.ctx.step_name(), self.flow.ctx.copy(), e.to_string());
        self.dispose();
        return self.report(started);
      }
    }

    self.state = StepState::Running;
    event!(Level::DEBUG, "Step copy running.");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive()));
    let result = match outcome {
      Ok(result) => result,
      Err(payload) => Err(StepError::fatal(anyhow::anyhow!(
        "step panicked: {}",
        panic_message(payload.as_ref())
      ))),
    };

    match result {
      Ok(()) => {
        self.flow.output.set_done();
        if let Some(errors) = &self.flow.errors {
          errors.set_done();
        }
        self.state = StepState::Done;
        event!(
          Level::INFO,
          rows_read = self.flow.stats.lines_read,
          rows_written = self.flow.stats.lines_written,
          rows_rejected = self.flow.stats.lines_rejected,
          "Step copy finished."
        );
      }
      Err(e) if e.is_cancellation() => {
        self.state = StepState::Cancelled;
        event!(Level::INFO, "Step copy stopped by cancellation.");
      }
      Err(e) => {
        self.state = StepState::Failed;
        self.flow.stats.errors += 1;
        event!(Level::ERROR, error = %e, "Step copy failed; cancelling the run.");
        self.flow.ctx.control().fail(self.flow.ctx.step_name(), self.flow.ctx.copy(), e.to_string());
      }
    }

    self.dispose();
    self.report(started)
  }

  fn drive(&mut self) -> Result<(), StepError> {
    loop {
      if self.process_row()? == ProcessOutcome::Done {
        return Ok(());
      }
    }
  }

  pub fn dispose(&mut self) {
    if self.disposed {
      return;
    }
    self.disposed = true;
    let ctx = &self.flow.ctx;
    let instance = &mut self.instance;
    if panic::catch_unwind(AssertUnwindSafe(|| instance.dispose(ctx))).is_err() {
      event!(Level::ERROR, step_name = ctx.step_name(), copy = ctx.copy(), "Step panicked while disposing.");
    }
  }

  /// Gives up on a copy that will never run: disposes it and marks it cancelled
  /// unless it already failed.
  pub(crate) fn abandon(&mut self) {
    if !self.state.is_terminal() {
      self.state = StepState::Cancelled;
    }
    self.dispose();
  }

  /// Report for a copy that never reached its thread.
  pub(crate) fn report_now(&self) -> StepReport {
    StepReport::new(
      self.flow.ctx.step_name(),
      self.flow.ctx.copy(),
      self.state,
      self.flow.stats,
      std::time::Duration::ZERO,
    )
  }

  fn report(&self, started: Instant) -> StepReport {
    StepReport::new(
      self.flow.ctx.step_name(),
      self.flow.ctx.copy(),
      self.state,
      self.flow.stats,
      started.elapsed(),
    )
  }
}

impl Drop for StepRunner {
  fn drop(&mut self) {
    self.dispose();
  }
}

impl Dataflow {
  fn transform_once(&mut self, step: &mut dyn TransformStep) -> Result<ProcessOutcome, StepError> {
    let Some((meta, row)) = self.input.get_row(self.ctx.control())? else {
      if let Some(binding) = &self.binding {
        let output = binding.output.clone();
        self.buffer.clear();
        step.finish(&self.ctx, &mut self.buffer)?;
        self.flush(&output)?;
      }
      return Ok(ProcessOutcome::Done);
    };
    self.stats.lines_read += 1;

    if self.binding.is_none() {
      let input = Arc::new(RowMeta::clone(&meta));
      let output = step.bind(&self.ctx, &input)?;
      event!(
        Level::DEBUG,
        input_fields = input.len(),
        output_fields = output.len(),
        "Bound to the layout of the first row."
      );
      self.binding = Some(Binding {
        input,
        output: Arc::new(output),
      });
    }
    let output = match &self.binding {
      Some(binding) => binding.output.clone(),
      None => return Err(StepError::fatal(anyhow::anyhow!("step is not bound"))),
    };

    self.buffer.clear();
    match step.process_row(&self.ctx, &row, &mut self.buffer) {
      Ok(()) => self.flush(&output)?,
      Err(StepError::Row(err)) => {
        self.buffer.clear();
        let processed = self.stats.lines_read;
        self.reject(row, meta, err, processed)?;
      }
      Err(e) => return Err(e),
    }
    Ok(ProcessOutcome::Continue)
  }

  fn generate_once(&mut self, step: &mut dyn SourceStep) -> Result<ProcessOutcome, StepError> {
    if self.ctx.is_safe_stopped() {
      self.ctx.control().record_early_stop();
      event!(Level::INFO, "Safe stop: source stops producing rows.");
      return Ok(ProcessOutcome::Done);
    }

    if self.binding.is_none() {
      let output = step.open(&self.ctx)?;
      event!(Level::DEBUG, output_fields = output.len(), "Source opened.");
      self.binding = Some(Binding {
        input: Arc::new(RowMeta::new()),
        output: Arc::new(output),
      });
    }
    let output = match &self.binding {
      Some(binding) => binding.output.clone(),
      None => return Err(StepError::fatal(anyhow::anyhow!("source is not open"))),
    };

    match step.next_row(&self.ctx) {
      Ok(Some(row)) => {
        self.output.emit(&output, row)?;
        self.stats.lines_written += 1;
        Ok(ProcessOutcome::Continue)
      }
      Ok(None) => Ok(ProcessOutcome::Done),
      Err(StepError::Row(err)) => {
        let row = Row::nulls(output.len());
        let processed = self.stats.lines_written + self.stats.lines_rejected + 1;
        self.reject(row, output, err, processed)?;
        Ok(ProcessOutcome::Continue)
      }
      Err(e) => Err(e),
    }
  }

  fn flush(&mut self, output: &Arc<RowMeta>) -> Result<(), StepError> {
    for row in self.buffer.drain() {
      self.output.emit(output, row)?;
      self.stats.lines_written += 1;
    }
    Ok(())
  }

  /// Routes a failed row to the error channel, or promotes the error when the
  /// step has no error handling.
  fn reject(&mut self, row: Row, meta: Arc<RowMeta>, mut err: RowError, processed: u64) -> Result<(), StepError> {
    let Some(channel) = self.errors.as_mut() else {
      return Err(StepError::Row(err));
    };
    let row = err.row.take().unwrap_or(row);
    let record = ErrorRecord::new(row, meta, &err);
    channel.reject(record, &mut self.stats, processed)
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::RowError;
  use crate::row::{Value, ValueMeta, ValueType};
  use crate::rowset::{InputSignal, RowSet, RowSetId};
  use crate::runtime::io::OutputHop;
  use crate::trans::meta::{Distribution, StepErrorMeta};
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Pass-through step that fails the row with id `fail_on`.
  struct Recording {
    binds: Arc<AtomicUsize>,
    disposals: Arc<AtomicUsize>,
    fail_on: i64,
  }

  impl TransformStep for Recording {
    fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
      self.binds.fetch_add(1, Ordering::SeqCst);
      Ok(input.clone())
    }

    fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
      out.push(row.clone());
      if row[0] == Value::Integer(self.fail_on) {
        return Err(RowError::new("E01", "rejected").with_field("id").into());
      }
      Ok(())
    }

    fn dispose(&mut self, _ctx: &StepContext) {
      self.disposals.fetch_add(1, Ordering::SeqCst);
    }
  }

  struct Fixture {
    input: Arc<RowSet>,
    output: Arc<RowSet>,
    errors: Arc<RowSet>,
    binds: Arc<AtomicUsize>,
    disposals: Arc<AtomicUsize>,
    layout: Arc<RowMeta>,
  }

  impl Fixture {
    fn new(rows: i64) -> Self {
      let layout = Arc::new(RowMeta::from_fields([ValueMeta::new("id", ValueType::Integer)]).unwrap());
      let input = Arc::new(RowSet::new(RowSetId::new("source", 0, "check", 0), 16));
      for id in 1..=rows {
        input.put(layout.clone(), Row::new(vec![Value::Integer(id)])).unwrap();
      }
      input.set_done();
      Self {
        input,
        output: Arc::new(RowSet::new(RowSetId::new("check", 0, "out", 0), 16)),
        errors: Arc::new(RowSet::new(RowSetId::new("check", 0, "errors", 0), 16)),
        binds: Arc::new(AtomicUsize::new(0)),
        disposals: Arc::new(AtomicUsize::new(0)),
        layout,
      }
    }

    fn runner(&self, fail_on: i64, with_errors: bool) -> StepRunner {
      let step = Recording {
        binds: self.binds.clone(),
        disposals: self.disposals.clone(),
        fail_on,
      };
      let errors = with_errors.then(|| {
        ErrorChannel::new(
          StepErrorMeta::new("errors"),
          OutputRouter::new(vec![OutputHop::new("errors", Distribution::RoundRobin, vec![self.errors.clone()])]),
        )
      });
      StepRunner::new(
        StepContext::standalone("check"),
        StepInstance::transform(step),
        InputGate::new(vec![self.input.clone()], Arc::new(InputSignal::new())),
        OutputRouter::new(vec![OutputHop::new("out", Distribution::RoundRobin, vec![self.output.clone()])]),
        errors,
      )
    }
  }

  #[test]
  fn binds_once_to_a_private_copy_of_the_first_layout() {
    let fixture = Fixture::new(3);
    let mut runner = fixture.runner(0, false);
    runner.init().unwrap();
    assert!(!runner.is_bound());

    assert_eq!(runner.process_row().unwrap(), ProcessOutcome::Continue);
    assert!(runner.is_bound());
    let bound = runner.input_layout().unwrap();
    assert_eq!(bound, fixture.layout.as_ref());
    assert!(!std::ptr::eq(bound, fixture.layout.as_ref()));

    while runner.process_row().unwrap() == ProcessOutcome::Continue {}
    assert_eq!(fixture.binds.load(Ordering::SeqCst), 1);
    assert_eq!(runner.stats().lines_read, 3);
    assert_eq!(fixture.output.len(), 3);
  }

  #[test]
  fn failed_row_goes_to_the_error_channel_only() {
    let fixture = Fixture::new(3);
    let report = fixture.runner(2, true).run();

    assert_eq!(report.state, StepState::Done);
    assert_eq!((report.rows_read, report.rows_written, report.rows_rejected), (3, 2, 1));
    let mut written = Vec::new();
    while let Some((_, row)) = fixture.output.try_get() {
      written.push(row[0].clone());
    }
    assert_eq!(written, vec![Value::Integer(1), Value::Integer(3)]);

    let (meta, error_row) = fixture.errors.try_get().unwrap();
    assert_eq!(meta.names().collect::<Vec<_>>(), vec!["id", "error_code", "error_description", "error_field"]);
    assert_eq!(error_row[1], Value::from("E01"));
    assert!(fixture.output.is_finished());
    assert!(fixture.errors.is_finished());
    assert_eq!(fixture.disposals.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn row_error_without_error_handling_fails_the_run() {
    let fixture = Fixture::new(3);
    let runner = fixture.runner(2, false);
    let ctx = runner.ctx().clone();
    let report = runner.run();

    assert_eq!(report.state, StepState::Failed);
    assert_eq!(report.errors, 1);
    assert!(ctx.control().has_failed());
    assert!(ctx.control().is_cancelled());
    assert_eq!(fixture.disposals.load(Ordering::SeqCst), 1);
  }
}
