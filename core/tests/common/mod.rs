// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use rowflow::{
  Row, RowBuffer, RowError, RowMeta, Settings, SourceStep, StepContext, StepError, StepInstance, StepMeta,
  StepRegistry, TransformStep, Value, ValueMeta, ValueType,
};
use rowflow::steps::{DataGridMeta, RowCollectorMeta};
use std::collections::HashSet;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;
use std::time::Duration;
use tracing::Level;

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Global counters for lifecycle checks (tests using them run #[serial]) ---
pub static INIT_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static DISPOSE_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static BIND_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static FINISH_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  INIT_COUNTER.store(0, Ordering::SeqCst);
  DISPOSE_COUNTER.store(0, Ordering::SeqCst);
  BIND_COUNTER.store(0, Ordering::SeqCst);
  FINISH_COUNTER.store(0, Ordering::SeqCst);
}

// --- Layouts and data ---
pub fn id_layout() -> RowMeta {
  RowMeta::from_fields([
    ValueMeta::new("id", ValueType::Integer),
    ValueMeta::new("name", ValueType::String),
  ])
  .unwrap()
}

pub fn id_rows(count: i64) -> Vec<Row> {
  (1..=count)
    .map(|n| Row::new(vec![Value::Integer(n), Value::from(format!("row-{}", n))]))
    .collect()
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
  rows.iter().map(|r| r[0].as_integer().unwrap()).collect()
}

/// Registry with the built-ins, an `ids` grid of `count` rows, and the test steps.
pub fn registry_with_grid(count: i64) -> StepRegistry {
  let registry = StepRegistry::with_builtins();
  let grid = DataGridMeta::new(id_layout(), id_rows(count)).unwrap();
  registry.register_meta("ids", Arc::new(grid));
  register_test_steps(&registry);
  registry
}

/// Registers a collector under `step_type` and returns it for inspection.
pub fn collector(registry: &StepRegistry, step_type: &str) -> RowCollectorMeta {
  let collector = RowCollectorMeta::new();
  registry.register_meta(step_type, Arc::new(collector.clone()));
  collector
}

pub fn register_test_steps(registry: &StepRegistry) {
  registry.register("fail_on", |_: &str, settings: &Settings| -> Result<Arc<dyn StepMeta>, StepError> {
    let ids: Vec<i64> = settings.parse("ids")?.unwrap_or_default();
    Ok(Arc::new(FailOnMeta {
      ids: ids.into_iter().collect(),
      fatal: settings.bool("fatal").unwrap_or(false),
    }))
  });
  registry.register("require_field", |_: &str, settings: &Settings| -> Result<Arc<dyn StepMeta>, StepError> {
    Ok(Arc::new(RequireFieldMeta {
      field: settings.require_field_ref("field")?.to_string(),
      optional: settings.field_ref("optional").map(str::to_string),
    }))
  });
  registry.register_meta("counting", Arc::new(CountingMeta));
  registry.register_meta("failing_init", Arc::new(FailingInitMeta));
  registry.register_meta("endless", Arc::new(EndlessSourceMeta));
  registry.register_meta("blocking_sink", Arc::new(BlockingSinkMeta));
  registry.register_meta("panicking", Arc::new(PanickingMeta { on_id: 3 }));
  registry.register_meta("slow", Arc::new(SlowMeta { delay: Duration::from_millis(2) }));
}

// --- Test steps ---

/// Fails the rows whose `id` is listed, with a row error (or a fatal error).
#[derive(Debug)]
pub struct FailOnMeta {
  pub ids: HashSet<i64>,
  pub fatal: bool,
}

impl StepMeta for FailOnMeta {
  fn step_type(&self) -> &str {
    "fail_on"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(FailOnStep {
      ids: self.ids.clone(),
      fatal: self.fatal,
      id_index: 0,
    })
  }
}

struct FailOnStep {
  ids: HashSet<i64>,
  fatal: bool,
  id_index: usize,
}

impl TransformStep for FailOnStep {
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    self.id_index = rowflow::FieldBinder::new(ctx.step_name(), input).required("id")?;
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    let id = row[self.id_index].as_integer().unwrap_or_default();
    // Pushed first so a failing row proves buffered output is discarded.
    out.push(row.clone());
    if self.ids.contains(&id) {
      if self.fatal {
        return Err(StepError::fatal(anyhow::anyhow!("fatal failure on row {}", id)));
      }
      return Err(RowError::new("REMOTE01", format!("endpoint unreachable for row {}", id))
        .with_field("id")
        .into());
    }
    Ok(())
  }
}

/// Binds a required field reference (and an optional one) and passes rows on.
#[derive(Debug)]
pub struct RequireFieldMeta {
  pub field: String,
  pub optional: Option<String>,
}

impl StepMeta for RequireFieldMeta {
  fn step_type(&self) -> &str {
    "require_field"
  }

  fn check(&self, step_name: &str, input: Option<&RowMeta>) -> Vec<rowflow::CheckResult> {
    match input {
      Some(input) if input.index_of(&self.field).is_none() => vec![rowflow::CheckResult::error(
        step_name,
        format!("field '{}' not found in input", self.field),
      )],
      _ => vec![rowflow::CheckResult::ok(step_name, "field found")],
    }
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(RequireFieldStep {
      field: self.field.clone(),
      optional: self.optional.clone(),
      optional_index: None,
    })
  }
}

struct RequireFieldStep {
  field: String,
  optional: Option<String>,
  optional_index: Option<usize>,
}

impl TransformStep for RequireFieldStep {
  fn bind(&mut self, ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    let binder = rowflow::FieldBinder::new(ctx.step_name(), input);
    binder.required(&self.field)?;
    self.optional_index = binder.optional(self.optional.as_deref());
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    out.push(row.clone());
    Ok(())
  }
}

/// Pass-through step counting lifecycle calls in the global counters.
#[derive(Debug)]
pub struct CountingMeta;

impl StepMeta for CountingMeta {
  fn step_type(&self) -> &str {
    "counting"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(CountingStep)
  }
}

struct CountingStep;

impl TransformStep for CountingStep {
  fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
    INIT_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    BIND_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    out.push(row.clone());
    Ok(())
  }

  fn finish(&mut self, _ctx: &StepContext, _out: &mut RowBuffer) -> Result<(), StepError> {
    FINISH_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn dispose(&mut self, _ctx: &StepContext) {
    DISPOSE_COUNTER.fetch_add(1, Ordering::SeqCst);
  }
}

/// A step whose `init` always fails.
#[derive(Debug)]
pub struct FailingInitMeta;

impl StepMeta for FailingInitMeta {
  fn step_type(&self) -> &str {
    "failing_init"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(FailingInitStep)
  }
}

struct FailingInitStep;

impl TransformStep for FailingInitStep {
  fn init(&mut self, _ctx: &StepContext) -> Result<(), StepError> {
    Err(StepError::config("connection could not be opened"))
  }

  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, _row: &Row, _out: &mut RowBuffer) -> Result<(), StepError> {
    Ok(())
  }

  fn dispose(&mut self, _ctx: &StepContext) {
    DISPOSE_COUNTER.fetch_add(1, Ordering::SeqCst);
  }
}

/// Source producing increasing ids until the run stops.
#[derive(Debug)]
pub struct EndlessSourceMeta;

impl StepMeta for EndlessSourceMeta {
  fn step_type(&self) -> &str {
    "endless"
  }

  fn output_fields(&self, _step_name: &str, _input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(id_layout())
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::source(EndlessSource { next: 0 })
  }
}

struct EndlessSource {
  next: i64,
}

impl SourceStep for EndlessSource {
  fn open(&mut self, _ctx: &StepContext) -> Result<RowMeta, StepError> {
    Ok(id_layout())
  }

  fn next_row(&mut self, _ctx: &StepContext) -> Result<Option<Row>, StepError> {
    self.next += 1;
    Ok(Some(Row::new(vec![Value::Integer(self.next), Value::from("endless")])))
  }

  fn dispose(&mut self, _ctx: &StepContext) {
    DISPOSE_COUNTER.fetch_add(1, Ordering::SeqCst);
  }
}

/// Takes one row, then holds on to it until the run is stopped.
#[derive(Debug)]
pub struct BlockingSinkMeta;

impl StepMeta for BlockingSinkMeta {
  fn step_type(&self) -> &str {
    "blocking_sink"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(BlockingSink)
  }
}

struct BlockingSink;

impl TransformStep for BlockingSink {
  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  fn process_row(&mut self, ctx: &StepContext, _row: &Row, _out: &mut RowBuffer) -> Result<(), StepError> {
    while !ctx.is_stopped() {
      thread::sleep(Duration::from_millis(5));
    }
    Ok(())
  }

  fn dispose(&mut self, _ctx: &StepContext) {
    DISPOSE_COUNTER.fetch_add(1, Ordering::SeqCst);
  }
}

/// Panics on the row with the given id.
#[derive(Debug)]
pub struct PanickingMeta {
  pub on_id: i64,
}

impl StepMeta for PanickingMeta {
  fn step_type(&self) -> &str {
    "panicking"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(PanickingStep { on_id: self.on_id })
  }
}

struct PanickingStep {
  on_id: i64,
}

impl TransformStep for PanickingStep {
  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    if row[0].as_integer() == Some(self.on_id) {
      panic!("unexpected value in row {}", self.on_id);
    }
    out.push(row.clone());
    Ok(())
  }
}

/// Pass-through step sleeping a little on every row.
#[derive(Debug)]
pub struct SlowMeta {
  pub delay: Duration,
}

impl StepMeta for SlowMeta {
  fn step_type(&self) -> &str {
    "slow"
  }

  fn create_step(&self) -> StepInstance {
    StepInstance::transform(SlowStep { delay: self.delay })
  }
}

struct SlowStep {
  delay: Duration,
}

impl TransformStep for SlowStep {
  fn bind(&mut self, _ctx: &StepContext, input: &RowMeta) -> Result<RowMeta, StepError> {
    Ok(input.clone())
  }

  fn process_row(&mut self, _ctx: &StepContext, row: &Row, out: &mut RowBuffer) -> Result<(), StepError> {
    thread::sleep(self.delay);
    out.push(row.clone());
    Ok(())
  }
}
