// rowflow/src/trans/execution.rs

//! The orchestrator: turns a `TransMeta` into running step copies, one thread
//! each, and collects the run report once every thread has been joined.

use crate::config::EngineConfig;
use crate::core::check::CheckResult;
use crate::core::context::StepContext;
use crate::core::control::{RunState, StepState};
use crate::core::variables::Variables;
use crate::error::{EngineError, EngineResult};
use crate::registry::StepRegistry;
use crate::row::RowMeta;
use crate::runtime::control::RunControl;
use crate::runtime::error_channel::{error_layout, ErrorChannel};
use crate::runtime::io::{InputGate, OutputRouter};
use crate::runtime::runner::StepRunner;
use crate::runtime::stats::{StepReport, StepStats};
use crate::trans::meta::TransMeta;
use crate::trans::report::RunReport;
use crate::trans::wiring::Wiring;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{event, instrument, Level};
use uuid::Uuid;

/// A pipeline definition bound to a step registry, variables and engine settings.
#[derive(Debug, Clone)]
pub struct Trans {
  meta: TransMeta,
  registry: Arc<StepRegistry>,
  variables: Variables,
  config: EngineConfig,
}

impl Trans {
  /// Variables start out as a snapshot of the process environment.
  pub fn new(meta: TransMeta, registry: Arc<StepRegistry>) -> Self {
    Self {
      meta,
      registry,
      variables: Variables::from_env(),
      config: EngineConfig::default(),
    }
  }

  /// Adds variables; they take precedence over existing ones.
  pub fn with_variables(mut self, variables: Variables) -> Self {
    self.variables = self.variables.merged(&variables);
    self
  }

  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn meta(&self) -> &TransMeta {
    &self.meta
  }

  pub fn variables(&self) -> &Variables {
    &self.variables
  }

  fn row_set_capacity(&self) -> usize {
    self.meta.row_set_capacity.unwrap_or(self.config.row_set_capacity).max(1)
  }

  /// Pre-flight check without running anything: validates the graph, then
  /// propagates row layouts through it and collects every step's findings.
  #[instrument(name = "Trans::check", skip_all, fields(trans_name = %self.meta.name), err(Display))]
  pub fn check(&self) -> EngineResult<Vec<CheckResult>> {
    self.meta.validate()?;

    let mut results = Vec::new();
    let mut outputs: HashMap<&str, RowMeta> = HashMap::new();
    let mut error_outputs: HashMap<&str, RowMeta> = HashMap::new();

    for name in self.meta.topological_order()? {
      let Some(definition) = self.meta.step(name) else {
        continue;
      };

      let mut incoming: Vec<&RowMeta> = Vec::new();
      for previous in self.meta.previous_steps(name) {
        if let Some(layout) = outputs.get(previous.name.as_str()) {
          incoming.push(layout);
        }
      }
      for source in self.meta.error_sources(name) {
        if let Some(layout) = error_outputs.get(source.name.as_str()) {
          incoming.push(layout);
        }
      }
      if incoming.windows(2).any(|pair| !pair[0].same_layout(pair[1])) {
        results.push(CheckResult::warning(
          name,
          "step receives rows with different layouts on its inputs",
        ));
      }
      let input = incoming.first().map(|layout| (*layout).clone());

      let step_meta = match self.registry.create_meta(definition) {
        Ok(step_meta) => step_meta,
        Err(e) => {
          results.push(CheckResult::error(name, e.to_string()));
          continue;
        }
      };
      results.extend(step_meta.check(name, input.as_ref()));

      let empty = RowMeta::new();
      let output = match step_meta.output_fields(name, input.as_ref().unwrap_or(&empty)) {
        Ok(output) => output,
        Err(e) => {
          results.push(CheckResult::error(name, e.to_string()));
          continue;
        }
      };

      if let Some(error_meta) = definition.active_error_handling() {
        let rejected = input.as_ref().unwrap_or(&output);
        match error_layout(rejected, error_meta) {
          Ok(layout) => {
            error_outputs.insert(name, layout);
          }
          Err(e) => results.push(CheckResult::error(name, e.to_string())),
        }
      }
      outputs.insert(name, output);
    }

    event!(Level::DEBUG, findings = results.len(), "Pipeline check finished.");
    Ok(results)
  }

  /// Validates the pipeline, allocates the row sets and creates a runner per
  /// step copy. Nothing runs yet.
  #[instrument(name = "Trans::prepare", skip_all, fields(trans_name = %self.meta.name), err(Display))]
  pub fn prepare(&self) -> EngineResult<PreparedTrans> {
    self.meta.validate()?;

    let capacity = self.row_set_capacity();
    let control = Arc::new(RunControl::new());
    let variables = Arc::new(self.variables.clone());
    let mut wiring = Wiring::build(&self.meta, capacity);
    control.register(wiring.row_sets().iter().cloned(), wiring.signals());

    let mut runners = Vec::new();
    for name in self.meta.topological_order()? {
      let Some(definition) = self.meta.step(name) else {
        continue;
      };
      let step_meta = self.registry.create_meta(definition)?;
      let input_less = self.meta.is_input_less(name);

      for copy in 0..definition.copies {
        let copy_wiring = wiring.take(name, copy);
        let instance = step_meta.create_step();

        if instance.is_source() && !input_less {
          return Err(EngineError::InvalidPipeline {
            trans_name: self.meta.name.clone(),
            message: format!("step '{}' generates rows and cannot have input hops", name),
          });
        }
        if !instance.is_source() && input_less && copy == 0 {
          event!(Level::WARN, step_name = name, "Step has no input hops and will receive no rows.");
        }

        let errors = definition
          .active_error_handling()
          .map(|settings| ErrorChannel::new(settings.clone(), OutputRouter::new(copy_wiring.error_outputs)));
        let ctx = StepContext::new(name, copy, definition.copies, variables.clone(), control.clone());
        runners.push(StepRunner::new(
          ctx,
          instance,
          InputGate::new(copy_wiring.inputs, copy_wiring.signal),
          OutputRouter::new(copy_wiring.outputs),
          errors,
        ));
      }
    }

    event!(
      Level::DEBUG,
      step_copies = runners.len(),
      row_sets = wiring.row_sets().len(),
      row_set_capacity = capacity,
      "Pipeline prepared."
    );

    Ok(PreparedTrans {
      run_id: Uuid::new_v4(),
      trans_name: self.meta.name.clone(),
      runners,
      control,
      config: self.config.clone(),
    })
  }

  /// Prepares and starts the pipeline.
  pub fn execute(&self) -> EngineResult<RunningTrans> {
    Ok(self.prepare()?.start())
  }

  /// Runs the pipeline to completion.
  pub fn run(&self) -> EngineResult<RunReport> {
    Ok(self.execute()?.wait())
  }
}

/// Stops a run from outside the step threads.
#[derive(Debug, Clone)]
pub struct RunHandle {
  control: Arc<RunControl>,
}

impl RunHandle {
  /// Immediate stop: every blocked step copy wakes up and stops.
  pub fn stop(&self) {
    self.control.stop();
  }

  /// Sources stop producing; everything already produced is still processed.
  pub fn stop_safely(&self) {
    self.control.stop_safely();
  }

  pub fn is_stopped(&self) -> bool {
    self.control.is_cancelled() || self.control.is_safe_stopped()
  }

  pub fn has_failed(&self) -> bool {
    self.control.has_failed()
  }
}

/// A pipeline whose step copies exist but are not initialised yet.
#[derive(Debug)]
pub struct PreparedTrans {
  run_id: Uuid,
  trans_name: String,
  runners: Vec<StepRunner>,
  control: Arc<RunControl>,
  config: EngineConfig,
}

impl PreparedTrans {
  pub fn run_id(&self) -> Uuid {
    self.run_id
  }

  pub fn step_copies(&self) -> usize {
    self.runners.len()
  }

  pub fn handle(&self) -> RunHandle {
    RunHandle {
      control: self.control.clone(),
    }
  }

  /// Runs `init` on every copy; returns the copies that failed with their errors.
  fn init_all(&mut self) -> Vec<(String, usize, String)> {
    let init_one = |runner: &mut StepRunner| {
      let step_name = runner.ctx().step_name().to_string();
      let copy = runner.ctx().copy();
      runner.init().err().map(|e| (step_name, copy, e.to_string()))
    };

    if self.config.init_in_parallel && self.runners.len() > 1 {
      thread::scope(|scope| {
        let pending: Vec<_> = self
          .runners
          .iter_mut()
          .map(|runner| scope.spawn(move || init_one(runner)))
          .collect();
        pending
          .into_iter()
          .filter_map(|handle| match handle.join() {
            Ok(result) => result,
            Err(_) => Some(("unknown".to_string(), 0, "init thread panicked".to_string())),
          })
          .collect()
      })
    } else {
      self.runners.iter_mut().filter_map(init_one).collect()
    }
  }

  /// Initialises every step copy and, if all of them succeed, starts one
  /// thread per copy. If any `init` fails, every copy is disposed and no
  /// thread is started.
  #[instrument(name = "PreparedTrans::start", skip_all, fields(trans_name = %self.trans_name, run_id = %self.run_id))]
  pub fn start(mut self) -> RunningTrans {
    let started_at = Utc::now();
    let started = Instant::now();

    let init_failures = self.init_all();
    if !init_failures.is_empty() {
      for (step_name, copy, message) in &init_failures {
        self.control.fail(step_name, *copy, format!("init failed: {}", message));
      }
      event!(Level::ERROR, "Pipeline could not be initialized; no step is started.");
      let finished = self
        .runners
        .iter_mut()
        .map(|runner| {
          runner.abandon();
          runner.report_now()
        })
        .collect();
      return RunningTrans {
        run_id: self.run_id,
        trans_name: self.trans_name,
        handles: Vec::new(),
        finished,
        control: self.control,
        started_at,
        started,
      };
    }

    event!(Level::INFO, step_copies = self.runners.len(), "Starting pipeline.");
    let mut handles = Vec::with_capacity(self.runners.len());
    let mut finished = Vec::new();
    for runner in self.runners.drain(..) {
      let step_name = runner.ctx().step_name().to_string();
      let copy = runner.ctx().copy();
      let thread_name = format!("{}{}.{}", self.config.thread_name_prefix, step_name, copy);
      match thread::Builder::new().name(thread_name).spawn(move || runner.run()) {
        Ok(handle) => handles.push(PendingStep { step_name, copy, handle }),
        Err(e) => {
          event!(Level::ERROR, step_name = %step_name, copy, error = %e, "Could not start step thread.");
          self.control.fail(&step_name, copy, format!("could not start thread: {}", e));
          let stats = StepStats {
            errors: 1,
            ..StepStats::default()
          };
          finished.push(StepReport::new(&step_name, copy, StepState::Failed, stats, Duration::ZERO));
        }
      }
    }

    RunningTrans {
      run_id: self.run_id,
      trans_name: self.trans_name,
      handles,
      finished,
      control: self.control,
      started_at,
      started,
    }
  }
}

#[derive(Debug)]
struct PendingStep {
  step_name: String,
  copy: usize,
  handle: JoinHandle<StepReport>,
}

/// A started pipeline.
#[derive(Debug)]
pub struct RunningTrans {
  run_id: Uuid,
  trans_name: String,
  handles: Vec<PendingStep>,
  finished: Vec<StepReport>,
  control: Arc<RunControl>,
  started_at: DateTime<Utc>,
  started: Instant,
}

impl RunningTrans {
  pub fn run_id(&self) -> Uuid {
    self.run_id
  }

  pub fn handle(&self) -> RunHandle {
    RunHandle {
      control: self.control.clone(),
    }
  }

  /// True once every step thread has returned.
  pub fn is_finished(&self) -> bool {
    self.handles.iter().all(|p| p.handle.is_finished())
  }

  /// Joins every step thread and builds the run report.
  #[instrument(name = "RunningTrans::wait", skip_all, fields(trans_name = %self.trans_name, run_id = %self.run_id))]
  pub fn wait(self) -> RunReport {
    let mut steps = self.finished;
    for pending in self.handles {
      match pending.handle.join() {
        Ok(report) => steps.push(report),
        Err(_) => {
          self
            .control
            .fail(&pending.step_name, pending.copy, "step thread panicked");
          let stats = StepStats {
            errors: 1,
            ..StepStats::default()
          };
          steps.push(StepReport::new(&pending.step_name, pending.copy, StepState::Failed, stats, Duration::ZERO));
        }
      }
    }

    let failure = self.control.failure();
    let state = if failure.is_some() || steps.iter().any(StepReport::is_failed) {
      RunState::Failed
    } else if steps.iter().any(|r| r.state == StepState::Cancelled) || self.control.has_stopped_early() {
      RunState::Cancelled
    } else {
      RunState::Success
    };

    let report = RunReport {
      run_id: self.run_id,
      trans_name: self.trans_name,
      state,
      failure: failure.map(|f| format!("step '{}' copy {}: {}", f.step_name, f.copy, f.message)),
      started_at: self.started_at,
      elapsed: self.started.elapsed(),
      steps,
    };
    event!(
      Level::INFO,
      state = %report.state,
      rejected = report.total_rejected(),
      elapsed_ms = report.elapsed.as_millis() as u64,
      "Pipeline finished."
    );
    report
  }
}
