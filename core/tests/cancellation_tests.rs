// tests/cancellation_tests.rs
mod common;
use common::*;
use rowflow::{HopMeta, RunState, StepDefinition, StepState, Trans, TransMeta};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
  let start = Instant::now();
  while start.elapsed() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

#[test]
fn stop_wakes_every_blocked_step() {
  setup_tracing();
  let registry = registry_with_grid(0);
  let meta = TransMeta::new("endless")
    .with_step(StepDefinition::new("source", "endless"))
    .with_step(StepDefinition::new("pass", "dummy").with_copies(2))
    .with_step(StepDefinition::new("sink", "blocking_sink"))
    .with_hop(HopMeta::new("source", "pass"))
    .with_hop(HopMeta::new("pass", "sink"))
    .with_row_set_capacity(4);

  let running = Trans::new(meta, Arc::new(registry)).execute().unwrap();
  let handle = running.handle();
  thread::sleep(Duration::from_millis(100));
  assert!(!running.is_finished());

  let stopped_at = Instant::now();
  handle.stop();
  let report = running.wait();

  assert!(stopped_at.elapsed() < Duration::from_secs(5));
  assert!(handle.is_stopped());
  assert_eq!(report.state, RunState::Cancelled);
  assert!(report.failure.is_none());
  assert!(report.steps.iter().all(|r| r.state.is_terminal()));
}

#[test]
fn full_row_sets_throttle_the_producer() {
  setup_tracing();
  let registry = registry_with_grid(0);
  let meta = TransMeta::new("backpressure")
    .with_step(StepDefinition::new("source", "endless"))
    .with_step(StepDefinition::new("sink", "blocking_sink"))
    .with_hop(HopMeta::new("source", "sink"))
    .with_row_set_capacity(1);

  let running = Trans::new(meta, Arc::new(registry)).execute().unwrap();
  let handle = running.handle();
  thread::sleep(Duration::from_millis(150));
  handle.stop();
  let report = running.wait();

  // One row held by the sink, one waiting in the row set; the next put blocked.
  assert_eq!(report.rows_read("sink"), 1);
  assert!(report.rows_written("source") <= 2, "producer ran ahead: {}", report.rows_written("source"));
  assert_eq!(report.state, RunState::Cancelled);
}

#[test]
fn failure_in_one_step_cancels_an_endless_pipeline() {
  setup_tracing();
  let registry = registry_with_grid(0);
  let meta = TransMeta::new("failure_propagation")
    .with_step(StepDefinition::new("source", "endless"))
    .with_step(
      StepDefinition::new("remote", "fail_on")
        .with_setting("ids", json!([500]))
        .with_copies(2),
    )
    .with_step(StepDefinition::new("pass", "dummy"))
    .with_hop(HopMeta::new("source", "remote"))
    .with_hop(HopMeta::new("remote", "pass"))
    .with_row_set_capacity(8);

  let started = Instant::now();
  let report = Trans::new(meta, Arc::new(registry)).run().unwrap();

  assert!(started.elapsed() < Duration::from_secs(10));
  assert_eq!(report.state, RunState::Failed);
  let failed: Vec<_> = report.steps.iter().filter(|r| r.state == StepState::Failed).collect();
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0].step_name, "remote");
  assert!(report.step("source").all(|r| r.state == StepState::Cancelled));
}

#[test]
fn safe_stop_drains_what_was_produced() {
  setup_tracing();
  let registry = registry_with_grid(0);
  let sink = collector(&registry, "sink");
  let meta = TransMeta::new("safe_stop")
    .with_step(StepDefinition::new("source", "endless"))
    .with_step(StepDefinition::new("slow", "slow"))
    .with_step(StepDefinition::new("sink", "sink"))
    .with_hop(HopMeta::new("source", "slow"))
    .with_hop(HopMeta::new("slow", "sink"))
    .with_row_set_capacity(20);

  let running = Trans::new(meta, Arc::new(registry)).execute().unwrap();
  let handle = running.handle();
  assert!(wait_until(Duration::from_secs(5), || sink.len() >= 10));
  handle.stop_safely();
  let report = running.wait();

  assert_eq!(report.state, RunState::Cancelled);
  assert!(report.steps.iter().all(|r| r.state == StepState::Done));
  let produced = report.rows_written("source");
  assert_eq!(report.rows_read("slow"), produced);
  assert_eq!(sink.len() as u64, produced);
  assert_eq!(ids(&sink.rows()), (1..=produced as i64).collect::<Vec<_>>());
}

#[test]
fn stop_after_every_copy_finished_keeps_success() {
  setup_tracing();
  let registry = registry_with_grid(5);
  let sink = collector(&registry, "sink");
  let meta = TransMeta::new("late_stop")
    .with_step(StepDefinition::new("source", "ids"))
    .with_step(StepDefinition::new("sink", "sink"))
    .with_hop(HopMeta::new("source", "sink"));

  let running = Trans::new(meta, Arc::new(registry)).execute().unwrap();
  assert!(wait_until(Duration::from_secs(5), || running.is_finished()));
  let handle = running.handle();
  handle.stop_safely();
  handle.stop();
  let report = running.wait();

  assert!(handle.is_stopped());
  assert_eq!(report.state, RunState::Success);
  assert!(report.steps.iter().all(|r| r.state == StepState::Done));
  assert_eq!(sink.len(), 5);
}
