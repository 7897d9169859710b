use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rowflow::steps::DataGridMeta;
use rowflow::{
  HopMeta, Row, RowMeta, RowSet, RowSetId, StepDefinition, StepRegistry, Trans, TransMeta, Value, ValueMeta,
  ValueType,
};
use std::sync::Arc;
use std::thread;

fn layout() -> RowMeta {
  RowMeta::from_fields([
    ValueMeta::new("id", ValueType::Integer),
    ValueMeta::new("payload", ValueType::String),
  ])
  .unwrap()
}

fn rows(count: usize) -> Vec<Row> {
  (0..count)
    .map(|n| Row::new(vec![Value::Integer(n as i64), Value::from("payload")]))
    .collect()
}

// --- Row set: one producer thread, one consumer thread ---
fn bench_row_set_transfer(c: &mut Criterion) {
  const ROWS: usize = 10_000;
  let mut group = c.benchmark_group("RowSet Transfer");
  group.throughput(Throughput::Elements(ROWS as u64));

  for capacity in [1usize, 100, 10_000] {
    group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
      let meta = Arc::new(layout());
      let data = rows(ROWS);
      b.iter(|| {
        let row_set = Arc::new(RowSet::new(RowSetId::new("producer", 0, "consumer", 0), capacity));
        let producer = {
          let row_set = row_set.clone();
          let meta = meta.clone();
          let data = data.clone();
          thread::spawn(move || {
            for row in data {
              row_set.put(meta.clone(), row).unwrap();
            }
            row_set.set_done();
          })
        };
        let mut received = 0usize;
        while let Some(_) = row_set.get().unwrap() {
          received += 1;
        }
        producer.join().unwrap();
        assert_eq!(received, ROWS);
      });
    });
  }
  group.finish();
}

// --- Full pipeline: grid -> dummy copies -> dummy ---
fn bench_pipeline(c: &mut Criterion) {
  const ROWS: usize = 20_000;
  let mut group = c.benchmark_group("Pipeline Throughput");
  group.throughput(Throughput::Elements(ROWS as u64));
  group.sample_size(20);

  let registry = StepRegistry::with_builtins();
  registry.register_meta("bench_grid", Arc::new(DataGridMeta::new(layout(), rows(ROWS)).unwrap()));
  let registry = Arc::new(registry);

  for copies in [1usize, 2, 4] {
    let meta = TransMeta::new("bench")
      .with_step(StepDefinition::new("grid", "bench_grid"))
      .with_step(StepDefinition::new("work", "dummy").with_copies(copies))
      .with_step(StepDefinition::new("sink", "dummy"))
      .with_hop(HopMeta::new("grid", "work"))
      .with_hop(HopMeta::new("work", "sink"))
      .with_row_set_capacity(1_000);
    let trans = Trans::new(meta, registry.clone());

    group.bench_with_input(BenchmarkId::new("copies", copies), &copies, |b, _| {
      b.iter(|| {
        let report = trans.run().unwrap();
        assert!(report.is_success());
      });
    });
  }
  group.finish();
}

criterion_group!(benches, bench_row_set_transfer, bench_pipeline);
criterion_main!(benches);
