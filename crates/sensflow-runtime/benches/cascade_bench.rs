//! Benchmarks for cascade throughput.
//!
//! Run with: cargo bench -p sensflow-runtime

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sensflow_runtime::{
    Clock, Emits, Interval, JoinAll, LabClock, Lambda, Linear, ManualInput, MovingAverage, Pipeline,
    RecordingDiagnostics, Sink,
};
use std::hint::black_box;
use web_time::Duration;

/// `depth` linear stages ending in a sink.
fn linear_chain(depth: usize) -> (Pipeline, ManualInput<f64>) {
    let pipeline = Pipeline::builder().diagnostics(RecordingDiagnostics::new()).build();
    let source = ManualInput::<f64>::new(&pipeline, "source");
    let mut tail = source.connect_to(Linear::new(&pipeline, 1.0001, 0.5, None));
    for _ in 1..depth {
        tail = tail.connect_to(Linear::new(&pipeline, 1.0001, 0.5, None));
    }
    tail.connect_to(Sink::new(&pipeline, "sink", |v: &f64| {
        black_box(*v);
    }));
    (pipeline, source)
}

fn bench_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/linear_chain");
    for depth in [1, 4, 16, 64] {
        let (_pipeline, source) = linear_chain(depth);
        group.bench_with_input(BenchmarkId::new("emit", depth), &source, |b, source| {
            b.iter(|| source.emit(black_box(21.5)))
        });
    }
    group.finish();
}

fn bench_moving_average(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/moving_average");
    for size in [10, 100, 1000] {
        let pipeline = Pipeline::builder().build();
        let source = ManualInput::<f64>::new(&pipeline, "source");
        source.connect_to(MovingAverage::new(&pipeline, size, 1.0, None));
        group.bench_with_input(BenchmarkId::new("window", size), &source, |b, source| {
            b.iter(|| source.emit(black_box(3.25)))
        });
    }
    group.finish();
}

fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/join_all");
    for ports in [2u16, 8, 32] {
        let pipeline = Pipeline::builder().build();
        let join = JoinAll::new(&pipeline, "mean", ports, |vs: &[f64]| {
            vs.iter().sum::<f64>() / vs.len() as f64
        });
        let inputs: Vec<ManualInput<f64>> = (0..ports)
            .map(|i| {
                let input = ManualInput::new(&pipeline, format!("in{i}"));
                input.connect_to(join.input(i));
                input.emit(f64::from(i));
                input
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("ports", ports), &inputs, |b, inputs| {
            b.iter(|| inputs[0].emit(black_box(1.0)))
        });
    }
    group.finish();
}

fn bench_scheduler_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade/scheduler");
    for tasks in [1, 16, 128] {
        let lab = LabClock::new();
        let pipeline = Pipeline::builder().clock(Clock::lab(&lab)).build();
        for i in 0..tasks {
            let stage = Lambda::new(&pipeline, format!("stage{i}"), |v: &u64| v.wrapping_mul(31));
            let source = ManualInput::<u64>::new(&pipeline, format!("src{i}"));
            source.connect_to(stage);
            pipeline
                .scheduler()
                .every(Interval::fixed(Duration::from_millis(10)), move |id| source.emit(id.raw()));
        }
        if pipeline.start().is_err() {
            continue;
        }
        group.bench_function(BenchmarkId::new("tasks", tasks), |b| {
            b.iter(|| {
                lab.advance(Duration::from_millis(10));
                black_box(pipeline.run_once())
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_depth,
    bench_moving_average,
    bench_fan_in,
    bench_scheduler_tick
);
criterion_main!(benches);
