//! End-to-end behaviour of the pipeline runtime.
//!
//! 1. Every listener sees every `set` once, in registration order.
//! 2. A moving average over N emits partial means, then slides.
//! 3. A join whose second input never fires emits nothing.
//! 4. A periodic producer fires at 0, T, 2T, ... without drift.
//! 5. A failed read skips one value, reports once, and recovers.
//! 6. Configuration survives a change and a fresh bind.
//! 7. `A.connect_to(B).connect_to(C)` forwards B's value to C.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::{Value, json};
use sensflow_runtime::{
    Clock, ConfigBinding, ConfigRecord, ConfigSchema, Emits, Join2, LabClock, Linear, ManualInput,
    MemoryStore, MovingAverage, ParamSpec, Pipeline, Producer, ReadError, RecordingDiagnostics,
    RecordingTransport, Severity, Sink, TelemetryOutput, TelemetryValue,
};
use web_time::Duration;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn record(value: Value) -> ConfigRecord {
    value.as_object().cloned().unwrap_or_default()
}

struct Rig {
    lab: LabClock,
    diagnostics: RecordingDiagnostics,
    store: MemoryStore,
    transport: RecordingTransport,
    pipeline: Pipeline,
}

fn rig() -> Rig {
    let lab = LabClock::new();
    let diagnostics = RecordingDiagnostics::new();
    let store = MemoryStore::new();
    let transport = RecordingTransport::new();
    let pipeline = Pipeline::builder()
        .hostname("test-rig")
        .clock(Clock::lab(&lab))
        .diagnostics(diagnostics.clone())
        .store(store.clone())
        .transport(transport.clone())
        .build();
    Rig {
        lab,
        diagnostics,
        store,
        transport,
        pipeline,
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Fan-out ordering
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn every_listener_sees_every_set_in_order() {
    let rig = rig();
    let source = ManualInput::<i64>::new(&rig.pipeline, "source");
    let log = Rc::new(RefCell::new(Vec::new()));
    for listener in 0..4 {
        let log = Rc::clone(&log);
        source.connect_to(Sink::new(&rig.pipeline, format!("sink{listener}"), move |v: &i64| {
            log.borrow_mut().push((listener, *v));
        }));
    }

    source.emit(10);
    source.emit(10);
    let expected: Vec<(i32, i64)> = [10, 10]
        .into_iter()
        .flat_map(|v| (0..4).map(move |l| (l, v)))
        .collect();
    assert_eq!(*log.borrow(), expected);
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Windowed mean
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn moving_average_partial_then_sliding() {
    let rig = rig();
    let source = ManualInput::<f64>::new(&rig.pipeline, "source");
    let avg = source.connect_to(MovingAverage::new(&rig.pipeline, 4, 1.0, None));
    let values = [2.0, 4.0, 6.0, 8.0, 10.0];
    let mut means = Vec::new();
    for v in values {
        source.emit(v);
        means.push(avg.current().unwrap_or(f64::NAN));
    }
    // Partial windows over v1..vi, then mean(v2..v5) once full.
    assert_eq!(means, vec![2.0, 3.0, 4.0, 5.0, 7.0]);
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Join withholds
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn join_never_emits_without_both_inputs() {
    let rig = rig();
    let a = ManualInput::<f64>::new(&rig.pipeline, "a");
    let b = ManualInput::<f64>::new(&rig.pipeline, "b");
    let join = Join2::new(&rig.pipeline, "diff", |x: &f64, y: &f64| x - y);
    a.connect_to(join.left());
    b.connect_to(join.right());
    join.connect_to(TelemetryOutput::<f64>::new(&rig.pipeline, "diff"));
    rig.pipeline.start().expect("topology is complete");

    for v in 0..20 {
        a.emit(f64::from(v));
    }
    assert_eq!(join.output().emit_count(), 0);
    assert!(rig.transport.is_empty());
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Drift-free periodic reads
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn periodic_producer_fires_on_exact_multiples() {
    let rig = rig();
    let times = Rc::new(RefCell::new(Vec::new()));
    let clock = rig.pipeline.clock().clone();
    let t = Rc::clone(&times);
    let probe = Producer::new(
        &rig.pipeline,
        "probe",
        move || -> Result<f64, ReadError> {
            t.borrow_mut().push(clock.now());
            Ok(0.0)
        },
        ms(100),
        None,
    );
    rig.pipeline.start().expect("start");

    for step in 0..5 {
        rig.lab.advance_to(ms(step * 100));
        rig.pipeline.run_once();
    }
    // Late wakeups must not push later fires back.
    for wake in [530, 660, 700] {
        rig.lab.advance_to(ms(wake));
        rig.pipeline.run_once();
    }
    let fired: Vec<u64> = times.borrow().iter().map(|d| d.as_millis() as u64).collect();
    assert_eq!(fired, vec![0, 100, 200, 300, 400, 530, 660, 700]);
    let task = probe.task_id().expect("scheduled");
    assert_eq!(rig.pipeline.scheduler().next_fire(task), Some(ms(800)));
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Transient read failure
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn failed_read_skips_reports_and_recovers() {
    let rig = rig();
    let tick = Rc::new(Cell::new(0u32));
    let t = Rc::clone(&tick);
    let probe = Producer::new(
        &rig.pipeline,
        "probe",
        move || {
            t.set(t.get() + 1);
            if t.get() == 3 {
                Err(ReadError::Timeout(ms(750)))
            } else {
                Ok(f64::from(t.get()))
            }
        },
        ms(1000),
        None,
    );
    probe.connect_to(TelemetryOutput::<f64>::new(&rig.pipeline, "probe"));
    rig.pipeline.start().expect("start");

    for step in 0..5 {
        rig.lab.advance_to(ms(step * 1000));
        rig.pipeline.run_once();
    }

    let published: Vec<f64> = rig
        .transport
        .values_for("probe")
        .iter()
        .filter_map(TelemetryValue::as_f64)
        .collect();
    assert_eq!(published, vec![1.0, 2.0, 4.0, 5.0]);
    assert_eq!(rig.diagnostics.len(), 1);
    assert_eq!(rig.diagnostics.reports()[0].severity, Severity::Warning);
    assert_eq!(probe.fault_count(), 1);
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Configuration persistence
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn binding_change_survives_rebind() {
    let rig = rig();
    let schema = || ConfigSchema::new().param(ParamSpec::float("gain", 1.0));
    let diag = rig.pipeline.diagnostics();

    let mut first = ConfigBinding::bind(Some("/x"), schema(), rig.pipeline.store(), Rc::clone(&diag));
    assert_eq!(first.float("gain"), Some(1.0));
    assert_eq!(rig.store.record("/x"), Some(record(json!({"gain": 1.0}))));

    let report = first.on_change(&record(json!({"gain": 2.5})));
    assert!(report.is_clean());
    assert_eq!(rig.store.record("/x"), Some(record(json!({"gain": 2.5}))));

    let fresh = ConfigBinding::bind(Some("/x"), schema(), rig.pipeline.store(), diag);
    assert_eq!(fresh.float("gain"), Some(2.5));
}

#[test]
fn management_surface_lists_and_describes_components() {
    let rig = rig();
    let source = ManualInput::<f64>::new(&rig.pipeline, "source");
    source
        .connect_to(Linear::new(&rig.pipeline, 2.0, 0.0, Some("/bilge/linear")))
        .connect_to(MovingAverage::new(&rig.pipeline, 10, 1.0, Some("/bilge/average")));

    assert_eq!(rig.pipeline.config_paths(), vec!["/bilge/average", "/bilge/linear"]);
    let described = rig.pipeline.describe_config("/bilge/linear").expect("registered");
    assert_eq!(described["values"]["multiplier"], json!(2.0));
    assert_eq!(described["path"], json!("/bilge/linear"));
}

#[test]
fn duplicate_config_path_fails_start() {
    let rig = rig();
    let _a = Linear::new(&rig.pipeline, 1.0, 0.0, Some("/same"));
    let _b = Linear::new(&rig.pipeline, 1.0, 0.0, Some("/same"));
    let err = rig.pipeline.start().expect_err("duplicate path");
    assert!(err.to_string().contains("/same"));
}

// ═════════════════════════════════════════════════════════════════════════
// 7. Chained wiring
// ═════════════════════════════════════════════════════════════════════════

#[test]
fn chain_forwards_computed_values() {
    let rig = rig();
    let a = ManualInput::<f64>::new(&rig.pipeline, "a");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    a.connect_to(Linear::new(&rig.pipeline, 3.0, 1.0, None))
        .connect_to(Sink::new(&rig.pipeline, "c", move |v: &f64| log.borrow_mut().push(*v)));

    a.emit(1.0);
    a.emit(2.0);
    assert_eq!(*seen.borrow(), vec![4.0, 7.0]);
}

#[test]
fn chain_built_from_temporaries_stays_alive() {
    let rig = rig();
    Producer::new(&rig.pipeline, "probe", || Ok::<f64, ReadError>(2.0), ms(500), None)
        .connect_to(Linear::new(&rig.pipeline, 10.0, 0.0, None))
        .connect_to(TelemetryOutput::<f64>::new(&rig.pipeline, "scaled"));
    rig.pipeline.start().expect("start");

    rig.pipeline.run_for(ms(1000));
    assert_eq!(
        rig.transport.values_for("scaled"),
        vec![TelemetryValue::Number(20.0), TelemetryValue::Number(20.0)]
    );
}

#[test]
fn cycle_fails_start() {
    let rig = rig();
    let source = ManualInput::<f64>::new(&rig.pipeline, "source");
    let first = source.connect_to(Linear::new(&rig.pipeline, 1.0, 0.0, None));
    let second = first.connect_to(Linear::new(&rig.pipeline, 1.0, 0.0, None));
    second.connect_to(first.clone());
    assert!(rig.pipeline.start().is_err());
}

#[test]
#[should_panic(expected = "after the pipeline started")]
fn wiring_after_start_panics() {
    let rig = rig();
    let source = ManualInput::<f64>::new(&rig.pipeline, "source");
    rig.pipeline.start().expect("start");
    source.connect_to(Sink::new(&rig.pipeline, "late", |_: &f64| {}));
}
