#![forbid(unsafe_code)]

//! Reactive sensor pipeline runtime.
//!
//! Periodic [`Producer`]s read inputs and emit values into
//! [`ValueCell`](reactive::ValueCell)s; transforms calibrate, smooth, and
//! combine them; consumers publish the results. Every value move is a
//! synchronous cascade driven by one cooperative
//! [`Scheduler`](sensflow_core::Scheduler).
//!
//! # Example
//!
//! ```ignore
//! let pipeline = Pipeline::builder().hostname("bilge-temp-monitor").build();
//! Producer::new(&pipeline, "probe", read_probe, Duration::from_secs(1), Some("/bilge/probe"))
//!     .connect_to(Linear::new(&pipeline, 1.0, 273.15, Some("/bilge/linear")))
//!     .connect_to(TelemetryOutput::new(&pipeline, "environment.bilge.temperature"));
//! pipeline.start()?;
//! pipeline.run_until(DEFAULT_IDLE, || shutdown.load(Ordering::Relaxed));
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod pipeline;
pub mod producer;
pub mod reactive;
pub mod system;
pub mod transforms;
pub mod transport;

pub use config::{
    ChangeReport, ConfigBinding, ConfigRecord, ConfigSchema, ConfigStore, Configurable, JsonFileStore,
    MemoryStore, ParamKind, ParamSpec, Rejection,
};
pub use consumer::{Sink, TelemetryOutput};
pub use error::{PipelineError, ReadError, Result, StoreError};
pub use pipeline::{DEFAULT_IDLE, Pipeline, PipelineBuilder};
pub use producer::{ManualInput, Producer, ReadInput};
pub use reactive::{Emits, Listens, NodeId, NodeKind, ValueCell};
pub use system::{DEVICE_PATH_ROOT, SystemSensorLevel, SystemSensors, device_path};
pub use transforms::{Join2, JoinAll, JoinInput, Lambda, Linear, MovingAverage, RingWindow};
pub use transport::{
    DEFAULT_QUEUE_CAPACITY, LogTransport, QueuedTransport, RecordingTransport, Sample, TelemetryTransport,
    TelemetryValue,
};

pub use sensflow_core::{Clock, DiagnosticsSink, Interval, LabClock, RecordingDiagnostics, Severity, TracingDiagnostics};
