#![forbid(unsafe_code)]

//! Core: uptime clocks, the cooperative scheduler, and the diagnostics sink.

pub mod clock;
pub mod diagnostics;
pub mod scheduler;

pub use clock::{Clock, LabClock};
pub use diagnostics::{DiagnosticsSink, RecordingDiagnostics, Report, Severity, TracingDiagnostics};
pub use scheduler::{Interval, Scheduler, TaskId, WeakScheduler};
