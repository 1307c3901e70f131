#![forbid(unsafe_code)]

//! Diagnostics sink for recoverable pipeline faults.
//!
//! Producers report failed reads here and configuration bindings report
//! rejected or unreadable records. Nothing reported here stops the pipeline.
//!
//! [`TracingDiagnostics`] forwards to `tracing`; [`RecordingDiagnostics`]
//! keeps every report in memory for assertions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// How bad a reported condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Lowercase name, as used in structured log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External collaborator receiving fault reports.
pub trait DiagnosticsSink {
    fn report(&self, severity: Severity, message: &str);
}

// ─── Tracing-backed sink ─────────────────────────────────────────────────────

/// Forwards reports to `tracing` at the matching level and counts them.
#[derive(Debug, Default)]
pub struct TracingDiagnostics {
    reports: Cell<u64>,
}

impl TracingDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total reports received.
    #[must_use]
    pub fn reports(&self) -> u64 {
        self.reports.get()
    }
}

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        self.reports.set(self.reports.get() + 1);
        match severity {
            Severity::Debug => tracing::debug!("{message}"),
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

// ─── Recording sink ──────────────────────────────────────────────────────────

/// A single captured report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: Severity,
    pub message: String,
}

/// In-memory sink. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    entries: Rc<RefCell<Vec<Report>>>,
}

impl RecordingDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.entries.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Number of reports at or above `severity`.
    #[must_use]
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|r| r.severity >= severity)
            .count()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn report(&self, severity: Severity, message: &str) {
        self.entries.borrow_mut().push(Report {
            severity,
            message: message.to_owned(),
        });
    }
}
