use std::path::PathBuf;

use thiserror::Error;
use web_time::Duration;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Topology misuse detected when the pipeline starts, or a management call
/// that names something the pipeline does not have.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("topology contains a cycle through: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("{node} has {missing} unconnected input port(s)")]
    UnconnectedInput { node: String, missing: usize },

    #[error("configuration path {path} is claimed by more than one component")]
    DuplicateConfigPath { path: String },

    #[error("no component is bound to configuration path {path}")]
    UnknownConfigPath { path: String },

    #[error("pipeline already started")]
    AlreadyStarted,
}

/// Why a hardware or simulated input produced no value this tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("reading {value} outside valid range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("device disconnected: {0}")]
    Disconnected(String),

    /// A multi-tick read has not completed yet. Not reported as a fault.
    #[error("read still in progress")]
    Pending,

    #[error("{0}")]
    Other(String),
}

impl ReadError {
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether this outcome is a fault worth reporting.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Failure of the configuration storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("record at {path} is not a JSON object")]
    NotAnObject { path: String },

    #[error("invalid configuration path: {path:?}")]
    InvalidPath { path: String },
}
