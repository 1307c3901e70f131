use std::path::PathBuf;

use sensflow_runtime::{PipelineError, StoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DemoError>;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read settings {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: Box<DemoError>,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("logging already initialised: {message}")]
    Logging { message: String },
}

impl DemoError {
    /// Process exit status: 2 for usage mistakes, 3 for topology misuse,
    /// 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::Settings { .. } => 2,
            Self::Pipeline(_) => 3,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
