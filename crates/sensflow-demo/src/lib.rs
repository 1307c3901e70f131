#![forbid(unsafe_code)]

//! Bilge and temperature monitor built on `sensflow-runtime`, reading
//! simulated hardware.
//!
//! Telemetry samples are written to stdout as JSON lines; logs go to stderr.

pub mod cli;
pub mod error;
pub mod logging;
pub mod netinfo;
pub mod settings;
pub mod sim;
pub mod topology;

pub use cli::{Cli, run, run_from_env};
pub use error::{DemoError, Result};
pub use settings::Settings;
