//! Subscriber setup. Logs go to stderr so stdout carries only telemetry.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::{DemoError, Result};

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .try_init()
        .map_err(|e| DemoError::Logging {
            message: e.to_string(),
        })
}
