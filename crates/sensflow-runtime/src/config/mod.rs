#![forbid(unsafe_code)]

//! Runtime-configurable, persistable component parameters.
//!
//! - [`ConfigSchema`] / [`ParamSpec`]: what a component exposes.
//! - [`ConfigStore`]: the durable backend ([`MemoryStore`], [`JsonFileStore`]).
//! - [`ConfigBinding`]: load-once / save-on-change glue between the two.
//! - [`Configurable`]: what the pipeline's management surface talks to.

pub mod binding;
pub mod schema;
pub mod store;

pub use binding::{ChangeReport, ConfigBinding, Rejection};
pub use schema::{ConfigSchema, ParamKind, ParamSpec};
pub use store::{ConfigStore, JsonFileStore, MemoryStore};

/// A stored or submitted parameter set.
pub type ConfigRecord = serde_json::Map<String, serde_json::Value>;

/// A component whose parameters can be inspected and changed at runtime.
///
/// Changes apply to inputs arriving after the call; nothing already
/// processed is recomputed.
pub trait Configurable {
    fn config_path(&self) -> Option<String>;

    /// Path, schema, and current values.
    fn describe(&self) -> serde_json::Value;

    fn update(&self, changes: &ConfigRecord) -> ChangeReport;
}
