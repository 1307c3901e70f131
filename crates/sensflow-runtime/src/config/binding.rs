#![forbid(unsafe_code)]

//! Binding of a component's parameters to a durable configuration path.
//!
//! # Invariants
//!
//! 1. With a path, the store is read exactly once, in [`ConfigBinding::bind`].
//! 2. Binding never fails: a miss, an unreadable record, or an invalid field
//!    falls back to defaults for what could not be used, and the repaired
//!    record is written back.
//! 3. The store is written once per accepted [`ConfigBinding::on_change`]
//!    call, never from the data path.
//! 4. A rejected field keeps its previous value.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Value, json};

use sensflow_core::diagnostics::{DiagnosticsSink, Severity};

use super::ConfigRecord;
use super::schema::ConfigSchema;
use super::store::ConfigStore;

/// A field `on_change` refused, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub field: String,
    pub reason: String,
}

/// Outcome of one external configuration change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub applied: Vec<String>,
    pub rejected: Vec<Rejection>,
}

impl ChangeReport {
    /// Whether every submitted field was applied.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    #[must_use]
    pub fn was_applied(&self, field: &str) -> bool {
        self.applied.iter().any(|f| f == field)
    }
}

/// Live parameter values of one component, optionally persisted.
pub struct ConfigBinding {
    path: Option<String>,
    schema: ConfigSchema,
    values: ConfigRecord,
    store: Rc<dyn ConfigStore>,
    diagnostics: Rc<dyn DiagnosticsSink>,
}

impl fmt::Debug for ConfigBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBinding")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl ConfigBinding {
    /// Load the parameters at `path`, or start from defaults.
    ///
    /// `None` means the component is not persisted; defaults stay live and
    /// changes are applied in memory only.
    pub fn bind(
        path: Option<&str>,
        schema: ConfigSchema,
        store: Rc<dyn ConfigStore>,
        diagnostics: Rc<dyn DiagnosticsSink>,
    ) -> Self {
        let mut binding = Self {
            path: path.map(str::to_owned),
            values: schema.defaults(),
            schema,
            store,
            diagnostics,
        };
        if let Some(path) = path {
            binding.load(path);
        }
        binding
    }

    fn load(&mut self, path: &str) {
        let stored = match self.store.load(path) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::info!(path, "no stored configuration, writing defaults");
                self.persist();
                return;
            }
            Err(err) => {
                self.diagnostics.report(
                    Severity::Warning,
                    &format!("{path}: could not load configuration ({err}), using defaults"),
                );
                self.persist();
                return;
            }
        };

        let mut repaired = false;
        for spec in self.schema.iter() {
            match stored.get(&spec.name) {
                None => repaired = true,
                Some(raw) => match spec.validate(raw) {
                    Ok(value) => {
                        self.values.insert(spec.name.clone(), value);
                    }
                    Err(reason) => {
                        self.diagnostics.report(
                            Severity::Warning,
                            &format!("{path}: stored {} is invalid ({reason}), using default", spec.name),
                        );
                        repaired = true;
                    }
                },
            }
        }
        if stored.keys().any(|k| self.schema.get(k).is_none()) {
            repaired = true;
        }
        tracing::debug!(path, repaired, "configuration loaded");
        if repaired {
            self.persist();
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(err) = self.store.save(path, &self.values) {
            self.diagnostics.report(
                Severity::Error,
                &format!("{path}: could not save configuration ({err})"),
            );
        }
    }

    /// Apply an externally submitted change.
    ///
    /// Each field is validated on its own; valid ones are applied, the
    /// merged record is persisted once, and every rejection is reported.
    pub fn on_change(&mut self, changes: &ConfigRecord) -> ChangeReport {
        let mut report = ChangeReport::default();
        for (field, raw) in changes {
            let verdict = match self.schema.get(field) {
                None => Err("unknown parameter".to_owned()),
                Some(spec) => spec.validate(raw),
            };
            match verdict {
                Ok(value) => {
                    self.values.insert(field.clone(), value);
                    report.applied.push(field.clone());
                }
                Err(reason) => report.rejected.push(Rejection {
                    field: field.clone(),
                    reason,
                }),
            }
        }

        let label = self.path.as_deref().unwrap_or("<unbound>");
        for rejection in &report.rejected {
            self.diagnostics.report(
                Severity::Warning,
                &format!("{label}: rejected {}: {}", rejection.field, rejection.reason),
            );
        }
        if !report.applied.is_empty() {
            tracing::info!(path = label, applied = ?report.applied, "configuration changed");
            self.persist();
        }
        report
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &ConfigRecord {
        &self.values
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Path, schema, and current values as one JSON document.
    #[must_use]
    pub fn describe(&self) -> Value {
        json!({
            "path": self.path,
            "schema": self.schema.to_json(),
            "values": self.values,
        })
    }
}
