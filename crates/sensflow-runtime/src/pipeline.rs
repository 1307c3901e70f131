#![forbid(unsafe_code)]

//! The pipeline context: one per process, passed explicitly to every
//! component instead of living in a global.
//!
//! It owns the clock, the scheduler, the topology graph, and the handles to
//! the external collaborators (diagnostics sink, configuration store,
//! telemetry transport), plus the registry of configurable components keyed
//! by configuration path.
//!
//! # Lifecycle
//!
//! 1. Build with [`Pipeline::builder`].
//! 2. Construct producers, transforms, consumers; wire them with
//!    `connect_to`.
//! 3. [`Pipeline::start`] validates the topology and seals it.
//! 4. Drive with [`Pipeline::run_once`] or [`Pipeline::run_until`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use web_time::Duration;

use sensflow_core::clock::Clock;
use sensflow_core::diagnostics::{DiagnosticsSink, TracingDiagnostics};
use sensflow_core::scheduler::Scheduler;

use crate::config::{ChangeReport, ConfigRecord, ConfigStore, Configurable, MemoryStore};
use crate::error::{PipelineError, Result};
use crate::reactive::graph::{Graph, NodeId, NodeKind, SharedGraph};
use crate::transport::{LogTransport, TelemetryTransport};

/// Longest the host loop sleeps when nothing is scheduled.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(100);

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    hostname: String,
    clock: Clock,
    diagnostics: Rc<dyn DiagnosticsSink>,
    store: Rc<dyn ConfigStore>,
    transport: Rc<dyn TelemetryTransport>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            hostname: "sensflow".to_owned(),
            clock: Clock::real(),
            diagnostics: Rc::new(TracingDiagnostics::new()),
            store: Rc::new(MemoryStore::new()),
            transport: Rc::new(LogTransport),
        }
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, diagnostics: impl DiagnosticsSink + 'static) -> Self {
        self.diagnostics = Rc::new(diagnostics);
        self
    }

    #[must_use]
    pub fn store(mut self, store: impl ConfigStore + 'static) -> Self {
        self.store = Rc::new(store);
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: impl TelemetryTransport + 'static) -> Self {
        self.transport = Rc::new(transport);
        self
    }

    /// Share an existing transport handle (e.g. to shut it down later).
    #[must_use]
    pub fn shared_transport(mut self, transport: Rc<dyn TelemetryTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn build(self) -> Pipeline {
        tracing::info!(hostname = %self.hostname, lab_clock = self.clock.is_lab(), "pipeline created");
        Pipeline {
            scheduler: Scheduler::new(self.clock.clone()),
            hostname: self.hostname,
            clock: self.clock,
            graph: Rc::new(RefCell::new(Graph::new())),
            diagnostics: self.diagnostics,
            store: self.store,
            transport: self.transport,
            configurables: RefCell::new(BTreeMap::new()),
            duplicate_paths: RefCell::new(Vec::new()),
            started: Cell::new(false),
        }
    }
}

/// Explicit application context.
pub struct Pipeline {
    hostname: String,
    clock: Clock,
    scheduler: Scheduler,
    graph: SharedGraph,
    diagnostics: Rc<dyn DiagnosticsSink>,
    store: Rc<dyn ConfigStore>,
    transport: Rc<dyn TelemetryTransport>,
    configurables: RefCell<BTreeMap<String, Rc<dyn Configurable>>>,
    duplicate_paths: RefCell<Vec<String>>,
    started: Cell<bool>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.graph.borrow();
        f.debug_struct("Pipeline")
            .field("hostname", &self.hostname)
            .field("nodes", &graph.node_count())
            .field("edges", &graph.edge_count())
            .field("tasks", &self.scheduler.len())
            .field("started", &self.started.get())
            .finish()
    }
}

impl Pipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn diagnostics(&self) -> Rc<dyn DiagnosticsSink> {
        Rc::clone(&self.diagnostics)
    }

    #[must_use]
    pub fn store(&self) -> Rc<dyn ConfigStore> {
        Rc::clone(&self.store)
    }

    #[must_use]
    pub fn transport(&self) -> Rc<dyn TelemetryTransport> {
        Rc::clone(&self.transport)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.borrow().edge_count()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub(crate) fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub(crate) fn add_node(&self, kind: NodeKind, label: impl Into<String>, required_ports: u16) -> NodeId {
        let label = label.into();
        let id = self.graph.borrow_mut().add_node(kind, label.as_str(), required_ports);
        tracing::trace!(node = %id, ?kind, label = %label, "node added");
        id
    }

    pub(crate) fn register_configurable(&self, component: Rc<dyn Configurable>) {
        let Some(path) = component.config_path() else {
            return;
        };
        let mut registry = self.configurables.borrow_mut();
        if registry.contains_key(&path) {
            self.duplicate_paths.borrow_mut().push(path);
            return;
        }
        registry.insert(path, component);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate and seal the topology. After this, `connect_to` panics.
    pub fn start(&self) -> Result<()> {
        if self.started.get() {
            return Err(PipelineError::AlreadyStarted);
        }
        if let Some(path) = self.duplicate_paths.borrow().first() {
            return Err(PipelineError::DuplicateConfigPath { path: path.clone() });
        }
        let mut graph = self.graph.borrow_mut();
        graph.validate()?;
        graph.seal();
        self.started.set(true);
        tracing::info!(
            hostname = %self.hostname,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            tasks = self.scheduler.len(),
            "pipeline started"
        );
        Ok(())
    }

    /// Fire every due task once. Returns the number fired.
    ///
    /// # Panics
    ///
    /// Panics if [`Pipeline::start`] has not succeeded.
    pub fn run_once(&self) -> usize {
        assert!(
            self.started.get(),
            "Pipeline::run_once called before a successful Pipeline::start"
        );
        self.scheduler.run_once()
    }

    /// Host loop: run due tasks, sleep until the next one (at most `idle`),
    /// repeat until `stop` returns true. `stop` is checked before each run.
    pub fn run_until(&self, idle: Duration, mut stop: impl FnMut() -> bool) {
        while !stop() {
            self.run_once();
            let wait = self
                .scheduler
                .time_until_next()
                .map_or(idle, |next| next.min(idle));
            if !wait.is_zero() {
                self.clock.sleep(wait);
            }
        }
    }

    /// Run the host loop for `duration` of clock time.
    pub fn run_for(&self, duration: Duration) {
        let deadline = self.clock.now() + duration;
        let clock = self.clock.clone();
        self.run_until(DEFAULT_IDLE, move || clock.now() >= deadline);
    }

    // ── Management surface ───────────────────────────────────────────

    /// Configuration paths of every registered component, sorted.
    #[must_use]
    pub fn config_paths(&self) -> Vec<String> {
        self.configurables.borrow().keys().cloned().collect()
    }

    /// Schema and current values of the component bound to `path`.
    #[must_use]
    pub fn describe_config(&self, path: &str) -> Option<Value> {
        let component = self.configurables.borrow().get(path).cloned()?;
        Some(component.describe())
    }

    /// Apply an external configuration change to the component at `path`.
    pub fn update_config(&self, path: &str, changes: &ConfigRecord) -> Result<ChangeReport> {
        let component = self
            .configurables
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownConfigPath {
                path: path.to_owned(),
            })?;
        Ok(component.update(changes))
    }
}
