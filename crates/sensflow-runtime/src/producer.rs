#![forbid(unsafe_code)]

//! Producers: the sources of a cascade.
//!
//! A [`Producer`] owns a periodic scheduler task. Each fire calls its
//! [`ReadInput`] once and, on success, sets the output cell, which runs the
//! whole downstream cascade before the task returns.
//!
//! # Failure Modes
//!
//! - A failed read emits nothing. The fault is reported to the diagnostics
//!   sink at `Warning` and the next tick reads again; nothing is sticky and
//!   no stale value is re-sent.
//! - [`ReadError::Pending`] is the normal outcome of a multi-tick read and is
//!   skipped without a report. With [`Producer::with_pending_poll`] the read
//!   is retried on a one-shot follow-up task, so a multi-tick read still
//!   yields one value per read delay.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use web_time::Duration;

use sensflow_core::diagnostics::{DiagnosticsSink, Severity};
use sensflow_core::scheduler::{Interval, TaskId, WeakScheduler};

use crate::config::{ChangeReport, ConfigBinding, ConfigRecord, ConfigSchema, Configurable, ParamSpec};
use crate::error::ReadError;
use crate::pipeline::Pipeline;
use crate::reactive::{Emits, NodeId, NodeKind, ValueCell};

/// Upper bound for the `read_delay` parameter (one day).
pub const MAX_READ_DELAY_MS: i64 = 86_400_000;

/// One hardware (or simulated) read.
///
/// Implemented for every `FnMut() -> Result<T, ReadError>`. A read that
/// talks to a shared bus should borrow the bus for the whole transaction.
pub trait ReadInput<T> {
    fn read(&mut self) -> Result<T, ReadError>;
}

impl<T, F> ReadInput<T> for F
where
    F: FnMut() -> Result<T, ReadError>,
{
    fn read(&mut self) -> Result<T, ReadError> {
        self()
    }
}

fn read_delay_schema(default: Duration) -> ConfigSchema {
    let default_ms = default.as_millis().clamp(1, MAX_READ_DELAY_MS as u128) as i64;
    ConfigSchema::new().param(
        ParamSpec::integer_range("read_delay", default_ms, 1, MAX_READ_DELAY_MS)
            .describe("Milliseconds between reads"),
    )
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(1) as u64)
}

// ─── Periodic producer ───────────────────────────────────────────────────────

struct ProducerState<T> {
    label: String,
    output: ValueCell<T>,
    input: RefCell<Box<dyn ReadInput<T>>>,
    scheduler: WeakScheduler,
    task: Cell<Option<TaskId>>,
    pending_poll: Cell<Option<Duration>>,
    /// Outstanding one-shot retry of a pending read.
    follow_up: Cell<Option<TaskId>>,
    max_jitter: Cell<Duration>,
    config: RefCell<ConfigBinding>,
    diagnostics: Rc<dyn DiagnosticsSink>,
    faults: Cell<u64>,
}

impl<T: Clone + 'static> ProducerState<T> {
    fn tick(self: &Rc<Self>) {
        // The cascade below must not run under the input borrow.
        let outcome = self.input.borrow_mut().read();
        match outcome {
            Ok(value) => self.output.set(value),
            Err(ReadError::Pending) => self.poll_again(),
            Err(err) => {
                self.faults.set(self.faults.get() + 1);
                self.diagnostics
                    .report(Severity::Warning, &format!("{}: read failed: {err}", self.label));
            }
        }
    }

    fn poll_again(self: &Rc<Self>) {
        let (Some(delay), Some(scheduler)) = (self.pending_poll.get(), self.scheduler.upgrade()) else {
            return;
        };
        if self.follow_up.get().is_some_and(|id| scheduler.contains(id)) {
            return;
        }
        let state = Rc::clone(self);
        let id = scheduler.after(delay, move |_| {
            state.follow_up.set(None);
            state.tick();
        });
        self.follow_up.set(Some(id));
        tracing::trace!(producer = %self.label, task = %id, "pending read, polling again");
    }

    fn interval(&self) -> Interval {
        let period = millis(self.config.borrow().integer("read_delay").unwrap_or(1));
        Interval::jittered(period, self.max_jitter.get())
    }

    fn reschedule(&self) {
        let (Some(task), Some(scheduler)) = (self.task.get(), self.scheduler.upgrade()) else {
            return;
        };
        let interval = self.interval();
        scheduler.set_interval(task, interval);
        tracing::debug!(
            producer = %self.label,
            task = %task,
            period_ms = interval.period().as_millis() as u64,
            "read delay changed"
        );
    }
}

impl<T: Clone + 'static> Configurable for ProducerState<T> {
    fn config_path(&self) -> Option<String> {
        self.config.borrow().path().map(str::to_owned)
    }

    fn describe(&self) -> Value {
        self.config.borrow().describe()
    }

    fn update(&self, changes: &ConfigRecord) -> ChangeReport {
        let report = self.config.borrow_mut().on_change(changes);
        if report.was_applied("read_delay") {
            self.reschedule();
        }
        report
    }
}

/// Periodic source of values of type `T`.
///
/// The handle is cheap to clone. The scheduler task keeps the producer (and
/// through its listeners, the rest of the chain) alive for the life of the
/// pipeline, so the handle may be dropped after wiring.
pub struct Producer<T> {
    state: Rc<ProducerState<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("label", &self.state.label)
            .field("task", &self.state.task.get())
            .field("output", &self.state.output)
            .finish()
    }
}

impl<T: Clone + 'static> Producer<T> {
    /// Register a producer that reads `input` every `read_delay`, first read
    /// immediately.
    ///
    /// With `config_path`, `read_delay` is a persisted parameter and the
    /// stored value (if any) wins over the argument.
    pub fn new(
        pipeline: &Pipeline,
        label: impl Into<String>,
        input: impl ReadInput<T> + 'static,
        read_delay: Duration,
        config_path: Option<&str>,
    ) -> Self {
        let label = label.into();
        let node = pipeline.add_node(NodeKind::Producer, label.as_str(), 0);
        let config = ConfigBinding::bind(
            config_path,
            read_delay_schema(read_delay),
            pipeline.store(),
            pipeline.diagnostics(),
        );
        let state = Rc::new(ProducerState {
            label,
            output: ValueCell::new(pipeline.graph(), node),
            input: RefCell::new(Box::new(input)),
            scheduler: pipeline.scheduler().downgrade(),
            task: Cell::new(None),
            pending_poll: Cell::new(None),
            follow_up: Cell::new(None),
            max_jitter: Cell::new(Duration::ZERO),
            config: RefCell::new(config),
            diagnostics: pipeline.diagnostics(),
            faults: Cell::new(0),
        });

        let ticking = Rc::clone(&state);
        let task = pipeline.scheduler().every(state.interval(), move |_| ticking.tick());
        state.task.set(Some(task));
        pipeline.register_configurable(Rc::clone(&state) as Rc<dyn Configurable>);

        tracing::debug!(producer = %state.label, node = %node, task = %task, "producer registered");
        Self { state }
    }

    /// Delay each read by a random amount up to `max_jitter` (clamped to the
    /// read delay). Takes effect from the next scheduled read.
    #[must_use]
    pub fn with_jitter(self, max_jitter: Duration) -> Self {
        self.state.max_jitter.set(max_jitter);
        self.state.reschedule();
        self
    }

    /// While a read reports [`ReadError::Pending`], read again `interval`
    /// later instead of waiting for the next read delay. At most one retry
    /// is outstanding at a time.
    #[must_use]
    pub fn with_pending_poll(self, interval: Duration) -> Self {
        self.state.pending_poll.set(Some(interval));
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.state.label
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.state.output.node_id()
    }

    #[must_use]
    pub fn task_id(&self) -> Option<TaskId> {
        self.state.task.get()
    }

    /// Current read delay.
    #[must_use]
    pub fn read_delay(&self) -> Duration {
        self.state.interval().period()
    }

    /// Failed reads so far (pending reads excluded).
    #[must_use]
    pub fn fault_count(&self) -> u64 {
        self.state.faults.get()
    }

    /// Stop reading, including any pending retry. The output keeps its last
    /// value.
    pub fn stop(&self) -> bool {
        let (Some(task), Some(scheduler)) = (self.state.task.take(), self.state.scheduler.upgrade()) else {
            return false;
        };
        if let Some(follow_up) = self.state.follow_up.take() {
            scheduler.cancel(follow_up);
        }
        scheduler.cancel(task)
    }
}

impl<T: Clone + 'static> Emits<T> for Producer<T> {
    fn output(&self) -> &ValueCell<T> {
        &self.state.output
    }
}

// ─── Manual producer ─────────────────────────────────────────────────────────

/// A source driven by the host instead of the scheduler: each
/// [`ManualInput::emit`] runs the cascade immediately.
pub struct ManualInput<T> {
    output: ValueCell<T>,
}

impl<T> Clone for ManualInput<T> {
    fn clone(&self) -> Self {
        Self {
            output: self.output.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ManualInput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualInput").field("output", &self.output).finish()
    }
}

impl<T: Clone + 'static> ManualInput<T> {
    #[must_use]
    pub fn new(pipeline: &Pipeline, label: impl Into<String>) -> Self {
        let node = pipeline.add_node(NodeKind::Producer, label, 0);
        Self {
            output: ValueCell::new(pipeline.graph(), node),
        }
    }

    pub fn emit(&self, value: T) {
        self.output.set(value);
    }
}

impl<T: Clone + 'static> Emits<T> for ManualInput<T> {
    fn output(&self) -> &ValueCell<T> {
        &self.output
    }
}
