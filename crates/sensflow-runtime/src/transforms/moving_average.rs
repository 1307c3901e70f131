#![forbid(unsafe_code)]

//! Windowed mean over the last `sample_size` scaled inputs.
//!
//! # Invariants
//!
//! 1. Every input is multiplied by the current `multiplier` when it arrives
//!    and stored scaled; a later multiplier change never rescales history.
//! 2. Every input produces exactly one emission: the mean of the window
//!    after the push, partial windows included.
//! 3. A `sample_size` change rebuilds the window keeping the newest samples
//!    and emits nothing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::config::{ChangeReport, ConfigBinding, ConfigRecord, ConfigSchema, Configurable, ParamSpec};
use crate::pipeline::Pipeline;
use crate::reactive::{Emits, InputPort, Listens, NodeKind, ValueCell};

use super::window::RingWindow;

/// Largest accepted `sample_size`.
pub const MAX_SAMPLE_SIZE: i64 = 1000;

struct AverageState {
    output: ValueCell<f64>,
    window: RefCell<RingWindow>,
    config: RefCell<ConfigBinding>,
}

impl AverageState {
    fn multiplier(&self) -> f64 {
        self.config.borrow().float("multiplier").unwrap_or(1.0)
    }

    fn sample_size(&self) -> usize {
        self.config.borrow().integer("sample_size").unwrap_or(1).clamp(1, MAX_SAMPLE_SIZE) as usize
    }

    fn apply(&self, input: f64) {
        let scaled = input * self.multiplier();
        let mean = {
            let mut window = self.window.borrow_mut();
            window.push(scaled);
            window.mean()
        };
        if let Some(mean) = mean {
            self.output.set(mean);
        }
    }
}

impl Configurable for AverageState {
    fn config_path(&self) -> Option<String> {
        self.config.borrow().path().map(str::to_owned)
    }

    fn describe(&self) -> Value {
        self.config.borrow().describe()
    }

    fn update(&self, changes: &ConfigRecord) -> ChangeReport {
        let report = self.config.borrow_mut().on_change(changes);
        if report.was_applied("sample_size") {
            let capacity = self.sample_size();
            let resized = self.window.borrow().resized(capacity);
            *self.window.borrow_mut() = resized;
            tracing::debug!(capacity, "moving average window resized");
        }
        report
    }
}

/// Smoothing stage.
#[derive(Clone)]
pub struct MovingAverage {
    state: Rc<AverageState>,
}

impl fmt::Debug for MovingAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovingAverage")
            .field("window", &*self.state.window.borrow())
            .field("multiplier", &self.state.multiplier())
            .finish()
    }
}

impl MovingAverage {
    /// `sample_size` (clamped to `1..=1000`) and `multiplier` are the
    /// defaults; a stored record at `config_path` overrides them.
    pub fn new(pipeline: &Pipeline, sample_size: usize, multiplier: f64, config_path: Option<&str>) -> Self {
        let node = pipeline.add_node(NodeKind::Transform, "moving-average", 0);
        let default_size = (sample_size as i64).clamp(1, MAX_SAMPLE_SIZE);
        let schema = ConfigSchema::new()
            .param(
                ParamSpec::integer_range("sample_size", default_size, 1, MAX_SAMPLE_SIZE)
                    .describe("Number of samples averaged"),
            )
            .param(ParamSpec::float("multiplier", multiplier).describe("Scale applied to each sample on arrival"));
        let config = ConfigBinding::bind(config_path, schema, pipeline.store(), pipeline.diagnostics());
        let state = Rc::new(AverageState {
            output: ValueCell::new(pipeline.graph(), node),
            window: RefCell::new(RingWindow::new(1)),
            config: RefCell::new(config),
        });
        *state.window.borrow_mut() = RingWindow::new(state.sample_size());
        pipeline.register_configurable(Rc::clone(&state) as Rc<dyn Configurable>);
        Self { state }
    }

    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.state.sample_size()
    }

    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.state.multiplier()
    }

    /// Samples currently held.
    #[must_use]
    pub fn filled(&self) -> usize {
        self.state.window.borrow().len()
    }
}

impl Listens<f64> for MovingAverage {
    fn input(&self) -> InputPort<f64> {
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        InputPort::new(output.graph(), output.node_id(), 0, Rc::new(move |v: &f64| state.apply(*v)))
    }
}

impl Emits<f64> for MovingAverage {
    fn output(&self) -> &ValueCell<f64> {
        &self.state.output
    }
}
