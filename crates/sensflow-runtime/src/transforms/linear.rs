#![forbid(unsafe_code)]

//! `out = in * multiplier + offset`, with both coefficients persisted.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::config::{ChangeReport, ConfigBinding, ConfigRecord, ConfigSchema, Configurable, ParamSpec};
use crate::pipeline::Pipeline;
use crate::reactive::{Emits, InputPort, Listens, NodeKind, ValueCell};

struct LinearState {
    output: ValueCell<f64>,
    config: RefCell<ConfigBinding>,
}

impl LinearState {
    fn coefficients(&self) -> (f64, f64) {
        let config = self.config.borrow();
        (
            config.float("multiplier").unwrap_or(1.0),
            config.float("offset").unwrap_or(0.0),
        )
    }

    fn apply(&self, input: f64) {
        let (multiplier, offset) = self.coefficients();
        self.output.set(input * multiplier + offset);
    }
}

impl Configurable for LinearState {
    fn config_path(&self) -> Option<String> {
        self.config.borrow().path().map(str::to_owned)
    }

    fn describe(&self) -> Value {
        self.config.borrow().describe()
    }

    fn update(&self, changes: &ConfigRecord) -> ChangeReport {
        self.config.borrow_mut().on_change(changes)
    }
}

/// Affine calibration stage.
#[derive(Clone)]
pub struct Linear {
    state: Rc<LinearState>,
}

impl fmt::Debug for Linear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (multiplier, offset) = self.state.coefficients();
        f.debug_struct("Linear")
            .field("multiplier", &multiplier)
            .field("offset", &offset)
            .field("output", &self.state.output)
            .finish()
    }
}

impl Linear {
    /// `multiplier` and `offset` are the defaults; a stored record at
    /// `config_path` overrides them.
    pub fn new(pipeline: &Pipeline, multiplier: f64, offset: f64, config_path: Option<&str>) -> Self {
        let node = pipeline.add_node(NodeKind::Transform, "linear", 0);
        let schema = ConfigSchema::new()
            .param(ParamSpec::float("multiplier", multiplier).describe("Scale applied to every input"))
            .param(ParamSpec::float("offset", offset).describe("Added after scaling"));
        let config = ConfigBinding::bind(config_path, schema, pipeline.store(), pipeline.diagnostics());
        let state = Rc::new(LinearState {
            output: ValueCell::new(pipeline.graph(), node),
            config: RefCell::new(config),
        });
        pipeline.register_configurable(Rc::clone(&state) as Rc<dyn Configurable>);
        Self { state }
    }

    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.state.coefficients().0
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        self.state.coefficients().1
    }
}

impl Listens<f64> for Linear {
    fn input(&self) -> InputPort<f64> {
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        InputPort::new(output.graph(), output.node_id(), 0, Rc::new(move |v: &f64| state.apply(*v)))
    }
}

impl Emits<f64> for Linear {
    fn output(&self) -> &ValueCell<f64> {
        &self.state.output
    }
}
