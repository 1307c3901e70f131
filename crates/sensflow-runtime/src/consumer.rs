#![forbid(unsafe_code)]

//! Consumers: the ends of a cascade. They listen and never emit.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use sensflow_core::clock::Clock;

use crate::pipeline::Pipeline;
use crate::reactive::graph::SharedGraph;
use crate::reactive::{InputPort, Listens, NodeId, NodeKind};
use crate::transport::{Sample, TelemetryTransport, TelemetryValue};

// ─── Telemetry output ────────────────────────────────────────────────────────

struct OutputState {
    path: String,
    clock: Clock,
    transport: Rc<dyn TelemetryTransport>,
    published: Cell<u64>,
}

impl OutputState {
    fn publish(&self, value: TelemetryValue) {
        self.published.set(self.published.get() + 1);
        self.transport.publish(Sample {
            path: self.path.clone(),
            value,
            timestamp: self.clock.now(),
        });
    }
}

/// Publishes every value it receives under a fixed telemetry path,
/// timestamped with pipeline uptime.
pub struct TelemetryOutput<T> {
    state: Rc<OutputState>,
    graph: SharedGraph,
    node: NodeId,
    _value: PhantomData<fn(T)>,
}

impl<T> Clone for TelemetryOutput<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            graph: Rc::clone(&self.graph),
            node: self.node,
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TelemetryOutput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryOutput")
            .field("path", &self.state.path)
            .field("published", &self.state.published.get())
            .finish()
    }
}

impl<T: Clone + Into<TelemetryValue> + 'static> TelemetryOutput<T> {
    #[must_use]
    pub fn new(pipeline: &Pipeline, path: impl Into<String>) -> Self {
        let path = path.into();
        let node = pipeline.add_node(NodeKind::Consumer, path.as_str(), 0);
        Self {
            state: Rc::new(OutputState {
                path,
                clock: pipeline.clock().clone(),
                transport: pipeline.transport(),
                published: Cell::new(0),
            }),
            graph: Rc::clone(pipeline.graph()),
            node,
            _value: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.state.path
    }

    /// Samples handed to the transport so far.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.state.published.get()
    }
}

impl<T: Clone + Into<TelemetryValue> + 'static> Listens<T> for TelemetryOutput<T> {
    fn input(&self) -> InputPort<T> {
        let state = Rc::clone(&self.state);
        let callback = Rc::new(move |v: &T| state.publish(v.clone().into()));
        InputPort::new(&self.graph, self.node, 0, callback)
    }
}

// ─── Closure sink ────────────────────────────────────────────────────────────

/// Runs a side effect (log, actuate) for every value it receives.
pub struct Sink<T> {
    effect: Rc<dyn Fn(&T)>,
    graph: SharedGraph,
    node: NodeId,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            effect: Rc::clone(&self.effect),
            graph: Rc::clone(&self.graph),
            node: self.node,
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").field("node", &self.node).finish()
    }
}

impl<T: Clone + 'static> Sink<T> {
    pub fn new(pipeline: &Pipeline, label: impl Into<String>, effect: impl Fn(&T) + 'static) -> Self {
        let node = pipeline.add_node(NodeKind::Consumer, label, 0);
        Self {
            effect: Rc::new(effect),
            graph: Rc::clone(pipeline.graph()),
            node,
        }
    }
}

impl<T: Clone + 'static> Listens<T> for Sink<T> {
    fn input(&self) -> InputPort<T> {
        InputPort::new(&self.graph, self.node, 0, Rc::clone(&self.effect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::ManualInput;
    use crate::reactive::Emits;
    use crate::transport::RecordingTransport;
    use sensflow_core::clock::LabClock;
    use std::cell::RefCell;
    use web_time::Duration;

    #[test]
    fn telemetry_output_publishes_with_uptime() {
        let lab = LabClock::new();
        let transport = RecordingTransport::new();
        let pipeline = Pipeline::builder()
            .clock(Clock::lab(&lab))
            .transport(transport.clone())
            .build();
        let input = ManualInput::<f64>::new(&pipeline, "raw");
        let out = input.connect_to(TelemetryOutput::new(&pipeline, "environment.bilge.temperature"));

        lab.advance(Duration::from_millis(1200));
        input.emit(291.5);
        input.emit(291.5);

        let samples = transport.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].path, "environment.bilge.temperature");
        assert_eq!(samples[0].value, TelemetryValue::Number(291.5));
        assert_eq!(samples[0].timestamp, Duration::from_millis(1200));
        assert_eq!(out.published(), 2);
    }

    #[test]
    fn sink_sees_every_value_in_order() {
        let pipeline = Pipeline::builder().build();
        let input = ManualInput::<u32>::new(&pipeline, "raw");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        input.connect_to(Sink::new(&pipeline, "log", move |v: &u32| log.borrow_mut().push(*v)));

        for v in [1, 1, 2] {
            input.emit(v);
        }
        assert_eq!(*seen.borrow(), vec![1, 1, 2]);
    }
}
