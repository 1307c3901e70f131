#![forbid(unsafe_code)]

//! Multi-input transforms.
//!
//! A join remembers the latest value seen on each port and recomputes on
//! every notification from any port. Until every port has delivered at
//! least once it emits nothing.
//!
//! Every port is a required input: [`Pipeline::start`] fails while one of
//! them is unconnected.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::pipeline::Pipeline;
use crate::reactive::{Emits, InputPort, Listens, NodeKind, ValueCell};

/// One input port of a join, ready to hand to `connect_to`.
pub struct JoinInput<T> {
    port: InputPort<T>,
}

impl<T> Clone for JoinInput<T> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
        }
    }
}

impl<T> fmt::Debug for JoinInput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JoinInput").field(&self.port).finish()
    }
}

impl<T: Clone + 'static> Listens<T> for JoinInput<T> {
    fn input(&self) -> InputPort<T> {
        self.port.clone()
    }
}

// ─── Two heterogeneous inputs ────────────────────────────────────────────────

type Combine2<A, B, O> = Box<dyn Fn(&A, &B) -> O>;

struct Join2State<A, B, O> {
    output: ValueCell<O>,
    left: RefCell<Option<A>>,
    right: RefCell<Option<B>>,
    combine: Combine2<A, B, O>,
}

impl<A: Clone + 'static, B: Clone + 'static, O: Clone + 'static> Join2State<A, B, O> {
    fn recompute(&self) {
        let out = {
            let left = self.left.borrow();
            let right = self.right.borrow();
            match (left.as_ref(), right.as_ref()) {
                (Some(a), Some(b)) => Some((self.combine)(a, b)),
                _ => None,
            }
        };
        if let Some(out) = out {
            self.output.set(out);
        }
    }
}

/// Emits `combine(&left, &right)` whenever either side changes.
pub struct Join2<A, B, O> {
    state: Rc<Join2State<A, B, O>>,
}

impl<A, B, O> Clone for Join2<A, B, O> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<A, B, O: fmt::Debug> fmt::Debug for Join2<A, B, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join2").field("output", &self.state.output).finish()
    }
}

impl<A: Clone + 'static, B: Clone + 'static, O: Clone + 'static> Join2<A, B, O> {
    pub fn new(pipeline: &Pipeline, label: impl Into<String>, combine: impl Fn(&A, &B) -> O + 'static) -> Self {
        let node = pipeline.add_node(NodeKind::Transform, label, 2);
        Self {
            state: Rc::new(Join2State {
                output: ValueCell::new(pipeline.graph(), node),
                left: RefCell::new(None),
                right: RefCell::new(None),
                combine: Box::new(combine),
            }),
        }
    }

    /// Port 0.
    #[must_use]
    pub fn left(&self) -> JoinInput<A> {
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        let callback = Rc::new(move |v: &A| {
            *state.left.borrow_mut() = Some(v.clone());
            state.recompute();
        });
        JoinInput {
            port: InputPort::new(output.graph(), output.node_id(), 0, callback),
        }
    }

    /// Port 1.
    #[must_use]
    pub fn right(&self) -> JoinInput<B> {
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        let callback = Rc::new(move |v: &B| {
            *state.right.borrow_mut() = Some(v.clone());
            state.recompute();
        });
        JoinInput {
            port: InputPort::new(output.graph(), output.node_id(), 1, callback),
        }
    }
}

impl<A: Clone + 'static, B: Clone + 'static, O: Clone + 'static> Emits<O> for Join2<A, B, O> {
    fn output(&self) -> &ValueCell<O> {
        &self.state.output
    }
}

// ─── N homogeneous inputs ────────────────────────────────────────────────────

type CombineAll<T, O> = Box<dyn Fn(&[T]) -> O>;

struct JoinAllState<T, O> {
    output: ValueCell<O>,
    latest: RefCell<Vec<Option<T>>>,
    combine: CombineAll<T, O>,
}

impl<T: Clone + 'static, O: Clone + 'static> JoinAllState<T, O> {
    fn receive(&self, port: usize, value: &T) {
        let out = {
            let mut latest = self.latest.borrow_mut();
            latest[port] = Some(value.clone());
            let values: Option<Vec<T>> = latest.iter().cloned().collect();
            values.map(|values| (self.combine)(&values))
        };
        if let Some(out) = out {
            self.output.set(out);
        }
    }
}

/// Emits `combine(&[v0, v1, ..])` over the latest value of each port.
pub struct JoinAll<T, O> {
    state: Rc<JoinAllState<T, O>>,
}

impl<T, O> Clone for JoinAll<T, O> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, O: fmt::Debug> fmt::Debug for JoinAll<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinAll")
            .field("ports", &self.state.latest.borrow().len())
            .field("output", &self.state.output)
            .finish()
    }
}

impl<T: Clone + 'static, O: Clone + 'static> JoinAll<T, O> {
    /// A join over `ports` inputs (at least one).
    pub fn new(
        pipeline: &Pipeline,
        label: impl Into<String>,
        ports: u16,
        combine: impl Fn(&[T]) -> O + 'static,
    ) -> Self {
        let ports = ports.max(1);
        let node = pipeline.add_node(NodeKind::Transform, label, ports);
        Self {
            state: Rc::new(JoinAllState {
                output: ValueCell::new(pipeline.graph(), node),
                latest: RefCell::new(vec![None; usize::from(ports)]),
                combine: Box::new(combine),
            }),
        }
    }

    #[must_use]
    pub fn ports(&self) -> usize {
        self.state.latest.borrow().len()
    }

    /// Port `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`JoinAll::ports`].
    #[must_use]
    pub fn input(&self, index: u16) -> JoinInput<T> {
        let slot = usize::from(index);
        assert!(
            slot < self.ports(),
            "join has {} ports, no port {index}",
            self.ports()
        );
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        let callback = Rc::new(move |v: &T| state.receive(slot, v));
        JoinInput {
            port: InputPort::new(output.graph(), output.node_id(), index, callback),
        }
    }
}

impl<T: Clone + 'static, O: Clone + 'static> Emits<O> for JoinAll<T, O> {
    fn output(&self) -> &ValueCell<O> {
        &self.state.output
    }
}
