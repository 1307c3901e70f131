#![forbid(unsafe_code)]

//! The value cell: last emitted value plus an ordered listener list.
//!
//! # Design
//!
//! [`ValueCell<T>`] keeps its state in shared, reference-counted storage.
//! Listeners are type-erased callbacks (`Rc<dyn Fn(&T)>`). Each callback owns
//! a strong handle to its downstream component, so an upstream cell keeps the
//! rest of its chain alive; components never hold their upstream.
//!
//! # Invariants
//!
//! 1. Every `set` notifies every listener exactly once, in registration
//!    order, with the exact value passed to `set`.
//! 2. `set` always propagates, even when the value equals the previous one.
//! 3. No borrow of the cell is held while listeners run, so a listener may
//!    read this cell or `set` other cells (the cascade).
//! 4. Attaching a listener does not replay the current value.
//!
//! # Failure Modes
//!
//! - **Cycle**: a listener that ends up calling `set` on the cell that
//!   notified it recurses until the stack overflows. The pipeline rejects
//!   cycles in [`Graph::validate`](super::graph::Graph::validate) before
//!   anything runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::graph::{NodeId, SharedGraph};

/// Type-erased notification callback.
pub type Listener<T> = Rc<dyn Fn(&T)>;

/// One input of a listening component: which node and port it is, and the
/// callback to invoke on notification.
pub struct InputPort<T> {
    pub(crate) graph: SharedGraph,
    pub(crate) node: NodeId,
    pub(crate) port: u16,
    pub(crate) callback: Listener<T>,
}

impl<T> InputPort<T> {
    pub(crate) fn new(graph: &SharedGraph, node: NodeId, port: u16, callback: Listener<T>) -> Self {
        Self {
            graph: Rc::clone(graph),
            node,
            port,
            callback,
        }
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl<T> Clone for InputPort<T> {
    fn clone(&self) -> Self {
        Self {
            graph: Rc::clone(&self.graph),
            node: self.node,
            port: self.port,
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<T> fmt::Debug for InputPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("node", &self.node)
            .field("port", &self.port)
            .finish()
    }
}

struct CellInner<T> {
    value: Option<T>,
    listeners: Vec<Listener<T>>,
    emits: u64,
}

/// Observable holder of the last value a component emitted.
///
/// Cloning creates another handle to the **same** cell. Only the owning
/// component can `set` it.
pub struct ValueCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
    node: NodeId,
    graph: SharedGraph,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            node: self.node,
            graph: Rc::clone(&self.graph),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ValueCell")
            .field("node", &self.node)
            .field("value", &inner.value)
            .field("listeners", &inner.listeners.len())
            .field("emits", &inner.emits)
            .finish()
    }
}

impl<T: Clone + 'static> ValueCell<T> {
    pub(crate) fn new(graph: &SharedGraph, node: NodeId) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CellInner {
                value: None,
                listeners: Vec::new(),
                emits: 0,
            })),
            node,
            graph: Rc::clone(graph),
        }
    }

    /// Store `value` and notify every listener before returning.
    pub(crate) fn set(&self, value: T) {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            inner.value = Some(value.clone());
            inner.emits += 1;
            inner.listeners.clone()
        };
        for listener in &listeners {
            listener(&value);
        }
    }

    /// Append a listener and record the edge in the topology.
    ///
    /// # Panics
    ///
    /// Panics if the port belongs to another pipeline or the pipeline has
    /// already started.
    pub(crate) fn attach(&self, input: InputPort<T>) {
        assert!(
            Rc::ptr_eq(&self.graph, &input.graph),
            "cannot connect components that belong to different pipelines"
        );
        self.graph
            .borrow_mut()
            .add_edge(self.node, input.node, input.port);
        self.inner.borrow_mut().listeners.push(input.callback);
    }

    /// Last emitted value, if any.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.inner.borrow().value.clone()
    }

    /// Access the last emitted value by reference.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let inner = self.inner.borrow();
        f(inner.value.as_ref())
    }

    /// Number of `set` calls so far.
    #[must_use]
    pub fn emit_count(&self) -> u64 {
        self.inner.borrow().emits
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub(crate) fn graph(&self) -> &SharedGraph {
        &self.graph
    }
}
