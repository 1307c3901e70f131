#![forbid(unsafe_code)]

//! Push-based dataflow primitives.
//!
//! - [`ValueCell`]: last emitted value plus ordered listener callbacks.
//! - [`Emits`]: a component that owns an output cell (producers, transforms).
//! - [`Listens`]: a component that accepts values (transforms, consumers).
//! - [`Graph`]: the index-addressed topology used for the start-time checks.
//!
//! # Architecture
//!
//! Values only move forward: producer → transform* → consumer. A producer's
//! `set` runs the whole downstream cascade as nested synchronous calls before
//! it returns, so two cascades never interleave.
//!
//! Chains are built with [`Emits::connect_to`], which hands the listener
//! back so the next stage can be attached to it:
//!
//! ```ignore
//! probe
//!     .connect_to(Linear::new(&pipeline, 1.0, 0.0, Some("/bilge/linear")))
//!     .connect_to(TelemetryOutput::new(&pipeline, "environment.bilge.waterTemperature"));
//! ```

pub mod cell;
pub mod graph;

pub use cell::{InputPort, Listener, ValueCell};
pub use graph::{Edge, Graph, NodeId, NodeKind};

/// A component with an output cell.
pub trait Emits<T: Clone + 'static> {
    fn output(&self) -> &ValueCell<T>;

    /// Connect `listener` downstream of this component and return it.
    ///
    /// The listener is not told about the current value; it sees the next
    /// `set`.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline has started or `listener` belongs to another
    /// pipeline.
    fn connect_to<L: Listens<T>>(&self, listener: L) -> L {
        self.output().attach(listener.input());
        listener
    }

    /// Last emitted value.
    fn current(&self) -> Option<T> {
        self.output().get()
    }
}

/// A component that accepts values of type `T`.
pub trait Listens<T: Clone + 'static> {
    fn input(&self) -> InputPort<T>;
}
