#![forbid(unsafe_code)]

//! Stateless closure stage for application-specific arithmetic.

use std::fmt;
use std::rc::Rc;

use crate::pipeline::Pipeline;
use crate::reactive::{Emits, InputPort, Listens, NodeKind, ValueCell};

struct LambdaState<I, O> {
    output: ValueCell<O>,
    f: Box<dyn Fn(&I) -> O>,
}

/// Emits `f(input)` for every input.
pub struct Lambda<I, O> {
    state: Rc<LambdaState<I, O>>,
}

impl<I, O> Clone for Lambda<I, O> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<I, O: fmt::Debug> fmt::Debug for Lambda<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda").field("output", &self.state.output).finish()
    }
}

impl<I: Clone + 'static, O: Clone + 'static> Lambda<I, O> {
    pub fn new(pipeline: &Pipeline, label: impl Into<String>, f: impl Fn(&I) -> O + 'static) -> Self {
        let node = pipeline.add_node(NodeKind::Transform, label, 0);
        Self {
            state: Rc::new(LambdaState {
                output: ValueCell::new(pipeline.graph(), node),
                f: Box::new(f),
            }),
        }
    }
}

impl<I: Clone + 'static, O: Clone + 'static> Listens<I> for Lambda<I, O> {
    fn input(&self) -> InputPort<I> {
        let state = Rc::clone(&self.state);
        let output = &self.state.output;
        InputPort::new(
            output.graph(),
            output.node_id(),
            0,
            Rc::new(move |v: &I| state.output.set((state.f)(v))),
        )
    }
}

impl<I: Clone + 'static, O: Clone + 'static> Emits<O> for Lambda<I, O> {
    fn output(&self) -> &ValueCell<O> {
        &self.state.output
    }
}
