#![forbid(unsafe_code)]

//! Topology arena: nodes addressed by index, edges recorded by `connect_to`.
//!
//! The graph carries no values. It exists so the pipeline can check the
//! wiring once, before the scheduler runs anything:
//!
//! - the cascade must be acyclic (a cycle would recurse until the stack is
//!   exhausted on the first `set`);
//! - every required input port of a multi-input node must have an upstream.
//!
//! After [`Graph::seal`] no further edges are accepted.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::{PipelineError, Result};

pub(crate) type SharedGraph = Rc<RefCell<Graph>>;

/// Index of a node in the topology arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Role of a node in the dataflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Producer,
    Transform,
    Consumer,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    label: String,
    required_ports: u16,
}

/// A directed `from -> to` connection into input `port` of `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub port: u16,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    sealed: bool,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. `required_ports` is non-zero only for joins, whose every
    /// port must be connected before the pipeline starts.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>, required_ports: u16) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            label: label.into(),
            required_ports,
        });
        id
    }

    /// Record an edge.
    ///
    /// # Panics
    ///
    /// Panics if the graph is sealed: wiring after start is a programming
    /// error, not a runtime condition.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, port: u16) {
        assert!(
            !self.sealed,
            "cannot connect {} -> {} after the pipeline started",
            self.label(from),
            self.label(to)
        );
        self.edges.push(Edge { from, to, port });
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn label(&self, id: NodeId) -> &str {
        self.nodes.get(id.index()).map_or("<unknown>", |n| n.label.as_str())
    }

    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id.index()).map(|n| n.kind)
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Direct downstream neighbours of `id`, in connection order.
    pub fn downstream(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.iter().filter(move |e| e.from == id).map(|e| e.to)
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Check acyclicity and port coverage.
    pub fn validate(&self) -> Result<()> {
        for (index, node) in self.nodes.iter().enumerate() {
            if node.required_ports == 0 {
                continue;
            }
            let id = NodeId(index as u32);
            let missing = (0..node.required_ports)
                .filter(|port| !self.edges.iter().any(|e| e.to == id && e.port == *port))
                .count();
            if missing > 0 {
                return Err(PipelineError::UnconnectedInput {
                    node: node.label.clone(),
                    missing,
                });
            }
        }

        // Kahn's algorithm: whatever never reaches in-degree zero sits on, or
        // downstream of, a cycle.
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            in_degree[edge.to.index()] += 1;
        }
        let mut ready: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut visited = 0;
        while let Some(index) = ready.pop_front() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.from.index() == index) {
                let d = &mut in_degree[edge.to.index()];
                *d -= 1;
                if *d == 0 {
                    ready.push_back(edge.to.index());
                }
            }
        }

        if visited == self.nodes.len() {
            return Ok(());
        }
        let nodes = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| self.nodes[i].label.clone())
            .collect();
        Err(PipelineError::Cycle { nodes })
    }
}
