//! Trait definitions for graph views.
//!
//! Algorithms such as dominator computation work on views of a [`GraphStore`] rather than
//! on the store itself, so the same code can run forwards (dependencies to users) and
//! backwards (users to dependencies) and can add a virtual root.
//!
//! - [`GraphBase`] - node count and node iteration
//! - [`Successors`] - forward edges
//! - [`Predecessors`] - backward edges
//! - [`RootedGraph`] - a designated entry node

use crate::graph::{GraphStore, NodeId};

/// Core graph properties.
pub trait GraphBase {
    /// Upper bound of the node indices of this graph.
    fn node_count(&self) -> usize;

    /// All node identifiers of the graph.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward edge traversal.
pub trait Successors: GraphBase {
    /// Targets of the edges leaving `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward edge traversal.
pub trait Predecessors: GraphBase {
    /// Sources of the edges entering `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a single entry node.
pub trait RootedGraph: Successors + Predecessors {
    /// The entry node.
    fn entry(&self) -> NodeId;
}

/// The store seen as a plain dependency graph: edges run from a node to its users.
impl GraphBase for GraphStore {
    fn node_count(&self) -> usize {
        self.capacity()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        GraphStore::node_ids(self)
    }
}

impl Successors for GraphStore {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self[node].users().iter().copied()
    }
}

impl Predecessors for GraphStore {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self[node].dependencies().iter().copied()
    }
}
