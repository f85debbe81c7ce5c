//! The processing order of a graph.
//!
//! A [`ProcessingOrder`] is a sequence of node ids together with a reverse index from node
//! to position, so that "does `a` run before `b`" is a constant time query. The order is
//! kept topologically valid by the [`GraphEditor`](crate::graph::GraphEditor): every edge
//! it adds is checked against the order and the affected region is repaired in place.

use crate::graph::NodeId;

/// A sequence of nodes with constant time position lookup.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOrder {
    order: Vec<NodeId>,
    positions: Vec<Option<usize>>,
}

impl ProcessingOrder {
    /// Creates an empty order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an order from a sequence of nodes.
    #[must_use]
    pub fn from_nodes(order: Vec<NodeId>) -> Self {
        let mut result = Self {
            order,
            positions: Vec::new(),
        };
        result.reindex();
        result
    }

    /// Nodes in order.
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    /// Iterator over nodes in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    /// Number of ordered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no node is ordered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Position of `node`, if ordered.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.positions.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `node` is ordered.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.position(node).is_some()
    }

    /// Returns `true` if `a` is ordered strictly before `b`.
    #[must_use]
    pub fn precedes(&self, a: NodeId, b: NodeId) -> bool {
        matches!((self.position(a), self.position(b)), (Some(pa), Some(pb)) if pa < pb)
    }

    pub(crate) fn push(&mut self, node: NodeId) {
        self.set_position(node, Some(self.order.len()));
        self.order.push(node);
    }

    pub(crate) fn remove(&mut self, node: NodeId) {
        if let Some(pos) = self.position(node) {
            self.order.remove(pos);
            self.set_position(node, None);
            for idx in pos..self.order.len() {
                let moved = self.order[idx];
                self.set_position(moved, Some(idx));
            }
        }
    }

    /// Places `nodes` into the given `slots`, in order. Both must have the same length and
    /// `slots` must be exactly the current positions of `nodes`, sorted ascending.
    pub(crate) fn reassign(&mut self, slots: &[usize], nodes: &[NodeId]) {
        debug_assert_eq!(slots.len(), nodes.len());
        for (&slot, &node) in slots.iter().zip(nodes) {
            self.order[slot] = node;
            self.set_position(node, Some(slot));
        }
    }

    fn reindex(&mut self) {
        self.positions.clear();
        let order = std::mem::take(&mut self.order);
        for (pos, &node) in order.iter().enumerate() {
            self.set_position(node, Some(pos));
        }
        self.order = order;
    }

    fn set_position(&mut self, node: NodeId, pos: Option<usize>) {
        if node.index() >= self.positions.len() {
            self.positions.resize(node.index() + 1, None);
        }
        self.positions[node.index()] = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[usize]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_positions() {
        let order = ProcessingOrder::from_nodes(ids(&[3, 0, 2]));
        assert_eq!(order.position(NodeId::new(3)), Some(0));
        assert_eq!(order.position(NodeId::new(2)), Some(2));
        assert_eq!(order.position(NodeId::new(1)), None);
        assert!(order.precedes(NodeId::new(0), NodeId::new(2)));
        assert!(!order.precedes(NodeId::new(2), NodeId::new(0)));
    }

    #[test]
    fn test_push_and_remove() {
        let mut order = ProcessingOrder::from_nodes(ids(&[0, 1, 2]));
        order.push(NodeId::new(7));
        order.remove(NodeId::new(1));
        assert_eq!(order.as_slice(), ids(&[0, 2, 7]).as_slice());
        assert_eq!(order.position(NodeId::new(7)), Some(2));
        assert!(!order.contains(NodeId::new(1)));
    }

    #[test]
    fn test_reassign() {
        let mut order = ProcessingOrder::from_nodes(ids(&[0, 1, 2, 3]));
        order.reassign(&[1, 3], &ids(&[3, 1]));
        assert_eq!(order.as_slice(), ids(&[0, 3, 2, 1]).as_slice());
        assert_eq!(order.position(NodeId::new(1)), Some(3));
    }
}
