//! Reachability walks over a [`GraphStore`].
//!
//! [`Bfs`] visits nodes breadth-first in one [`Direction`], starting from any set of
//! nodes. The `mark` callbacks of [`forward_bfs`] and [`backward_bfs`] decide per node
//! whether the walk continues through it, which lets callers prune at, for example,
//! constants or already processed nodes. Visited state lives in the walk itself, so no
//! per-node marks need to be cleared afterwards.

use std::collections::VecDeque;

use crate::{
    graph::{GraphStore, NodeId},
    utils::BitSet,
};

/// Which edges a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a node to its users
    Forward,
    /// From a node to its dependencies
    Backward,
}

/// Breadth-first iterator over a graph.
pub struct Bfs<'a> {
    graph: &'a GraphStore,
    direction: Direction,
    queue: VecDeque<NodeId>,
    visited: BitSet,
}

impl<'a> Bfs<'a> {
    /// Starts a walk from `starts`.
    pub fn new(
        graph: &'a GraphStore,
        starts: impl IntoIterator<Item = NodeId>,
        direction: Direction,
    ) -> Self {
        let mut visited = BitSet::new(graph.capacity());
        let mut queue = VecDeque::new();
        for start in starts {
            if graph.is_live(start) && visited.insert(start.index()) {
                queue.push_back(start);
            }
        }
        Self {
            graph,
            direction,
            queue,
            visited,
        }
    }

    /// Returns `true` if `node` has been queued.
    #[must_use]
    pub fn visited(&self, node: NodeId) -> bool {
        self.visited.contains(node.index())
    }

    /// Consumes the walk and returns the visited set.
    #[must_use]
    pub fn into_visited(mut self) -> BitSet {
        while self.next().is_some() {}
        self.visited
    }

    /// Queues the unvisited neighbours of `node`.
    fn expand(&mut self, node: NodeId) {
        let graph = self.graph;
        let neighbours = match self.direction {
            Direction::Forward => graph[node].users(),
            Direction::Backward => graph[node].dependencies(),
        };
        for &next in neighbours {
            if self.visited.insert(next.index()) {
                self.queue.push_back(next);
            }
        }
    }
}

impl Iterator for Bfs<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;
        self.expand(node);
        Some(node)
    }
}

/// Walks forward from the sources of the graph. `mark` is called once per reached node;
/// returning `false` stops the walk from continuing through that node.
pub fn forward_bfs<F>(graph: &GraphStore, mark: F) -> BitSet
where
    F: FnMut(NodeId) -> bool,
{
    let sources: Vec<NodeId> = graph
        .node_ids()
        .filter(|&n| graph[n].is_source())
        .collect();
    guided_bfs(graph, sources, Direction::Forward, mark)
}

/// Walks backward from the outputs of the graph. `mark` is called once per reached node;
/// returning `false` stops the walk from continuing through that node.
pub fn backward_bfs<F>(graph: &GraphStore, mark: F) -> BitSet
where
    F: FnMut(NodeId) -> bool,
{
    guided_bfs(
        graph,
        graph.outputs().iter().copied(),
        Direction::Backward,
        mark,
    )
}

/// Nodes reachable from `starts` in `direction`, including the starts.
#[must_use]
pub fn reachable(
    graph: &GraphStore,
    starts: impl IntoIterator<Item = NodeId>,
    direction: Direction,
) -> BitSet {
    Bfs::new(graph, starts, direction).into_visited()
}

/// Per-node ancestor sets (transitive dependencies, excluding the node itself), indexed by
/// arena slot. Requires an established processing order.
#[must_use]
pub fn ancestor_sets(graph: &GraphStore) -> Vec<BitSet> {
    let capacity = graph.capacity();
    let mut ancestors = vec![BitSet::new(capacity); capacity];
    for node in graph.processing_order().iter() {
        let mut set = BitSet::new(capacity);
        for &dep in graph[node].dependencies() {
            set.insert(dep.index());
            set.union_with(&ancestors[dep.index()]);
        }
        ancestors[node.index()] = set;
    }
    ancestors
}

fn guided_bfs<F>(
    graph: &GraphStore,
    starts: impl IntoIterator<Item = NodeId>,
    direction: Direction,
    mut mark: F,
) -> BitSet
where
    F: FnMut(NodeId) -> bool,
{
    let mut walk = Bfs::new(graph, starts, direction);
    while let Some(node) = walk.queue.pop_front() {
        if mark(node) {
            walk.expand(node);
        }
    }
    walk.visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::diamond;

    #[test]
    fn test_bfs_order() {
        let (graph, [a, b, c, d]) = diamond();
        let order: Vec<_> = Bfs::new(&graph, [a], Direction::Forward).collect();
        assert_eq!(order[0], a);
        assert_eq!(order.len(), 4);
        assert_eq!(order[3], d);
        assert!(order[1..3].contains(&b) && order[1..3].contains(&c));
    }

    #[test]
    fn test_backward_bfs_prunes() {
        let (graph, [a, b, c, d]) = diamond();
        let seen = backward_bfs(&graph, |n| n != b);
        assert!(seen.contains(d.index()));
        assert!(seen.contains(b.index()));
        assert!(seen.contains(c.index()));
        // a is still reached through c
        assert!(seen.contains(a.index()));

        let seen = backward_bfs(&graph, |n| n == d);
        assert!(!seen.contains(a.index()));
    }

    #[test]
    fn test_forward_bfs_from_sources() {
        let (graph, [a, _, _, d]) = diamond();
        let mut visited = Vec::new();
        forward_bfs(&graph, |n| {
            visited.push(n);
            true
        });
        assert_eq!(visited.first(), Some(&a));
        assert_eq!(visited.last(), Some(&d));
    }

    #[test]
    fn test_ancestor_sets() {
        let (graph, [a, b, c, d]) = diamond();
        let ancestors = ancestor_sets(&graph);
        assert!(ancestors[a.index()].is_empty());
        assert_eq!(ancestors[d.index()].count(), 3);
        assert!(ancestors[b.index()].contains(a.index()));
        assert!(!ancestors[b.index()].contains(c.index()));
    }

    #[test]
    fn test_reachable() {
        let (graph, [a, b, _, d]) = diamond();
        let up = reachable(&graph, [b], Direction::Backward);
        assert!(up.contains(a.index()));
        assert!(!up.contains(d.index()));
    }
}
