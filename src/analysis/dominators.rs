//! Dominator and post-dominator computation using the Lengauer-Tarjan algorithm.
//!
//! # Theory
//!
//! A node `d` **dominates** a node `n` if every path from the sources of the graph to `n`
//! passes through `d`. Dually, `p` **post-dominates** `n` if every path from `n` to an
//! output passes through `p`. The program graph has many sources and many outputs, so both
//! relations are computed on a view with one virtual node added: a root feeding every
//! source for dominance, and an exit fed by every output and every sink for
//! post-dominance. Sinks that are not outputs count as exits so that a node feeding a
//! dangling branch is never considered post-dominated by something on another branch.
//!
//! # Algorithm
//!
//! Lengauer-Tarjan with path compression, O(V α(V)). Predecessor lists are materialised
//! up front from the view, and the forest compression is iterative so deep graphs do not
//! exhaust the stack.
//!
//! # Usage
//!
//! [`post_dominated_branch`] drives whole-branch replacement in the graph editor: when a
//! node is replaced together with its branch, only the part of its dependency subtree it
//! post-dominates may be removed.

use crate::{
    graph::{GraphBase, GraphStore, NodeId, Predecessors, RootedGraph, Successors},
    utils::BitSet,
};

/// Result of a dominator computation over one view of the graph.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The virtual root of the view
    root: NodeId,
    /// Immediate dominator per arena index; `None` for unreachable nodes and the root
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// Returns the immediate dominator of `node`, or `None` if `node` is only dominated by
    /// the virtual root or is unreachable.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom
            .get(node.index())
            .copied()
            .flatten()
            .filter(|&d| d != self.root)
    }

    /// Checks if `a` dominates `b`. A node dominates itself; unreachable nodes dominate
    /// and are dominated by nothing but themselves.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(Some(idom)) = self.idom.get(current.index()) {
            if *idom == a {
                return true;
            }
            if *idom == self.root {
                return false;
            }
            current = *idom;
        }
        false
    }

    /// Checks if `a` dominates `b` and `a != b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns `true` if `node` is reachable from the virtual root.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        matches!(self.idom.get(node.index()), Some(Some(_)))
    }
}

/// Dominators and post-dominators of a graph.
#[derive(Debug, Clone)]
pub struct Dominance {
    /// Dominance from the sources
    pub dominators: DominatorTree,
    /// Dominance towards the outputs
    pub post_dominators: DominatorTree,
}

impl Dominance {
    /// Checks if `a` dominates `b`.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.dominators.dominates(a, b)
    }

    /// Checks if every path from `b` to an output passes through `a`.
    #[must_use]
    pub fn post_dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.post_dominators.dominates(a, b)
    }
}

/// Computes dominators and post-dominators of `graph`.
#[must_use]
pub fn calc_dominators(graph: &GraphStore) -> Dominance {
    Dominance {
        dominators: compute_dominators(&VirtualRootView::forward(graph)),
        post_dominators: compute_dominators(&VirtualRootView::backward(graph)),
    }
}

/// The dependency subtree of `node` that `node` post-dominates, including `node` itself.
///
/// These are the nodes whose every path to an output runs through `node`; removing `node`
/// makes all of them unused.
#[must_use]
pub fn post_dominated_branch(graph: &GraphStore, node: NodeId) -> BitSet {
    let tree = compute_dominators(&VirtualRootView::backward(graph));
    let mut branch = BitSet::new(graph.capacity());
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if !tree.dominates(node, current) || !branch.insert(current.index()) {
            continue;
        }
        stack.extend(graph[current].dependencies().iter().copied());
    }
    branch
}

/// Computes the dominator tree of a rooted graph.
pub fn compute_dominators<G>(graph: &G) -> DominatorTree
where
    G: RootedGraph,
{
    let mut lt = LengauerTarjan::new(graph);
    lt.compute();
    let root = graph.entry();
    let mut idom: Vec<Option<NodeId>> = lt
        .idom
        .iter()
        .zip(&lt.dfnum)
        .map(|(&d, &num)| (num != 0).then_some(d))
        .collect();
    if let Some(slot) = idom.get_mut(root.index()) {
        *slot = None;
    }
    DominatorTree { root, idom }
}

/// The program graph plus one virtual node at index `capacity`.
///
/// In the forward view edges run from dependencies to users and the virtual node points at
/// every source. In the backward view edges run from users to dependencies and the virtual
/// node points at every output and sink.
struct VirtualRootView {
    root: NodeId,
    live: Vec<NodeId>,
    successors: Vec<Vec<NodeId>>,
    predecessors: Vec<Vec<NodeId>>,
}

impl VirtualRootView {
    fn forward(graph: &GraphStore) -> Self {
        Self::build(graph, |node| graph[node].is_source(), |node| {
            graph[node].users().to_vec()
        })
    }

    fn backward(graph: &GraphStore) -> Self {
        Self::build(
            graph,
            |node| graph[node].is_output() || graph[node].is_sink(),
            |node| graph[node].dependencies().to_vec(),
        )
    }

    fn build<E, S>(graph: &GraphStore, is_entry: E, edges: S) -> Self
    where
        E: Fn(NodeId) -> bool,
        S: Fn(NodeId) -> Vec<NodeId>,
    {
        let root = NodeId::new(graph.capacity());
        let size = graph.capacity() + 1;
        let mut successors = vec![Vec::new(); size];
        let mut predecessors = vec![Vec::new(); size];
        let live: Vec<NodeId> = graph.node_ids().collect();
        for &node in &live {
            if is_entry(node) {
                successors[root.index()].push(node);
                predecessors[node.index()].push(root);
            }
            for next in edges(node) {
                successors[node.index()].push(next);
                predecessors[next.index()].push(node);
            }
        }
        Self {
            root,
            live,
            successors,
            predecessors,
        }
    }
}

impl GraphBase for VirtualRootView {
    fn node_count(&self) -> usize {
        self.successors.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.live.iter().copied().chain(std::iter::once(self.root))
    }
}

impl Successors for VirtualRootView {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.successors[node.index()].iter().copied()
    }
}

impl Predecessors for VirtualRootView {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.predecessors[node.index()].iter().copied()
    }
}

impl RootedGraph for VirtualRootView {
    fn entry(&self) -> NodeId {
        self.root
    }
}

const SENTINEL: NodeId = NodeId::new(usize::MAX);

/// Internal state for the Lengauer-Tarjan algorithm.
struct LengauerTarjan<'g, G> {
    graph: &'g G,
    /// DFS number for each node (0 = not visited)
    dfnum: Vec<usize>,
    /// Node with each DFS number minus one
    vertex: Vec<NodeId>,
    /// Parent in the DFS tree
    parent: Vec<NodeId>,
    /// Semidominator
    semi: Vec<NodeId>,
    /// Immediate dominator
    idom: Vec<NodeId>,
    /// Ancestor in the link-eval forest
    ancestor: Vec<NodeId>,
    /// Node with minimal semidominator on the compressed path
    best: Vec<NodeId>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
    counter: usize,
}

impl<'g, G: RootedGraph> LengauerTarjan<'g, G> {
    fn new(graph: &'g G) -> Self {
        let n = graph.node_count();
        Self {
            graph,
            dfnum: vec![0; n],
            vertex: vec![SENTINEL; n],
            parent: vec![SENTINEL; n],
            semi: (0..n).map(NodeId::new).collect(),
            idom: vec![SENTINEL; n],
            ancestor: vec![SENTINEL; n],
            best: (0..n).map(NodeId::new).collect(),
            bucket: vec![Vec::new(); n],
            counter: 0,
        }
    }

    fn compute(&mut self) {
        let entry = self.graph.entry();
        self.dfs(entry);

        for i in (1..self.counter).rev() {
            let w = self.vertex[i];
            let parent_w = self.parent[w.index()];

            let preds: Vec<NodeId> = self.graph.predecessors(w).collect();
            for v in preds {
                if self.dfnum[v.index()] == 0 {
                    continue;
                }
                let u = self.eval(v);
                if self.dfnum[self.semi[u.index()].index()]
                    < self.dfnum[self.semi[w.index()].index()]
                {
                    self.semi[w.index()] = self.semi[u.index()];
                }
            }

            let semi_w = self.semi[w.index()];
            self.bucket[semi_w.index()].push(w);
            self.ancestor[w.index()] = parent_w;

            let bucket = std::mem::take(&mut self.bucket[parent_w.index()]);
            for v in bucket {
                let u = self.eval(v);
                self.idom[v.index()] = if self.semi[u.index()] == self.semi[v.index()] {
                    parent_w
                } else {
                    u
                };
            }
        }

        for i in 1..self.counter {
            let w = self.vertex[i];
            if self.idom[w.index()] != self.semi[w.index()] {
                self.idom[w.index()] = self.idom[self.idom[w.index()].index()];
            }
        }
        self.idom[entry.index()] = entry;
    }

    /// Iterative depth-first numbering that records proper tree parents.
    fn dfs(&mut self, start: NodeId) {
        self.number(start);
        let mut successors: Vec<NodeId> = self.graph.successors(start).collect();
        successors.reverse();
        let mut stack = vec![(start, successors)];
        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            let Some(next) = pending.pop() else {
                stack.pop();
                continue;
            };
            if self.dfnum[next.index()] == 0 {
                self.parent[next.index()] = node;
                self.number(next);
                let mut successors: Vec<NodeId> = self.graph.successors(next).collect();
                successors.reverse();
                stack.push((next, successors));
            }
        }
    }

    fn number(&mut self, node: NodeId) {
        self.counter += 1;
        self.dfnum[node.index()] = self.counter;
        self.vertex[self.counter - 1] = node;
    }

    fn eval(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()] == SENTINEL {
            return v;
        }
        self.compress(v);
        self.best[v.index()]
    }

    /// Path compression, iterative: collect the path to the forest root, then fold it
    /// from the top down.
    fn compress(&mut self, v: NodeId) {
        let mut path = Vec::new();
        let mut current = v;
        while self.ancestor[self.ancestor[current.index()].index()] != SENTINEL {
            path.push(current);
            current = self.ancestor[current.index()];
        }
        while let Some(node) = path.pop() {
            let ancestor = self.ancestor[node.index()];
            let best_ancestor = self.best[ancestor.index()];
            if self.dfnum[self.semi[best_ancestor.index()].index()]
                < self.dfnum[self.semi[self.best[node.index()].index()].index()]
            {
                self.best[node.index()] = best_ancestor;
            }
            self.ancestor[node.index()] = self.ancestor[ancestor.index()];
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test::{data, diamond, eltwise_sum, input, relu};

    #[test]
    fn test_diamond_dominance() {
        let (graph, [a, b, c, d]) = diamond();
        let dom = calc_dominators(&graph);
        assert!(dom.dominates(a, d));
        assert!(!dom.dominates(b, d));
        assert_eq!(dom.dominators.immediate_dominator(d), Some(a));
        assert_eq!(dom.dominators.immediate_dominator(a), None);

        assert!(dom.post_dominates(d, a));
        assert!(dom.post_dominates(d, b));
        assert!(!dom.post_dominates(b, a));
        assert!(dom.post_dominators.strictly_dominates(d, c));
    }

    #[test]
    fn test_branch_stops_at_shared_nodes() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let w = editor.get_or_create(Arc::new(data("w", 4)));
        let shared = editor.get_or_create(Arc::new(input("shared")));
        let x = editor.get_or_create(Arc::new(relu("x", "w")));
        let sum = editor.get_or_create(Arc::new(eltwise_sum("sum", &["x", "shared"])));
        let other = editor.get_or_create(Arc::new(relu("other", "shared")));
        editor.add_connection(w, x).unwrap();
        editor.add_connection(x, sum).unwrap();
        editor.add_connection(shared, sum).unwrap();
        editor.add_connection(shared, other).unwrap();
        editor.set_output(sum, true).unwrap();

        let branch = post_dominated_branch(&graph, sum);
        assert!(branch.contains(sum.index()));
        assert!(branch.contains(x.index()));
        assert!(branch.contains(w.index()));
        // other is a sink, so shared reaches an exit without passing through sum
        assert!(!branch.contains(shared.index()));
        assert!(!branch.contains(other.index()));
    }

    #[test]
    fn test_long_chain() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let mut prev = editor.get_or_create(Arc::new(input("n0")));
        let first = prev;
        for i in 1..5000 {
            let node =
                editor.get_or_create(Arc::new(relu(&format!("n{i}"), &format!("n{}", i - 1))));
            editor.connect_unordered(prev, node);
            prev = node;
        }
        let dom = calc_dominators(&graph);
        assert!(dom.dominates(first, prev));
        assert!(dom.post_dominates(prev, first));
    }
}
