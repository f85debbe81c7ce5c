//! Conflict policies.
//!
//! Each policy derives pairs of nodes whose buffers must not alias. Policies only ever
//! add conflicts; the analyzer takes the union of all enabled policies, so enabling a
//! policy can never make a previously forbidden aliasing legal.
//!
//! | Policy | Conflict between `a` and `b` when |
//! |--------|-----------------------------------|
//! | [`BasicPolicy`] | `b` runs while the output of `a` is still needed |
//! | [`SkippedBranchPolicy`] | one was an ancestor of the other before optimization, and no longer is |
//! | [`OutOfOrderPolicy`] | neither is an ancestor of the other |

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    graph::{traversal::ancestor_sets, GraphStore, NodeId},
    utils::BitSet,
};

/// A source of memory conflicts.
pub trait MemoryPolicy: Send + Sync {
    /// Name used in events.
    fn name(&self) -> &'static str;

    /// Conflicting pairs. Requires an established processing order.
    fn conflicts(&self, graph: &GraphStore) -> Vec<(NodeId, NodeId)>;
}

/// Live range overlap in processing order.
///
/// The output of a node is live from its own position up to its last user; outputs of
/// the program stay live until the end. A node conflicts with every node that runs
/// while its output is live, which includes all its users.
///
/// A node flagged [`CAN_BE_OPTIMIZED`](crate::graph::NodeFlags::CAN_BE_OPTIMIZED)
/// works in the buffers of its dependencies. Those dependencies stay live as long as the
/// in-place node does, and do not conflict with it. The in-place buffer itself is written
/// as soon as its earliest dependency runs, so its live range starts there.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPolicy;

impl BasicPolicy {
    /// Last position at which the output of each node is read, indexed by arena slot.
    fn live_ends(graph: &GraphStore) -> Vec<usize> {
        let order = graph.processing_order();
        let mut ends = vec![0usize; graph.capacity()];
        for node in order.iter() {
            let current = &graph[node];
            let own = order.position(node).unwrap_or(0);
            ends[node.index()] = if current.is_output() {
                order.len()
            } else {
                current
                    .users()
                    .iter()
                    .filter_map(|&u| order.position(u))
                    .max()
                    .unwrap_or(own)
            };
        }
        for node in order.iter().rev() {
            if graph[node].can_be_optimized() {
                let end = ends[node.index()];
                for &dep in graph[node].dependencies() {
                    ends[dep.index()] = ends[dep.index()].max(end);
                }
            }
        }
        ends
    }

    /// First position at which the buffer of each node is written, indexed by arena slot.
    fn live_starts(graph: &GraphStore) -> Vec<usize> {
        let mut starts = vec![0usize; graph.capacity()];
        for (pos, node) in graph.processing_order().iter().enumerate() {
            let current = &graph[node];
            starts[node.index()] = if current.can_be_optimized() {
                current
                    .dependencies()
                    .iter()
                    .map(|dep| starts[dep.index()])
                    .fold(pos, usize::min)
            } else {
                pos
            };
        }
        starts
    }

    fn shares_buffer(graph: &GraphStore, a: NodeId, b: NodeId) -> bool {
        (graph[b].can_be_optimized() && graph[b].dependencies().contains(&a))
            || (graph[a].can_be_optimized() && graph[a].dependencies().contains(&b))
    }
}

impl MemoryPolicy for BasicPolicy {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn conflicts(&self, graph: &GraphStore) -> Vec<(NodeId, NodeId)> {
        let ends = Self::live_ends(graph);
        let starts = Self::live_starts(graph);
        let order = graph.processing_order().as_slice();
        order
            .par_iter()
            .enumerate()
            .flat_map_iter(|(pos, &a)| {
                let end = ends[a.index()];
                let starts = &starts;
                // `b` comes later, so the ranges overlap once `b` starts before `a` ends
                order[pos + 1..]
                    .iter()
                    .filter(move |&&b| {
                        starts[b.index()] <= end && !Self::shares_buffer(graph, a, b)
                    })
                    .map(move |&b| (a, b))
            })
            .collect()
    }
}

/// Ancestor relation of a graph, keyed by identifier so it survives node replacement.
#[derive(Debug, Clone, Default)]
pub struct BranchSnapshot {
    index: HashMap<String, usize>,
    ancestors: Vec<BitSet>,
}

impl BranchSnapshot {
    /// Captures the ancestor relation of `graph`. Requires an established processing
    /// order.
    #[must_use]
    pub fn capture(graph: &GraphStore) -> Self {
        let sets = ancestor_sets(graph);
        let index = graph
            .node_ids()
            .map(|n| (graph[n].id().to_string(), n.index()))
            .collect();
        Self {
            index,
            ancestors: sets,
        }
    }

    /// Returns `true` if one of the two nodes was an ancestor of the other when the
    /// snapshot was taken. Unknown identifiers are unrelated.
    #[must_use]
    pub fn related(&self, a: &str, b: &str) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        self.ancestors[ia].contains(ib) || self.ancestors[ib].contains(ia)
    }

    /// Number of captured nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Keeps nodes apart that were linked through a branch optimization removed.
///
/// Rewrites such as constant folding or fusing can remove the path that ordered two
/// nodes. Their buffers were never considered for aliasing when the topology was
/// designed, so they stay apart.
#[derive(Debug, Clone)]
pub struct SkippedBranchPolicy {
    snapshot: BranchSnapshot,
}

impl SkippedBranchPolicy {
    /// Creates the policy from a snapshot taken before optimization.
    #[must_use]
    pub fn new(snapshot: BranchSnapshot) -> Self {
        Self { snapshot }
    }
}

impl MemoryPolicy for SkippedBranchPolicy {
    fn name(&self) -> &'static str {
        "skipped_branch"
    }

    fn conflicts(&self, graph: &GraphStore) -> Vec<(NodeId, NodeId)> {
        let ancestors = ancestor_sets(graph);
        let order = graph.processing_order().as_slice();
        order
            .par_iter()
            .enumerate()
            .flat_map_iter(|(pos, &a)| {
                let ancestors = &ancestors;
                order[pos + 1..]
                    .iter()
                    .filter(move |&&b| {
                        !ancestors[b.index()].contains(a.index())
                            && self.snapshot.related(graph[a].id(), graph[b].id())
                    })
                    .map(move |&b| (a, b))
            })
            .collect()
    }
}

/// Nodes without an ancestor relation may run concurrently on an out-of-order queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutOfOrderPolicy;

impl MemoryPolicy for OutOfOrderPolicy {
    fn name(&self) -> &'static str {
        "out_of_order"
    }

    fn conflicts(&self, graph: &GraphStore) -> Vec<(NodeId, NodeId)> {
        let ancestors = ancestor_sets(graph);
        let order = graph.processing_order().as_slice();
        order
            .par_iter()
            .enumerate()
            .flat_map_iter(|(pos, &a)| {
                let ancestors = &ancestors;
                // later nodes can only have `a` as ancestor, never the other way round
                order[pos + 1..]
                    .iter()
                    .filter(move |&&b| !ancestors[b.index()].contains(a.index()))
                    .map(move |&b| (a, b))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::calc_processing_order,
        graph::NodeFlags,
        test::{diamond, input, relu},
        topology::{ConcatAxis, Primitive},
    };

    fn pairs(graph: &GraphStore, conflicts: &[(NodeId, NodeId)]) -> Vec<(String, String)> {
        let mut named: Vec<_> = conflicts
            .iter()
            .map(|&(a, b)| {
                let (a, b) = (graph[a].id().to_string(), graph[b].id().to_string());
                if a < b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect();
        named.sort();
        named
    }

    #[test]
    fn test_basic_live_ranges() {
        // a -> b -> d, a -> c -> d, d output; order a b c d
        let (graph, _) = diamond();
        let conflicts = pairs(&graph, &BasicPolicy.conflicts(&graph));
        let expected: Vec<(String, String)> = [("a", "b"), ("a", "c"), ("b", "c"), ("b", "d"), ("c", "d")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(conflicts, expected);
    }

    #[test]
    fn test_in_place_concatenation_starts_with_first_input() {
        // in -> {a, b} -> cat, cat in place; a writes into cat while b still reads in
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let i = editor.get_or_create(Arc::new(input("in")));
        let a = editor.get_or_create(Arc::new(relu("a", "in")));
        let b = editor.get_or_create(Arc::new(relu("b", "in")));
        let cat = editor.get_or_create(Arc::new(Primitive::concatenation(
            "cat",
            ["a", "b"],
            ConcatAxis::Feature,
        )));
        editor.add_connection(i, a).unwrap();
        editor.add_connection(i, b).unwrap();
        editor.add_connection(a, cat).unwrap();
        editor.add_connection(b, cat).unwrap();
        editor.set_output(cat, true).unwrap();
        let order = calc_processing_order(&graph).unwrap();
        graph.set_processing_order(order);
        graph
            .node_mut(cat)
            .set_flag(NodeFlags::CAN_BE_OPTIMIZED, true);

        let conflicts = pairs(&graph, &BasicPolicy.conflicts(&graph));
        let expected: Vec<(String, String)> = [("a", "b"), ("a", "in"), ("b", "in"), ("cat", "in")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        assert_eq!(conflicts, expected);
    }

    #[test]
    fn test_out_of_order_unrelated() {
        let (graph, _) = diamond();
        let conflicts = pairs(&graph, &OutOfOrderPolicy.conflicts(&graph));
        assert_eq!(conflicts, vec![("b".to_string(), "c".to_string())]);
    }

    #[test]
    fn test_skipped_branch() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let a = editor.get_or_create(Arc::new(input("a")));
        let b = editor.get_or_create(Arc::new(relu("b", "a")));
        let c = editor.get_or_create(Arc::new(relu("c", "b")));
        editor.add_connection(a, b).unwrap();
        editor.add_connection(b, c).unwrap();
        let order = calc_processing_order(&graph).unwrap();
        graph.set_processing_order(order);
        let snapshot = BranchSnapshot::capture(&graph);
        assert!(snapshot.related("a", "c"));
        assert!(!snapshot.related("a", "missing"));

        graph.editor().remove_connection(b, c).unwrap();
        let policy = SkippedBranchPolicy::new(snapshot);
        let conflicts = pairs(&graph, &policy.conflicts(&graph));
        assert_eq!(
            conflicts,
            vec![
                ("a".to_string(), "c".to_string()),
                ("b".to_string(), "c".to_string())
            ]
        );
    }
}
