//! Processing order for parallel execution.
//!
//! Reorders the processing order by level: the length of the longest dependency path
//! from any source. Nodes on the same level are independent of each other, so grouping
//! them lets a runtime dispatch them together. Ties keep their previous relative order,
//! which keeps the result deterministic and the pass idempotent.

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeId},
    Result,
};

/// Groups independent nodes in the processing order.
pub struct ParallelReorderPass;

impl Default for ParallelReorderPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelReorderPass {
    /// Creates a new parallel reorder pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Longest path from a source for every node, indexed by arena index.
    fn levels(graph: &GraphStore) -> Vec<usize> {
        let mut levels = vec![0usize; graph.capacity()];
        for node in graph.processing_order().iter() {
            levels[node.index()] = graph[node]
                .dependencies()
                .iter()
                .map(|d| levels[d.index()] + 1)
                .max()
                .unwrap_or(0);
        }
        levels
    }
}

impl GraphPass for ParallelReorderPass {
    fn name(&self) -> &'static str {
        "reorder_for_parallel"
    }

    fn kind(&self) -> PassKind {
        PassKind::Parallel
    }

    fn description(&self) -> &'static str {
        "Orders nodes by dependency level so independent nodes are adjacent"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let levels = Self::levels(graph);
        let current: Vec<NodeId> = graph.processing_order().iter().collect();
        let mut reordered = current.clone();
        // stable, so equal levels keep their current order
        reordered.sort_by_key(|n| levels[n.index()]);
        if reordered == current {
            return Ok(false);
        }

        let depth = reordered
            .last()
            .map_or(0, |n| levels[n.index()] + 1);
        graph.set_processing_order(reordered);
        ctx.events
            .record(EventKind::OrderChanged)
            .pass(self.name())
            .message(format!("{} nodes on {depth} levels", current.len()));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{build_graph, eltwise_sum, input_with, relu, run_pass, TestContext},
        topology::{Tensor, Topology},
    };

    fn ids(graph: &GraphStore) -> Vec<String> {
        graph
            .processing_order()
            .iter()
            .map(|n| graph[n].id().to_string())
            .collect()
    }

    #[test]
    fn test_levels_grouped() {
        // a -> a1 -> a2 -> sum
        // b -> b1 ---------^
        let mut topology = Topology::new();
        topology.add(input_with("a", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(relu("a1", "a")).unwrap();
        topology.add(relu("a2", "a1")).unwrap();
        topology.add(input_with("b", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(relu("b1", "b")).unwrap();
        topology.add(eltwise_sum("sum", &["a2", "b1"])).unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();
        assert_eq!(ids(&graph), ["a", "a1", "a2", "b", "b1", "sum"]);

        assert!(run_pass(&ParallelReorderPass::new(), &mut graph, &fixture));
        assert_eq!(ids(&graph), ["a", "b", "a1", "b1", "a2", "sum"]);
        assert!(fixture.events.has(EventKind::OrderChanged));

        assert!(!run_pass(&ParallelReorderPass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_chain_unchanged() {
        let mut topology = Topology::new();
        topology.add(input_with("a", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(relu("b", "a")).unwrap();
        topology.add(relu("c", "b")).unwrap();
        let mut graph = build_graph(&topology);
        assert!(!run_pass(&ParallelReorderPass::new(), &mut graph, &TestContext::new()));
    }
}
