//! Constant propagation.
//!
//! Constant subgraphs are evaluated at compile time by the
//! [`ConstantsPropagator`](crate::policy::ConstantsPropagator) and replaced by a single
//! `data` node holding the result. Only the nodes at the boundary of a constant
//! subgraph are materialised: constant nodes with a non-constant user (the constant
//! frontier) and constant outputs. Everything behind them that only they consume is
//! removed together with them.
//!
//! # Example
//!
//! Before:
//! ```text
//! w (data) -> reorder(os_iyx_osv16) -> conv <- input
//! ```
//!
//! After:
//! ```text
//! reorder (data, os_iyx_osv16) -> conv <- input
//! ```
//!
//! A refusal of the propagator is not an error; the node stays and is executed at run
//! time.

use std::sync::Arc;

use crate::{
    analysis::mark_constants,
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::ordered_nodes,
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeFlags, NodeId},
    policy::ConstantData,
    topology::{Padding, Primitive, PrimitiveKind},
    Result,
};

/// Replaces constant subgraphs by precomputed data.
pub struct PropagateConstantsPass;

impl Default for PropagateConstantsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PropagateConstantsPass {
    /// Creates a new constant propagation pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn candidates(graph: &GraphStore) -> Vec<NodeId> {
        ordered_nodes(graph)
            .into_iter()
            .filter(|&n| {
                let node = &graph[n];
                node.is_constant()
                    && node.kind() != PrimitiveKind::Data
                    && (node.flags().contains(NodeFlags::CONSTANT_FRONTIER)
                        || node.is_output())
            })
            .collect()
    }
}

impl GraphPass for PropagateConstantsPass {
    fn name(&self) -> &'static str {
        "propagate_constants"
    }

    fn kind(&self) -> PassKind {
        PassKind::Constants
    }

    fn description(&self) -> &'static str {
        "Replaces constant subgraphs by precomputed data nodes"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        mark_constants(graph)?;

        // evaluate everything first, replacements remove nodes other candidates read
        let mut folded: Vec<(NodeId, ConstantData)> = Vec::new();
        for node in Self::candidates(graph) {
            match ctx.constants.evaluate(graph, node) {
                Some(value) => folded.push((node, value)),
                None => {
                    ctx.events
                        .record(EventKind::Info)
                        .node(node)
                        .pass(self.name())
                        .message(format!(
                            "{} refused by {}",
                            graph[node].id(),
                            ctx.constants.name()
                        ));
                }
            }
        }

        let mut changed = false;
        for (node, value) in folded {
            if !graph.is_live(node) {
                continue;
            }
            let id = graph[node].id().to_string();
            let primitive = Primitive::data(
                format!("_const_prop_{id}"),
                value.layout.with_padding(Padding::none()),
                value.values,
            );
            let mut editor = graph.editor_with_events(ctx.events);
            let data = editor.get_or_create(Arc::new(primitive));
            editor.replace(node, data, true, true)?;
            ctx.events
                .record(EventKind::ConstantFolded)
                .node(data)
                .pass(self.name())
                .message(format!("{id} folded to {}", value.layout));
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{build_graph, data_with, input_with, relu, run_pass, TestContext},
        topology::{EltwiseMode, Operation, PoolingMode, PoolingParams, Tensor, Topology},
    };

    #[test]
    fn test_constant_output_folded() {
        let mut topology = Topology::new();
        topology.add(data_with("a", Tensor::new(1, 1, 2, 1))).unwrap();
        topology.add(relu("b", "a")).unwrap();
        topology.add_output("b");
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&PropagateConstantsPass::new(), &mut graph, &fixture));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
        let b = graph.get_node("b").unwrap();
        assert_eq!(b.kind(), PrimitiveKind::Data);
        assert!(b.is_output());
        assert!(graph.optimized_out().iter().any(|id| id == "a"));
        assert!(graph.optimized_out().iter().any(|id| id == "b"));
        assert_eq!(fixture.events.count_kind(EventKind::ConstantFolded), 1);

        assert!(!run_pass(&PropagateConstantsPass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_frontier_folded_values() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 1, 2, 1))).unwrap();
        topology.add(data_with("c", Tensor::new(1, 1, 2, 1))).unwrap();
        topology.add(relu("neg", "c")).unwrap();
        topology
            .add(Primitive::eltwise("sum", ["in", "neg"], EltwiseMode::Sum))
            .unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&PropagateConstantsPass::new(), &mut graph, &fixture));
        assert!(!graph.contains("c"));
        let folded = graph.get_node("neg").unwrap();
        match folded.operation() {
            Operation::Data { values, .. } => {
                // data_with counts up from zero
                assert_eq!(&values[..], &[0.0, 1.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let sum = graph.get_node("sum").unwrap();
        assert_eq!(graph[sum.dependencies()[1]].id(), "neg");
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_refusal_keeps_node() {
        let mut topology = Topology::new();
        topology.add(data_with("a", Tensor::new(1, 1, 2, 1))).unwrap();
        topology
            .add(Primitive::reshape("r", "a", Tensor::new(1, 2, 1, 1)))
            .unwrap();
        topology
            .add(Primitive::pooling(
                "p",
                "r",
                PoolingParams {
                    mode: PoolingMode::Max,
                    size: Tensor::spatial(1, 1),
                    stride: Tensor::spatial(1, 1),
                    input_offset: Tensor::splat(0),
                    output_size: None,
                },
            ))
            .unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(!run_pass(&PropagateConstantsPass::new(), &mut graph, &fixture));
        assert!(graph.contains("p"));
        assert!(fixture.events.has(EventKind::Info));
    }
}
