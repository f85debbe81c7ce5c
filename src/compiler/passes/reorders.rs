//! Redundant reorder removal.
//!
//! A reorder is redundant when it produces exactly the layout it reads, or when every
//! consumer of it is another reorder that converts the data again anyway. Both kinds
//! are spliced out so the producer feeds the consumers directly. Outputs are kept: the
//! caller asked for their layout.

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::{layout_of, ordered_nodes},
    },
    config::PassKind,
    graph::{GraphStore, NodeId},
    topology::{Operation, PrimitiveKind},
    Result,
};

/// Removes reorders that do not change anything.
pub struct RedundantReordersPass;

impl Default for RedundantReordersPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RedundantReordersPass {
    /// Creates a new redundant reorder removal pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_redundant(graph: &GraphStore, node: NodeId) -> Result<bool> {
        let current = &graph[node];
        let Operation::Reorder { padding, .. } = current.operation() else {
            return Ok(false);
        };
        if current.is_output() || current.can_be_optimized() {
            return Ok(false);
        }
        let Some(dep) = current.dependency(0) else {
            return Ok(false);
        };

        let input = layout_of(graph, dep)?;
        let output = layout_of(graph, node)?;
        if padding.is_zero() && input == output {
            return Ok(true);
        }
        let users = current.users();
        Ok(!users.is_empty()
            && users
                .iter()
                .all(|&u| graph[u].kind() == PrimitiveKind::Reorder && !graph[u].can_be_optimized()))
    }
}

impl GraphPass for RedundantReordersPass {
    fn name(&self) -> &'static str {
        "remove_redundant_reorders"
    }

    fn kind(&self) -> PassKind {
        PassKind::RedundantReorders
    }

    fn description(&self) -> &'static str {
        "Removes identity reorders and reorders feeding only other reorders"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for node in ordered_nodes(graph) {
            if !graph.is_live(node) || !Self::is_redundant(graph, node)? {
                continue;
            }
            changed |= graph
                .editor_with_events(ctx.events)
                .extract_and_remove(node)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{build_graph, input_with, run_pass, TestContext},
        topology::{DataType, Format, Primitive, Tensor, Topology},
    };

    #[test]
    fn test_identity_reorder_removed() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 2, 2, 2))).unwrap();
        topology
            .add(Primitive::reorder("same", "in", Format::Bfyx, DataType::F32))
            .unwrap();
        topology.add(Primitive::softmax("out", "same")).unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&RedundantReordersPass::new(), &mut graph, &fixture));
        assert!(!graph.contains("same"));
        assert!(graph.optimized_out().iter().any(|id| id == "same"));
        assert!(!run_pass(&RedundantReordersPass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_reorder_chain_collapsed() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 2, 2, 2))).unwrap();
        topology
            .add(Primitive::reorder("r1", "in", Format::Yxfb, DataType::F32))
            .unwrap();
        topology
            .add(Primitive::reorder("r2", "r1", Format::Byxf, DataType::F16))
            .unwrap();
        topology.add(Primitive::softmax("out", "r2")).unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&RedundantReordersPass::new(), &mut graph, &fixture));
        assert!(!graph.contains("r1"));
        let r2 = graph.get_node("r2").unwrap();
        assert_eq!(graph[r2.dependencies()[0]].id(), "in");
        assert_eq!(r2.output_layout().unwrap().format, Format::Byxf);
        assert!(!run_pass(&RedundantReordersPass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_converting_output_reorder_kept() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 2, 2, 2))).unwrap();
        topology
            .add(Primitive::reorder("out", "in", Format::Bfyx, DataType::F32))
            .unwrap();
        let mut graph = build_graph(&topology);
        assert!(!run_pass(&RedundantReordersPass::new(), &mut graph, &TestContext::new()));
        assert!(graph.contains("out"));
    }
}
