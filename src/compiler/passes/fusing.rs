//! Primitive fusing.
//!
//! Fuses an activation into the convolution, eltwise or fully connected node that
//! produces its input, so the activation is applied while the result is written
//! instead of in a separate kernel.
//!
//! # Example
//!
//! Before:
//! ```text
//! in -> conv -> relu -> out
//! ```
//!
//! After (the fused node takes over the activation's identifier):
//! ```text
//! in -> relu = conv+relu -> out
//! ```
//!
//! The producer must be used only by the activation and must not be an output,
//! otherwise its unactivated result is still needed.

use std::sync::Arc;

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::ordered_nodes,
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeId},
    topology::{Operation, Primitive},
    Result,
};

/// Fuses activations into their producers.
pub struct PrimitiveFusingPass;

impl Default for PrimitiveFusingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveFusingPass {
    /// Creates a new primitive fusing pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// The producer of `activation` and the fused operation, if fusing is possible.
    fn fusable(graph: &GraphStore, activation: NodeId) -> Option<(NodeId, Operation)> {
        let current = &graph[activation];
        let Operation::Activation { function } = current.operation() else {
            return None;
        };
        let [producer] = current.dependencies() else {
            return None;
        };
        let producer_node = &graph[*producer];
        if producer_node.is_output()
            || producer_node.can_be_optimized()
            || producer_node.users() != [activation]
        {
            return None;
        }
        let fused = producer_node.operation().with_activation(*function)?;
        Some((*producer, fused))
    }
}

impl GraphPass for PrimitiveFusingPass {
    fn name(&self) -> &'static str {
        "primitive_fusing"
    }

    fn kind(&self) -> PassKind {
        PassKind::PrimitiveFusing
    }

    fn description(&self) -> &'static str {
        "Fuses activations into convolution, eltwise and fully connected producers"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for activation in ordered_nodes(graph) {
            if !graph.is_live(activation) {
                continue;
            }
            let Some((producer, operation)) = Self::fusable(graph, activation) else {
                continue;
            };
            let producer_id = graph[producer].id().to_string();
            let activation_id = graph[activation].id().to_string();
            let deps = graph[producer].dependencies().to_vec();
            let inputs: Vec<String> = deps.iter().map(|&d| graph[d].id().to_string()).collect();

            let mut editor = graph.editor_with_events(ctx.events);
            let fused = editor.get_or_create(Arc::new(Primitive::new(
                format!("_fused_{producer_id}"),
                operation,
                inputs,
            )));
            for dep in deps {
                editor.add_connection(dep, fused)?;
            }
            editor.replace(activation, fused, true, true)?;
            ctx.events
                .record(EventKind::PrimitiveFused)
                .node(fused)
                .pass(self.name())
                .message(format!("{activation_id} fused into {producer_id}"));
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{build_graph, eltwise_sum, input_with, relu, run_pass, TestContext},
        topology::{ActivationFunction, Tensor, Topology},
    };

    fn topology(output_sum: bool) -> Topology {
        let mut topology = Topology::new();
        topology.add(input_with("a", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(input_with("b", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(eltwise_sum("sum", &["a", "b"])).unwrap();
        topology.add(relu("act", "sum")).unwrap();
        topology.add_output("act");
        if output_sum {
            topology.add_output("sum");
        }
        topology
    }

    #[test]
    fn test_activation_fused() {
        let mut graph = build_graph(&topology(false));
        let fixture = TestContext::new();

        assert!(run_pass(&PrimitiveFusingPass::new(), &mut graph, &fixture));
        assert_eq!(graph.len(), 3);
        assert!(!graph.contains("sum"));
        let fused = graph.get_node("act").unwrap();
        assert!(fused.is_output());
        assert_eq!(
            fused.operation().fused_activation(),
            Some(ActivationFunction::Relu)
        );
        let a = graph.lookup("a").unwrap();
        let b = graph.lookup("b").unwrap();
        assert_eq!(fused.dependencies(), [a, b]);
        assert!(graph.optimized_out().iter().any(|id| id == "sum"));
        graph.check_integrity().unwrap();

        assert!(!run_pass(&PrimitiveFusingPass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_output_producer_not_fused() {
        let mut graph = build_graph(&topology(true));
        assert!(!run_pass(&PrimitiveFusingPass::new(), &mut graph, &TestContext::new()));
        assert!(graph.contains("sum"));
    }
}
