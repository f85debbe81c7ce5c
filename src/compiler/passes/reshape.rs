//! Reshape handling.
//!
//! A reshape to the size its input already has is a no-op and is spliced out. A reshape
//! reading a blocked format cannot reinterpret the buffer in place, so its input is
//! converted to plain `bfyx` first.

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::{convert_dependency, layout_of, ordered_nodes},
    },
    config::PassKind,
    graph::GraphStore,
    topology::{Format, Operation},
    Result,
};

/// Splices out no-op reshapes and converts blocked reshape inputs.
pub struct HandleReshapePass;

impl Default for HandleReshapePass {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleReshapePass {
    /// Creates a new reshape handling pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for HandleReshapePass {
    fn name(&self) -> &'static str {
        "handle_reshape"
    }

    fn kind(&self) -> PassKind {
        PassKind::Reshape
    }

    fn description(&self) -> &'static str {
        "Removes no-op reshapes and converts blocked reshape inputs to bfyx"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for node in ordered_nodes(graph) {
            if !graph.is_live(node) {
                continue;
            }
            let current = &graph[node];
            let Operation::Reshape { size } = current.operation() else {
                continue;
            };
            let Some(dep) = current.dependency(0) else {
                continue;
            };
            let target = *size;
            let input = layout_of(graph, dep)?;

            if input.size == target
                && !graph[node].is_output()
                && graph[node].output_padding().is_zero()
            {
                changed |= graph
                    .editor_with_events(ctx.events)
                    .extract_and_remove(node)?;
                continue;
            }
            if input.format.is_blocked() {
                let plain = input.with_format(Format::Bfyx);
                changed |= convert_dependency(graph, ctx, self.name(), node, 0, plain)?;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{build_graph, input_with, run_pass, TestContext},
        topology::{DataType, Layout, Primitive, Tensor, Topology},
    };

    #[test]
    fn test_noop_reshape_removed() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 4, 2, 2))).unwrap();
        topology
            .add(Primitive::reshape("same", "in", Tensor::new(1, 4, 2, 2)))
            .unwrap();
        topology.add(Primitive::softmax("out", "same")).unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&HandleReshapePass::new(), &mut graph, &fixture));
        assert!(!graph.contains("same"));
        let input = graph.lookup("in").unwrap();
        assert_eq!(graph.get_node("out").unwrap().dependencies(), [input]);
        assert!(!run_pass(&HandleReshapePass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_blocked_input_converted() {
        let layout = Layout::new(DataType::F32, Format::BfyxF16, Tensor::new(1, 16, 2, 2));
        let mut topology = Topology::new();
        topology.add(Primitive::input("in", layout)).unwrap();
        topology
            .add(Primitive::reshape("flat", "in", Tensor::new(1, 64, 1, 1)))
            .unwrap();
        let mut graph = build_graph(&topology);
        let fixture = TestContext::new();

        assert!(run_pass(&HandleReshapePass::new(), &mut graph, &fixture));
        let reorder = graph.get_node("_reorder_in_bfyx_f32").unwrap();
        assert_eq!(reorder.output_layout().unwrap().format, Format::Bfyx);
        let flat = graph.get_node("flat").unwrap();
        assert_eq!(graph[flat.dependencies()[0]].id(), "_reorder_in_bfyx_f32");
        assert!(!run_pass(&HandleReshapePass::new(), &mut graph, &fixture));
    }

    #[test]
    fn test_output_reshape_kept() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 4, 2, 2))).unwrap();
        topology
            .add(Primitive::reshape("same", "in", Tensor::new(1, 4, 2, 2)))
            .unwrap();
        let mut graph = build_graph(&topology);
        assert!(!run_pass(&HandleReshapePass::new(), &mut graph, &TestContext::new()));
        assert!(graph.contains("same"));
    }
}
