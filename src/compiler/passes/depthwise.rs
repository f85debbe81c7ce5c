//! Depthwise separable convolution optimization.
//!
//! A convolution split into many groups with few input features each is executed far
//! more efficiently by a single kernel over merged weights than by one kernel per
//! group. The optimization runs in two steps:
//!
//! 1. [`DepthwiseMarkingPass`] (pre-optimization) flags convolutions with at least
//!    [`MIN_SPLIT`] groups of at most [`MAX_FEATURES_PER_SPLIT`] input features whose
//!    per-group weights and biases are constants used by nothing else.
//! 2. [`DepthwiseFusingPass`] (post-optimization, after constant propagation) merges
//!    the per-group weights, and biases, of flagged convolutions into single data
//!    nodes. The first group's node is replaced by the merged one, the others are
//!    disconnected and dropped.

use std::sync::Arc;

use crate::{
    analysis::convolution_weights_count,
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::{layout_of, ordered_nodes},
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeFlags, NodeId},
    topology::{Layout, Operation, Primitive, Tensor},
    Result,
};

/// Minimum number of groups for the optimization.
pub const MIN_SPLIT: u32 = 16;

/// Maximum number of input features per group.
pub const MAX_FEATURES_PER_SPLIT: i32 = 8;

/// Flags split convolutions eligible for merged weights.
pub struct DepthwiseMarkingPass;

impl Default for DepthwiseMarkingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthwiseMarkingPass {
    /// Creates a new depthwise marking pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn is_eligible(graph: &GraphStore, node: NodeId) -> Result<bool> {
        let current = &graph[node];
        let Operation::Convolution(params) = current.operation() else {
            return Ok(false);
        };
        let deps = current.dependencies();
        let weights = convolution_weights_count(params, deps.len());
        if params.split < MIN_SPLIT || weights != params.split as usize {
            return Ok(false);
        }
        let Some(&input) = deps.first() else {
            return Ok(false);
        };
        let features = layout_of(graph, input)?.size.feature;
        if features / params.split as i32 > MAX_FEATURES_PER_SPLIT {
            return Ok(false);
        }
        Ok(deps[1..]
            .iter()
            .all(|&d| graph[d].is_constant() && graph[d].users() == [node]))
    }
}

impl GraphPass for DepthwiseMarkingPass {
    fn name(&self) -> &'static str {
        "prepare_depthwise_sep_opt"
    }

    fn kind(&self) -> PassKind {
        PassKind::DepthwiseFusing
    }

    fn description(&self) -> &'static str {
        "Flags split convolutions whose per-group weights can be merged"
    }

    fn run(&self, graph: &mut GraphStore, _ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for node in ordered_nodes(graph) {
            let eligible = Self::is_eligible(graph, node)?;
            let current = graph[node].flags().contains(NodeFlags::DEPTHWISE_SEP_OPT);
            if eligible != current {
                graph
                    .node_mut(node)
                    .set_flag(NodeFlags::DEPTHWISE_SEP_OPT, eligible);
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Merges the per-group weights of flagged convolutions.
pub struct DepthwiseFusingPass;

impl Default for DepthwiseFusingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthwiseFusingPass {
    /// Creates a new depthwise fusing pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Concatenates data nodes along the batch axis (weights) or the feature axis
    /// (biases, which have a batch of one).
    ///
    /// Returns `None` if any node is not a `data` node or the groups differ in layout.
    fn merge(graph: &GraphStore, nodes: &[NodeId], batch_axis: bool) -> Option<(Layout, Vec<f32>)> {
        let mut layout: Option<Layout> = None;
        let mut values = Vec::new();
        for &node in nodes {
            let Operation::Data {
                layout: part,
                values: part_values,
            } = graph[node].operation()
            else {
                return None;
            };
            match layout {
                None => layout = Some(*part),
                Some(l) if l.size == part.size && l.format == part.format => {}
                Some(_) => return None,
            }
            values.extend_from_slice(part_values);
        }
        let first = layout?;
        let groups = i32::try_from(nodes.len()).ok()?;
        let size = if batch_axis {
            Tensor::new(first.size.batch * groups, first.size.feature, first.size.x, first.size.y)
        } else if first.size.batch == 1 {
            Tensor::new(1, first.size.feature * groups, first.size.x, first.size.y)
        } else {
            return None;
        };
        Some((Layout::new(first.data_type, first.format, size), values))
    }

    /// Replaces `group[0]` by `merged` data and drops the other groups.
    fn apply_merge(
        graph: &mut GraphStore,
        ctx: &PassContext<'_>,
        conv: NodeId,
        group: &[NodeId],
        merged: Primitive,
    ) -> Result<()> {
        let Some((&first, rest)) = group.split_first() else {
            return Ok(());
        };
        let mut editor = graph.editor_with_events(ctx.events);
        let node = editor.get_or_create(Arc::new(merged));
        editor.replace(first, node, true, false)?;
        for &other in rest {
            editor.remove_connection(other, conv)?;
            editor.remove_if_dangling(other, true)?;
        }
        Ok(())
    }
}

impl GraphPass for DepthwiseFusingPass {
    fn name(&self) -> &'static str {
        "depthwise_sep_opt"
    }

    fn kind(&self) -> PassKind {
        PassKind::DepthwiseFusing
    }

    fn description(&self) -> &'static str {
        "Merges per-group weights and biases of depthwise separable convolutions"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for conv in ordered_nodes(graph) {
            if !graph.is_live(conv) || !graph[conv].flags().contains(NodeFlags::DEPTHWISE_SEP_OPT) {
                continue;
            }
            let current = &graph[conv];
            let Operation::Convolution(params) = current.operation() else {
                continue;
            };
            let deps = current.dependencies().to_vec();
            let groups = convolution_weights_count(params, deps.len());
            if groups <= 1 || groups != params.split as usize {
                continue;
            }
            let with_bias = params.with_bias;
            let conv_id = current.id().to_string();

            let weights = &deps[1..=groups];
            let biases = &deps[groups + 1..];
            let Some((weights_layout, weights_values)) = Self::merge(graph, weights, true) else {
                continue;
            };
            let merged_biases = if with_bias {
                match Self::merge(graph, biases, false) {
                    Some(merged) => Some(merged),
                    None => continue,
                }
            } else {
                None
            };

            let merged_weights = Primitive::data(
                format!("_dw_weights_{conv_id}"),
                weights_layout,
                weights_values,
            );
            Self::apply_merge(graph, ctx, conv, weights, merged_weights)?;
            if let Some((bias_layout, bias_values)) = merged_biases {
                let merged = Primitive::data(format!("_dw_biases_{conv_id}"), bias_layout, bias_values);
                Self::apply_merge(graph, ctx, conv, biases, merged)?;
            }

            let inputs: Vec<String> = graph[conv]
                .dependencies()
                .iter()
                .map(|&d| graph[d].id().to_string())
                .collect();
            let primitive = Primitive::new(conv_id.clone(), graph[conv].operation().clone(), inputs);
            graph.node_mut(conv).set_primitive(Arc::new(primitive));
            ctx.events
                .record(EventKind::PrimitiveFused)
                .node(conv)
                .pass(self.name())
                .message(format!("{conv_id}: merged {groups} weight groups"));
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{build_graph, convolution_topology, run_pass, TestContext};

    #[test]
    fn test_marking() {
        let mut graph = build_graph(&convolution_topology(1, 16));
        let fixture = TestContext::new();
        assert!(run_pass(&DepthwiseMarkingPass::new(), &mut graph, &fixture));
        assert!(graph
            .get_node("conv")
            .unwrap()
            .flags()
            .contains(NodeFlags::DEPTHWISE_SEP_OPT));
        assert!(!run_pass(&DepthwiseMarkingPass::new(), &mut graph, &fixture));

        let mut small = build_graph(&convolution_topology(1, 4));
        assert!(!run_pass(&DepthwiseMarkingPass::new(), &mut small, &fixture));
    }

    #[test]
    fn test_fusing_merges_weights() {
        let mut graph = build_graph(&convolution_topology(1, 16));
        let fixture = TestContext::new();
        let before = layout_of(&graph, graph.lookup("conv").unwrap()).unwrap();
        run_pass(&DepthwiseMarkingPass::new(), &mut graph, &fixture);

        assert!(run_pass(&DepthwiseFusingPass::new(), &mut graph, &fixture));
        let conv = graph.get_node("conv").unwrap();
        // input, merged weights, merged biases
        assert_eq!(conv.dependencies().len(), 3);
        let weights = &graph[conv.dependencies()[1]];
        assert_eq!(weights.id(), "w0");
        assert_eq!(weights.output_layout().unwrap().size.batch, 16);
        let biases = &graph[conv.dependencies()[2]];
        assert_eq!(biases.output_layout().unwrap().size.feature, 16);
        assert_eq!(conv.output_layout().unwrap().size, before.size);
        assert!(!graph.contains("w1"));
        assert!(!graph.contains("b15"));
        assert_eq!(conv.primitive().inputs, vec!["in", "w0", "b0"]);
        graph.check_integrity().unwrap();

        assert!(!run_pass(&DepthwiseFusingPass::new(), &mut graph, &fixture));
    }
}
