//! Buffer fusing.
//!
//! Some primitives only move data around and can work on a view of another node's
//! buffer instead of copying:
//!
//! - A feature-axis concatenation lets each input write directly into its slice of the
//!   concatenation's output. Each input gets feature padding that places its data at
//!   the right offset, and the concatenation itself becomes a no-op.
//! - A crop along the batch or feature axis reads a sub-range of its input in place.
//!   The crop's output padding describes where its data sits inside the input buffer.
//!
//! Both are flagged [`NodeFlags::CAN_BE_OPTIMIZED`]; the memory dependency analysis
//! treats such nodes as sharing storage with their neighbours.

use crate::{
    analysis::infer_layout,
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::{layout_of, ordered_nodes},
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeFlags, NodeId},
    topology::{ConcatAxis, Operation, Padding, Tensor},
    Result,
};

/// Lets concatenations and crops work in place.
pub struct BufferFusingPass;

impl Default for BufferFusingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferFusingPass {
    /// Creates a new buffer fusing pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Feature paddings of the inputs of an in-place concatenation, or `None` if the
    /// concatenation cannot work in place.
    fn concatenation_slices(graph: &GraphStore, node: NodeId) -> Result<Option<Vec<(NodeId, Padding)>>> {
        let current = &graph[node];
        if current.can_be_optimized() {
            return Ok(None);
        }
        let Operation::Concatenation {
            axis: ConcatAxis::Feature,
        } = current.operation()
        else {
            return Ok(None);
        };
        let output = layout_of(graph, node)?;
        if !output.format.is_plain() {
            return Ok(None);
        }

        let mut slices = Vec::with_capacity(current.dependencies().len());
        let mut offset = 0;
        for &dep in current.dependencies() {
            let producer = &graph[dep];
            let layout = layout_of(graph, dep)?;
            let in_place = producer.users() == [node]
                && !producer.is_input()
                && !producer.is_constant()
                && !producer.can_be_optimized()
                && layout.format == output.format
                && layout.padding.is_zero();
            if !in_place {
                return Ok(None);
            }
            let features = layout.size.feature;
            let lower = output.padding.lower + Tensor::new(0, offset, 0, 0);
            let upper = output.padding.upper
                + Tensor::new(0, output.size.feature - offset - features, 0, 0);
            slices.push((dep, Padding::new(lower, upper)));
            offset += features;
        }
        Ok(Some(slices))
    }

    /// Output padding of an in-place crop, or `None` if the crop must copy.
    fn crop_view(graph: &GraphStore, node: NodeId) -> Result<Option<Padding>> {
        let current = &graph[node];
        let Operation::Crop { reference, offset } = current.operation() else {
            return Ok(None);
        };
        if current.can_be_optimized() || current.is_constant() || !current.output_padding().is_zero() {
            return Ok(None);
        }
        let Some(dep) = current.dependency(0) else {
            return Ok(None);
        };
        let input = layout_of(graph, dep)?;
        let spatial_whole = reference.x == input.size.x
            && reference.y == input.size.y
            && offset.x == 0
            && offset.y == 0;
        if !spatial_whole || !input.format.is_plain() || !input.padding.is_zero() {
            return Ok(None);
        }
        let lower = Tensor::new(offset.batch, offset.feature, 0, 0);
        let upper = Tensor::new(
            input.size.batch - offset.batch - reference.batch,
            input.size.feature - offset.feature - reference.feature,
            0,
            0,
        );
        Ok(Some(Padding::new(lower, upper)))
    }

    fn set_padding(graph: &mut GraphStore, node: NodeId, padding: Padding) -> Result<()> {
        let merged = graph[node].output_padding().max(padding);
        graph.node_mut(node).set_output_padding(merged);
        let layout = infer_layout(graph, node)?;
        graph.node_mut(node).set_layout(layout);
        Ok(())
    }
}

impl GraphPass for BufferFusingPass {
    fn name(&self) -> &'static str {
        "prepare_buffer_fusing"
    }

    fn kind(&self) -> PassKind {
        PassKind::BufferFusing
    }

    fn description(&self) -> &'static str {
        "Lets feature concatenations and batch/feature crops work in place"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for node in ordered_nodes(graph) {
            if !graph.is_live(node) {
                continue;
            }
            if let Some(slices) = Self::concatenation_slices(graph, node)? {
                for (dep, padding) in slices {
                    Self::set_padding(graph, dep, padding)?;
                }
                graph
                    .node_mut(node)
                    .set_flag(NodeFlags::CAN_BE_OPTIMIZED, true);
                ctx.events
                    .record(EventKind::BufferFused)
                    .node(node)
                    .pass(self.name())
                    .message(format!("{} concatenates in place", graph[node].id()));
                changed = true;
            } else if let Some(padding) = Self::crop_view(graph, node)? {
                Self::set_padding(graph, node, padding)?;
                graph
                    .node_mut(node)
                    .set_flag(NodeFlags::CAN_BE_OPTIMIZED, true);
                ctx.events
                    .record(EventKind::BufferFused)
                    .node(node)
                    .pass(self.name())
                    .message(format!("{} crops in place", graph[node].id()));
                changed = true;
            }
        }
        Ok(changed)
    }
}
