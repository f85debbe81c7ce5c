//! Input padding for windowed primitives.
//!
//! Kernels of convolutions in plain formats, and of convolutions and poolings that
//! produce an explicitly requested output size, read their input through a window that
//! may start before the data (negative input offset) or run past its end. Instead of
//! bounds checks the kernels expect the input buffer to be padded accordingly.
//!
//! The padding is requested from the producer: it is merged into the producer's output
//! padding so the producer writes into a larger buffer. Runtime inputs and constants
//! cannot do that, they get an explicit padded conversion node instead.

use std::sync::Arc;

use crate::{
    analysis::infer_layout,
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::{layout_of, ordered_nodes},
        EventKind,
    },
    config::PassKind,
    graph::{GraphStore, NodeFlags, NodeId},
    topology::{Operation, Padding, Primitive, Tensor},
    Error, Result,
};

/// Window geometry of a node that reads its input through a sliding window.
struct Window {
    offset: Tensor,
    stride: Tensor,
    dilation: Tensor,
    extent: Tensor,
}

/// Requests the input padding windowed primitives need.
pub struct PreparePaddingPass;

impl Default for PreparePaddingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparePaddingPass {
    /// Creates a new padding preparation pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn window(graph: &GraphStore, node: NodeId) -> Result<Option<Window>> {
        let current = &graph[node];
        let handles_size = current.flags().contains(NodeFlags::OUTPUT_SIZE_HANDLING);
        match current.operation() {
            Operation::Convolution(params) => {
                let Some(input) = current.dependency(0) else {
                    return Ok(None);
                };
                if !handles_size && !layout_of(graph, input)?.format.is_plain() {
                    return Ok(None);
                }
                let Some(weights) = current.dependency(1) else {
                    return Ok(None);
                };
                Ok(Some(Window {
                    offset: params.input_offset,
                    stride: params.stride,
                    dilation: params.dilation,
                    extent: layout_of(graph, weights)?.size,
                }))
            }
            Operation::Pooling(params) if handles_size => Ok(Some(Window {
                offset: params.input_offset,
                stride: params.stride,
                dilation: Tensor::spatial(1, 1),
                extent: params.size,
            })),
            _ => Ok(None),
        }
    }

    /// Padding the input of a window needs to produce `output` from `input`.
    fn needed_padding(window: &Window, input: Tensor, output: Tensor) -> Padding {
        let overrun = |offset: i32, out: i32, stride: i32, extent: i32, dilation: i32, size: i32| {
            (offset + (out - 1) * stride + (extent - 1) * dilation + 1 - size).max(0)
        };
        let lower = Tensor::new(
            0,
            0,
            (-window.offset.x).max(0),
            (-window.offset.y).max(0),
        );
        let upper = Tensor::new(
            0,
            0,
            overrun(
                window.offset.x,
                output.x,
                window.stride.x,
                window.extent.x,
                window.dilation.x,
                input.x,
            ),
            overrun(
                window.offset.y,
                output.y,
                window.stride.y,
                window.extent.y,
                window.dilation.y,
                input.y,
            ),
        );
        Padding::new(lower, upper)
    }

    fn apply(
        &self,
        graph: &mut GraphStore,
        ctx: &PassContext<'_>,
        user: NodeId,
        needed: Padding,
    ) -> Result<bool> {
        let Some(dep) = graph[user].dependency(0) else {
            return Ok(false);
        };
        let current = layout_of(graph, dep)?;
        if current.padding.covers(&needed) {
            return Ok(false);
        }

        let padded = if graph[dep].is_input() || graph[dep].is_constant() {
            let dep_id = graph[dep].id().to_string();
            let reorder_id = format!("_padding_reorder_{dep_id}");
            let mut editor = graph.editor_with_events(ctx.events);
            match editor.graph().lookup(&reorder_id) {
                Some(existing) if editor.graph()[existing].dependencies() == [dep] => {
                    editor.add_intermediate(existing, user, 0, false)?;
                    existing
                }
                Some(_) => return Err(Error::IdentifierCollision(reorder_id)),
                None => {
                    let primitive = Primitive::new(
                        reorder_id,
                        Operation::Reorder {
                            format: current.format,
                            data_type: current.data_type,
                            padding: needed,
                        },
                        [dep_id],
                    );
                    let node = editor.get_or_create(Arc::new(primitive));
                    editor.add_intermediate(node, user, 0, true)?;
                    node
                }
            }
        } else {
            dep
        };

        let merged = graph[padded].output_padding().max(needed);
        graph.node_mut(padded).set_output_padding(merged);
        let layout = infer_layout(graph, padded)?;
        graph.node_mut(padded).set_layout(layout);
        ctx.events
            .record(EventKind::PaddingApplied)
            .node(padded)
            .pass(self.name())
            .message(format!(
                "{} padded for {}: {layout}",
                graph[padded].id(),
                graph[user].id()
            ));
        Ok(true)
    }
}

impl GraphPass for PreparePaddingPass {
    fn name(&self) -> &'static str {
        "prepare_padding"
    }

    fn kind(&self) -> PassKind {
        PassKind::Padding
    }

    fn description(&self) -> &'static str {
        "Pads the inputs of windowed primitives so kernels need no bounds checks"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let mut changed = false;
        for node in ordered_nodes(graph) {
            if !graph.is_live(node) {
                continue;
            }
            let Some(window) = Self::window(graph, node)? else {
                continue;
            };
            let Some(input) = graph[node].dependency(0) else {
                continue;
            };
            let input_size = layout_of(graph, input)?.size;
            let output_size = layout_of(graph, node)?.size;
            let needed = Self::needed_padding(&window, input_size, output_size);
            if needed.is_zero() {
                continue;
            }
            changed |= self.apply(graph, ctx, node, needed)?;
        }
        Ok(changed)
    }
}
