//! Output layout inference.
//!
//! [`infer_layout`] derives the output layout of one node from its operation and the
//! layouts of its dependencies, validating that the inputs are consistent with each other.
//! [`resolve_layouts`] walks the processing order and stores the result on every node,
//! merged with the output padding other nodes requested.
//!
//! Sizes are derived per operation:
//!
//! | Operation | Output size |
//! |-----------|-------------|
//! | `Input`, `Data` | declared layout |
//! | `Reorder`, `Activation`, `Softmax`, `Split` | input size |
//! | `Eltwise` | input size, all inputs equal |
//! | `Convolution` | `(in + 2*pad - ((k-1)*dilation+1)) / stride + 1`, or the explicit size |
//! | `Pooling` | `(in + 2*pad - window) / stride + 1`, or the explicit size |
//! | `FullyConnected` | `batch x weights.batch x 1 x 1` |
//! | `Concatenation` | sum along the axis, other axes equal |
//! | `Crop` | reference size, must fit inside the input |
//! | `Reshape` | target size, same element count |

use std::collections::HashMap;

use crate::{
    graph::{GraphStore, NodeId},
    topology::{ConvolutionParams, Format, Layout, Operation, PoolingParams, Tensor},
    utils::BitSet,
    Error, Result,
};

/// Infers the output layout of `node`, including its requested output padding.
///
/// Ancestors without a resolved layout are inferred first, each one once.
///
/// # Errors
///
/// Returns [`Error::InvalidLayout`] if the inputs of `node` are inconsistent with its
/// operation.
pub fn infer_layout(graph: &GraphStore, node: NodeId) -> Result<Layout> {
    let mut inferred = HashMap::new();
    let resolved = graph[node]
        .dependencies()
        .iter()
        .all(|&dep| graph[dep].output_layout().is_some());
    if resolved {
        return infer_single(graph, node, &inferred);
    }
    for ancestor in unresolved_ancestors(graph, node) {
        let layout = infer_single(graph, ancestor, &inferred)?;
        inferred.insert(ancestor, layout);
    }
    infer_single(graph, node, &inferred)
}

/// Ancestors of `node` that have no layout yet and are reachable through such nodes,
/// dependencies first.
fn unresolved_ancestors(graph: &GraphStore, node: NodeId) -> Vec<NodeId> {
    let unresolved = |n: NodeId| graph[n].output_layout().is_none();
    let mut visited = BitSet::new(graph.capacity());
    let mut ordered = Vec::new();
    // (node, next dependency to visit)
    let mut stack = vec![(node, 0usize)];
    visited.insert(node.index());
    while let Some((current, next)) = stack.pop() {
        match graph[current].dependency(next) {
            Some(dep) => {
                stack.push((current, next + 1));
                if unresolved(dep) && visited.insert(dep.index()) {
                    stack.push((dep, 0));
                }
            }
            None if current != node => ordered.push(current),
            None => {}
        }
    }
    ordered
}

fn infer_single(
    graph: &GraphStore,
    node: NodeId,
    inferred: &HashMap<NodeId, Layout>,
) -> Result<Layout> {
    let current = &graph[node];
    let invalid = |message: String| Error::InvalidLayout {
        node: current.id().to_string(),
        message,
    };

    let mut inputs = Vec::with_capacity(current.dependencies().len());
    for &dep in current.dependencies() {
        match graph[dep].output_layout().or_else(|| inferred.get(&dep)) {
            Some(layout) => inputs.push(*layout),
            None => {
                return Err(invalid(format!(
                    "dependency '{}' has no layout",
                    graph[dep].id()
                )))
            }
        }
    }
    let first = || {
        inputs
            .first()
            .copied()
            .ok_or_else(|| invalid(format!("{} requires an input", current.kind())))
    };

    let layout = match current.operation() {
        Operation::Input { layout } => *layout,
        Operation::Data { layout, values } => {
            if values.len() != layout.count() {
                return Err(invalid(format!(
                    "{} values for {} elements",
                    values.len(),
                    layout.count()
                )));
            }
            *layout
        }
        Operation::Reorder {
            format,
            data_type,
            padding,
        } => Layout::new(*data_type, *format, first()?.size).with_padding(*padding),
        Operation::Activation { .. } | Operation::Softmax | Operation::Split { .. } => {
            plain_copy(first()?)
        }
        Operation::Eltwise { .. } => {
            let base = first()?;
            if inputs.len() < 2 {
                return Err(invalid("eltwise requires at least two inputs".to_string()));
            }
            if let Some(other) = inputs.iter().find(|l| l.size != base.size) {
                return Err(invalid(format!(
                    "input sizes differ: {} vs {}",
                    base.size, other.size
                )));
            }
            plain_copy(base)
        }
        Operation::Convolution(params) => convolution_layout(params, &inputs).map_err(invalid)?,
        Operation::FullyConnected { with_bias, .. } => {
            let expected = if *with_bias { 3 } else { 2 };
            if inputs.len() != expected {
                return Err(invalid(format!(
                    "expected {expected} inputs, found {}",
                    inputs.len()
                )));
            }
            let input = inputs[0];
            let weights = inputs[1];
            let per_batch = input.size.feature * input.size.x * input.size.y;
            if weights.size.feature * weights.size.x * weights.size.y != per_batch {
                return Err(invalid(format!(
                    "weights {} do not match input {}",
                    weights.size, input.size
                )));
            }
            Layout::new(
                input.data_type,
                Format::Bfyx,
                Tensor::new(input.size.batch, weights.size.batch, 1, 1),
            )
        }
        Operation::Pooling(params) => pooling_layout(params, first()?).map_err(invalid)?,
        Operation::Concatenation { axis } => {
            let base = first()?;
            let index = axis.index();
            let mut axes = base.size.axes();
            for other in &inputs[1..] {
                let other_axes = other.size.axes();
                for (i, (&a, &b)) in axes.iter().zip(other_axes.iter()).enumerate() {
                    if i != index && a != b {
                        return Err(invalid(format!(
                            "inputs {} and {} differ outside the {} axis",
                            base.size, other.size, axis
                        )));
                    }
                }
                axes[index] += other_axes[index];
            }
            Layout::new(base.data_type, base.format, Tensor::from_axes(axes))
        }
        Operation::Crop { reference, offset } => {
            let base = first()?;
            let end = (*reference + *offset).axes();
            let fits = offset.axes().iter().all(|&o| o >= 0)
                && reference.axes().iter().all(|&r| r > 0)
                && end.iter().zip(base.size.axes()).all(|(&e, s)| e <= s);
            if !fits {
                return Err(invalid(format!(
                    "crop {} at {} exceeds input {}",
                    reference, offset, base.size
                )));
            }
            Layout::new(base.data_type, base.format, *reference)
        }
        Operation::Reshape { size } => {
            let base = first()?;
            if size.count() != base.size.count() {
                return Err(invalid(format!(
                    "cannot reshape {} to {}",
                    base.size, size
                )));
            }
            let format = if base.format.is_plain() {
                base.format
            } else {
                Format::Bfyx
            };
            Layout::new(base.data_type, format, *size)
        }
    };

    let padding = layout.padding.max(current.output_padding());
    Ok(layout.with_padding(padding))
}

/// Infers and stores the layout of every node in processing order.
///
/// # Errors
///
/// Returns the first [`Error::InvalidLayout`] encountered.
pub fn resolve_layouts(graph: &mut GraphStore) -> Result<()> {
    let order: Vec<NodeId> = graph.processing_order().iter().collect();
    for node in order {
        let layout = infer_layout(graph, node)?;
        graph.node_mut(node).set_layout(layout);
    }
    Ok(())
}

/// Number of weights inputs of a convolution with `dependencies` inputs in total.
pub(crate) fn convolution_weights_count(params: &ConvolutionParams, dependencies: usize) -> usize {
    let per_group = if params.with_bias { 2 } else { 1 };
    dependencies.saturating_sub(1) / per_group
}

/// Spatial output extent of a sliding window.
pub(crate) fn window_output(input: i32, offset: i32, extent: i32, stride: i32) -> i32 {
    let pad = -offset;
    (input + 2 * pad - extent) / stride.max(1) + 1
}

fn plain_copy(layout: Layout) -> Layout {
    Layout::new(layout.data_type, layout.format, layout.size)
}

fn convolution_layout(
    params: &ConvolutionParams,
    inputs: &[Layout],
) -> std::result::Result<Layout, String> {
    let Some(&input) = inputs.first() else {
        return Err("convolution requires an input".to_string());
    };
    let per_group = if params.with_bias { 2 } else { 1 };
    if inputs.len() < 1 + per_group || (inputs.len() - 1) % per_group != 0 {
        return Err(format!(
            "{} inputs do not form weights{} groups",
            inputs.len(),
            if params.with_bias { "/bias" } else { "" }
        ));
    }
    let weights_count = convolution_weights_count(params, inputs.len());
    let split = params.split.max(1) as i32;
    let weights = inputs[1];
    if inputs[1..=weights_count]
        .iter()
        .any(|w| w.size != weights.size)
    {
        return Err("weights of all splits must have the same size".to_string());
    }

    let features = if weights_count == 1 {
        weights.size.batch
    } else if weights_count == split as usize {
        weights.size.batch * split
    } else {
        return Err(format!(
            "{weights_count} weights inputs for split {split}"
        ));
    };
    if weights.size.feature * split != input.size.feature {
        return Err(format!(
            "weights {} do not match {} input features in {} splits",
            weights.size, input.size.feature, split
        ));
    }

    let size = match params.output_size {
        Some(explicit) => Tensor::new(input.size.batch, features, explicit.x, explicit.y),
        None => {
            let extent_x = (weights.size.x - 1) * params.dilation.x + 1;
            let extent_y = (weights.size.y - 1) * params.dilation.y + 1;
            Tensor::new(
                input.size.batch,
                features,
                window_output(input.size.x, params.input_offset.x, extent_x, params.stride.x),
                window_output(input.size.y, params.input_offset.y, extent_y, params.stride.y),
            )
        }
    };
    if size.x <= 0 || size.y <= 0 {
        return Err(format!("output size {size} is empty"));
    }
    Ok(Layout::new(input.data_type, input.format, size))
}

fn pooling_layout(params: &PoolingParams, input: Layout) -> std::result::Result<Layout, String> {
    let size = match params.output_size {
        Some(explicit) => Tensor::new(input.size.batch, input.size.feature, explicit.x, explicit.y),
        None => Tensor::new(
            input.size.batch,
            input.size.feature,
            window_output(input.size.x, params.input_offset.x, params.size.x, params.stride.x),
            window_output(input.size.y, params.input_offset.y, params.size.y, params.stride.y),
        ),
    };
    if size.x <= 0 || size.y <= 0 {
        return Err(format!("output size {size} is empty"));
    }
    Ok(Layout::new(input.data_type, input.format, size))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        test::{data_with, eltwise_sum, input_with, relu},
        topology::{ConcatAxis, DataType, Primitive},
    };

    fn single(prim: Primitive, deps: Vec<Primitive>) -> Result<Layout> {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let ids: Vec<NodeId> = deps
            .into_iter()
            .map(|p| editor.get_or_create(Arc::new(p)))
            .collect();
        let node = editor.get_or_create(Arc::new(prim));
        for dep in ids {
            editor.add_connection(dep, node)?;
        }
        infer_layout(&graph, node)
    }

    #[test]
    fn test_convolution_output_size() {
        let conv = Primitive::convolution(
            "conv",
            "in",
            ["w"],
            Vec::<String>::new(),
            ConvolutionParams {
                input_offset: Tensor::new(0, 0, -1, -1),
                ..Default::default()
            },
        );
        let layout = single(
            conv,
            vec![
                input_with("in", Tensor::new(1, 3, 8, 8)),
                data_with("w", Tensor::new(16, 3, 3, 3)),
            ],
        )
        .unwrap();
        assert_eq!(layout.size, Tensor::new(1, 16, 8, 8));
    }

    #[test]
    fn test_split_convolution_features() {
        let conv = Primitive::convolution(
            "conv",
            "in",
            ["w0", "w1"],
            ["b0", "b1"],
            ConvolutionParams {
                split: 2,
                stride: Tensor::spatial(2, 2),
                ..Default::default()
            },
        );
        let layout = single(
            conv,
            vec![
                input_with("in", Tensor::new(1, 4, 9, 9)),
                data_with("w0", Tensor::new(8, 2, 3, 3)),
                data_with("w1", Tensor::new(8, 2, 3, 3)),
                data_with("b0", Tensor::new(1, 8, 1, 1)),
                data_with("b1", Tensor::new(1, 8, 1, 1)),
            ],
        )
        .unwrap();
        assert_eq!(layout.size, Tensor::new(1, 16, 4, 4));
    }

    #[test]
    fn test_concatenation_mismatch() {
        let concat = Primitive::concatenation("cat", ["a", "b"], ConcatAxis::Feature);
        let ok = single(
            concat.clone(),
            vec![
                input_with("a", Tensor::new(1, 2, 4, 4)),
                input_with("b", Tensor::new(1, 3, 4, 4)),
            ],
        )
        .unwrap();
        assert_eq!(ok.size, Tensor::new(1, 5, 4, 4));

        let err = single(
            concat,
            vec![
                input_with("a", Tensor::new(1, 2, 4, 4)),
                input_with("b", Tensor::new(1, 3, 5, 4)),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidLayout { node, .. } if node == "cat"));
    }

    #[test]
    fn test_crop_bounds() {
        let crop = Primitive::crop("c", "in", Tensor::new(1, 2, 4, 4), Tensor::new(0, 3, 0, 0));
        let err = single(crop, vec![input_with("in", Tensor::new(1, 4, 4, 4))]).unwrap_err();
        assert!(matches!(err, Error::InvalidLayout { .. }));
    }

    #[test]
    fn test_reorder_and_reshape() {
        let reorder = Primitive::reorder("r", "in", Format::BfyxF16, DataType::F16);
        let layout = single(reorder, vec![input_with("in", Tensor::new(1, 3, 4, 4))]).unwrap();
        assert_eq!(layout.format, Format::BfyxF16);
        assert_eq!(layout.data_type, DataType::F16);

        let reshape = Primitive::reshape("s", "in", Tensor::new(1, 6, 2, 4));
        let layout = single(reshape, vec![input_with("in", Tensor::new(1, 3, 4, 4))]).unwrap();
        assert_eq!(layout.size, Tensor::new(1, 6, 2, 4));

        let reshape = Primitive::reshape("s", "in", Tensor::new(1, 5, 2, 4));
        assert!(single(reshape, vec![input_with("in", Tensor::new(1, 3, 4, 4))]).is_err());
    }

    #[test]
    fn test_unresolved_ancestry_inferred_once() {
        // 64 levels of x + x on top of a long activation chain, nothing resolved yet
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let mut last = editor.get_or_create(Arc::new(input_with("n0", Tensor::new(1, 2, 3, 3))));
        for i in 1..=10_000 {
            let prev = editor.graph()[last].id().to_string();
            let next = editor.get_or_create(Arc::new(relu(&format!("r{i}"), &prev)));
            editor.connect_unordered(last, next);
            last = next;
        }
        for i in 1..=64 {
            let prev = editor.graph()[last].id().to_string();
            let next =
                editor.get_or_create(Arc::new(eltwise_sum(&format!("e{i}"), &[&prev, &prev])));
            editor.connect_unordered(last, next);
            editor.connect_unordered(last, next);
            last = next;
        }

        let layout = infer_layout(&graph, last).unwrap();
        assert_eq!(layout.size, Tensor::new(1, 2, 3, 3));
        assert!(graph.nodes().all(|n| n.output_layout().is_none()));
    }

    #[test]
    fn test_data_value_count_checked() {
        let mut graph = GraphStore::new();
        let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 2, 2));
        let node = graph
            .editor()
            .get_or_create(Arc::new(Primitive::data("d", layout, vec![1.0, 2.0])));
        assert!(infer_layout(&graph, node).is_err());
    }
}
