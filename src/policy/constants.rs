//! Compile-time evaluation of constant subgraphs.
//!
//! A [`ConstantsPropagator`] is handed a constant node and returns its value, or `None`
//! if it cannot evaluate it. A refusal is not an error: the node simply stays in the
//! graph and is executed at run time.
//!
//! [`ReferenceConstantsPropagator`] evaluates the element-wise and data-movement kinds on
//! `f32` values. Values are kept in logical `batch, feature, y, x` order, so format
//! conversions leave them untouched.

use std::sync::Arc;

use crate::{
    graph::{GraphStore, NodeId},
    topology::{DataType, Layout, Operation, Tensor},
};

/// A precomputed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantData {
    /// Layout of the value
    pub layout: Layout,
    /// Values in logical order, one per element
    pub values: Arc<[f32]>,
}

/// Evaluates constant nodes.
pub trait ConstantsPropagator {
    /// Name used in events.
    fn name(&self) -> &'static str;

    /// Value of the constant `node`, or `None` if it cannot be computed.
    fn evaluate(&self, graph: &GraphStore, node: NodeId) -> Option<ConstantData>;
}

/// Reference evaluator for `reorder`, `activation`, `eltwise`, `reshape`, `crop`,
/// `concatenation` and `softmax` over `f32` data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceConstantsPropagator;

impl ReferenceConstantsPropagator {
    /// Creates the propagator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn values(&self, graph: &GraphStore, node: NodeId) -> Option<Arc<[f32]>> {
        let current = &graph[node];
        let layout = current.output_layout()?;
        if layout.data_type != DataType::F32 {
            return None;
        }
        let inputs = || -> Option<Vec<(Layout, Arc<[f32]>)>> {
            current
                .dependencies()
                .iter()
                .map(|&d| Some((*graph[d].output_layout()?, self.values(graph, d)?)))
                .collect()
        };

        let values: Vec<f32> = match current.operation() {
            Operation::Data { values, .. } => return Some(values.clone()),
            Operation::Reorder { .. } | Operation::Reshape { .. } => {
                let inputs = inputs()?;
                return inputs.into_iter().next().map(|(_, v)| v);
            }
            Operation::Activation { function } => {
                let inputs = inputs()?;
                let (_, input) = inputs.first()?;
                input.iter().map(|&v| function.apply(v)).collect()
            }
            Operation::Eltwise { mode, activation } => {
                let inputs = inputs()?;
                let (_, first) = inputs.first()?;
                let mut acc: Vec<f32> = first.to_vec();
                for (_, other) in &inputs[1..] {
                    if other.len() != acc.len() {
                        return None;
                    }
                    for (a, &b) in acc.iter_mut().zip(other.iter()) {
                        *a = mode.apply(*a, b);
                    }
                }
                if let Some(function) = activation {
                    acc.iter_mut().for_each(|v| *v = function.apply(*v));
                }
                acc
            }
            Operation::Crop { reference, offset } => {
                let inputs = inputs()?;
                let (input_layout, input) = inputs.first()?;
                crop(input, input_layout.size, *reference, *offset)
            }
            Operation::Concatenation { axis } => {
                let inputs = inputs()?;
                let parts: Vec<(Tensor, &[f32])> =
                    inputs.iter().map(|(l, v)| (l.size, &v[..])).collect();
                concatenate(&parts, axis.index(), layout.size)
            }
            Operation::Softmax => {
                let inputs = inputs()?;
                let (input_layout, input) = inputs.first()?;
                softmax(input, input_layout.size)
            }
            _ => return None,
        };
        (values.len() == layout.count()).then(|| values.into())
    }
}

impl ConstantsPropagator for ReferenceConstantsPropagator {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn evaluate(&self, graph: &GraphStore, node: NodeId) -> Option<ConstantData> {
        let layout = *graph[node].output_layout()?;
        let values = self.values(graph, node)?;
        Some(ConstantData { layout, values })
    }
}

/// Linear index of `(b, f, x, y)` in logical `b, f, y, x` order.
fn index(size: Tensor, b: i32, f: i32, x: i32, y: i32) -> usize {
    (((b * size.feature + f) * size.y + y) * size.x + x) as usize
}

fn crop(input: &[f32], size: Tensor, reference: Tensor, offset: Tensor) -> Vec<f32> {
    let mut out = Vec::with_capacity(reference.count());
    for b in 0..reference.batch {
        for f in 0..reference.feature {
            for y in 0..reference.y {
                for x in 0..reference.x {
                    let i = index(
                        size,
                        b + offset.batch,
                        f + offset.feature,
                        x + offset.x,
                        y + offset.y,
                    );
                    out.push(input.get(i).copied().unwrap_or_default());
                }
            }
        }
    }
    out
}

fn concatenate(parts: &[(Tensor, &[f32])], axis: usize, size: Tensor) -> Vec<f32> {
    let mut out = vec![0.0; size.count()];
    let mut base = 0;
    for (part_size, values) in parts {
        for b in 0..part_size.batch {
            for f in 0..part_size.feature {
                for y in 0..part_size.y {
                    for x in 0..part_size.x {
                        let mut at = [b, f, x, y];
                        at[axis] += base;
                        let src = index(*part_size, b, f, x, y);
                        let dst = index(size, at[0], at[1], at[2], at[3]);
                        if let (Some(slot), Some(&v)) = (out.get_mut(dst), values.get(src)) {
                            *slot = v;
                        }
                    }
                }
            }
        }
        base += part_size.axes()[axis];
    }
    out
}

fn softmax(input: &[f32], size: Tensor) -> Vec<f32> {
    let mut out = input.to_vec();
    for b in 0..size.batch {
        for y in 0..size.y {
            for x in 0..size.x {
                let slots: Vec<usize> = (0..size.feature).map(|f| index(size, b, f, x, y)).collect();
                let max = slots
                    .iter()
                    .filter_map(|&i| input.get(i))
                    .fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                let sum: f32 = slots
                    .iter()
                    .filter_map(|&i| input.get(i))
                    .map(|&v| (v - max).exp())
                    .sum();
                for &i in &slots {
                    if let (Some(slot), Some(&v)) = (out.get_mut(i), input.get(i)) {
                        *slot = (v - max).exp() / sum;
                    }
                }
            }
        }
    }
    out
}
