//! Layout selection.
//!
//! The compiler asks a [`LayoutOptimizer`] which layout a node wants for each of its
//! inputs and inserts a conversion when the current layout differs. Returning `None`
//! keeps the current layout.

use crate::{
    analysis::convolution_weights_count,
    graph::{GraphStore, NodeId},
    topology::{Format, Layout, Operation},
};

/// Role of a dependency slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRole {
    /// A data input
    Data,
    /// Weights of a convolution or fully connected layer
    Weights,
    /// Biases of a convolution or fully connected layer
    Bias,
}

impl InputRole {
    /// Role of dependency `index` of `node`.
    #[must_use]
    pub fn of(graph: &GraphStore, node: NodeId, index: usize) -> InputRole {
        let current = &graph[node];
        match current.operation() {
            Operation::Convolution(params) => {
                let weights = convolution_weights_count(params, current.dependencies().len());
                match index {
                    0 => InputRole::Data,
                    i if i <= weights => InputRole::Weights,
                    _ => InputRole::Bias,
                }
            }
            Operation::FullyConnected { .. } => match index {
                0 => InputRole::Data,
                1 => InputRole::Weights,
                _ => InputRole::Bias,
            },
            _ => InputRole::Data,
        }
    }
}

/// Chooses preferred input layouts.
pub trait LayoutOptimizer {
    /// Name used in events.
    fn name(&self) -> &'static str;

    /// Preferred layout of dependency `index` of `node`, or `None` to keep the current one.
    ///
    /// The returned layout must have the same size as the dependency's current layout.
    fn preferred_input_layout(&self, graph: &GraphStore, node: NodeId, index: usize)
        -> Option<Layout>;
}

/// Device independent default preferences.
///
/// - convolution data inputs in a blocked format are converted to plain `bfyx`
/// - convolution weights with a multiple of 16 output features use `os_iyx_osv16`
/// - convolution and fully connected biases use `bfyx` in the data type of the input
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceLayoutOptimizer;

impl DeviceLayoutOptimizer {
    /// Creates the optimizer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LayoutOptimizer for DeviceLayoutOptimizer {
    fn name(&self) -> &'static str {
        "device"
    }

    fn preferred_input_layout(
        &self,
        graph: &GraphStore,
        node: NodeId,
        index: usize,
    ) -> Option<Layout> {
        let current = &graph[node];
        let dep = current.dependency(index)?;
        let layout = *graph[dep].output_layout()?;
        let is_convolution = matches!(current.operation(), Operation::Convolution(_));
        let is_fully_connected = matches!(current.operation(), Operation::FullyConnected { .. });

        match InputRole::of(graph, node, index) {
            InputRole::Data if is_convolution && !layout.format.is_plain() => {
                Some(Layout::new(layout.data_type, Format::Bfyx, layout.size))
            }
            InputRole::Weights
                if is_convolution
                    && layout.size.batch % 16 == 0
                    && layout.format != Format::OsIyxOsv16 =>
            {
                Some(Layout::new(
                    layout.data_type,
                    Format::OsIyxOsv16,
                    layout.size,
                ))
            }
            InputRole::Bias if is_convolution || is_fully_connected => {
                let data_type = graph[current.dependency(0)?]
                    .output_layout()
                    .map_or(layout.data_type, |l| l.data_type);
                Some(Layout::new(data_type, Format::Bfyx, layout.size))
            }
            _ => None,
        }
    }
}
