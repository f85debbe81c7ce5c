//! Layout conversions requested by the layout optimizer.
//!
//! The three passes in this module differ only in the role of the dependency slots they
//! look at: data inputs are converted before anything else, biases in the
//! pre-optimization phase and weights last, once the consuming primitive is final.
//! Conversions of constant weights and biases are folded away by constant propagation.

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        passes::utils::convert_inputs_with_role,
    },
    config::PassKind,
    graph::GraphStore,
    policy::InputRole,
    Result,
};

/// Converts data inputs to the preferred layout.
pub struct ReorderInputsPass;

impl Default for ReorderInputsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ReorderInputsPass {
    /// Creates a new input reordering pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for ReorderInputsPass {
    fn name(&self) -> &'static str {
        "reorder_inputs"
    }

    fn kind(&self) -> PassKind {
        PassKind::ReorderInputs
    }

    fn description(&self) -> &'static str {
        "Converts data inputs to the layout preferred by their consumer"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        convert_inputs_with_role(graph, ctx, self.name(), InputRole::Data)
    }
}

/// Converts convolution and fully connected biases to the preferred layout.
pub struct PreOptimizeBiasPass;

impl Default for PreOptimizeBiasPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PreOptimizeBiasPass {
    /// Creates a new bias optimization pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for PreOptimizeBiasPass {
    fn name(&self) -> &'static str {
        "pre_optimize_bias"
    }

    fn kind(&self) -> PassKind {
        PassKind::Bias
    }

    fn description(&self) -> &'static str {
        "Converts biases to the layout preferred by their consumer"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        convert_inputs_with_role(graph, ctx, self.name(), InputRole::Bias)
    }
}

/// Converts convolution and fully connected weights to the preferred layout.
pub struct PostOptimizeWeightsPass;

impl Default for PostOptimizeWeightsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl PostOptimizeWeightsPass {
    /// Creates a new weights optimization pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for PostOptimizeWeightsPass {
    fn name(&self) -> &'static str {
        "post_optimize_weights"
    }

    fn kind(&self) -> PassKind {
        PassKind::Weights
    }

    fn description(&self) -> &'static str {
        "Converts weights to the layout preferred by their consumer"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        convert_inputs_with_role(graph, ctx, self.name(), InputRole::Weights)
    }
}
