//! Build configuration.
//!
//! [`BuildOptions`] is fixed when a program is built. Every optimization pass belongs to
//! one [`PassKind`]; the set of enabled kinds is an [`OptimizationPasses`] bit set, so
//! passes can be switched off individually.

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

bitflags! {
    /// Set of enabled optimization pass kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OptimizationPasses: u16 {
        /// Remove nodes that do not contribute to any output
        const TRIM = 1 << 0;
        /// Splice out no-op reshapes, convert blocked reshape inputs
        const RESHAPE = 1 << 1;
        /// Remove reorders that do not change the layout
        const REDUNDANT_REORDERS = 1 << 2;
        /// Convert data inputs to the preferred layout
        const REORDER_INPUTS = 1 << 3;
        /// Convert biases to the preferred layout
        const BIAS = 1 << 4;
        /// Convert weights to the preferred layout
        const WEIGHTS = 1 << 5;
        /// Request the input padding windowed primitives need
        const PADDING = 1 << 6;
        /// Fold constant subgraphs
        const CONSTANTS = 1 << 7;
        /// Let concatenations and crops work in place
        const BUFFER_FUSING = 1 << 8;
        /// Fuse activations into their producers
        const PRIMITIVE_FUSING = 1 << 9;
        /// Merge the weights of depthwise separable convolutions
        const DEPTHWISE_FUSING = 1 << 10;
        /// Reorder for parallel execution
        const PARALLEL = 1 << 11;
    }
}

impl Default for OptimizationPasses {
    fn default() -> Self {
        Self::all()
    }
}

/// The kind of an optimization pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PassKind {
    /// Trimming to outputs
    Trim,
    /// Reshape handling
    Reshape,
    /// Redundant reorder removal
    RedundantReorders,
    /// Input reordering
    ReorderInputs,
    /// Bias pre-optimization
    Bias,
    /// Weights post-optimization
    Weights,
    /// Padding propagation
    Padding,
    /// Constant propagation
    Constants,
    /// Buffer fusing
    BufferFusing,
    /// Primitive fusing
    PrimitiveFusing,
    /// Depthwise separable fusing
    DepthwiseFusing,
    /// Parallel execution reordering
    Parallel,
}

impl PassKind {
    /// The flag enabling passes of this kind.
    #[must_use]
    pub const fn flag(self) -> OptimizationPasses {
        match self {
            PassKind::Trim => OptimizationPasses::TRIM,
            PassKind::Reshape => OptimizationPasses::RESHAPE,
            PassKind::RedundantReorders => OptimizationPasses::REDUNDANT_REORDERS,
            PassKind::ReorderInputs => OptimizationPasses::REORDER_INPUTS,
            PassKind::Bias => OptimizationPasses::BIAS,
            PassKind::Weights => OptimizationPasses::WEIGHTS,
            PassKind::Padding => OptimizationPasses::PADDING,
            PassKind::Constants => OptimizationPasses::CONSTANTS,
            PassKind::BufferFusing => OptimizationPasses::BUFFER_FUSING,
            PassKind::PrimitiveFusing => OptimizationPasses::PRIMITIVE_FUSING,
            PassKind::DepthwiseFusing => OptimizationPasses::DEPTHWISE_FUSING,
            PassKind::Parallel => OptimizationPasses::PARALLEL,
        }
    }
}

/// Configuration of one program build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Debug build: keeps nodes inspectable by disabling the fusing passes (default: false).
    pub debug: bool,

    /// Allow primitives to request an explicit output size (default: false).
    pub output_size_handling: bool,

    /// Target an out-of-order queue, which adds conflicts between independent nodes to the
    /// memory dependencies (default: true).
    pub out_of_order_queue: bool,

    /// Compute memory dependencies for a memory pool (default: true).
    pub memory_pool: bool,

    /// Enabled optimization passes (default: all).
    pub passes: OptimizationPasses,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            debug: false,
            output_size_handling: false,
            out_of_order_queue: true,
            memory_pool: true,
            passes: OptimizationPasses::all(),
        }
    }
}

impl BuildOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables debug mode.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enables or disables output size handling.
    #[must_use]
    pub fn with_output_size_handling(mut self, enable: bool) -> Self {
        self.output_size_handling = enable;
        self
    }

    /// Enables or disables the out-of-order queue model.
    #[must_use]
    pub fn with_out_of_order_queue(mut self, enable: bool) -> Self {
        self.out_of_order_queue = enable;
        self
    }

    /// Enables or disables the memory dependency analysis.
    #[must_use]
    pub fn with_memory_pool(mut self, enable: bool) -> Self {
        self.memory_pool = enable;
        self
    }

    /// Replaces the set of enabled passes.
    #[must_use]
    pub fn with_passes(mut self, passes: OptimizationPasses) -> Self {
        self.passes = passes;
        self
    }

    /// Disables one kind of pass.
    #[must_use]
    pub fn without_pass(mut self, kind: PassKind) -> Self {
        self.passes.remove(kind.flag());
        self
    }

    /// Passes that actually run: the configured set, minus the fusing passes in debug
    /// builds.
    #[must_use]
    pub fn effective_passes(&self) -> OptimizationPasses {
        if self.debug {
            self.passes
                - (OptimizationPasses::PRIMITIVE_FUSING
                    | OptimizationPasses::BUFFER_FUSING
                    | OptimizationPasses::DEPTHWISE_FUSING)
        } else {
            self.passes
        }
    }

    /// Returns `true` if passes of `kind` run.
    #[must_use]
    pub fn is_enabled(&self, kind: PassKind) -> bool {
        self.effective_passes().contains(kind.flag())
    }
}
