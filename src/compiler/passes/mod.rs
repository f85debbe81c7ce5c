//! Built-in graph optimization passes.
//!
//! Every pass rewrites the graph only through the [`GraphEditor`](crate::graph::GraphEditor)
//! and returns whether it changed anything. Passes are idempotent and can be run on their
//! own, without the rest of the pipeline.
//!
//! # Pipeline Phases
//!
//! The [`PassScheduler`](crate::compiler::PassScheduler) runs the passes in two phases,
//! each pass once.
//!
//! ## Phase 1: Pre-optimization
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`TrimToOutputsPass`] | Removes nodes that do not contribute to any output |
//! | [`HandleReshapePass`] | Splices out no-op reshapes, converts blocked reshape inputs |
//! | [`RedundantReordersPass`] | Removes reorders that do not change anything |
//! | [`DepthwiseMarkingPass`] | Flags split convolutions eligible for merged weights |
//! | [`ReorderInputsPass`] | Converts data inputs to the preferred layout |
//! | [`PreOptimizeBiasPass`] | Converts biases to the preferred layout |
//! | [`PreparePaddingPass`] | Requests the input padding windowed primitives need |
//!
//! ## Phase 2: Post-optimization
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`PostOptimizeWeightsPass`] | Converts weights to the preferred layout |
//! | [`RedundantReordersPass`] | Cleans up after the weights conversions |
//! | [`PropagateConstantsPass`] | Replaces constant subgraphs by precomputed data |
//! | [`DepthwiseFusingPass`] | Merges per-split weights of flagged convolutions |
//! | [`PrimitiveFusingPass`] | Fuses activations into their producers |
//! | [`BufferFusingPass`] | Lets concatenations and crops work in place |
//! | [`TrimToOutputsPass`] | Removes what the rewrites left unused |
//! | [`ParallelReorderPass`] | Orders independent nodes for parallel execution |

mod buffer;
mod constants;
mod depthwise;
mod fusing;
mod layout;
mod padding;
mod parallel;
mod reorders;
mod reshape;
mod trim;
pub(crate) mod utils;

pub use buffer::BufferFusingPass;
pub use constants::PropagateConstantsPass;
pub use depthwise::{DepthwiseFusingPass, DepthwiseMarkingPass};
pub use fusing::PrimitiveFusingPass;
pub use layout::{PostOptimizeWeightsPass, PreOptimizeBiasPass, ReorderInputsPass};
pub use padding::PreparePaddingPass;
pub use parallel::ParallelReorderPass;
pub use reorders::RedundantReordersPass;
pub use reshape::HandleReshapePass;
pub use trim::TrimToOutputsPass;
