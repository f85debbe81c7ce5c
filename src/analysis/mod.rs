//! Structural analyses over the program graph.
//!
//! - [`calc_processing_order`] - deterministic topological order, cycle detection
//! - [`calc_dominators`] / [`post_dominated_branch`] - dominance from the sources and
//!   towards the outputs
//! - [`infer_layout`] / [`resolve_layouts`] - output layout derivation and validation
//! - [`mark_constants`], [`mark_data_flow`], [`analyze_output_size_handling`] - node
//!   flags derived from the graph shape
//!
//! Analyses only read the graph or set derived metadata (flags, layouts); they never
//! change edges.

mod dominators;
mod layout;
mod marking;
mod order;

pub use dominators::{
    calc_dominators, compute_dominators, post_dominated_branch, Dominance, DominatorTree,
};
pub use layout::{infer_layout, resolve_layouts};
pub(crate) use layout::convolution_weights_count;
pub use marking::{analyze_output_size_handling, mark_constants, mark_data_flow};
pub use order::calc_processing_order;
