//! Memory dependency analysis.
//!
//! After optimization, a memory pool may let node outputs share buffers. This module
//! tells it which ones must not: the [`MemoryDependencyGraph`] maps every node to the
//! identifiers of the nodes whose buffers it must not alias.
//!
//! The conflicts are the union of several [`MemoryPolicy`] implementations, combined by
//! the [`MemoryDependencyAnalyzer`]. Ambiguity always resolves to a conflict: a missing
//! conflict corrupts results at run time, an extra one only costs memory.
//!
//! # Examples
//!
//! ```rust
//! use nngraph::topology::{ActivationFunction, DataType, Format, Layout, Primitive, Tensor, Topology};
//! use nngraph::{BuildOptions, Program};
//!
//! let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 2, 2));
//! let mut topology = Topology::new();
//! topology.add(Primitive::input("a", layout))?;
//! topology.add(Primitive::activation("b", "a", ActivationFunction::Relu))?;
//! topology.add(Primitive::activation("c", "a", ActivationFunction::Relu))?;
//! topology.add_output("b").add_output("c");
//!
//! let program = Program::build(&topology, BuildOptions::default())?;
//! let deps = program.memory_dependencies();
//! assert!(deps.conflicts_with("a", "b"));
//! assert!(deps.conflicts_with("b", "c"));
//! # Ok::<(), nngraph::Error>(())
//! ```

mod analyzer;
mod dependencies;
mod policy;

pub use analyzer::MemoryDependencyAnalyzer;
pub use dependencies::MemoryDependencyGraph;
pub use policy::{BasicPolicy, BranchSnapshot, MemoryPolicy, OutOfOrderPolicy, SkippedBranchPolicy};
