//! # nngraph Prelude
//!
//! The types needed to describe a topology, compile it and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all nngraph operations
pub use crate::Error;

/// The result type used throughout nngraph
pub use crate::Result;

// ================================================================================================
// Topology Description
// ================================================================================================

pub use crate::topology::{
    ActivationFunction, ConcatAxis, ConvolutionParams, DataType, EltwiseMode, Format, Layout,
    Operation, Padding, PoolingMode, PoolingParams, Primitive, PrimitiveKind, SplitOutput, Tensor,
    Topology,
};

// ================================================================================================
// Compilation
// ================================================================================================

/// Build configuration
pub use crate::config::{BuildOptions, OptimizationPasses, PassKind};

/// Compiled program and its driver
pub use crate::program::{CompileDriver, Program};

/// Pass infrastructure for custom pipelines
pub use crate::compiler::{EventKind, EventLog, GraphPass, PassContext, PassScheduler};

// ================================================================================================
// Graph and Collaborators
// ================================================================================================

pub use crate::graph::{GraphStore, NodeFlags, NodeId, ProgramNode};

pub use crate::memory::MemoryDependencyGraph;

pub use crate::policy::{
    ConstantsPropagator, ImplementationHandle, ImplementationSelector, LayoutOptimizer,
};
