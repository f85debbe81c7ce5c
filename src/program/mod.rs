//! Compiled programs.
//!
//! A [`Program`] is the result of compiling a [`Topology`]: the optimized graph with
//! every node bound to an implementation, the memory dependencies for the memory pool
//! and the event log of the compile. [`Program::build`] compiles with the default
//! collaborators; [`CompileDriver`] lets callers install their own.
//!
//! # Examples
//!
//! ```rust
//! use nngraph::topology::{ActivationFunction, DataType, Format, Layout, Primitive, Tensor, Topology};
//! use nngraph::{BuildOptions, Error, Program};
//!
//! let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 2, 1));
//! let mut topology = Topology::new();
//! topology.add(Primitive::data("a", layout, vec![-1.0, 2.0]))?;
//! topology.add(Primitive::activation("b", "a", ActivationFunction::Relu))?;
//! topology.add_output("b");
//!
//! let program = Program::build(&topology, BuildOptions::default())?;
//! assert_eq!(program.nodes().count(), 1);
//! assert!(program.optimized_out().iter().any(|id| id == "a"));
//! assert!(matches!(program.get_node("a"), Err(Error::NotFound(_))));
//! # Ok::<(), nngraph::Error>(())
//! ```

mod driver;
mod init;

pub use driver::CompileDriver;
pub use init::init_graph;

use crate::{
    compiler::EventLog,
    config::BuildOptions,
    graph::{GraphStore, ProgramNode},
    memory::MemoryDependencyGraph,
    topology::Topology,
    Result,
};

/// A compiled topology.
#[derive(Debug)]
pub struct Program {
    graph: GraphStore,
    memory: MemoryDependencyGraph,
    events: EventLog,
    options: BuildOptions,
}

impl Program {
    pub(crate) fn new(
        graph: GraphStore,
        memory: MemoryDependencyGraph,
        events: EventLog,
        options: BuildOptions,
    ) -> Self {
        Self {
            graph,
            memory,
            events,
            options,
        }
    }

    /// Compiles `topology` with the default collaborators.
    ///
    /// # Errors
    ///
    /// See [`CompileDriver::compile`].
    pub fn build(topology: &Topology, options: BuildOptions) -> Result<Self> {
        CompileDriver::new().compile(topology, options)
    }

    /// The node with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) if no such node survived.
    pub fn get_node(&self, id: &str) -> Result<&ProgramNode> {
        self.graph.get_node(id)
    }

    /// Returns `true` if a node with identifier `id` survived compilation.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.graph.contains(id)
    }

    /// All surviving nodes, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &ProgramNode> + '_ {
        self.graph.nodes()
    }

    /// Surviving nodes in processing order.
    #[must_use]
    pub fn processing_order(&self) -> Vec<&ProgramNode> {
        self.graph
            .processing_order()
            .iter()
            .map(|n| &self.graph[n])
            .collect()
    }

    /// Identifiers of nodes removed during compilation.
    #[must_use]
    pub fn optimized_out(&self) -> &[String] {
        self.graph.optimized_out()
    }

    /// Output nodes.
    #[must_use]
    pub fn outputs(&self) -> Vec<&ProgramNode> {
        self.graph.outputs().iter().map(|&n| &self.graph[n]).collect()
    }

    /// Which node outputs must not share a buffer. Empty when the build options disable
    /// the memory pool.
    #[must_use]
    pub fn memory_dependencies(&self) -> &MemoryDependencyGraph {
        &self.memory
    }

    /// The memory dependencies as text, one `primitive: <id> restricted list: ...` line
    /// per node.
    #[must_use]
    pub fn memory_dependencies_string(&self) -> String {
        self.memory.to_string()
    }

    /// Events recorded during compilation.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The compiled graph.
    #[must_use]
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Options the program was built with.
    #[must_use]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }
}
