//! End-to-end compilation.

use crate::{
    compiler::{EventKind, EventLog, PassContext, PassScheduler},
    config::BuildOptions,
    graph::{GraphStore, NodeId},
    memory::{BranchSnapshot, MemoryDependencyAnalyzer, MemoryDependencyGraph},
    policy::{
        ConstantsPropagator, DeviceLayoutOptimizer, ImplementationSelector, LayoutOptimizer,
        ReferenceConstantsPropagator, ReferenceImplementationSelector,
    },
    program::{init_graph, Program},
    topology::Topology,
    Error, Result,
};

/// Orchestrates a compile: init, pre-optimization, post-optimization, memory
/// dependencies, implementation binding and cleanup.
///
/// The collaborators default to the device independent reference implementations and
/// can be swapped individually.
///
/// # Examples
///
/// ```rust
/// use nngraph::topology::{DataType, Format, Layout, Primitive, Tensor, Topology};
/// use nngraph::{BuildOptions, CompileDriver};
///
/// let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 2, 2));
/// let mut topology = Topology::new();
/// topology.add(Primitive::input("in", layout))?;
/// topology.add(Primitive::softmax("prob", "in"))?;
///
/// let program = CompileDriver::new().compile(&topology, BuildOptions::default())?;
/// let prob = program.get_node("prob")?;
/// assert_eq!(prob.implementation().map(|h| h.name.as_str()), Some("softmax_bfyx_ref"));
/// # Ok::<(), nngraph::Error>(())
/// ```
pub struct CompileDriver {
    scheduler: PassScheduler,
    layout_optimizer: Box<dyn LayoutOptimizer>,
    constants: Box<dyn ConstantsPropagator>,
    selector: Box<dyn ImplementationSelector>,
}

impl Default for CompileDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileDriver {
    /// Creates a driver with the standard pipeline and the reference collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheduler: PassScheduler::standard(),
            layout_optimizer: Box::new(DeviceLayoutOptimizer::new()),
            constants: Box::new(ReferenceConstantsPropagator::new()),
            selector: Box::new(ReferenceImplementationSelector::new()),
        }
    }

    /// Replaces the pass pipeline.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: PassScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replaces the layout optimizer.
    #[must_use]
    pub fn with_layout_optimizer(mut self, optimizer: Box<dyn LayoutOptimizer>) -> Self {
        self.layout_optimizer = optimizer;
        self
    }

    /// Replaces the constants propagator.
    #[must_use]
    pub fn with_constants_propagator(mut self, constants: Box<dyn ConstantsPropagator>) -> Self {
        self.constants = constants;
        self
    }

    /// Replaces the implementation selector.
    #[must_use]
    pub fn with_implementation_selector(mut self, selector: Box<dyn ImplementationSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Compiles `topology`.
    ///
    /// # Errors
    ///
    /// Fails with the first fatal error of any stage: topology errors from
    /// initialization, [`Error::PassFailed`] naming the failing pass,
    /// [`Error::BindFailure`] naming the node without implementation.
    pub fn compile(&self, topology: &Topology, options: BuildOptions) -> Result<Program> {
        let events = EventLog::new();
        let mut graph = init_graph(topology, &options, &events)?;
        let snapshot = options
            .memory_pool
            .then(|| BranchSnapshot::capture(&graph));

        let ctx = PassContext {
            options: &options,
            events: &events,
            layout_optimizer: self.layout_optimizer.as_ref(),
            constants: self.constants.as_ref(),
        };
        self.scheduler.run_pre(&mut graph, &ctx)?;
        self.scheduler.run_post(&mut graph, &ctx)?;

        let memory = if options.memory_pool {
            MemoryDependencyAnalyzer::for_options(&options, snapshot).analyze(&graph, &events)?
        } else {
            MemoryDependencyGraph::new()
        };

        self.bind(&mut graph, &events)?;
        cleanup(&graph, &events)?;
        Ok(Program::new(graph, memory, events, options))
    }

    /// Binds every node to an implementation, in processing order.
    fn bind(&self, graph: &mut GraphStore, events: &EventLog) -> Result<()> {
        let order: Vec<NodeId> = graph.processing_order().iter().collect();
        for node in order {
            let current = &graph[node];
            let Some(handle) = self.selector.select(current) else {
                return Err(Error::BindFailure {
                    node: current.id().to_string(),
                    kind: current.kind().to_string(),
                    format: current
                        .output_layout()
                        .map(|l| l.format.to_string())
                        .unwrap_or_default(),
                });
            };
            events
                .record(EventKind::ImplementationBound)
                .node(node)
                .message(format!("{} -> {handle}", current.id()));
            graph.node_mut(node).bind(handle);
        }
        Ok(())
    }
}

/// Verifies the finished graph and summarises the compile.
fn cleanup(graph: &GraphStore, events: &EventLog) -> Result<()> {
    graph.check_integrity()?;
    events.info(format!(
        "{} nodes, {} optimized out",
        graph.len(),
        graph.optimized_out().len()
    ));
    Ok(())
}
