//! Pass trait and the context handed to every pass.

use crate::{
    compiler::EventLog,
    config::{BuildOptions, PassKind},
    graph::GraphStore,
    policy::{ConstantsPropagator, LayoutOptimizer},
    Result,
};

/// Everything a pass may consult besides the graph.
pub struct PassContext<'a> {
    /// Build options of the program
    pub options: &'a BuildOptions,
    /// Log receiving the pass's events
    pub events: &'a EventLog,
    /// Preferred layouts
    pub layout_optimizer: &'a dyn LayoutOptimizer,
    /// Constant evaluation
    pub constants: &'a dyn ConstantsPropagator,
}

/// A graph rewrite.
///
/// Passes receive exclusive access to the graph and change its shape only through the
/// [`GraphEditor`](crate::graph::GraphEditor), so every invariant of the graph holds
/// again when `run` returns. The scheduler refreshes layouts and derived flags after a
/// pass reports a change.
///
/// Every pass is idempotent: running it twice in a row changes nothing the second time.
pub trait GraphPass {
    /// Unique name for events and errors.
    fn name(&self) -> &'static str;

    /// The kind of this pass; disabling the kind skips the pass.
    fn kind(&self) -> PassKind;

    /// Runs the pass.
    ///
    /// Returns `true` if the graph changed, `false` otherwise. Events are recorded
    /// directly to `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be rewritten consistently; the compile is
    /// aborted.
    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
