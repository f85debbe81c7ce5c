//! Pass scheduler for orchestrating the optimization pipeline.
//!
//! The `PassScheduler` runs graph passes in two fixed phases. Unlike a fixpoint driver,
//! every pass runs exactly once per phase: passes are idempotent, so a second run
//! would not change anything. After each pass that reports a change, the scheduler
//! refreshes the derived state (layouts, constant and data-flow flags) so the next
//! pass observes a consistent graph.

use crate::{
    analysis::{mark_constants, mark_data_flow, resolve_layouts},
    compiler::{
        pass::{GraphPass, PassContext},
        passes::{
            BufferFusingPass, DepthwiseFusingPass, DepthwiseMarkingPass, HandleReshapePass,
            ParallelReorderPass, PostOptimizeWeightsPass, PreOptimizeBiasPass,
            PreparePaddingPass, PrimitiveFusingPass, PropagateConstantsPass,
            RedundantReordersPass, ReorderInputsPass, TrimToOutputsPass,
        },
        EventKind,
    },
    graph::GraphStore,
    Result,
};

/// Orchestrates pass execution in a two phase pipeline.
///
/// 1. **Pre-optimization**: layout shaping before implementations are considered
///    (trimming, reshape handling, redundant reorders, input and bias conversion,
///    padding)
/// 2. **Post-optimization**: rewrites that rely on the final layouts (weights,
///    constant folding, fusing, parallel ordering)
pub struct PassScheduler {
    /// Phase 1: pre-optimization.
    pub pre: Vec<Box<dyn GraphPass>>,
    /// Phase 2: post-optimization.
    pub post: Vec<Box<dyn GraphPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::standard()
    }
}

impl PassScheduler {
    /// Creates a scheduler without passes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Creates the standard pipeline.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            pre: vec![
                Box::new(TrimToOutputsPass::new()),
                Box::new(HandleReshapePass::new()),
                Box::new(RedundantReordersPass::new()),
                Box::new(DepthwiseMarkingPass::new()),
                Box::new(ReorderInputsPass::new()),
                Box::new(PreOptimizeBiasPass::new()),
                Box::new(PreparePaddingPass::new()),
            ],
            post: vec![
                Box::new(PostOptimizeWeightsPass::new()),
                Box::new(RedundantReordersPass::new()),
                Box::new(PropagateConstantsPass::new()),
                Box::new(DepthwiseFusingPass::new()),
                Box::new(PrimitiveFusingPass::new()),
                Box::new(BufferFusingPass::new()),
                Box::new(TrimToOutputsPass::new()),
                Box::new(ParallelReorderPass::new()),
            ],
        }
    }

    /// Runs the pre-optimization phase.
    ///
    /// # Errors
    ///
    /// Returns the first pass failure wrapped in [`Error::PassFailed`](crate::Error::PassFailed).
    pub fn run_pre(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        Self::run_phase(&self.pre, graph, ctx)
    }

    /// Runs the post-optimization phase.
    ///
    /// # Errors
    ///
    /// Returns the first pass failure wrapped in [`Error::PassFailed`](crate::Error::PassFailed).
    pub fn run_post(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        Self::run_phase(&self.post, graph, ctx)
    }

    /// Names of all scheduled passes in execution order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.pre
            .iter()
            .chain(self.post.iter())
            .map(|pass| pass.name())
            .collect()
    }

    fn run_phase(
        passes: &[Box<dyn GraphPass>],
        graph: &mut GraphStore,
        ctx: &PassContext<'_>,
    ) -> Result<bool> {
        let mut any_changed = false;
        for pass in passes {
            if !ctx.options.is_enabled(pass.kind()) {
                continue;
            }
            any_changed |= Self::run_pass(pass.as_ref(), graph, ctx)?;
        }
        Ok(any_changed)
    }

    fn run_pass(pass: &dyn GraphPass, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let name = pass.name();
        ctx.events.record(EventKind::PassStarted).pass(name);

        let changed = pass
            .run(graph, ctx)
            .and_then(|changed| {
                if changed {
                    Self::refresh(graph)?;
                }
                Ok(changed)
            })
            .map_err(|e| e.in_pass(name))?;

        ctx.events
            .record(EventKind::PassCompleted)
            .pass(name)
            .message(if changed { "changed" } else { "unchanged" });
        if ctx.options.debug {
            ctx.events
                .record(EventKind::Debug)
                .pass(name)
                .message(format!("{} nodes after {name}", graph.len()));
        }
        Ok(changed)
    }

    /// Recomputes layouts and derived flags after a structural change.
    pub(crate) fn refresh(graph: &mut GraphStore) -> Result<()> {
        resolve_layouts(graph)?;
        mark_constants(graph)?;
        mark_data_flow(graph)
    }
}
