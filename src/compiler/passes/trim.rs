//! Trimming to outputs.
//!
//! Removes every node from which no output can be reached. Such nodes cannot influence
//! any result the caller reads, including runtime inputs nobody consumes.

use crate::{
    compiler::{
        pass::{GraphPass, PassContext},
        EventKind,
    },
    config::PassKind,
    graph::{
        traversal::{reachable, Direction},
        GraphStore, NodeId,
    },
    Result,
};

/// Removes nodes that do not contribute to any output.
pub struct TrimToOutputsPass;

impl Default for TrimToOutputsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl TrimToOutputsPass {
    /// Creates a new trimming pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl GraphPass for TrimToOutputsPass {
    fn name(&self) -> &'static str {
        "trim_to_outputs"
    }

    fn kind(&self) -> PassKind {
        PassKind::Trim
    }

    fn description(&self) -> &'static str {
        "Removes nodes from which no output is reachable"
    }

    fn run(&self, graph: &mut GraphStore, ctx: &PassContext<'_>) -> Result<bool> {
        let needed = reachable(graph, graph.outputs().iter().copied(), Direction::Backward);
        // closed under users: a user of an unneeded node is unneeded as well
        let unneeded: Vec<NodeId> = graph
            .node_ids()
            .filter(|n| !needed.contains(n.index()))
            .collect();
        if unneeded.is_empty() {
            return Ok(false);
        }

        graph
            .editor_with_events(ctx.events)
            .remove_nodes(&unneeded)?;
        ctx.events
            .record(EventKind::Info)
            .pass(self.name())
            .message(format!("trimmed {} nodes", unneeded.len()));
        Ok(true)
    }
}
