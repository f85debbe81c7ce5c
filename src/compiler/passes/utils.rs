//! Shared utilities for graph passes.
//!
//! Layout conversions are inserted by several passes. Conversion nodes are keyed by
//! source, format and data type, so two users asking for the same conversion of the
//! same producer share a single node.

use std::sync::Arc;

use crate::{
    analysis::infer_layout,
    compiler::{pass::PassContext, EventKind},
    graph::{GraphStore, NodeId},
    policy::InputRole,
    topology::{Layout, Primitive},
    Error, Result,
};

/// Snapshot of the processing order, or arena order while none is established.
pub(crate) fn ordered_nodes(graph: &GraphStore) -> Vec<NodeId> {
    if graph.order_established() {
        graph.processing_order().iter().collect()
    } else {
        graph.node_ids().collect()
    }
}

/// Current output layout of `node`, inferred if not resolved yet.
pub(crate) fn layout_of(graph: &GraphStore, node: NodeId) -> Result<Layout> {
    match graph[node].output_layout() {
        Some(layout) => Ok(*layout),
        None => infer_layout(graph, node),
    }
}

/// Makes dependency `index` of `user` produce `target`.
///
/// Returns `false` if the dependency already has the target layout. Otherwise a
/// conversion node is spliced in (or an existing one for the same conversion reused)
/// and `true` is returned.
///
/// # Errors
///
/// Returns [`Error::InvalidLayout`] if `target` has a different size than the current
/// layout, and fails like [`GraphEditor::add_intermediate`](crate::graph::GraphEditor::add_intermediate).
pub(crate) fn convert_dependency(
    graph: &mut GraphStore,
    ctx: &PassContext<'_>,
    pass: &'static str,
    user: NodeId,
    index: usize,
    target: Layout,
) -> Result<bool> {
    let count = graph[user].dependencies().len();
    let Some(dep) = graph[user].dependency(index) else {
        return Err(Error::InvalidDependencyIndex {
            node: graph[user].id().to_string(),
            index,
            count,
        });
    };
    let current = layout_of(graph, dep)?;
    if current.same_data(&target) {
        return Ok(false);
    }
    if current.size != target.size {
        return Err(Error::InvalidLayout {
            node: graph[user].id().to_string(),
            message: format!("conversion of input {index} from {current} to {target} changes its size"),
        });
    }

    let dep_id = graph[dep].id().to_string();
    let reorder_id = format!("_reorder_{dep_id}_{}_{}", target.format, target.data_type);
    let mut editor = graph.editor_with_events(ctx.events);
    let reorder = match editor.graph().lookup(&reorder_id) {
        Some(existing) if editor.graph()[existing].dependencies() == [dep] => {
            editor.add_intermediate(existing, user, index, false)?;
            existing
        }
        Some(_) => return Err(Error::IdentifierCollision(reorder_id)),
        None => {
            let primitive = Primitive::reorder(&reorder_id, &dep_id, target.format, target.data_type);
            let node = editor.get_or_create(Arc::new(primitive));
            editor.add_intermediate(node, user, index, true)?;
            node
        }
    };

    let layout = infer_layout(graph, reorder)?;
    graph.node_mut(reorder).set_layout(layout);
    ctx.events
        .record(EventKind::LayoutConverted)
        .node(reorder)
        .pass(pass)
        .message(format!(
            "{dep_id} -> {}: {current} to {layout}",
            graph[user].id()
        ));
    Ok(true)
}

/// Converts every dependency slot with `role` to the layout the layout optimizer
/// prefers for it.
pub(crate) fn convert_inputs_with_role(
    graph: &mut GraphStore,
    ctx: &PassContext<'_>,
    pass: &'static str,
    role: InputRole,
) -> Result<bool> {
    let mut changed = false;
    for node in ordered_nodes(graph) {
        if !graph.is_live(node) {
            continue;
        }
        for index in 0..graph[node].dependencies().len() {
            if InputRole::of(graph, node, index) != role {
                continue;
            }
            let Some(target) = ctx.layout_optimizer.preferred_input_layout(graph, node, index)
            else {
                continue;
            };
            changed |= convert_dependency(graph, ctx, pass, node, index, target)?;
        }
    }
    Ok(changed)
}
