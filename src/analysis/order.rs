//! Topological ordering of the program graph.
//!
//! [`calc_processing_order`] is Kahn's algorithm with a min-heap keyed on the arena index,
//! so among all nodes that are ready the one declared first is scheduled first. The result
//! is deterministic for a given graph and matches declaration order wherever the
//! dependencies allow it.
//!
//! When the heap runs dry before every node is scheduled, the remaining nodes contain at
//! least one cycle. A depth-first search over them recovers one concrete cycle for the
//! error message.

use std::{cmp::Reverse, collections::BinaryHeap};

use crate::{
    graph::{GraphStore, NodeId},
    utils::BitSet,
    Error, Result,
};

/// Computes a topological order of all live nodes, ties broken by declaration order.
///
/// # Errors
///
/// Returns [`Error::Cycle`] listing the identifiers of one cycle if the dependency
/// relation is cyclic.
pub fn calc_processing_order(graph: &GraphStore) -> Result<Vec<NodeId>> {
    let mut pending = vec![0usize; graph.capacity()];
    let mut ready = BinaryHeap::new();
    for node in graph.node_ids() {
        pending[node.index()] = graph[node].dependencies().len();
        if pending[node.index()] == 0 {
            ready.push(Reverse(node));
        }
    }

    let mut order = Vec::with_capacity(graph.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &user in graph[node].users() {
            pending[user.index()] -= 1;
            if pending[user.index()] == 0 {
                ready.push(Reverse(user));
            }
        }
    }

    if order.len() == graph.len() {
        return Ok(order);
    }

    let mut scheduled = BitSet::new(graph.capacity());
    for node in &order {
        scheduled.insert(node.index());
    }
    Err(Error::Cycle(find_cycle(graph, &scheduled)))
}

/// Finds one cycle among the nodes Kahn's algorithm could not schedule. Every such node
/// has an unscheduled dependency, so walking dependencies must eventually revisit a node.
fn find_cycle(graph: &GraphStore, scheduled: &BitSet) -> Vec<String> {
    let Some(start) = graph.node_ids().find(|n| !scheduled.contains(n.index())) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut on_path = BitSet::new(graph.capacity());
    on_path.insert(start.index());
    let mut current = start;
    loop {
        let Some(&next) = graph[current]
            .dependencies()
            .iter()
            .find(|d| !scheduled.contains(d.index()))
        else {
            return Vec::new();
        };
        if on_path.contains(next.index()) {
            // walked backwards along dependencies; flip to producer -> consumer
            let begin = path.iter().position(|&n| n == next).unwrap_or(0);
            let cycle: Vec<String> = path[begin..]
                .iter()
                .rev()
                .map(|&n| graph[n].id().to_string())
                .collect();
            return close_cycle(cycle);
        }
        on_path.insert(next.index());
        path.push(next);
        current = next;
    }
}

/// Normalises a cycle so that it starts and ends with the same identifier.
fn close_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if cycle.first() != cycle.last() {
        if let Some(first) = cycle.first().cloned() {
            cycle.push(first);
        }
    }
    cycle
}
