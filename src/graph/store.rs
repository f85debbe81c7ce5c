//! Ownership of all nodes of a program.
//!
//! [`GraphStore`] is an arena of [`ProgramNode`]s addressed by [`NodeId`], plus the lookup
//! table from identifier to node and the canonical input, output, processing order and
//! optimized-out lists. Read access is public; every shape change goes through
//! [`GraphStore::editor`].

use std::{collections::HashMap, ops::Index};

use crate::{
    compiler::EventLog,
    graph::{GraphEditor, NodeFlags, NodeId, ProcessingOrder, ProgramNode},
    utils::BitSet,
    Error, Result,
};

/// The node arena and its canonical lists.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: Vec<Option<ProgramNode>>,
    ids: HashMap<String, NodeId>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    order: ProcessingOrder,
    order_established: bool,
    optimized_out: Vec<String>,
}

impl GraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an editor for shape changes.
    pub fn editor(&mut self) -> GraphEditor<'_> {
        GraphEditor::new(self)
    }

    /// Returns an editor that records its changes in `events`.
    pub fn editor_with_events<'a>(&'a mut self, events: &'a EventLog) -> GraphEditor<'a> {
        GraphEditor::new(self).with_events(events)
    }

    /// Looks up a node by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no live node has identifier `id`.
    pub fn get_node(&self, id: &str) -> Result<&ProgramNode> {
        self.lookup(id)
            .map(|node| &self[node])
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Resolves an identifier to a node id.
    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Returns `true` if a live node has identifier `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// Returns the node in slot `node`, if it is live.
    #[must_use]
    pub fn try_node(&self, node: NodeId) -> Option<&ProgramNode> {
        self.nodes.get(node.index()).and_then(Option::as_ref)
    }

    /// Returns `true` if slot `node` holds a live node.
    #[must_use]
    pub fn is_live(&self, node: NodeId) -> bool {
        self.try_node(node).is_some()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if the store has no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of arena slots, live or not. Every [`NodeId`] of this store is below it.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Live node ids in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId::new(i))
    }

    /// Live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ProgramNode> + '_ {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes().map(|n| n.dependencies().len()).sum()
    }

    /// Runtime fed inputs.
    #[must_use]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Output nodes.
    #[must_use]
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// The processing order.
    #[must_use]
    pub fn processing_order(&self) -> &ProcessingOrder {
        &self.order
    }

    /// Position of `node` in the processing order.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.order.position(node)
    }

    /// Identifiers of nodes removed during optimization, in removal order.
    #[must_use]
    pub fn optimized_out(&self) -> &[String] {
        &self.optimized_out
    }

    /// Returns `true` once a processing order has been computed.
    #[must_use]
    pub fn order_established(&self) -> bool {
        self.order_established
    }

    /// Nodes reachable from `start` following users, including `start`.
    #[must_use]
    pub fn descendants(&self, start: NodeId) -> BitSet {
        let mut seen = BitSet::new(self.capacity());
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if seen.insert(node.index()) {
                stack.extend(self[node].users().iter().copied());
            }
        }
        seen
    }

    /// Verifies the structural invariants: mirrored edges, live endpoints, consistent
    /// lookup table and a valid processing order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] describing the first violation found.
    pub fn check_integrity(&self) -> Result<()> {
        for node in self.node_ids() {
            let current = &self[node];
            if self.lookup(current.id()) != Some(node) {
                return Err(structural_error!("'{}' is not registered", current.id()));
            }
            for &dep in current.dependencies() {
                let Some(dep_node) = self.try_node(dep) else {
                    return Err(structural_error!(
                        "'{}' depends on removed node {}",
                        current.id(),
                        dep
                    ));
                };
                let forward = current.dependencies().iter().filter(|&&d| d == dep).count();
                let backward = dep_node.users().iter().filter(|&&u| u == node).count();
                if forward != backward {
                    return Err(structural_error!(
                        "edge {} -> {} is not mirrored ({} vs {})",
                        dep_node.id(),
                        current.id(),
                        forward,
                        backward
                    ));
                }
            }
            for &user in current.users() {
                let Some(user_node) = self.try_node(user) else {
                    return Err(structural_error!(
                        "'{}' is used by removed node {}",
                        current.id(),
                        user
                    ));
                };
                if !user_node.dependencies().contains(&node) {
                    return Err(structural_error!(
                        "user edge {} -> {} has no dependency",
                        current.id(),
                        user_node.id()
                    ));
                }
            }
        }

        if self.order_established {
            if self.order.len() != self.len() {
                return Err(structural_error!(
                    "processing order holds {} nodes, graph has {}",
                    self.order.len(),
                    self.len()
                ));
            }
            for node in self.order.iter() {
                if !self.is_live(node) {
                    return Err(structural_error!("processing order holds removed {}", node));
                }
                for &dep in self[node].dependencies() {
                    if !self.order.precedes(dep, node) {
                        return Err(structural_error!(
                            "'{}' is ordered before its dependency '{}'",
                            self[node].id(),
                            self[dep].id()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn node_mut(&mut self, node: NodeId) -> &mut ProgramNode {
        match self.nodes.get_mut(node.index()).and_then(Option::as_mut) {
            Some(n) => n,
            None => panic!("{node} is not a live node"),
        }
    }

    /// Installs a computed processing order.
    pub(crate) fn set_processing_order(&mut self, order: Vec<NodeId>) {
        self.order = ProcessingOrder::from_nodes(order);
        self.order_established = true;
    }

    pub(crate) fn set_output(&mut self, node: NodeId, output: bool) {
        self.node_mut(node).set_flag(NodeFlags::OUTPUT, output);
        self.outputs.retain(|&o| o != node);
        if output {
            self.outputs.push(node);
        }
    }

    pub(in crate::graph) fn order_mut(&mut self) -> &mut ProcessingOrder {
        &mut self.order
    }

    pub(in crate::graph) fn insert_node(&mut self, node: ProgramNode) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.ids.insert(node.id().to_string(), id);
        if node.is_input() {
            self.inputs.push(id);
        }
        self.nodes.push(Some(node));
        if self.order_established {
            self.order.push(id);
        }
        id
    }

    /// Drops a node that has no users and detaches it from its dependencies. Returns the
    /// distinct former dependencies.
    pub(in crate::graph) fn drop_node(&mut self, node: NodeId) -> Vec<NodeId> {
        let mut deps = self.node_mut(node).take_dependencies();
        deps.sort_unstable();
        deps.dedup();
        for &dep in &deps {
            self.node_mut(dep).remove_user(node);
        }
        if let Some(removed) = self.nodes[node.index()].take() {
            if self.ids.get(removed.id()) == Some(&node) {
                self.ids.remove(removed.id());
            }
            self.optimized_out.push(removed.id().to_string());
        }
        self.inputs.retain(|&i| i != node);
        self.outputs.retain(|&o| o != node);
        self.order.remove(node);
        deps
    }

    pub(in crate::graph) fn rekey(&mut self, node: NodeId, new_id: String) {
        let old = self.node_mut(node).id().to_string();
        if self.ids.get(&old) == Some(&node) {
            self.ids.remove(&old);
        }
        self.ids.insert(new_id.clone(), node);
        self.node_mut(node).set_id(new_id);
    }
}

impl Index<NodeId> for GraphStore {
    type Output = ProgramNode;

    /// # Panics
    ///
    /// Panics if `node` is not live.
    fn index(&self, node: NodeId) -> &Self::Output {
        match self.try_node(node) {
            Some(n) => n,
            None => panic!("{node} is not a live node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test::{input, relu};

    #[test]
    fn test_lookup_not_found_does_not_mutate() {
        let mut graph = GraphStore::new();
        graph.editor().get_or_create(Arc::new(input("a")));
        let before = graph.len();
        let err = graph.get_node("missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(id) if id == "missing"));
        assert_eq!(graph.len(), before);
        assert!(graph.contains("a"));
    }

    #[test]
    fn test_insert_tracks_inputs() {
        let mut graph = GraphStore::new();
        let a = graph.editor().get_or_create(Arc::new(input("a")));
        let r = graph.editor().get_or_create(Arc::new(relu("r", "a")));
        assert_eq!(graph.inputs(), [a]);
        assert!(!graph[r].is_input());
        assert_eq!(graph.capacity(), 2);
    }

    #[test]
    fn test_integrity_detects_order_violation() {
        let mut graph = GraphStore::new();
        let a = graph.editor().get_or_create(Arc::new(input("a")));
        let r = graph.editor().get_or_create(Arc::new(relu("r", "a")));
        graph.editor().add_connection(a, r).unwrap();
        graph.set_processing_order(vec![r, a]);
        assert!(graph.check_integrity().is_err());
        graph.set_processing_order(vec![a, r]);
        assert!(graph.check_integrity().is_ok());
    }

    #[test]
    fn test_descendants() {
        let mut graph = GraphStore::new();
        let a = graph.editor().get_or_create(Arc::new(input("a")));
        let r = graph.editor().get_or_create(Arc::new(relu("r", "a")));
        let s = graph.editor().get_or_create(Arc::new(relu("s", "r")));
        graph.editor().add_connection(a, r).unwrap();
        graph.editor().add_connection(r, s).unwrap();
        let desc = graph.descendants(r);
        assert!(desc.contains(r.index()));
        assert!(desc.contains(s.index()));
        assert!(!desc.contains(a.index()));
    }
}
