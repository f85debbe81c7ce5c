//! Graph mutation primitives.
//!
//! [`GraphEditor`] is the only way to change the shape of a [`GraphStore`]. Every operation
//! either completes fully or fails without touching any edge, and afterwards:
//!
//! - dependency and user edges are mirror images (as multisets),
//! - the identifier table maps every live node and nothing else,
//! - an established processing order is still a topological order.
//!
//! The processing order is repaired locally whenever a new edge runs against it: the
//! descendants of the consumer that are ordered before the producer and the ancestors of
//! the producer that are ordered after the consumer swap places, keeping their relative
//! order. Nodes outside that window never move.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use nngraph::graph::GraphStore;
//! use nngraph::topology::{ActivationFunction, DataType, Format, Layout, Primitive, Tensor};
//!
//! let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 4, 4));
//! let mut graph = GraphStore::new();
//! let mut editor = graph.editor();
//! let input = editor.get_or_create(Arc::new(Primitive::input("in", layout)));
//! let relu = editor.get_or_create(Arc::new(Primitive::activation("relu", "in", ActivationFunction::Relu)));
//! editor.add_connection(input, relu)?;
//!
//! assert_eq!(graph[relu].dependencies(), [input]);
//! assert_eq!(graph[input].users(), [relu]);
//! # Ok::<(), nngraph::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    analysis::{infer_layout, post_dominated_branch},
    compiler::{EventKind, EventLog},
    graph::{GraphStore, NodeId, ProgramNode},
    topology::Primitive,
    utils::BitSet,
    Error, Result,
};

/// Mutation handle over a [`GraphStore`].
pub struct GraphEditor<'a> {
    graph: &'a mut GraphStore,
    events: Option<&'a EventLog>,
}

impl<'a> GraphEditor<'a> {
    /// Creates an editor over `graph`.
    pub fn new(graph: &'a mut GraphStore) -> Self {
        Self {
            graph,
            events: None,
        }
    }

    /// Records every change in `events`.
    #[must_use]
    pub fn with_events(mut self, events: &'a EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Read access to the edited graph.
    #[must_use]
    pub fn graph(&self) -> &GraphStore {
        self.graph
    }

    /// Returns the node for `primitive.id`, creating and registering it if absent.
    ///
    /// A new node has no edges. Once a processing order exists the node is appended to it
    /// and moves forward as edges are added.
    pub fn get_or_create(&mut self, primitive: Arc<Primitive>) -> NodeId {
        if let Some(existing) = self.graph.lookup(&primitive.id) {
            return existing;
        }
        let node = self.graph.insert_node(ProgramNode::new(primitive));
        if self.graph.order_established() {
            self.record(EventKind::NodeInserted, node, None);
        }
        node
    }

    /// Adds the edge `prev -> next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] if `next` already reaches `prev`, or [`Error::Structural`]
    /// if either node is not live. The graph is unchanged on error.
    pub fn add_connection(&mut self, prev: NodeId, next: NodeId) -> Result<()> {
        self.ensure_live(prev)?;
        self.ensure_live(next)?;
        self.check_acyclic(prev, next)?;
        self.link(prev, next);
        self.repair_order(prev, next);
        Ok(())
    }

    /// Removes every edge `prev -> next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if there is no such edge.
    pub fn remove_connection(&mut self, prev: NodeId, next: NodeId) -> Result<()> {
        self.ensure_live(prev)?;
        self.ensure_live(next)?;
        if !self.graph[next].dependencies().contains(&prev) {
            return Err(structural_error!(
                "no edge {} -> {}",
                self.graph[prev].id(),
                self.graph[next].id()
            ));
        }
        self.graph.node_mut(next).remove_dependency(prev);
        self.graph.node_mut(prev).remove_user(next);
        Ok(())
    }

    /// Splices `node` between `next` and its dependency at `prev_index`.
    ///
    /// The dependency slot is redirected to `node`, so the position of the input is kept.
    /// With `connect_old` the former dependency also becomes a dependency of `node`;
    /// without it, `node` is expected to already carry its inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDependencyIndex`] if `prev_index` is out of range and
    /// [`Error::Cycle`] if the splice would close a cycle. No edge is touched on error.
    pub fn add_intermediate(
        &mut self,
        node: NodeId,
        next: NodeId,
        prev_index: usize,
        connect_old: bool,
    ) -> Result<()> {
        self.ensure_live(node)?;
        self.ensure_live(next)?;
        let count = self.graph[next].dependencies().len();
        let Some(prev) = self.graph[next].dependency(prev_index) else {
            return Err(Error::InvalidDependencyIndex {
                node: self.graph[next].id().to_string(),
                index: prev_index,
                count,
            });
        };
        if node == next || node == prev {
            return Err(structural_error!(
                "'{}' cannot be spliced next to itself",
                self.graph[node].id()
            ));
        }
        self.check_acyclic(node, next)?;
        if connect_old {
            self.check_acyclic(prev, node)?;
        }

        self.graph.node_mut(next).set_dependency(prev_index, node);
        self.graph.node_mut(prev).remove_user_once(next);
        self.graph.node_mut(node).push_user(next);
        self.repair_order(node, next);
        if connect_old {
            self.link(prev, node);
            self.repair_order(prev, node);
        }
        self.record(EventKind::NodeInserted, node, None);
        Ok(())
    }

    /// Splices `node` between `next` and every dependency slot holding `prev`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `prev` is not a dependency of `next`, otherwise
    /// fails like [`GraphEditor::add_intermediate`].
    pub fn add_intermediate_between(
        &mut self,
        node: NodeId,
        next: NodeId,
        prev: NodeId,
        connect_old: bool,
    ) -> Result<()> {
        self.ensure_live(next)?;
        let slots: Vec<usize> = self.graph[next]
            .dependencies()
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == prev)
            .map(|(i, _)| i)
            .collect();
        if slots.is_empty() {
            return Err(structural_error!("{} is not a dependency of {}", prev, next));
        }
        for (n, slot) in slots.into_iter().enumerate() {
            self.add_intermediate(node, next, slot, connect_old && n == 0)?;
        }
        Ok(())
    }

    /// Changes the identifier of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentifierCollision`] if another node already uses `new_id`.
    pub fn rename(&mut self, node: NodeId, new_id: impl Into<String>) -> Result<()> {
        self.ensure_live(node)?;
        let new_id = new_id.into();
        match self.graph.lookup(&new_id) {
            Some(existing) if existing == node => return Ok(()),
            Some(_) => return Err(Error::IdentifierCollision(new_id)),
            None => {}
        }
        let old = self.graph[node].id().to_string();
        self.graph.rekey(node, new_id.clone());
        self.record(
            EventKind::NodeRenamed,
            node,
            Some(format!("{old} renamed to {new_id}")),
        );
        Ok(())
    }

    /// Exchanges the identifiers of `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if either node is not live.
    pub fn swap_names(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.ensure_live(a)?;
        self.ensure_live(b)?;
        if a == b {
            return Ok(());
        }
        let id_a = self.graph[a].id().to_string();
        let id_b = self.graph[b].id().to_string();
        self.graph.rekey(a, id_b.clone());
        self.graph.rekey(b, id_a.clone());
        self.record(
            EventKind::NodeRenamed,
            a,
            Some(format!("{id_a} swapped with {id_b}")),
        );
        Ok(())
    }

    /// Redirects every user of `old` to `new`. `old` stays in the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] if `new` is reachable from a user of `old`.
    pub fn replace_all_usages(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        self.ensure_live(old)?;
        self.ensure_live(new)?;
        if old == new {
            return Ok(());
        }
        self.check_users_movable(old, new)?;
        self.move_users(old, new);
        Ok(())
    }

    /// Substitutes `new` for `old` and removes `old`.
    ///
    /// Users of `old` are redirected to `new`, `new` takes over the identifier, output flag
    /// and requested output padding of `old`, and `old` is recorded as optimized out.
    ///
    /// Without `replace_whole_branch` the dependencies of `old` move to `new`. With it,
    /// `new` keeps its own dependencies and the part of the dependency subtree of `old`
    /// that is post-dominated by `old` is removed, except runtime inputs and nodes still
    /// used elsewhere (for example by `new`).
    ///
    /// # Errors
    ///
    /// - [`Error::LayoutMismatch`] if `check_output_layouts_integrity` is set and the
    ///   resolved layouts differ
    /// - [`Error::Cycle`] if the substitution would close a cycle
    ///
    /// The graph is unchanged on error.
    pub fn replace(
        &mut self,
        old: NodeId,
        new: NodeId,
        replace_whole_branch: bool,
        check_output_layouts_integrity: bool,
    ) -> Result<()> {
        self.ensure_live(old)?;
        self.ensure_live(new)?;
        if old == new {
            return Ok(());
        }
        if check_output_layouts_integrity {
            self.check_layouts(old, new)?;
        }
        self.check_users_movable(old, new)?;
        if !replace_whole_branch {
            for &dep in self.graph[old].dependencies() {
                if dep == new {
                    return Err(structural_error!(
                        "'{}' cannot inherit itself as dependency",
                        self.graph[new].id()
                    ));
                }
                if self.graph.descendants(new).contains(dep.index()) {
                    return Err(self.cycle_error(new, dep));
                }
            }
        }

        let branch = if replace_whole_branch {
            post_dominated_branch(self.graph, old)
        } else {
            BitSet::new(self.graph.capacity())
        };

        let old_id = self.graph[old].id().to_string();
        let new_id = self.graph[new].id().to_string();
        let was_output = self.graph[old].is_output();
        let padding = self.graph[old].output_padding();

        if !replace_whole_branch {
            let deps = self.graph.node_mut(old).take_dependencies();
            for dep in deps {
                self.graph.node_mut(dep).remove_user_once(old);
                self.link(dep, new);
                self.repair_order(dep, new);
            }
        }
        self.move_users(old, new);

        let former = self.graph.drop_node(old);
        self.record(EventKind::NodeRemoved, old, Some(format!("{old_id} replaced")));
        if replace_whole_branch {
            self.remove_dangling_within(former, Some(&branch));
        }

        self.graph.rekey(new, old_id.clone());
        if was_output {
            self.graph.set_output(new, true);
        }
        let merged = self.graph[new].output_padding().max(padding);
        self.graph.node_mut(new).set_output_padding(merged);
        self.record(
            EventKind::NodeReplaced,
            new,
            Some(format!("{old_id} replaced by {new_id}")),
        );
        Ok(())
    }

    /// Removes `node` if nothing uses it and it is neither an output nor a runtime input.
    ///
    /// With `detach_whole_branch` former dependencies that become unused are removed too,
    /// recursively, under the same conditions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `node` is not live.
    pub fn remove_if_dangling(&mut self, node: NodeId, detach_whole_branch: bool) -> Result<bool> {
        self.ensure_live(node)?;
        if !self.is_dangling(node) {
            return Ok(false);
        }
        let id = self.graph[node].id().to_string();
        let former = self.graph.drop_node(node);
        self.record(EventKind::NodeRemoved, node, Some(id));
        if detach_whole_branch {
            self.remove_dangling_within(former, None);
        }
        Ok(true)
    }

    /// Removes a node with exactly one dependency, connecting that dependency directly to
    /// the node's users. Returns `false` (and changes nothing) for outputs and for nodes
    /// with any other number of dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `node` is not live.
    pub fn extract_and_remove(&mut self, node: NodeId) -> Result<bool> {
        self.ensure_live(node)?;
        let current = &self.graph[node];
        if current.is_output() || current.dependencies().len() != 1 {
            return Ok(false);
        }
        let dep = current.dependencies()[0];
        let id = current.id().to_string();
        self.move_users(node, dep);
        self.graph.drop_node(node);
        self.record(EventKind::NodeRemoved, node, Some(format!("{id} extracted")));
        Ok(true)
    }

    /// Removes a set of nodes at once. The set must be closed under users: no node outside
    /// it may consume a node inside it. Runtime inputs and outputs may be removed this way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if the set is not closed under users.
    pub fn remove_nodes(&mut self, nodes: &[NodeId]) -> Result<()> {
        let mut set = BitSet::new(self.graph.capacity());
        for &node in nodes {
            self.ensure_live(node)?;
            set.insert(node.index());
        }
        for &node in nodes {
            if let Some(&user) = self.graph[node]
                .users()
                .iter()
                .find(|u| !set.contains(u.index()))
            {
                return Err(structural_error!(
                    "'{}' is still used by '{}'",
                    self.graph[node].id(),
                    self.graph[user].id()
                ));
            }
        }
        // users first, so every node is unused when it is dropped
        let mut pending: Vec<NodeId> = nodes.to_vec();
        pending.sort_by_key(|&n| std::cmp::Reverse(self.graph.position(n).unwrap_or(n.index())));
        while !pending.is_empty() {
            let before = pending.len();
            let mut next_round = Vec::new();
            for node in pending {
                if self.graph[node].users().is_empty() {
                    let id = self.graph[node].id().to_string();
                    self.graph.drop_node(node);
                    self.record(EventKind::NodeRemoved, node, Some(id));
                } else {
                    next_round.push(node);
                }
            }
            if next_round.len() == before {
                return Err(structural_error!("removal set contains a cycle"));
            }
            pending = next_round;
        }
        Ok(())
    }

    /// Sets the output flag of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `node` is not live.
    pub fn set_output(&mut self, node: NodeId, output: bool) -> Result<()> {
        self.ensure_live(node)?;
        self.graph.set_output(node, output);
        Ok(())
    }

    /// Adds `prev -> next` without cycle checking or order repair. Only valid while no
    /// processing order is established; cycles surface when the order is computed.
    pub(crate) fn connect_unordered(&mut self, prev: NodeId, next: NodeId) {
        debug_assert!(!self.graph.order_established());
        self.link(prev, next);
    }

    fn link(&mut self, prev: NodeId, next: NodeId) {
        self.graph.node_mut(next).push_dependency(prev);
        self.graph.node_mut(prev).push_user(next);
    }

    fn move_users(&mut self, from: NodeId, to: NodeId) {
        let mut users = self.graph.node_mut(from).take_users();
        users.sort_unstable();
        users.dedup();
        for user in users {
            let moved = self.graph.node_mut(user).redirect_dependency(from, to);
            for _ in 0..moved {
                self.graph.node_mut(to).push_user(user);
            }
            self.repair_order(to, user);
        }
    }

    fn is_dangling(&self, node: NodeId) -> bool {
        let current = &self.graph[node];
        current.users().is_empty() && !current.is_output() && !current.is_input()
    }

    fn remove_dangling_within(&mut self, start: Vec<NodeId>, restrict: Option<&BitSet>) {
        let mut worklist = start;
        while let Some(node) = worklist.pop() {
            if !self.graph.is_live(node) || !self.is_dangling(node) {
                continue;
            }
            if restrict.is_some_and(|set| !set.contains(node.index())) {
                continue;
            }
            let id = self.graph[node].id().to_string();
            worklist.extend(self.graph.drop_node(node));
            self.record(EventKind::NodeRemoved, node, Some(id));
        }
    }

    fn check_layouts(&self, old: NodeId, new: NodeId) -> Result<()> {
        let old_layout = match self.graph[old].output_layout() {
            Some(layout) => *layout,
            None => infer_layout(self.graph, old)?,
        };
        let new_layout = match self.graph[new].output_layout() {
            Some(layout) => *layout,
            None => infer_layout(self.graph, new)?,
        };
        if old_layout.same_data(&new_layout) {
            return Ok(());
        }
        Err(Error::LayoutMismatch {
            old: self.graph[old].id().to_string(),
            new: self.graph[new].id().to_string(),
            old_layout: old_layout.to_string(),
            new_layout: new_layout.to_string(),
        })
    }

    fn check_users_movable(&self, old: NodeId, new: NodeId) -> Result<()> {
        for &user in self.graph[old].users() {
            if self.reaches(user, new) {
                return Err(self.cycle_error(new, user));
            }
        }
        Ok(())
    }

    fn check_acyclic(&self, prev: NodeId, next: NodeId) -> Result<()> {
        if prev == next || self.reaches(next, prev) {
            return Err(self.cycle_error(prev, next));
        }
        Ok(())
    }

    /// Returns `true` if `to` is reachable from `from` following users.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.path(from, to).is_some()
    }

    /// A user path `from -> .. -> to`, searched only within the order window when an order
    /// is established.
    fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        if from == to {
            return Some(vec![from]);
        }
        let bound = if self.graph.order_established() {
            match (self.graph.position(from), self.graph.position(to)) {
                (Some(pf), Some(pt)) if pf > pt => return None,
                (_, Some(pt)) => Some(pt),
                _ => None,
            }
        } else {
            None
        };

        let mut parent: Vec<Option<NodeId>> = vec![None; self.graph.capacity()];
        let mut seen = BitSet::new(self.graph.capacity());
        let mut stack = vec![from];
        seen.insert(from.index());
        while let Some(node) = stack.pop() {
            for &user in self.graph[node].users() {
                if seen.contains(user.index()) {
                    continue;
                }
                if let (Some(limit), Some(pos)) = (bound, self.graph.position(user)) {
                    if pos > limit {
                        continue;
                    }
                }
                seen.insert(user.index());
                parent[user.index()] = Some(node);
                if user == to {
                    let mut path = vec![to];
                    let mut current = to;
                    while let Some(p) = parent[current.index()] {
                        path.push(p);
                        current = p;
                    }
                    path.reverse();
                    return Some(path);
                }
                stack.push(user);
            }
        }
        None
    }

    fn cycle_error(&self, prev: NodeId, next: NodeId) -> Error {
        let mut ids = vec![self.graph[prev].id().to_string()];
        match self.path(next, prev) {
            Some(path) => ids.extend(path.iter().map(|&n| self.graph[n].id().to_string())),
            None => {
                ids.push(self.graph[next].id().to_string());
                ids.push(self.graph[prev].id().to_string());
            }
        }
        Error::Cycle(ids)
    }

    /// Restores a topological order after the edge `prev -> next` was added.
    fn repair_order(&mut self, prev: NodeId, next: NodeId) {
        let (Some(pos_prev), Some(pos_next)) = (self.graph.position(prev), self.graph.position(next))
        else {
            return;
        };
        if pos_prev < pos_next {
            return;
        }

        let capacity = self.graph.capacity();
        let mut forward = Vec::new();
        let mut seen = BitSet::new(capacity);
        let mut stack = vec![next];
        seen.insert(next.index());
        while let Some(node) = stack.pop() {
            forward.push(node);
            for &user in self.graph[node].users() {
                if let Some(pos) = self.graph.position(user) {
                    if pos <= pos_prev && seen.insert(user.index()) {
                        stack.push(user);
                    }
                }
            }
        }

        let mut backward = Vec::new();
        let mut seen = BitSet::new(capacity);
        let mut stack = vec![prev];
        seen.insert(prev.index());
        while let Some(node) = stack.pop() {
            backward.push(node);
            for &dep in self.graph[node].dependencies() {
                if let Some(pos) = self.graph.position(dep) {
                    if pos >= pos_next && seen.insert(dep.index()) {
                        stack.push(dep);
                    }
                }
            }
        }

        let position = |n: &NodeId| self.graph.position(*n).unwrap_or(usize::MAX);
        forward.sort_by_key(position);
        backward.sort_by_key(position);
        let mut slots: Vec<usize> = forward
            .iter()
            .chain(backward.iter())
            .map(position)
            .collect();
        slots.sort_unstable();
        let nodes: Vec<NodeId> = backward.into_iter().chain(forward).collect();
        self.graph.order_mut().reassign(&slots, &nodes);
        self.record(
            EventKind::OrderChanged,
            next,
            Some(format!("{} moved behind {}", self.graph[next].id(), self.graph[prev].id())),
        );
    }

    fn ensure_live(&self, node: NodeId) -> Result<()> {
        if self.graph.is_live(node) {
            Ok(())
        } else {
            Err(structural_error!("{} is not a live node", node))
        }
    }

    fn record(&self, kind: EventKind, node: NodeId, message: Option<String>) {
        if let Some(events) = self.events {
            let builder = events.record(kind).node(node);
            if let Some(message) = message {
                builder.message(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::calc_processing_order,
        test::{data, eltwise_sum, input, relu},
    };

    /// in -> a -> b, with an established order.
    fn chain() -> (GraphStore, NodeId, NodeId, NodeId) {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let i = editor.get_or_create(Arc::new(input("in")));
        let a = editor.get_or_create(Arc::new(relu("a", "in")));
        let b = editor.get_or_create(Arc::new(relu("b", "a")));
        editor.add_connection(i, a).unwrap();
        editor.add_connection(a, b).unwrap();
        editor.set_output(b, true).unwrap();
        let order = calc_processing_order(&graph).unwrap();
        graph.set_processing_order(order);
        (graph, i, a, b)
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let (mut graph, _, a, _) = chain();
        let again = graph.editor().get_or_create(Arc::new(relu("a", "zzz")));
        assert_eq!(again, a);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_add_connection_rejects_cycle() {
        let (mut graph, i, _, b) = chain();
        let err = graph.editor().add_connection(b, i).unwrap_err();
        match err {
            Error::Cycle(ids) => assert_eq!(ids, vec!["b", "in", "a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(graph[i].dependencies().is_empty());
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_add_connection_repairs_order() {
        let (mut graph, _, a, b) = chain();
        let late = graph.editor().get_or_create(Arc::new(input("late")));
        // late is appended after b; making it feed a must move it in front of a
        graph.editor().add_connection(late, a).unwrap();
        assert!(graph.processing_order().precedes(late, a));
        assert!(graph.processing_order().precedes(a, b));
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_add_intermediate_invalid_index_is_untouched() {
        let (mut graph, i, a, _) = chain();
        let r = graph.editor().get_or_create(Arc::new(relu("r", "in")));
        let err = graph.editor().add_intermediate(r, a, 3, true).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidDependencyIndex {
                index: 3,
                count: 1,
                ..
            }
        ));
        assert_eq!(graph[a].dependencies(), [i]);
        assert!(graph[r].dependencies().is_empty());
        assert!(graph[r].users().is_empty());
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_add_intermediate_splices() {
        let (mut graph, i, a, _) = chain();
        let r = graph.editor().get_or_create(Arc::new(relu("r", "in")));
        graph.editor().add_intermediate(r, a, 0, true).unwrap();
        assert_eq!(graph[a].dependencies(), [r]);
        assert_eq!(graph[r].dependencies(), [i]);
        assert_eq!(graph[i].users(), [r]);
        assert!(graph.processing_order().precedes(r, a));
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_rename_collision() {
        let (mut graph, _, a, b) = chain();
        let err = graph.editor().rename(a, "b").unwrap_err();
        assert!(matches!(err, Error::IdentifierCollision(id) if id == "b"));
        graph.editor().rename(a, "a2").unwrap();
        assert_eq!(graph.lookup("a2"), Some(a));
        assert!(!graph.contains("a"));
        graph.editor().swap_names(a, b).unwrap();
        assert_eq!(graph[a].id(), "b");
        assert_eq!(graph.lookup("a2"), Some(b));
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_remove_if_dangling() {
        let (mut graph, i, a, b) = chain();
        assert!(!graph.editor().remove_if_dangling(a, false).unwrap());
        assert!(!graph.editor().remove_if_dangling(b, false).unwrap());
        graph.editor().set_output(b, false).unwrap();
        assert!(graph.editor().remove_if_dangling(b, true).unwrap());
        // a is removed with the branch, the runtime input stays
        assert!(!graph.is_live(b));
        assert!(!graph.is_live(a));
        assert!(graph.is_live(i));
        assert!(graph[i].users().is_empty());
        assert_eq!(graph.optimized_out(), ["b", "a"]);
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_extract_and_remove() {
        let (mut graph, i, a, b) = chain();
        assert!(graph.editor().extract_and_remove(a).unwrap());
        assert_eq!(graph[b].dependencies(), [i]);
        assert_eq!(graph[i].users(), [b]);
        // outputs are never extracted
        assert!(!graph.editor().extract_and_remove(b).unwrap());
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_replace_keeps_dependencies() {
        let (mut graph, i, a, b) = chain();
        let n = graph.editor().get_or_create(Arc::new(relu("n", "in")));
        graph.editor().replace(a, n, false, false).unwrap();
        assert_eq!(graph[n].id(), "a");
        assert_eq!(graph[n].dependencies(), [i]);
        assert_eq!(graph[b].dependencies(), [n]);
        assert_eq!(graph.optimized_out(), ["a"]);
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_replace_whole_branch() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let w = editor.get_or_create(Arc::new(data("w", 4)));
        let shared = editor.get_or_create(Arc::new(data("shared", 4)));
        let x = editor.get_or_create(Arc::new(relu("x", "w")));
        let sum = editor.get_or_create(Arc::new(eltwise_sum("sum", &["x", "shared"])));
        let other = editor.get_or_create(Arc::new(relu("other", "shared")));
        editor.add_connection(w, x).unwrap();
        editor.add_connection(x, sum).unwrap();
        editor.add_connection(shared, sum).unwrap();
        editor.add_connection(shared, other).unwrap();
        editor.set_output(sum, true).unwrap();
        editor.set_output(other, true).unwrap();
        let order = calc_processing_order(&graph).unwrap();
        graph.set_processing_order(order);

        let folded = graph.editor().get_or_create(Arc::new(data("folded", 4)));
        graph.editor().replace(sum, folded, true, false).unwrap();

        assert_eq!(graph.lookup("sum"), Some(folded));
        assert!(graph[folded].is_output());
        assert!(graph[folded].dependencies().is_empty());
        assert!(!graph.contains("x"));
        assert!(!graph.contains("w"));
        // shared still feeds another output
        assert!(graph.is_live(shared));
        assert_eq!(graph[shared].users(), [other]);
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_remove_nodes_requires_closed_set() {
        let (mut graph, i, a, b) = chain();
        assert!(graph.editor().remove_nodes(&[i, a]).is_err());
        assert!(graph.is_live(a));
        graph.editor().remove_nodes(&[a, b, i]).unwrap();
        assert!(graph.is_empty());
        graph.check_integrity().unwrap();
    }
}
