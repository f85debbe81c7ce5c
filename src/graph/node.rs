//! Graph vertices.
//!
//! A [`ProgramNode`] wraps one [`Primitive`] together with everything the compiler derives
//! about it: its dependency and user edges, status [`NodeFlags`], the resolved output
//! [`Layout`] and the bound implementation. Nodes live in the arena of a
//! [`GraphStore`](crate::graph::GraphStore) and are addressed by [`NodeId`].
//!
//! Edge lists can only be changed from inside [`crate::graph`]; everything else goes
//! through the [`GraphEditor`](crate::graph::GraphEditor), which keeps dependency and user
//! edges mirrored.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::{
    policy::ImplementationHandle,
    topology::{Layout, Operation, Padding, Primitive, PrimitiveKind},
};

/// A stable arena index of a node.
///
/// Identifiers are never reused within one graph: removing a node leaves its slot empty.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a `NodeId` from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

bitflags! {
    /// Status flags derived by the compiler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u16 {
        /// Result is read by the caller; never trimmed
        const OUTPUT = 1 << 0;
        /// Runtime fed input
        const INPUT = 1 << 1;
        /// Value is known at compile time
        const CONSTANT = 1 << 2;
        /// Constant consumed by a non-constant node
        const CONSTANT_FRONTIER = 1 << 3;
        /// Value depends on runtime input
        const DATA_FLOW = 1 << 4;
        /// Produces an explicitly requested output size
        const OUTPUT_SIZE_HANDLING = 1 << 5;
        /// Executes in place inside another node's buffer
        const CAN_BE_OPTIMIZED = 1 << 6;
        /// Split convolution eligible for merged weights
        const DEPTHWISE_SEP_OPT = 1 << 7;
    }
}

/// A node of the program graph.
#[derive(Debug, Clone)]
pub struct ProgramNode {
    id: String,
    primitive: Arc<Primitive>,
    dependencies: Vec<NodeId>,
    users: Vec<NodeId>,
    flags: NodeFlags,
    output_padding: Padding,
    layout: Option<Layout>,
    implementation: Option<ImplementationHandle>,
}

impl ProgramNode {
    pub(crate) fn new(primitive: Arc<Primitive>) -> Self {
        let mut flags = NodeFlags::empty();
        if matches!(primitive.operation, Operation::Input { .. }) {
            flags |= NodeFlags::INPUT;
        }
        Self {
            id: primitive.id.clone(),
            primitive,
            dependencies: Vec::new(),
            users: Vec::new(),
            flags,
            output_padding: Padding::none(),
            layout: None,
            implementation: None,
        }
    }

    /// Current identifier. May differ from the primitive's after a rename.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The wrapped primitive.
    #[must_use]
    pub fn primitive(&self) -> &Arc<Primitive> {
        &self.primitive
    }

    /// The wrapped operation.
    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.primitive.operation
    }

    /// The primitive kind.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        self.primitive.kind()
    }

    /// Ordered dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[NodeId] {
        &self.dependencies
    }

    /// Dependency at `index`.
    #[must_use]
    pub fn dependency(&self, index: usize) -> Option<NodeId> {
        self.dependencies.get(index).copied()
    }

    /// Users, one entry per consuming dependency slot. Order carries no meaning.
    #[must_use]
    pub fn users(&self) -> &[NodeId] {
        &self.users
    }

    /// Status flags.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Returns `true` if the caller reads this node's result.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.flags.contains(NodeFlags::OUTPUT)
    }

    /// Returns `true` for runtime fed inputs.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.flags.contains(NodeFlags::INPUT)
    }

    /// Returns `true` if the value is known at compile time.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.flags.contains(NodeFlags::CONSTANT)
    }

    /// Returns `true` if the value depends on runtime input.
    #[must_use]
    pub fn is_in_data_flow(&self) -> bool {
        self.flags.contains(NodeFlags::DATA_FLOW)
    }

    /// Returns `true` if the node executes inside another node's buffer.
    #[must_use]
    pub fn can_be_optimized(&self) -> bool {
        self.flags.contains(NodeFlags::CAN_BE_OPTIMIZED)
    }

    /// Returns `true` if the node has no dependencies.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Returns `true` if the node has no users.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        self.users.is_empty()
    }

    /// Resolved output layout, including output padding.
    #[must_use]
    pub fn output_layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    /// Padding other nodes requested around this node's output.
    #[must_use]
    pub fn output_padding(&self) -> Padding {
        self.output_padding
    }

    /// The bound implementation.
    #[must_use]
    pub fn implementation(&self) -> Option<&ImplementationHandle> {
        self.implementation.as_ref()
    }

    pub(crate) fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub(crate) fn set_layout(&mut self, layout: Layout) {
        self.layout = Some(layout);
    }

    pub(crate) fn set_output_padding(&mut self, padding: Padding) {
        self.output_padding = padding;
    }

    pub(crate) fn set_primitive(&mut self, primitive: Arc<Primitive>) {
        self.primitive = primitive;
    }

    pub(crate) fn bind(&mut self, implementation: ImplementationHandle) {
        self.implementation = Some(implementation);
    }

    pub(in crate::graph) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(in crate::graph) fn push_dependency(&mut self, dep: NodeId) {
        self.dependencies.push(dep);
    }

    pub(in crate::graph) fn set_dependency(&mut self, index: usize, dep: NodeId) {
        self.dependencies[index] = dep;
    }

    /// Replaces every occurrence of `from` with `to`; returns how many were replaced.
    pub(in crate::graph) fn redirect_dependency(&mut self, from: NodeId, to: NodeId) -> usize {
        let mut count = 0;
        for dep in &mut self.dependencies {
            if *dep == from {
                *dep = to;
                count += 1;
            }
        }
        count
    }

    /// Removes every occurrence of `dep`; returns how many were removed.
    pub(in crate::graph) fn remove_dependency(&mut self, dep: NodeId) -> usize {
        let before = self.dependencies.len();
        self.dependencies.retain(|&d| d != dep);
        before - self.dependencies.len()
    }

    pub(in crate::graph) fn take_dependencies(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    pub(in crate::graph) fn push_user(&mut self, user: NodeId) {
        self.users.push(user);
    }

    /// Removes one occurrence of `user`.
    pub(in crate::graph) fn remove_user_once(&mut self, user: NodeId) -> bool {
        match self.users.iter().position(|&u| u == user) {
            Some(pos) => {
                self.users.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes every occurrence of `user`; returns how many were removed.
    pub(in crate::graph) fn remove_user(&mut self, user: NodeId) -> usize {
        let before = self.users.len();
        self.users.retain(|&u| u != user);
        before - self.users.len()
    }

    pub(in crate::graph) fn take_users(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.users)
    }
}

impl fmt::Display for ProgramNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind())?;
        if let Some(layout) = &self.layout {
            write!(f, " {layout}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{DataType, Format, Tensor};

    fn input_node() -> ProgramNode {
        let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 2, 3, 3));
        ProgramNode::new(Arc::new(Primitive::input("in", layout)))
    }

    #[test]
    fn test_node_id_format() {
        let id = NodeId::new(7);
        assert_eq!(format!("{id:?}"), "NodeId(7)");
        assert_eq!(id.to_string(), "n7");
        assert_eq!(id.index(), 7);
    }

    #[test]
    fn test_input_flag_from_primitive() {
        let node = input_node();
        assert!(node.is_input());
        assert!(!node.is_output());
        assert!(node.is_source());
        assert!(node.is_sink());
    }

    #[test]
    fn test_user_multiset() {
        let mut node = input_node();
        node.push_user(NodeId::new(1));
        node.push_user(NodeId::new(1));
        node.push_user(NodeId::new(2));
        assert!(node.remove_user_once(NodeId::new(1)));
        assert_eq!(node.users().iter().filter(|&&u| u == NodeId::new(1)).count(), 1);
        assert_eq!(node.remove_user(NodeId::new(2)), 1);
        assert!(!node.remove_user_once(NodeId::new(9)));
    }

    #[test]
    fn test_redirect_dependency() {
        let mut node = input_node();
        node.push_dependency(NodeId::new(1));
        node.push_dependency(NodeId::new(2));
        node.push_dependency(NodeId::new(1));
        assert_eq!(node.redirect_dependency(NodeId::new(1), NodeId::new(5)), 2);
        assert_eq!(
            node.dependencies(),
            [NodeId::new(5), NodeId::new(2), NodeId::new(5)]
        );
        assert_eq!(node.remove_dependency(NodeId::new(5)), 2);
        assert_eq!(node.dependencies(), [NodeId::new(2)]);
    }
}
