//! Implementation binding.
//!
//! After optimization every surviving node is bound to an [`ImplementationHandle`]
//! chosen by an [`ImplementationSelector`] from the node's kind and resolved layout. A
//! node the selector refuses cannot be executed, so a refusal aborts the compile with
//! [`Error::BindFailure`](crate::Error::BindFailure).

use std::fmt;

use crate::{
    graph::ProgramNode,
    topology::{Format, PrimitiveKind},
};

/// An opaque reference to a device kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplementationHandle {
    /// Kernel name
    pub name: String,
    /// Kind the kernel implements
    pub kind: PrimitiveKind,
    /// Output format the kernel was selected for
    pub format: Format,
}

impl fmt::Display for ImplementationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Chooses an implementation per node.
pub trait ImplementationSelector {
    /// Name used in events.
    fn name(&self) -> &'static str;

    /// Implementation for `node`, or `None` if no kernel supports it.
    fn select(&self, node: &ProgramNode) -> Option<ImplementationHandle>;
}

/// Binds every kind except `split` to a reference kernel named `<kind>_<format>_ref`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceImplementationSelector;

impl ReferenceImplementationSelector {
    /// Creates the selector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ImplementationSelector for ReferenceImplementationSelector {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn select(&self, node: &ProgramNode) -> Option<ImplementationHandle> {
        let kind = node.kind();
        if kind == PrimitiveKind::Split {
            return None;
        }
        let format = node.output_layout()?.format;
        Some(ImplementationHandle {
            name: format!("{kind}_{format}_ref"),
            kind,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::{calc_processing_order, resolve_layouts},
        graph::GraphStore,
        test::{input, relu},
    };

    #[test]
    fn test_reference_names() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let i = editor.get_or_create(Arc::new(input("in")));
        let r = editor.get_or_create(Arc::new(relu("r", "in")));
        editor.add_connection(i, r).unwrap();
        let order = calc_processing_order(&graph).unwrap();
        graph.set_processing_order(order);
        resolve_layouts(&mut graph).unwrap();

        let selector = ReferenceImplementationSelector::new();
        let handle = selector.select(&graph[r]).unwrap();
        assert_eq!(handle.name, "activation_bfyx_ref");
        assert_eq!(handle.kind, PrimitiveKind::Activation);
        assert_eq!(selector.select(&graph[i]).unwrap().to_string(), "input_bfyx_ref");
    }
}
