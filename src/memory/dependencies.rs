//! The memory dependency graph.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// Per node, the identifiers of the nodes whose output buffer must not alias its own.
///
/// The relation is symmetric: [`add_conflict`](Self::add_conflict) always records both
/// directions. Every analysed node has an entry, possibly empty, so a memory pool can tell
/// "no restrictions" apart from "unknown node".
///
/// # Examples
///
/// ```rust
/// use nngraph::memory::MemoryDependencyGraph;
///
/// let mut deps = MemoryDependencyGraph::new();
/// deps.add_node("c");
/// deps.add_conflict("a", "b");
///
/// assert!(deps.conflicts_with("b", "a"));
/// assert!(deps.get("c").is_some_and(|set| set.is_empty()));
/// assert_eq!(deps.to_string(), "primitive: a restricted list: b\nprimitive: b restricted list: a\nprimitive: c restricted list: \n");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDependencyGraph {
    restrictions: BTreeMap<String, BTreeSet<String>>,
}

impl MemoryDependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` without conflicts.
    pub fn add_node(&mut self, id: impl Into<String>) {
        self.restrictions.entry(id.into()).or_default();
    }

    /// Records that `a` and `b` must not alias. Returns `true` if the conflict is new.
    ///
    /// A node never conflicts with itself; `a == b` is ignored.
    pub fn add_conflict(&mut self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let added = self
            .restrictions
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.restrictions
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
        added
    }

    /// Conflicts of `id`, or `None` for a node that was not analysed.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.restrictions.get(id)
    }

    /// Returns `true` if `a` and `b` must not alias.
    #[must_use]
    pub fn conflicts_with(&self, a: &str, b: &str) -> bool {
        self.restrictions.get(a).is_some_and(|set| set.contains(b))
    }

    /// Nodes and their conflicts, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.restrictions.iter().map(|(id, set)| (id.as_str(), set))
    }

    /// Number of analysed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.restrictions.len()
    }

    /// Returns `true` if no node was analysed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.restrictions.is_empty()
    }

    /// Number of distinct conflicting pairs.
    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.restrictions.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Returns `true` if every conflict is recorded in both directions.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.iter()
            .all(|(a, set)| set.iter().all(|b| self.conflicts_with(b, a)))
    }

    /// Returns `true` if every conflict of `other` is also a conflict here.
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        other
            .iter()
            .all(|(a, set)| set.iter().all(|b| self.conflicts_with(a, b)))
    }
}

impl fmt::Display for MemoryDependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, set) in self.iter() {
            let list: Vec<&str> = set.iter().map(String::as_str).collect();
            writeln!(f, "primitive: {id} restricted list: {}", list.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicts_are_symmetric() {
        let mut deps = MemoryDependencyGraph::new();
        assert!(deps.add_conflict("a", "b"));
        assert!(!deps.add_conflict("b", "a"));
        assert!(!deps.add_conflict("a", "a"));
        assert!(deps.is_symmetric());
        assert_eq!(deps.conflict_count(), 1);
        assert!(!deps.conflicts_with("a", "a"));
    }

    #[test]
    fn test_superset() {
        let mut small = MemoryDependencyGraph::new();
        small.add_conflict("a", "b");
        let mut large = small.clone();
        large.add_conflict("b", "c");
        assert!(large.is_superset_of(&small));
        assert!(!small.is_superset_of(&large));
    }

    #[test]
    fn test_dump_format() {
        let mut deps = MemoryDependencyGraph::new();
        deps.add_conflict("x", "y");
        deps.add_conflict("x", "z");
        let dump = deps.to_string();
        assert!(dump.starts_with("primitive: x restricted list: y, z\n"));
        assert_eq!(dump.lines().count(), 3);
    }
}
