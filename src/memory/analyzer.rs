//! Runs the enabled conflict policies over a compiled graph.

use crate::{
    compiler::{EventKind, EventLog},
    config::BuildOptions,
    graph::GraphStore,
    memory::{
        BasicPolicy, BranchSnapshot, MemoryDependencyGraph, MemoryPolicy, OutOfOrderPolicy,
        SkippedBranchPolicy,
    },
    Result,
};

/// Derives the [`MemoryDependencyGraph`] of a graph from a set of policies.
///
/// The result is the union of the conflicts of all policies, so it is symmetric and a
/// superset of what any single policy reports. Every live node has an entry.
pub struct MemoryDependencyAnalyzer {
    policies: Vec<Box<dyn MemoryPolicy>>,
}

impl Default for MemoryDependencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDependencyAnalyzer {
    /// Creates an analyzer with only the [`BasicPolicy`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: vec![Box::new(BasicPolicy)],
        }
    }

    /// Creates the analyzer a build with `options` uses.
    ///
    /// The skipped branch policy is enabled when a pre-optimization `snapshot` is
    /// given, the out-of-order policy when the options target an out-of-order queue.
    #[must_use]
    pub fn for_options(options: &BuildOptions, snapshot: Option<BranchSnapshot>) -> Self {
        let mut analyzer = Self::new();
        if let Some(snapshot) = snapshot {
            analyzer = analyzer.with_policy(Box::new(SkippedBranchPolicy::new(snapshot)));
        }
        if options.out_of_order_queue {
            analyzer = analyzer.with_policy(Box::new(OutOfOrderPolicy));
        }
        analyzer
    }

    /// Adds a policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Box<dyn MemoryPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Names of the enabled policies.
    #[must_use]
    pub fn policy_names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Computes the memory dependencies of `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`](crate::Error::Structural) if the graph has no
    /// established processing order.
    pub fn analyze(&self, graph: &GraphStore, events: &EventLog) -> Result<MemoryDependencyGraph> {
        if !graph.order_established() {
            return Err(structural_error!(
                "memory dependencies require a processing order"
            ));
        }

        let mut dependencies = MemoryDependencyGraph::new();
        for node in graph.nodes() {
            dependencies.add_node(node.id());
        }
        for policy in &self.policies {
            let mut added = 0usize;
            for (a, b) in policy.conflicts(graph) {
                if dependencies.add_conflict(graph[a].id(), graph[b].id()) {
                    added += 1;
                }
            }
            events
                .record(EventKind::MemoryDependenciesComputed)
                .message(format!("{}: {added} new conflicts", policy.name()));
        }
        Ok(dependencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{build_graph, input_with, relu};
    use crate::topology::{Tensor, Topology};

    /// {A, B(A), C(A), outputs B, C}
    fn fork() -> GraphStore {
        let mut topology = Topology::new();
        topology.add(input_with("a", Tensor::new(1, 1, 2, 2))).unwrap();
        topology.add(relu("b", "a")).unwrap();
        topology.add(relu("c", "a")).unwrap();
        topology.add_output("b").add_output("c");
        build_graph(&topology)
    }

    #[test]
    fn test_fork_conflicts() {
        let graph = fork();
        let events = EventLog::new();
        let options = BuildOptions::new();
        let deps = MemoryDependencyAnalyzer::for_options(&options, None)
            .analyze(&graph, &events)
            .unwrap();

        assert!(deps.conflicts_with("a", "b"));
        assert!(deps.conflicts_with("a", "c"));
        assert!(deps.conflicts_with("b", "c"));
        assert!(deps.is_symmetric());
        assert_eq!(events.count_kind(EventKind::MemoryDependenciesComputed), 2);
    }

    #[test]
    fn test_union_is_superset_of_basic() {
        let graph = fork();
        let events = EventLog::new();
        let basic = MemoryDependencyAnalyzer::new().analyze(&graph, &events).unwrap();
        let all = MemoryDependencyAnalyzer::for_options(&BuildOptions::new(), None)
            .analyze(&graph, &events)
            .unwrap();
        assert!(all.is_superset_of(&basic));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_requires_order() {
        let graph = GraphStore::new();
        let result = MemoryDependencyAnalyzer::new().analyze(&graph, &EventLog::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_names() {
        let options = BuildOptions {
            out_of_order_queue: false,
            ..BuildOptions::default()
        };
        let analyzer = MemoryDependencyAnalyzer::for_options(&options, Some(BranchSnapshot::default()));
        assert_eq!(analyzer.policy_names(), ["basic", "skipped_branch"]);
    }
}
