//! Constant, data-flow and output-size-handling marking.
//!
//! All markings are recomputed from scratch in processing order, so they can be re-run
//! after any pass without clearing state first.

use crate::{
    analysis::calc_processing_order,
    graph::{GraphStore, NodeFlags, NodeId},
    topology::Operation,
    Error, Result,
};

/// Flags nodes whose value is known at compile time.
///
/// A node is constant if it is a `Data` node, or if it has dependencies that are all
/// constant and is not a runtime input. Constant nodes with at least one non-constant user
/// are additionally flagged [`NodeFlags::CONSTANT_FRONTIER`].
///
/// # Errors
///
/// Returns [`Error::Cycle`] if no processing order exists and none can be computed.
pub fn mark_constants(graph: &mut GraphStore) -> Result<()> {
    let order = ordered(graph)?;
    for &node in &order {
        let current = &graph[node];
        let constant = match current.operation() {
            Operation::Data { .. } => true,
            Operation::Input { .. } => false,
            _ => {
                !current.dependencies().is_empty()
                    && current.dependencies().iter().all(|&d| graph[d].is_constant())
            }
        };
        graph.node_mut(node).set_flag(NodeFlags::CONSTANT, constant);
    }
    for &node in &order {
        let current = &graph[node];
        let frontier =
            current.is_constant() && current.users().iter().any(|&u| !graph[u].is_constant());
        graph
            .node_mut(node)
            .set_flag(NodeFlags::CONSTANT_FRONTIER, frontier);
    }
    Ok(())
}

/// Flags nodes whose value depends on a runtime input.
///
/// Only data inputs propagate: for convolutions and fully connected layers that is the
/// first dependency, weights and biases never make a node part of the data flow.
///
/// # Errors
///
/// Returns [`Error::Cycle`] if no processing order exists and none can be computed.
pub fn mark_data_flow(graph: &mut GraphStore) -> Result<()> {
    let order = ordered(graph)?;
    for node in order {
        let current = &graph[node];
        let data_inputs = match current.operation() {
            Operation::Convolution(_) | Operation::FullyConnected { .. } => {
                &current.dependencies()[..current.dependencies().len().min(1)]
            }
            _ => current.dependencies(),
        };
        let flow = current.is_input() || data_inputs.iter().any(|&d| graph[d].is_in_data_flow());
        graph.node_mut(node).set_flag(NodeFlags::DATA_FLOW, flow);
    }
    Ok(())
}

/// Flags convolutions and poolings that request an explicit output size.
///
/// # Errors
///
/// Returns [`Error::InvalidLayout`] if such a node exists while output size handling is
/// disabled.
pub fn analyze_output_size_handling(graph: &mut GraphStore, enabled: bool) -> Result<()> {
    let nodes: Vec<NodeId> = graph.node_ids().collect();
    for node in nodes {
        let explicit = match graph[node].operation() {
            Operation::Convolution(params) => params.output_size.is_some(),
            Operation::Pooling(params) => params.output_size.is_some(),
            _ => false,
        };
        if explicit && !enabled {
            return Err(Error::InvalidLayout {
                node: graph[node].id().to_string(),
                message: "explicit output size requires output size handling".to_string(),
            });
        }
        graph
            .node_mut(node)
            .set_flag(NodeFlags::OUTPUT_SIZE_HANDLING, explicit);
    }
    Ok(())
}

fn ordered(graph: &GraphStore) -> Result<Vec<NodeId>> {
    if graph.order_established() {
        Ok(graph.processing_order().iter().collect())
    } else {
        calc_processing_order(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        test::{data, data_with, eltwise_sum, input, input_with, relu},
        topology::{ConvolutionParams, Primitive, Tensor},
    };

    #[test]
    fn test_constants_and_frontier() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let c = editor.get_or_create(Arc::new(data("c", 32)));
        let rc = editor.get_or_create(Arc::new(relu("rc", "c")));
        let i = editor.get_or_create(Arc::new(input("in")));
        let sum = editor.get_or_create(Arc::new(eltwise_sum("sum", &["in", "rc"])));
        editor.connect_unordered(c, rc);
        editor.connect_unordered(i, sum);
        editor.connect_unordered(rc, sum);

        mark_constants(&mut graph).unwrap();
        assert!(graph[c].is_constant());
        assert!(graph[rc].is_constant());
        assert!(!graph[i].is_constant());
        assert!(!graph[sum].is_constant());
        assert!(graph[rc].flags().contains(NodeFlags::CONSTANT_FRONTIER));
        assert!(!graph[c].flags().contains(NodeFlags::CONSTANT_FRONTIER));

        mark_data_flow(&mut graph).unwrap();
        assert!(graph[i].is_in_data_flow());
        assert!(graph[sum].is_in_data_flow());
        assert!(!graph[rc].is_in_data_flow());
    }

    #[test]
    fn test_weights_do_not_join_data_flow() {
        let mut graph = GraphStore::new();
        let mut editor = graph.editor();
        let i = editor.get_or_create(Arc::new(input_with("in", Tensor::new(1, 3, 4, 4))));
        let w = editor.get_or_create(Arc::new(data_with("w", Tensor::new(4, 3, 1, 1))));
        let r = editor.get_or_create(Arc::new(relu("r", "in")));
        let conv = editor.get_or_create(Arc::new(Primitive::convolution(
            "conv",
            "w",
            ["r"],
            Vec::<String>::new(),
            ConvolutionParams::default(),
        )));
        editor.connect_unordered(i, r);
        // weights in the data slot, a runtime value in the weights slot
        editor.connect_unordered(w, conv);
        editor.connect_unordered(r, conv);

        mark_data_flow(&mut graph).unwrap();
        assert!(graph[r].is_in_data_flow());
        assert!(!graph[conv].is_in_data_flow());
    }

    #[test]
    fn test_output_size_handling_toggle() {
        let mut graph = GraphStore::new();
        let conv = graph.editor().get_or_create(Arc::new(Primitive::convolution(
            "conv",
            "in",
            ["w"],
            Vec::<String>::new(),
            ConvolutionParams {
                output_size: Some(Tensor::spatial(6, 6)),
                ..Default::default()
            },
        )));
        assert!(matches!(
            analyze_output_size_handling(&mut graph, false),
            Err(Error::InvalidLayout { .. })
        ));
        analyze_output_size_handling(&mut graph, true).unwrap();
        assert!(graph[conv].flags().contains(NodeFlags::OUTPUT_SIZE_HANDLING));
    }
}
