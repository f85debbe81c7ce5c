//! Graph construction from a topology.
//!
//! [`init_graph`] turns a [`Topology`] into a [`GraphStore`] ready for optimization:
//!
//! 1. one node per primitive, plus one crop node per split output
//! 2. edges from the input identifiers of every primitive, and from each split input to
//!    its crops
//! 3. the processing order
//! 4. split expansion in processing order: each crop is sized, the split is removed
//! 5. output selection
//! 6. output-size-handling flags, layouts, constant and data-flow flags
//!
//! Consumers refer to split outputs as `"<split>:<output>"`; referring to the split
//! itself is an error, it has no value of its own.

use std::sync::Arc;

use crate::{
    analysis::{
        analyze_output_size_handling, calc_processing_order, infer_layout, mark_constants,
        mark_data_flow, resolve_layouts,
    },
    compiler::{EventKind, EventLog},
    config::BuildOptions,
    graph::{GraphStore, NodeId},
    topology::{Operation, Primitive, SplitOutput, Tensor, Topology},
    Error, Result,
};

/// A split waiting for expansion.
struct PendingSplit {
    split: NodeId,
    input: NodeId,
    crops: Vec<(NodeId, Tensor)>,
}

/// Builds the program graph of `topology`.
///
/// # Errors
///
/// - [`Error::UnknownInput`] if a primitive references an identifier that does not exist
/// - [`Error::NotFound`] if a declared output does not exist; a split is never an output
/// - [`Error::Cycle`] if the inputs form a cycle
/// - [`Error::InvalidLayout`] if the input layouts of a primitive are inconsistent
/// - [`Error::Structural`] if a split is consumed directly
pub fn init_graph(
    topology: &Topology,
    options: &BuildOptions,
    events: &EventLog,
) -> Result<GraphStore> {
    let mut graph = GraphStore::new();
    let mut splits = create_nodes(&mut graph, topology)?;
    connect_inputs(&mut graph, topology, &splits)?;

    let order = calc_processing_order(&graph)?;
    graph.set_processing_order(order);

    // a split reading another split's crop comes after the split that sizes it
    splits.sort_by_key(|pending| graph.position(pending.input).unwrap_or(usize::MAX));
    for pending in splits {
        expand_split(&mut graph, events, pending)?;
    }
    set_outputs(&mut graph, topology)?;

    analyze_output_size_handling(&mut graph, options.output_size_handling)?;
    resolve_layouts(&mut graph)?;
    mark_constants(&mut graph)?;
    mark_data_flow(&mut graph)?;
    Ok(graph)
}

fn create_nodes(graph: &mut GraphStore, topology: &Topology) -> Result<Vec<PendingSplit>> {
    let mut declared = Vec::new();
    let mut editor = graph.editor();
    for primitive in topology.primitives() {
        let node = editor.get_or_create(Arc::clone(primitive));
        let Operation::Split { outputs } = &primitive.operation else {
            continue;
        };
        let input = match primitive.inputs.as_slice() {
            [input] => input.clone(),
            other => {
                return Err(structural_error!(
                    "split '{}' needs exactly one input, has {}",
                    primitive.id,
                    other.len()
                ))
            }
        };
        let mut crops = Vec::with_capacity(outputs.len());
        for SplitOutput { name, offset } in outputs {
            let crop_id = format!("{}:{}", primitive.id, name);
            if topology.get(&crop_id).is_some() {
                return Err(Error::IdentifierCollision(crop_id));
            }
            // sized during expansion, once the input layout is known
            let crop = Primitive::crop(crop_id, input.clone(), Tensor::splat(1), *offset);
            crops.push((editor.get_or_create(Arc::new(crop)), *offset));
        }
        declared.push((node, input, crops));
    }

    // inputs may name crops of splits declared later
    declared
        .into_iter()
        .map(|(split, input, crops)| match graph.lookup(&input) {
            Some(input) => Ok(PendingSplit {
                split,
                input,
                crops,
            }),
            None => Err(Error::UnknownInput {
                node: graph[split].id().to_string(),
                input,
            }),
        })
        .collect()
}

fn connect_inputs(
    graph: &mut GraphStore,
    topology: &Topology,
    splits: &[PendingSplit],
) -> Result<()> {
    let mut edges = Vec::new();
    for primitive in topology.primitives() {
        let Some(node) = graph.lookup(&primitive.id) else {
            return Err(Error::NotFound(primitive.id.clone()));
        };
        for input in &primitive.inputs {
            let Some(dep) = graph.lookup(input) else {
                return Err(Error::UnknownInput {
                    node: primitive.id.clone(),
                    input: input.clone(),
                });
            };
            if matches!(graph[dep].operation(), Operation::Split { .. }) {
                return Err(structural_error!(
                    "'{}' consumes split '{}' directly; use '{}:<output>'",
                    primitive.id,
                    input,
                    input
                ));
            }
            edges.push((dep, node));
        }
    }
    for pending in splits {
        edges.extend(pending.crops.iter().map(|&(crop, _)| (pending.input, crop)));
    }
    let mut editor = graph.editor();
    for (dep, node) in edges {
        editor.connect_unordered(dep, node);
    }
    Ok(())
}

/// Size of each split output: up to the next output's offset on axes where that offset
/// is larger, otherwise up to the end of the input.
fn crop_sizes(input: Tensor, offsets: &[Tensor]) -> Vec<Tensor> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            let next = offsets.get(i + 1);
            let mut axes = [0; 4];
            for (axis, slot) in axes.iter_mut().enumerate() {
                let start = offset.axes()[axis];
                *slot = match next {
                    Some(n) if n.axes()[axis] > start => n.axes()[axis] - start,
                    _ => input.axes()[axis] - start,
                };
            }
            Tensor::from_axes(axes)
        })
        .collect()
}

fn expand_split(graph: &mut GraphStore, events: &EventLog, pending: PendingSplit) -> Result<()> {
    let PendingSplit {
        split,
        input,
        crops,
    } = pending;
    let split_id = graph[split].id().to_string();
    let input_id = graph[input].id().to_string();
    let input_size = infer_layout(graph, input)?.size;
    let offsets: Vec<Tensor> = crops.iter().map(|&(_, offset)| offset).collect();
    let sizes = crop_sizes(input_size, &offsets);

    for (&(crop, offset), size) in crops.iter().zip(sizes) {
        let id = graph[crop].id().to_string();
        let primitive = Primitive::crop(id, input_id.clone(), size, offset);
        graph.node_mut(crop).set_primitive(Arc::new(primitive));
    }
    graph.editor_with_events(events).remove_nodes(&[split])?;
    events
        .record(EventKind::SplitExpanded)
        .message(format!("{split_id} expanded into {} crops", crops.len()));
    Ok(())
}

fn set_outputs(graph: &mut GraphStore, topology: &Topology) -> Result<()> {
    let outputs: Vec<NodeId> = if topology.outputs().is_empty() {
        graph.node_ids().filter(|&n| graph[n].is_sink()).collect()
    } else {
        topology
            .outputs()
            .iter()
            .map(|id| graph.lookup(id).ok_or_else(|| Error::NotFound(id.clone())))
            .collect::<Result<_>>()?
    };
    let mut editor = graph.editor();
    for node in outputs {
        editor.set_output(node, true)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::NodeFlags,
        test::{data_with, input, input_with, relu},
        topology::{ConcatAxis, PrimitiveKind},
    };

    fn build(topology: &Topology) -> Result<GraphStore> {
        init_graph(topology, &BuildOptions::default(), &EventLog::new())
    }

    #[test]
    fn test_edges_mirrored_and_ordered() {
        let mut topology = Topology::new();
        topology.add(relu("r", "in")).unwrap();
        topology.add(input("in")).unwrap();
        let graph = build(&topology).unwrap();
        graph.check_integrity().unwrap();
        let order: Vec<&str> = graph
            .processing_order()
            .iter()
            .map(|n| graph[n].id())
            .collect();
        assert_eq!(order, ["in", "r"]);
        assert!(graph.get_node("r").unwrap().is_output());
        assert!(graph.get_node("in").unwrap().is_input());
    }

    #[test]
    fn test_unknown_input() {
        let mut topology = Topology::new();
        topology.add(relu("r", "missing")).unwrap();
        match build(&topology) {
            Err(Error::UnknownInput { node, input }) => {
                assert_eq!(node, "r");
                assert_eq!(input, "missing");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_declared_outputs() {
        let mut topology = Topology::new();
        topology.add(input("in")).unwrap();
        topology.add(relu("a", "in")).unwrap();
        topology.add(relu("b", "a")).unwrap();
        topology.add_output("a");
        let graph = build(&topology).unwrap();
        assert!(graph.get_node("a").unwrap().is_output());
        assert!(!graph.get_node("b").unwrap().is_output());

        topology.add_output("nope");
        assert!(matches!(build(&topology), Err(Error::NotFound(id)) if id == "nope"));
    }

    #[test]
    fn test_constants_marked() {
        let mut topology = Topology::new();
        topology.add(input("in")).unwrap();
        topology.add(data_with("c", Tensor::new(1, 2, 4, 4))).unwrap();
        topology
            .add(Primitive::eltwise("sum", ["in", "c"], crate::topology::EltwiseMode::Sum))
            .unwrap();
        let graph = build(&topology).unwrap();
        let c = graph.get_node("c").unwrap();
        assert!(c.is_constant());
        assert!(c.flags().contains(NodeFlags::CONSTANT_FRONTIER));
        assert!(graph.get_node("sum").unwrap().is_in_data_flow());
    }

    #[test]
    fn test_crop_sizes() {
        let sizes = crop_sizes(
            Tensor::new(1, 8, 4, 4),
            &[Tensor::new(0, 0, 0, 0), Tensor::new(0, 3, 0, 0)],
        );
        assert_eq!(sizes, vec![Tensor::new(1, 3, 4, 4), Tensor::new(1, 5, 4, 4)]);
    }

    #[test]
    fn test_split_expanded() {
        let mut topology = Topology::new();
        topology.add(input_with("in", Tensor::new(1, 8, 2, 2))).unwrap();
        topology
            .add(Primitive::split(
                "s",
                "in",
                vec![
                    SplitOutput::new("lo", Tensor::splat(0)),
                    SplitOutput::new("hi", Tensor::new(0, 4, 0, 0)),
                ],
            ))
            .unwrap();
        topology
            .add(Primitive::concatenation("cat", ["s:hi", "s:lo"], ConcatAxis::Feature))
            .unwrap();
        let events = EventLog::new();
        let graph = init_graph(&topology, &BuildOptions::default(), &events).unwrap();

        assert!(!graph.contains("s"));
        assert!(graph.optimized_out().iter().any(|id| id == "s"));
        let hi = graph.get_node("s:hi").unwrap();
        assert_eq!(hi.kind(), PrimitiveKind::Crop);
        assert_eq!(hi.output_layout().unwrap().size, Tensor::new(1, 4, 2, 2));
        assert_eq!(graph[hi.dependencies()[0]].id(), "in");
        assert!(!hi.is_output());
        assert!(events.has(EventKind::SplitExpanded));
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_split_of_split_declared_first() {
        let mut topology = Topology::new();
        topology
            .add(Primitive::split(
                "s2",
                "s1:hi",
                vec![
                    SplitOutput::new("x", Tensor::splat(0)),
                    SplitOutput::new("y", Tensor::new(0, 3, 0, 0)),
                ],
            ))
            .unwrap();
        topology.add(input_with("in", Tensor::new(1, 8, 2, 2))).unwrap();
        topology
            .add(Primitive::split(
                "s1",
                "in",
                vec![
                    SplitOutput::new("lo", Tensor::splat(0)),
                    SplitOutput::new("hi", Tensor::new(0, 4, 0, 0)),
                ],
            ))
            .unwrap();
        let graph = build(&topology).unwrap();

        let y = graph.get_node("s2:y").unwrap();
        assert_eq!(graph[y.dependencies()[0]].id(), "s1:hi");
        assert_eq!(y.output_layout().unwrap().size, Tensor::new(1, 1, 2, 2));
        let x = graph.get_node("s2:x").unwrap();
        assert_eq!(x.output_layout().unwrap().size, Tensor::new(1, 3, 2, 2));
        assert!(!graph.contains("s1") && !graph.contains("s2"));
        graph.check_integrity().unwrap();
    }

    #[test]
    fn test_split_consumed_directly() {
        let mut topology = Topology::new();
        topology.add(input("in")).unwrap();
        topology
            .add(Primitive::split("s", "in", vec![SplitOutput::new("a", Tensor::splat(0))]))
            .unwrap();
        topology.add(relu("r", "s")).unwrap();
        assert!(matches!(build(&topology), Err(Error::Structural { .. })));
    }
}
