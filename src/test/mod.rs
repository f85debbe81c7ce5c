//! Shared fixtures for unit tests.

use crate::{
    analysis::{calc_processing_order, resolve_layouts},
    compiler::{EventLog, GraphPass, PassContext, PassScheduler},
    config::BuildOptions,
    graph::{GraphStore, NodeId},
    policy::{DeviceLayoutOptimizer, ReferenceConstantsPropagator},
    program::init_graph,
    topology::{
        ActivationFunction, ConvolutionParams, DataType, EltwiseMode, Format, Layout, Primitive,
        Tensor, Topology,
    },
};

use std::sync::Arc;

/// Input of size 1x2x4x4, f32 bfyx.
pub fn input(id: &str) -> Primitive {
    input_with(id, Tensor::new(1, 2, 4, 4))
}

pub fn input_with(id: &str, size: Tensor) -> Primitive {
    Primitive::input(id, Layout::new(DataType::F32, Format::Bfyx, size))
}

/// Data holding `count` values along x.
pub fn data(id: &str, count: i32) -> Primitive {
    data_with(id, Tensor::new(1, 1, count, 1))
}

/// Data of `size` holding 0, 1, 2, ...
pub fn data_with(id: &str, size: Tensor) -> Primitive {
    let layout = Layout::new(DataType::F32, Format::Bfyx, size);
    let values: Vec<f32> = (0..layout.count()).map(|v| v as f32).collect();
    Primitive::data(id, layout, values)
}

/// Plain weights.
pub fn weights(id: &str, size: Tensor) -> Primitive {
    let layout = Layout::new(DataType::F32, Format::Oiyx, size);
    let values = vec![0.5f32; layout.count()];
    Primitive::data(id, layout, values)
}

pub fn relu(id: &str, input: &str) -> Primitive {
    Primitive::activation(id, input, ActivationFunction::Relu)
}

pub fn eltwise_sum(id: &str, inputs: &[&str]) -> Primitive {
    Primitive::eltwise(id, inputs.iter().copied(), EltwiseMode::Sum)
}

/// a -> {b, c} -> d, relu branches summed, d is the output. Ordered and with layouts.
pub fn diamond() -> (GraphStore, [NodeId; 4]) {
    let mut graph = GraphStore::new();
    let mut editor = graph.editor();
    let a = editor.get_or_create(Arc::new(input("a")));
    let b = editor.get_or_create(Arc::new(relu("b", "a")));
    let c = editor.get_or_create(Arc::new(relu("c", "a")));
    let d = editor.get_or_create(Arc::new(eltwise_sum("d", &["b", "c"])));
    editor.connect_unordered(a, b);
    editor.connect_unordered(a, c);
    editor.connect_unordered(b, d);
    editor.connect_unordered(c, d);
    editor.set_output(d, true).unwrap();

    let order = calc_processing_order(&graph).unwrap();
    graph.set_processing_order(order);
    resolve_layouts(&mut graph).unwrap();
    (graph, [a, b, c, d])
}

/// Owns everything a [`PassContext`] borrows.
pub struct TestContext {
    pub options: BuildOptions,
    pub events: EventLog,
    layout_optimizer: DeviceLayoutOptimizer,
    constants: ReferenceConstantsPropagator,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_options(BuildOptions::default())
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self {
            options,
            events: EventLog::new(),
            layout_optimizer: DeviceLayoutOptimizer::new(),
            constants: ReferenceConstantsPropagator::new(),
        }
    }

    pub fn ctx(&self) -> PassContext<'_> {
        PassContext {
            options: &self.options,
            events: &self.events,
            layout_optimizer: &self.layout_optimizer,
            constants: &self.constants,
        }
    }
}

pub fn build_graph(topology: &Topology) -> GraphStore {
    init_graph(topology, &BuildOptions::default(), &EventLog::new()).unwrap()
}

/// Runs `pass` the way the scheduler does and checks the graph afterwards.
pub fn run_pass(pass: &dyn GraphPass, graph: &mut GraphStore, fixture: &TestContext) -> bool {
    let changed = pass.run(graph, &fixture.ctx()).unwrap();
    if changed {
        PassScheduler::refresh(graph).unwrap();
    }
    graph.check_integrity().unwrap();
    changed
}

/// `in` -> `conv` with `ofm` output features per group and `split` groups of 2 input
/// features, 3x3 kernels padded by one.
pub fn convolution_topology(ofm: i32, split: u32) -> Topology {
    let groups = split as i32;
    let mut topology = Topology::new();
    topology
        .add(input_with("in", Tensor::new(1, 2 * groups, 4, 4)))
        .unwrap();

    let (weight_ids, bias_ids): (Vec<String>, Vec<String>) = if split == 1 {
        (vec!["w".to_string()], vec!["b".to_string()])
    } else {
        (0..split).map(|i| (format!("w{i}"), format!("b{i}"))).unzip()
    };
    for (w, b) in weight_ids.iter().zip(&bias_ids) {
        topology.add(weights(w, Tensor::new(ofm, 2, 3, 3))).unwrap();
        topology.add(data_with(b, Tensor::new(1, ofm, 1, 1))).unwrap();
    }

    let params = ConvolutionParams {
        input_offset: Tensor::new(0, 0, -1, -1),
        split,
        ..ConvolutionParams::default()
    };
    topology
        .add(Primitive::convolution("conv", "in", weight_ids, bias_ids, params))
        .unwrap();
    topology.add_output("conv");
    topology
}
