#![no_main]

use libfuzzer_sys::fuzz_target;
use nngraph::prelude::*;

/// Every byte pair adds one primitive reading earlier primitives only, so the
/// topology is always a DAG.
fn topology(data: &[u8]) -> Topology {
    let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 2, 4, 4));
    let mut topology = Topology::new();
    let _ = topology.add(Primitive::input("n0", layout));
    let _ = topology.add(Primitive::data("n1", layout, vec![1.0; layout.count()]));

    for (i, pair) in data.chunks_exact(2).take(64).enumerate() {
        let index = i + 2;
        let id = format!("n{index}");
        let a = format!("n{}", pair[1] as usize % index);
        let b = format!("n{}", (pair[1] as usize / 7) % index);
        let primitive = match pair[0] % 6 {
            0 => Primitive::activation(id.as_str(), a.as_str(), ActivationFunction::Relu),
            1 => Primitive::softmax(id.as_str(), a.as_str()),
            2 => Primitive::eltwise(id.as_str(), [a.as_str(), b.as_str()], EltwiseMode::Sum),
            3 => Primitive::reorder(id.as_str(), a.as_str(), Format::Bfyx, DataType::F32),
            4 => Primitive::reshape(id.as_str(), a.as_str(), Tensor::new(1, 2, 4, 4)),
            _ => Primitive::activation(id.as_str(), a.as_str(), ActivationFunction::Relu),
        };
        let _ = topology.add(primitive);
    }
    topology
}

fuzz_target!(|data: &[u8]| {
    let options = match data.first() {
        Some(flags) => BuildOptions::default()
            .with_debug(flags & 1 != 0)
            .with_out_of_order_queue(flags & 2 != 0)
            .with_memory_pool(flags & 4 != 0),
        None => BuildOptions::default(),
    };
    if let Ok(program) = Program::build(&topology(data), options) {
        assert!(program.graph().check_integrity().is_ok());
        assert!(program.memory_dependencies().is_symmetric());
    }
});
