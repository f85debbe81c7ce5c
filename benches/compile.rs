//! Benchmarks for end-to-end compilation.
//!
//! Compiles synthetic topologies of growing size:
//! - Wide graphs: many independent branches joined by a concatenation
//! - Deep graphs: long chains of convolutions with fusable activations
//! - Constant heavy graphs: chains that fold away entirely

extern crate nngraph;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nngraph::prelude::*;
use std::hint::black_box;

fn input(id: &str, size: Tensor) -> Primitive {
    Primitive::input(id, Layout::new(DataType::F32, Format::Bfyx, size))
}

/// `width` relu branches over one input, concatenated along features.
fn wide(width: usize) -> Topology {
    let mut topology = Topology::new();
    topology.add(input("in", Tensor::new(1, 4, 16, 16))).unwrap();
    let mut branches = Vec::with_capacity(width);
    for i in 0..width {
        let id = format!("branch{i}");
        topology
            .add(Primitive::activation(id.as_str(), "in", ActivationFunction::Relu))
            .unwrap();
        branches.push(id);
    }
    topology
        .add(Primitive::concatenation("cat", branches, ConcatAxis::Feature))
        .unwrap();
    topology
}

/// `depth` padded 3x3 convolutions, each followed by a relu.
fn deep(depth: usize) -> Topology {
    let mut topology = Topology::new();
    topology.add(input("in", Tensor::new(1, 16, 8, 8))).unwrap();
    let weights = Layout::new(DataType::F32, Format::Oiyx, Tensor::new(16, 16, 3, 3));
    let mut previous = "in".to_string();
    for i in 0..depth {
        let w = format!("w{i}");
        let conv = format!("conv{i}");
        let act = format!("act{i}");
        topology
            .add(Primitive::data(w.as_str(), weights, vec![0.01; weights.count()]))
            .unwrap();
        topology
            .add(Primitive::convolution(
                conv.as_str(),
                previous.as_str(),
                [w.as_str()],
                Vec::<String>::new(),
                ConvolutionParams {
                    input_offset: Tensor::new(0, 0, -1, -1),
                    ..ConvolutionParams::default()
                },
            ))
            .unwrap();
        topology
            .add(Primitive::activation(act.as_str(), conv.as_str(), ActivationFunction::Relu))
            .unwrap();
        previous = act;
    }
    topology
}

/// A chain of activations over constant data, folded at compile time.
fn constant_chain(length: usize) -> Topology {
    let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 8, 8, 8));
    let mut topology = Topology::new();
    topology
        .add(Primitive::data("c", layout, vec![-0.5; layout.count()]))
        .unwrap();
    let mut previous = "c".to_string();
    for i in 0..length {
        let id = format!("a{i}");
        topology
            .add(Primitive::activation(id.as_str(), previous.as_str(), ActivationFunction::Relu))
            .unwrap();
        previous = id;
    }
    topology
}

fn bench_wide(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_wide");
    for width in [8, 64, 256] {
        let topology = wide(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &topology, |b, t| {
            b.iter(|| {
                let program = Program::build(black_box(t), BuildOptions::default()).unwrap();
                black_box(program)
            });
        });
    }
    group.finish();
}

fn bench_deep(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_deep");
    for depth in [4, 32, 128] {
        let topology = deep(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &topology, |b, t| {
            b.iter(|| {
                let program = Program::build(black_box(t), BuildOptions::default()).unwrap();
                black_box(program)
            });
        });
    }
    group.finish();
}

fn bench_constant_chain(c: &mut Criterion) {
    let topology = constant_chain(64);
    c.bench_function("compile_constant_chain_64", |b| {
        b.iter(|| {
            let program = Program::build(black_box(&topology), BuildOptions::default()).unwrap();
            black_box(program)
        });
    });
}

/// Memory dependencies dominate large wide graphs; compare with the pool disabled.
fn bench_without_memory_pool(c: &mut Criterion) {
    let topology = wide(256);
    let options = BuildOptions::default().with_memory_pool(false);
    c.bench_function("compile_wide_256_no_pool", |b| {
        b.iter(|| {
            let program = Program::build(black_box(&topology), options.clone()).unwrap();
            black_box(program)
        });
    });
}

criterion_group!(
    benches,
    bench_wide,
    bench_deep,
    bench_constant_chain,
    bench_without_memory_pool
);
criterion_main!(benches);
