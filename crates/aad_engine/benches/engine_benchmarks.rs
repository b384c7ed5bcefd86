//! Criterion benchmarks for the forward/backward pass pair.

use aad_core::types::{NodeId, RandomVariable};
use aad_engine::graph::ComputationGraph;
use aad_engine::liveness::{NodeMask, RequirementMap};
use aad_engine::ops::{Opcode, OperatorRegistry};
use aad_engine::regression::RegressionCache;
use aad_engine::store::ValueStore;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

/// A chain of alternating Mul/Add nodes off one leaf, the shape of a
/// discretised pathwise payoff.
fn chain_graph(depth: usize) -> (ComputationGraph, NodeId, NodeId) {
    let mut g = ComputationGraph::new();
    let leaf = g.add_leaf();
    let half = g.add_constant(0.5);
    let mut cursor = leaf;
    for step in 0..depth {
        let opcode = if step % 2 == 0 { Opcode::Mul } else { Opcode::Add };
        cursor = g.add_operation(opcode, &[cursor, half]).unwrap();
    }
    (g, leaf, cursor)
}

fn bench_forward_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_backward");
    let registry = OperatorRegistry::standard();

    for &(depth, n_paths) in &[(256usize, 1_024usize), (1_024, 8_192)] {
        let (graph, leaf, out) = chain_graph(depth);
        let requirements = RequirementMap::build(&graph);
        let keep = NodeMask::all_active(graph.len());
        let active = NodeMask::all_active(graph.len());
        let draws: Vec<f64> = (0..n_paths).map(|i| 1.0 + (i as f64 * 1e-4)).collect();

        group.bench_with_input(
            BenchmarkId::new("pass_pair", format!("{}nodes_{}paths", depth, n_paths)),
            &draws,
            |b, draws| {
                b.iter(|| {
                    let mut values = ValueStore::new(graph.len());
                    graph.seed_constants(&mut values);
                    values.set(leaf, RandomVariable::from_paths(draws.clone()));
                    let mut regressions = RegressionCache::new();
                    aad_engine::forward::evaluate(
                        &graph,
                        &registry,
                        &mut values,
                        &mut regressions,
                        &requirements,
                        &keep,
                        &active,
                    )
                    .unwrap();

                    let mut derivatives = ValueStore::new(graph.len());
                    derivatives.seed_scalar(out, 1.0);
                    aad_engine::backward::propagate(
                        &graph,
                        &registry,
                        &values,
                        &mut derivatives,
                        &regressions,
                        &keep,
                        &active,
                    )
                    .unwrap();
                    derivatives.mean(leaf)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_forward_backward);
criterion_main!(benches);
