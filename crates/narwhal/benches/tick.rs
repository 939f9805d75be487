use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use narwhal::{
    DirectSolver, EdgeSpec, EngineConfig, GraphModel, LayoutPipeline, NodeSpec, Phase,
    SpectralEmbedder, SpectralOptions,
};
use std::hint::black_box;
use std::time::Duration;

#[derive(Debug, Clone)]
struct GraphSpec {
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
}

impl GraphSpec {
    fn build(&self) -> GraphModel {
        let mut g = GraphModel::new();
        g.reconcile(&self.nodes, &self.edges);
        g
    }
}

/// Grid-like mesh with a few long-range edges and one compound per row.
fn build_mesh_spec(name: &str, side: usize) -> GraphSpec {
    let id = |i: usize, j: usize| format!("{name}_{i}_{j}");
    let mut nodes = Vec::with_capacity(side * side + side);
    let mut edges = Vec::new();

    for i in 0..side {
        nodes.push(NodeSpec::new(format!("{name}_row{i}")));
        for j in 0..side {
            let x = (j as f64) * 70.0;
            let y = (i as f64) * 70.0;
            nodes.push(
                NodeSpec::new(id(i, j))
                    .with_parent(format!("{name}_row{i}"))
                    .at(x, y),
            );
            if j + 1 < side {
                edges.push(EdgeSpec::new(
                    format!("h_{i}_{j}"),
                    id(i, j),
                    id(i, j + 1),
                ));
            }
            if i + 1 < side {
                edges.push(EdgeSpec::new(
                    format!("v_{i}_{j}"),
                    id(i, j),
                    id(i + 1, j),
                ));
            }
        }
        let far = (i * 7 + 3) % side;
        if far != i {
            edges.push(EdgeSpec::new(format!("x_{i}"), id(i, 0), id(far, side - 1)));
        }
    }

    GraphSpec { nodes, edges }
}

fn bench_polish(c: &mut Criterion) {
    let mut group = c.benchmark_group("polish");
    group.measurement_time(Duration::from_secs(10));

    let cases = [("mesh_10", 10usize), ("mesh_30", 30usize)];
    let config = EngineConfig {
        polish_ticks: 20,
        ..EngineConfig::default()
    };

    for (name, side) in cases {
        let spec = build_mesh_spec(name, side);
        group.bench_with_input(BenchmarkId::new("barnes_hut", name), &spec, |b, spec| {
            b.iter_batched(
                || (spec.build(), LayoutPipeline::new(config.clone())),
                |(mut g, mut pipeline)| {
                    let report = pipeline.run_phase(black_box(&mut g), &[], Phase::Polish);
                    black_box(report.displacement);
                },
                BatchSize::LargeInput,
            )
        });
        group.bench_with_input(BenchmarkId::new("direct", name), &spec, |b, spec| {
            b.iter_batched(
                || {
                    let pipeline =
                        LayoutPipeline::with_solver(config.clone(), Box::new(DirectSolver::new()));
                    (spec.build(), pipeline)
                },
                |(mut g, mut pipeline)| {
                    let report = pipeline.run_phase(black_box(&mut g), &[], Phase::Polish);
                    black_box(report.displacement);
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_embed(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectral");
    group.measurement_time(Duration::from_secs(10));

    for (name, side) in [("mesh_10", 10usize), ("mesh_40", 40usize)] {
        let spec = build_mesh_spec(name, side);
        let physics = EngineConfig::default().physics;
        group.bench_with_input(BenchmarkId::new("embed", name), &spec, |b, spec| {
            b.iter_batched(
                || spec.build(),
                |mut g| {
                    let mut embedder = SpectralEmbedder::new(SpectralOptions::default(), 1);
                    let report = embedder.embed(black_box(&mut g), &physics);
                    black_box(report.pivots);
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_polish, bench_embed);
criterion_main!(benches);
