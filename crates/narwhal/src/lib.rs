//! Interactive compound graph layout.
//!
//! `narwhal` keeps a mutable graph (nodes, edges, a compound hierarchy) and lays it out with a
//! pipeline of phases: a seeded scatter, a pivot MDS draft, a pluggable coordinate transform,
//! constraint enforcement and a Barnes-Hut force polish. [`LayoutEngine`] runs the pipeline on
//! a background worker and publishes immutable position snapshots; [`layout`] runs it once on
//! the calling thread.
#![forbid(unsafe_code)]

pub mod algo;
pub mod engine;
pub mod error;
pub mod graph;
pub mod options;
pub mod physics;
pub mod pipeline;
pub(crate) mod rng;
pub mod spatial;

pub use algo::{
    Constraint, ConstraintKind, ConstraintParams, ConstraintSpec, CoordinateTransform,
    EmbedReport, EnforceReport, SpectralEmbedder,
};
pub use engine::LayoutEngine;
pub use error::{Error, Result};
pub use graph::{
    Edge, EdgeSpec, GraphModel, Node, NodePosition, NodeSpec, Point, PositionSnapshot, Rect,
    ReconcileReport,
};
pub use options::{EngineConfig, ModelSettings, PhysicsOptions, SpectralOptions};
pub use physics::{DirectSolver, ForceSimulator, ForceSolver, TickStats};
pub use pipeline::{LayoutPipeline, Phase, PhaseReport, PipelineState, PolishMode};

/// Headless layout entry point: builds a graph, runs every phase once and returns the final
/// positions.
pub fn layout(
    nodes: &[NodeSpec],
    edges: &[EdgeSpec],
    constraints: &[Constraint],
    config: EngineConfig,
) -> PositionSnapshot {
    let mut graph = GraphModel::seeded(config.model, config.random_seed);
    graph.reconcile(nodes, edges);
    let mut pipeline = LayoutPipeline::new(config);
    pipeline.run_full(&mut graph, constraints);
    graph.snapshot(1)
}
