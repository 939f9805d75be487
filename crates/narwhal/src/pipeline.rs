//! Layout phases and the state machine that sequences them.
//!
//! A full run is Randomize → Draft → Transform → Enforce → Polish. Every phase is a one-shot
//! call except continuous polishing, which the caller drives tick by tick through
//! [`LayoutPipeline::step`] until it is stopped.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::algo::{Constraint, CoordinateTransform, EmbedReport, EnforceReport, SpectralEmbedder};
use crate::graph::{GraphModel, Spring};
use crate::options::{EngineConfig, PhysicsOptions};
use crate::physics::{ForceSimulator, ForceSolver, TickStats};
use crate::rng::XorShift64Star;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Scatter free leaves uniformly around the current centroid.
    Randomize,
    /// Spectral (pivot MDS) placement.
    Draft,
    /// Apply the configured [`CoordinateTransform`].
    Transform,
    /// Enforce constraints.
    Enforce,
    /// A fixed number of physics ticks followed by Enforce.
    Polish,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Randomize,
        Phase::Draft,
        Phase::Transform,
        Phase::Enforce,
        Phase::Polish,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolishMode {
    /// Ticks until stopped.
    Continuous,
    /// Ticks left in a bounded burst.
    Burst { remaining: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Running(Phase),
    Polishing(PolishMode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub ticks: usize,
    /// Nodes the phase moved (for Polish, summed over ticks).
    pub moved: usize,
    pub displacement: f64,
    pub embed: Option<EmbedReport>,
    pub enforce: Option<EnforceReport>,
    pub elapsed: Duration,
}

impl PhaseReport {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            ticks: 0,
            moved: 0,
            displacement: 0.0,
            embed: None,
            enforce: None,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ramp {
    remaining: usize,
    total: usize,
}

pub struct LayoutPipeline {
    config: EngineConfig,
    solver: Box<dyn ForceSolver>,
    embedder: SpectralEmbedder,
    rng: XorShift64Star,
    state: PipelineState,
    continuous: bool,
    ramp: Option<Ramp>,
    springs: Vec<Spring>,
    springs_version: Option<u64>,
}

impl fmt::Debug for LayoutPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutPipeline")
            .field("state", &self.state)
            .field("continuous", &self.continuous)
            .field("ramp", &self.ramp)
            .finish_non_exhaustive()
    }
}

impl LayoutPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_solver(config, Box::new(ForceSimulator::new()))
    }

    pub fn with_solver(config: EngineConfig, solver: Box<dyn ForceSolver>) -> Self {
        Self {
            embedder: SpectralEmbedder::new(config.spectral, config.random_seed),
            rng: XorShift64Star::new(config.random_seed ^ 0x9E37_79B9_7F4A_7C15),
            config,
            solver,
            state: PipelineState::Idle,
            continuous: false,
            ramp: None,
            springs: Vec::new(),
            springs_version: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Takes effect on the next tick.
    pub fn set_physics_options(&mut self, physics: PhysicsOptions) {
        self.config.physics = physics;
    }

    pub fn set_transform(&mut self, transform: CoordinateTransform) {
        self.config.transform = transform;
    }

    pub fn run_phase(
        &mut self,
        graph: &mut GraphModel,
        constraints: &[Constraint],
        phase: Phase,
    ) -> PhaseReport {
        let started = Instant::now();
        let resume = self.state;
        self.state = PipelineState::Running(phase);

        let mut report = PhaseReport::new(phase);
        match phase {
            Phase::Randomize => report.moved = self.randomize(graph),
            Phase::Draft => {
                let embed = self.embedder.embed(graph, &self.config.physics);
                report.moved = embed.leaves;
                report.embed = Some(embed);
            }
            Phase::Transform => report.moved = self.config.transform.apply(graph),
            Phase::Enforce => report.enforce = Some(self.enforce(graph, constraints)),
            Phase::Polish => {
                let physics = self.config.physics;
                for _ in 0..self.config.polish_ticks {
                    let stats = self.tick(graph, &physics);
                    report.ticks += 1;
                    report.moved += stats.moved;
                    report.displacement += stats.total_displacement;
                }
                report.enforce = Some(self.enforce(graph, constraints));
            }
        }

        report.elapsed = started.elapsed();
        self.state = match resume {
            PipelineState::Running(_) => PipelineState::Idle,
            other => other,
        };
        debug!(
            ?phase,
            moved = report.moved,
            ticks = report.ticks,
            elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
            "layout phase finished"
        );
        report
    }

    pub fn run_chain(
        &mut self,
        graph: &mut GraphModel,
        constraints: &[Constraint],
        phases: &[Phase],
    ) -> Vec<PhaseReport> {
        phases
            .iter()
            .map(|&phase| self.run_phase(graph, constraints, phase))
            .collect()
    }

    /// Runs every phase in order.
    pub fn run_full(
        &mut self,
        graph: &mut GraphModel,
        constraints: &[Constraint],
    ) -> Vec<PhaseReport> {
        self.run_chain(graph, constraints, &Phase::ALL)
    }

    /// Enforces `constraints` outside any phase, leaving the state untouched.
    pub fn enforce_now(
        &mut self,
        graph: &mut GraphModel,
        constraints: &[Constraint],
    ) -> EnforceReport {
        self.enforce(graph, constraints)
    }

    pub fn start_polishing(&mut self) {
        self.continuous = true;
        self.state = PipelineState::Polishing(PolishMode::Continuous);
    }

    /// Stops continuous polishing and any release burst.
    pub fn stop_polishing(&mut self) {
        self.continuous = false;
        self.ramp = None;
        self.state = PipelineState::Idle;
    }

    pub fn is_polishing(&self) -> bool {
        matches!(self.state, PipelineState::Polishing(_))
    }

    /// Starts a bounded burst after a drag release: `release_ticks` ticks whose tolerance starts
    /// at `release_energy` times the configured one and decays linearly back to it. While
    /// continuous polishing is on only the energy ramp is applied.
    pub fn release_burst(&mut self) {
        let total = self.config.release_ticks;
        if total == 0 {
            return;
        }
        self.ramp = Some(Ramp {
            remaining: total,
            total,
        });
        if !self.continuous {
            self.state = PipelineState::Polishing(PolishMode::Burst { remaining: total });
        }
    }

    /// One polish tick, followed by constraint enforcement and a bounds refresh. Returns `None`
    /// when not polishing.
    pub fn step(
        &mut self,
        graph: &mut GraphModel,
        constraints: &[Constraint],
    ) -> Option<TickStats> {
        if !self.is_polishing() {
            return None;
        }

        let mut physics = self.config.physics;
        if let Some(ramp) = self.ramp {
            physics.tolerance *= self.energy(ramp);
        }
        let stats = self.tick(graph, &physics);
        self.enforce(graph, constraints);
        trace!(
            moved = stats.moved,
            displacement = stats.total_displacement,
            speed = stats.global_speed,
            "polish tick"
        );

        if let Some(ramp) = self.ramp.as_mut() {
            ramp.remaining = ramp.remaining.saturating_sub(1);
            let remaining = ramp.remaining;
            if remaining == 0 {
                self.ramp = None;
            }
            if !self.continuous {
                self.state = if remaining == 0 {
                    PipelineState::Idle
                } else {
                    PipelineState::Polishing(PolishMode::Burst { remaining })
                };
            }
        }
        Some(stats)
    }

    fn energy(&self, ramp: Ramp) -> f64 {
        let extra = (self.config.release_energy - 1.0).max(0.0);
        1.0 + extra * ramp.remaining as f64 / ramp.total.max(1) as f64
    }

    fn tick(&mut self, graph: &mut GraphModel, physics: &PhysicsOptions) -> TickStats {
        if self.springs_version != Some(graph.topology_version()) {
            self.springs = graph.springs();
            self.springs_version = Some(graph.topology_version());
        }
        let stats = self
            .solver
            .tick(graph.nodes_mut(), &self.springs, physics, self.config.dt);
        graph.update_all_bounds();
        stats
    }

    fn enforce(&mut self, graph: &mut GraphModel, constraints: &[Constraint]) -> EnforceReport {
        crate::algo::enforce(graph, constraints, self.config.max_enforce_passes)
    }

    fn randomize(&mut self, graph: &mut GraphModel) -> usize {
        let free: Vec<usize> = graph
            .leaf_slots()
            .into_iter()
            .filter(|&i| !graph.nodes()[i].is_fixed())
            .collect();
        let Some(center) = graph.centroid_of(&free) else {
            return 0;
        };
        let r = graph.settings().default_node_size / 2.0;
        let half = self.config.physics.ideal_length(r, r) * (free.len() as f64).sqrt() / 2.0;

        let nodes = graph.nodes_mut();
        for &i in &free {
            let n = &mut nodes[i];
            n.x = center.x + self.rng.next_f64_signed() * half;
            n.y = center.y + self.rng.next_f64_signed() * half;
            n.reset_motion();
        }
        graph.update_all_bounds();
        free.len()
    }
}
