//! Background layout engine.
//!
//! One worker thread owns the graph, the constraints and the pipeline. Every public call
//! enqueues a command; the worker applies commands between ticks and phases, never inside one.
//! Readers get positions from an immutable snapshot swapped behind a lock, so they never wait
//! on a running phase.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::algo::{Constraint, ConstraintSpec, CoordinateTransform};
use crate::error::{Error, Result};
use crate::graph::{EdgeSpec, GraphModel, NodeSpec, PositionSnapshot};
use crate::options::{EngineConfig, PhysicsOptions};
use crate::pipeline::{LayoutPipeline, Phase, PhaseReport, PipelineState};

const WORKER_NAME: &str = "narwhal-layout";

enum Command {
    SyncGraph {
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    },
    SyncConstraints(Vec<Constraint>),
    SetPhysics(PhysicsOptions),
    SetTransform(CoordinateTransform),
    RunPhase {
        phase: Phase,
        reply: Option<Sender<PhaseReport>>,
    },
    StartPolish,
    StopPolish,
    DragStart(String),
    Drag {
        id: String,
        dx: f64,
        dy: f64,
    },
    DragEnd(String),
    Flush(Sender<()>),
    Shutdown,
}

struct Shared {
    snapshot: RwLock<Arc<PositionSnapshot>>,
    state: Mutex<PipelineState>,
    // Checked before every polish tick; set by the caller thread so a stop takes effect
    // without waiting for the queue.
    polish_cancel: AtomicBool,
    shutdown: AtomicBool,
}

/// Handle to the layout worker. Dropping it shuts the worker down.
pub struct LayoutEngine {
    commands: Sender<Command>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl LayoutEngine {
    pub fn spawn(config: EngineConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            snapshot: RwLock::new(Arc::new(PositionSnapshot::default())),
            state: Mutex::new(PipelineState::Idle),
            polish_cancel: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::channel();

        let worker = Worker::new(config, rx, Arc::clone(&shared));
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(Error::Spawn)?;

        Ok(Self {
            commands: tx,
            shared,
            worker: Some(handle),
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::EngineStopped);
        }
        self.commands
            .send(command)
            .map_err(|_| Error::EngineStopped)
    }

    /// Replaces the node and edge sets (diffed by id on the worker).
    pub fn sync_graph(&self, nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Result<()> {
        self.send(Command::SyncGraph { nodes, edges })
    }

    /// Replaces the constraint set.
    pub fn sync_constraints(&self, constraints: Vec<Constraint>) -> Result<()> {
        self.send(Command::SyncConstraints(constraints))
    }

    /// Like [`sync_constraints`](Self::sync_constraints) for wire records. Relative records with
    /// fewer than two ids are dropped.
    pub fn sync_constraint_specs(&self, specs: Vec<ConstraintSpec>) -> Result<()> {
        let total = specs.len();
        let constraints: Vec<Constraint> = specs
            .into_iter()
            .filter_map(ConstraintSpec::into_constraint)
            .collect();
        if constraints.len() < total {
            warn!(
                dropped = total - constraints.len(),
                "dropping relative constraints with fewer than two node ids"
            );
        }
        self.sync_constraints(constraints)
    }

    pub fn set_physics_options(&self, physics: PhysicsOptions) -> Result<()> {
        self.send(Command::SetPhysics(physics))
    }

    pub fn set_transform(&self, transform: CoordinateTransform) -> Result<()> {
        self.send(Command::SetTransform(transform))
    }

    pub fn start_polish(&self) -> Result<()> {
        self.send(Command::StartPolish)
    }

    /// Stops continuous polishing (and any release burst). Takes effect before the next tick.
    pub fn stop_polish(&self) -> Result<()> {
        self.shared.polish_cancel.store(true, Ordering::Release);
        self.send(Command::StopPolish)
    }

    /// Queues a one-shot phase without waiting for it.
    pub fn run_phase(&self, phase: Phase) -> Result<()> {
        self.send(Command::RunPhase { phase, reply: None })
    }

    /// Runs a one-shot phase after every previously queued command and waits for its report.
    /// The snapshot is republished before this returns.
    pub fn run_phase_and_wait(&self, phase: Phase) -> Result<PhaseReport> {
        let (tx, rx) = mpsc::channel();
        self.send(Command::RunPhase {
            phase,
            reply: Some(tx),
        })?;
        rx.recv().map_err(|_| Error::EngineStopped)
    }

    /// Returns once every previously queued command has been applied and a fresh snapshot
    /// has been published.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.send(Command::Flush(tx))?;
        rx.recv().map_err(|_| Error::EngineStopped)
    }

    /// Marks `id` and its subtree as dragged; physics leaves them alone until the drag ends.
    pub fn on_drag_start(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::DragStart(id.into()))
    }

    pub fn on_drag(&self, id: impl Into<String>, dx: f64, dy: f64) -> Result<()> {
        self.send(Command::Drag {
            id: id.into(),
            dx,
            dy,
        })
    }

    /// Releases the drag and lets the neighbourhood settle with a short energy burst.
    pub fn on_drag_end(&self, id: impl Into<String>) -> Result<()> {
        self.send(Command::DragEnd(id.into()))
    }

    /// Latest published positions.
    pub fn position_snapshot(&self) -> Arc<PositionSnapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && !self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Stops the worker and waits for it. Later calls on this handle fail with
    /// [`Error::EngineStopped`]; calling it again is a no-op.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.polish_cancel.store(true, Ordering::Release);
        // The worker may already be gone; the flag alone stops it then.
        let _ = self.commands.send(Command::Shutdown);
        if handle.join().is_err() {
            warn!("layout worker panicked");
        }
    }
}

impl Drop for LayoutEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    graph: GraphModel,
    constraints: Vec<Constraint>,
    pipeline: LayoutPipeline,
    commands: Receiver<Command>,
    shared: Arc<Shared>,
    interval: Duration,
    tick_budget: Option<Duration>,
    generation: u64,
    dirty: bool,
    last_publish: Instant,
    last_tick: Instant,
}

impl Worker {
    fn new(config: EngineConfig, commands: Receiver<Command>, shared: Arc<Shared>) -> Self {
        Self {
            graph: GraphModel::seeded(config.model, config.random_seed),
            constraints: Vec::new(),
            interval: config.snapshot_interval(),
            tick_budget: config.tick_budget(),
            pipeline: LayoutPipeline::new(config),
            commands,
            shared,
            generation: 0,
            dirty: false,
            last_publish: Instant::now(),
            last_tick: Instant::now(),
        }
    }

    fn run(mut self) {
        debug!("layout worker started");
        loop {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            let ticking = self.pipeline.is_polishing()
                && !self.shared.polish_cancel.load(Ordering::Acquire);
            // While ticking, wait out what is left of the tick budget; commands cut it short.
            let wait = if ticking {
                self.tick_budget
                    .map_or(Duration::ZERO, |b| b.saturating_sub(self.last_tick.elapsed()))
            } else {
                self.interval
            };
            let next = if wait.is_zero() {
                match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };

            if let Some(command) = next {
                if !self.apply(command) {
                    break;
                }
                // Drain the queue before the next tick.
                continue;
            }

            if ticking {
                self.last_tick = Instant::now();
                self.pipeline.step(&mut self.graph, &self.constraints);
                self.dirty = true;
                self.sync_state();
            }
            if self.dirty && self.last_publish.elapsed() >= self.interval {
                self.publish();
            }
        }
        if self.dirty {
            self.publish();
        }
        debug!("layout worker stopped");
    }

    /// Returns `false` on shutdown.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::SyncGraph { nodes, edges } => {
                let report = self.graph.reconcile(&nodes, &edges);
                if !report.is_unchanged() {
                    self.dirty = true;
                }
                self.warn_unknown_constraint_ids();
            }
            Command::SyncConstraints(constraints) => {
                self.constraints = constraints;
                self.warn_unknown_constraint_ids();
                let report = self.pipeline.enforce_now(&mut self.graph, &self.constraints);
                if !report.converged {
                    warn!(passes = report.passes, "constraint set could not be fully satisfied");
                }
                self.publish();
            }
            Command::SetPhysics(physics) => self.pipeline.set_physics_options(physics),
            Command::SetTransform(transform) => self.pipeline.set_transform(transform),
            Command::RunPhase { phase, reply } => {
                *self.shared.state.lock() = PipelineState::Running(phase);
                let report = self
                    .pipeline
                    .run_phase(&mut self.graph, &self.constraints, phase);
                self.sync_state();
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(report);
                }
            }
            Command::StartPolish => {
                self.shared.polish_cancel.store(false, Ordering::Release);
                self.pipeline.start_polishing();
                self.sync_state();
            }
            Command::StopPolish => {
                self.pipeline.stop_polishing();
                self.shared.polish_cancel.store(false, Ordering::Release);
                self.sync_state();
            }
            Command::DragStart(id) => {
                if self.graph.set_dragging(&id, true) {
                    self.dirty = true;
                } else {
                    warn!(id = %id, "drag start on unknown node");
                }
            }
            Command::Drag { id, dx, dy } => {
                let dragging = self.graph.node(&id).is_some_and(|n| n.dragging);
                if dragging && dx.is_finite() && dy.is_finite() {
                    self.graph.translate_subtree(&id, dx, dy);
                    self.graph.update_all_bounds();
                    self.dirty = true;
                }
            }
            Command::DragEnd(id) => {
                if self.graph.set_dragging(&id, false) {
                    self.pipeline.release_burst();
                    self.dirty = true;
                    self.sync_state();
                }
            }
            Command::Flush(reply) => {
                self.publish();
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn warn_unknown_constraint_ids(&self) {
        let unknown = self
            .constraints
            .iter()
            .flat_map(|c| c.node_ids())
            .filter(|id| self.graph.index_of(id).is_none())
            .count();
        if unknown > 0 {
            warn!(unknown, "constraints reference unknown node ids; they are ignored");
        }
    }

    fn sync_state(&self) {
        *self.shared.state.lock() = self.pipeline.state();
    }

    fn publish(&mut self) {
        self.generation += 1;
        let snapshot = Arc::new(self.graph.snapshot(self.generation));
        *self.shared.snapshot.write() = snapshot;
        self.last_publish = Instant::now();
        self.dirty = false;
    }
}
