//! Engine configuration.
//!
//! Every option struct is plain data with serde support so collaborators can persist or ship
//! settings as JSON. Unknown fields are rejected; missing fields fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::algo::CoordinateTransform;
use crate::error::Result;

/// Force simulation parameters. Hot-swappable: a new value takes effect on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PhysicsOptions {
    /// Pull toward the origin, proportional to distance and mass.
    pub gravity: f64,
    /// Inverse-distance repulsion between every pair of leaf nodes.
    pub repulsion: f64,
    /// Spring stiffness applied to `(distance - ideal_length)`.
    pub spring: f64,
    /// Velocity retention per tick, in `(0, 1]`.
    pub damping: f64,
    /// Extra clearance between node boxes; also scales the ideal spring length.
    pub min_distance: f64,
    /// Barnes-Hut opening angle. Smaller is more accurate and slower; `0` is exact.
    pub barnes_hut_theta: f64,
    /// ForceAtlas2 swing tolerance. Higher values let the layout move faster.
    pub tolerance: f64,
    /// Short-range push applied while two nodes are closer than their radii plus
    /// `min_distance`.
    pub collision: f64,
    /// Spring multiplier for edges touching a hypernode.
    pub hypernode_spring_multiplier: f64,
    /// Pull of compound children toward their parent's center.
    pub compound_gravity: f64,
}

impl Default for PhysicsOptions {
    fn default() -> Self {
        Self {
            gravity: 0.005,
            repulsion: 20.0,
            spring: 0.1,
            damping: 0.8,
            min_distance: 10.0,
            barnes_hut_theta: 0.8,
            tolerance: 1.0,
            collision: 0.5,
            hypernode_spring_multiplier: 2.0,
            compound_gravity: 0.02,
        }
    }
}

impl PhysicsOptions {
    /// Rest length of a spring between two nodes of the given radii.
    pub fn ideal_length(&self, radius_a: f64, radius_b: f64) -> f64 {
        radius_a + radius_b + self.min_distance * 5.0
    }
}

/// Parameters of the one-shot pivot MDS layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SpectralOptions {
    /// Graphs up to this many leaves use every node as a pivot; larger graphs use
    /// `max(min_pivots, sqrt(n))`.
    pub min_pivots: usize,
    /// Hard cap on the pivot count, bounding BFS work on very large graphs.
    pub max_pivots: usize,
    /// Power iteration count per eigenvector.
    pub power_iterations: usize,
    /// Stop early once the Rayleigh quotient changes by less than this (relative). `None`
    /// always runs the full `power_iterations`.
    pub eigen_tolerance: Option<f64>,
    /// Jitter amplitude as a fraction of the mean edge length.
    pub jitter: f64,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self {
            min_pivots: 50,
            max_pivots: 250,
            power_iterations: 100,
            eigen_tolerance: Some(1e-10),
            jitter: 0.01,
        }
    }
}

/// Graph model settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ModelSettings {
    /// Width and height of nodes synced without an explicit size.
    pub default_node_size: f64,
    /// Margin between a compound node's box and the union of its children.
    pub compound_padding: f64,
    /// Radius of the jitter disc new nodes are dropped into.
    pub spawn_jitter: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            default_node_size: 20.0,
            compound_padding: 10.0,
            spawn_jitter: 10.0,
        }
    }
}

/// Pipeline and worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EngineConfig {
    pub physics: PhysicsOptions,
    pub spectral: SpectralOptions,
    pub model: ModelSettings,
    /// Integration step per tick.
    pub dt: f64,
    /// Ticks run by a one-shot Polish phase.
    pub polish_ticks: usize,
    /// Ticks run after a drag is released.
    pub release_ticks: usize,
    /// Initial tolerance multiplier of a release burst; decays linearly to 1.
    pub release_energy: f64,
    /// Upper bound on enforce passes per call.
    pub max_enforce_passes: usize,
    /// Snapshot publication rate while the layout is changing.
    pub snapshot_hz: f64,
    /// Upper bound on polish ticks per second on the engine worker. Zero or less runs
    /// unpaced.
    pub max_tick_hz: f64,
    /// Seeds the spawn jitter of new nodes, the Randomize phase and the spectral draft.
    pub random_seed: u64,
    pub transform: CoordinateTransform,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsOptions::default(),
            spectral: SpectralOptions::default(),
            model: ModelSettings::default(),
            dt: 1.0,
            polish_ticks: 300,
            release_ticks: 60,
            release_energy: 3.0,
            max_enforce_passes: 16,
            snapshot_hz: 30.0,
            max_tick_hz: 120.0,
            random_seed: 1,
            transform: CoordinateTransform::Identity,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub(crate) fn snapshot_interval(&self) -> std::time::Duration {
        let hz = if self.snapshot_hz.is_finite() && self.snapshot_hz > 0.0 {
            self.snapshot_hz
        } else {
            30.0
        };
        std::time::Duration::from_secs_f64(1.0 / hz)
    }

    pub(crate) fn tick_budget(&self) -> Option<std::time::Duration> {
        (self.max_tick_hz.is_finite() && self.max_tick_hz > 0.0)
            .then(|| std::time::Duration::from_secs_f64(1.0 / self.max_tick_hz))
    }
}
