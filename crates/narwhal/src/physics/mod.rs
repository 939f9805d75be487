//! ForceAtlas2-style force simulation.
//!
//! A tick accumulates gravity, repulsion, springs and compound gravity on every free leaf,
//! derives a global speed from how much the forces swing between ticks, and integrates with
//! damped Euler steps. Compound nodes are never simulated; their boxes follow their children.
//!
//! Solvers only differ in how repulsion is computed: [`ForceSimulator`] uses a Barnes-Hut
//! quadtree, [`DirectSolver`] sums every pair.

mod barnes_hut;
mod direct;

pub use barnes_hut::ForceSimulator;
pub use direct::DirectSolver;

use crate::graph::{Node, Spring};
use crate::options::PhysicsOptions;
use crate::spatial::{Body, EPSILON};

const MIN_GLOBAL_SPEED: f64 = 0.01;
const MAX_GLOBAL_SPEED: f64 = 10.0;
const RESTING_GLOBAL_SPEED: f64 = 0.1;

/// Advances node positions by one simulation step.
pub trait ForceSolver: Send {
    fn tick(
        &mut self,
        nodes: &mut [Node],
        springs: &[Spring],
        options: &PhysicsOptions,
        dt: f64,
    ) -> TickStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickStats {
    /// Free leaves integrated this tick.
    pub moved: usize,
    /// Sum of position changes over all moved nodes.
    pub total_displacement: f64,
    pub global_speed: f64,
}

impl TickStats {
    pub fn mean_displacement(&self) -> f64 {
        if self.moved == 0 {
            0.0
        } else {
            self.total_displacement / self.moved as f64
        }
    }
}

pub(crate) fn body_of(node: &Node) -> Body {
    Body {
        x: node.x,
        y: node.y,
        mass: node.mass,
        radius: node.radius(),
    }
}

/// Shared tick body. `bodies[k]` is the node slot of body `k` and `repulsion(k)` returns the
/// repulsive force on it.
pub(crate) fn integrate(
    nodes: &mut [Node],
    springs: &[Spring],
    options: &PhysicsOptions,
    dt: f64,
    bodies: &[usize],
    mut repulsion: impl FnMut(usize) -> (f64, f64),
) -> TickStats {
    let mut forces = vec![(0.0_f64, 0.0_f64); nodes.len()];

    for (k, &i) in bodies.iter().enumerate() {
        let n = &nodes[i];
        if n.is_fixed() {
            continue;
        }
        let (rx, ry) = repulsion(k);
        let f = &mut forces[i];
        f.0 += rx - n.x * options.gravity * n.mass;
        f.1 += ry - n.y * options.gravity * n.mass;

        if let Some(p) = n.parent_slot {
            let parent = &nodes[p];
            f.0 += (parent.x - n.x) * options.compound_gravity * n.mass;
            f.1 += (parent.y - n.y) * options.compound_gravity * n.mass;
        }
    }

    for s in springs {
        let (a, b) = (&nodes[s.a], &nodes[s.b]);
        if a.is_fixed() || b.is_fixed() {
            continue;
        }
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let d = dx.hypot(dy);
        if d < EPSILON {
            continue;
        }
        let mut k = options.spring * s.strength;
        if a.hypernode || b.hypernode {
            k *= options.hypernode_spring_multiplier;
        }
        let mag = (d - options.ideal_length(a.radius(), b.radius())) * k;
        let (fx, fy) = (dx / d * mag, dy / d * mag);
        forces[s.a].0 += fx;
        forces[s.a].1 += fy;
        forces[s.b].0 -= fx;
        forces[s.b].1 -= fy;
    }

    let mut global_swinging = 0.0;
    let mut global_traction = 0.0;
    for &i in bodies {
        let n = &mut nodes[i];
        if n.is_fixed() {
            continue;
        }
        let (fx, fy) = forces[i];
        let (px, py) = n.previous_force;
        n.swinging = (fx - px).hypot(fy - py);
        n.traction = (fx + px).hypot(fy + py) / 2.0;
        global_swinging += n.mass * n.swinging;
        global_traction += n.mass * n.traction;
    }
    let global_speed = if global_swinging > 0.0 {
        (options.tolerance * global_traction / global_swinging)
            .clamp(MIN_GLOBAL_SPEED, MAX_GLOBAL_SPEED)
    } else {
        RESTING_GLOBAL_SPEED
    };

    let mut stats = TickStats {
        global_speed,
        ..TickStats::default()
    };
    for &i in bodies {
        let n = &mut nodes[i];
        if n.is_fixed() {
            n.vx = 0.0;
            n.vy = 0.0;
            n.previous_force = (0.0, 0.0);
            continue;
        }
        let (fx, fy) = forces[i];
        let local_speed = global_speed / (1.0 + global_speed * n.swinging.sqrt());
        n.vx = (n.vx + fx / n.mass * dt) * options.damping;
        n.vy = (n.vy + fy / n.mass * dt) * options.damping;
        let step_x = n.vx * dt * local_speed;
        let step_y = n.vy * dt * local_speed;
        n.x += step_x;
        n.y += step_y;
        n.previous_force = (fx, fy);
        stats.moved += 1;
        stats.total_displacement += step_x.hypot(step_y);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphModel, NodeSpec};

    #[test]
    fn fixed_nodes_do_not_move_and_lose_velocity() {
        let mut g = GraphModel::new();
        g.reconcile(
            &[NodeSpec::new("a").at(0.0, 0.0).pinned(), NodeSpec::new("b").at(5.0, 0.0)],
            &[],
        );
        g.nodes_mut()[0].vx = 3.0;
        let mut sim = ForceSimulator::new();
        let stats = sim.tick(g.nodes_mut(), &[], &PhysicsOptions::default(), 1.0);
        let a = g.node("a").unwrap();
        assert_eq!((a.x, a.y, a.vx), (0.0, 0.0, 0.0));
        assert_eq!(stats.moved, 1);
        assert!(g.node("b").unwrap().x > 5.0);
    }

    #[test]
    fn resting_layout_uses_the_fallback_speed() {
        let mut g = GraphModel::new();
        g.reconcile(&[NodeSpec::new("a").at(0.0, 0.0)], &[]);
        let mut sim = DirectSolver::new();
        let stats = sim.tick(g.nodes_mut(), &[], &PhysicsOptions::default(), 1.0);
        assert_eq!(stats.global_speed, RESTING_GLOBAL_SPEED);
        assert_eq!(stats.total_displacement, 0.0);
    }
}
