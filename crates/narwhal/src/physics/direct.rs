use super::{ForceSolver, TickStats, body_of, integrate};
use crate::graph::{Node, Spring};
use crate::options::PhysicsOptions;
use crate::spatial::{Body, pair_force};

/// Reference solver summing repulsion over every pair. O(n²) per tick.
#[derive(Debug, Clone, Default)]
pub struct DirectSolver {
    bodies: Vec<usize>,
    snapshot: Vec<Body>,
}

impl DirectSolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForceSolver for DirectSolver {
    fn tick(
        &mut self,
        nodes: &mut [Node],
        springs: &[Spring],
        options: &PhysicsOptions,
        dt: f64,
    ) -> TickStats {
        self.bodies.clear();
        self.bodies
            .extend((0..nodes.len()).filter(|&i| !nodes[i].is_compound()));
        self.snapshot.clear();
        self.snapshot
            .extend(self.bodies.iter().map(|&i| body_of(&nodes[i])));

        let bodies = &self.snapshot;
        integrate(nodes, springs, options, dt, &self.bodies, |k| {
            let target = &bodies[k];
            bodies
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .fold((0.0, 0.0), |acc, (j, b)| {
                    let (fx, fy) = pair_force(k, target, j, b, options);
                    (acc.0 + fx, acc.1 + fy)
                })
        })
    }
}
