use super::{ForceSolver, TickStats, body_of, integrate};
use crate::graph::{Node, Spring};
use crate::options::PhysicsOptions;
use crate::spatial::QuadTree;

/// Default solver: repulsion through a quadtree rebuilt every tick.
#[derive(Debug, Clone, Default)]
pub struct ForceSimulator {
    tree: QuadTree,
    bodies: Vec<usize>,
}

impl ForceSimulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ForceSolver for ForceSimulator {
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
        self.tree.build(self.bodies.iter().map(|&i| body_of(&nodes[i])));

        let tree = &self.tree;
        let theta = options.barnes_hut_theta;
        integrate(nodes, springs, options, dt, &self.bodies, |k| {
            tree.apply_repulsion(k, options, theta)
        })
    }
}
