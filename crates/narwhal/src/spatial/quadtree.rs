//! Barnes-Hut quadtree over point bodies.
//!
//! Cells and body chains live in flat `Vec`s addressed by `u32` handles. `build` clears the
//! vectors without freeing them, so rebuilding the tree every tick does not allocate once the
//! arena has grown to the working-set size.

use crate::options::PhysicsOptions;

/// Distances below this are clamped when computing pair forces.
pub const EPSILON: f64 = 0.01;

/// Cells at this depth never subdivide; further bodies are chained in the leaf.
const MAX_DEPTH: u16 = 24;
/// Cells whose half-width falls below this never subdivide.
const MIN_HALF_WIDTH: f64 = 1e-3;
/// Margin added around the bounding square of the bodies.
const ROOT_MARGIN: f64 = 1.0;

const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub x: f64,
    pub y: f64,
    pub mass: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    cx: f64,
    cy: f64,
    half: f64,
    depth: u16,
    mass: f64,
    com_x: f64,
    com_y: f64,
    count: u32,
    // Head of the body chain while the cell is a leaf.
    head: Option<u32>,
    // NW, NE, SW, SE once subdivided.
    children: Option<[u32; 4]>,
}

impl Cell {
    fn new(cx: f64, cy: f64, half: f64, depth: u16) -> Self {
        Self {
            cx,
            cy,
            half,
            depth,
            mass: 0.0,
            com_x: cx,
            com_y: cy,
            count: 0,
            head: None,
            children: None,
        }
    }

    fn quadrant(&self, x: f64, y: f64) -> usize {
        let east = x >= self.cx;
        let south = y >= self.cy;
        match (south, east) {
            (false, false) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (true, true) => 3,
        }
    }

    fn add_mass(&mut self, b: &Body) {
        let m = self.mass + b.mass;
        if m > 0.0 {
            self.com_x = (self.com_x * self.mass + b.x * b.mass) / m;
            self.com_y = (self.com_y * self.mass + b.y * b.mass) / m;
        } else {
            self.com_x = b.x;
            self.com_y = b.y;
        }
        self.mass = m;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuadTree {
    cells: Vec<Cell>,
    bodies: Vec<Body>,
    // Next body in the same leaf chain.
    next: Vec<Option<u32>>,
}

impl QuadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tree from scratch. Body `i` of the iterator is addressed as `i` afterwards.
    pub fn build(&mut self, bodies: impl IntoIterator<Item = Body>) {
        self.cells.clear();
        self.bodies.clear();
        self.next.clear();
        self.bodies.extend(bodies);
        self.next.resize(self.bodies.len(), None);
        if self.bodies.is_empty() {
            return;
        }

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for b in &self.bodies {
            min_x = min_x.min(b.x);
            min_y = min_y.min(b.y);
            max_x = max_x.max(b.x);
            max_y = max_y.max(b.y);
        }
        let half = ((max_x - min_x).max(max_y - min_y) / 2.0) + ROOT_MARGIN;
        self.cells.push(Cell::new(
            (min_x + max_x) / 2.0,
            (min_y + max_y) / 2.0,
            half,
            0,
        ));

        for i in 0..self.bodies.len() {
            self.insert(i as u32);
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Total mass aggregated at the root.
    pub fn total_mass(&self) -> f64 {
        self.cells.first().map_or(0.0, |c| c.mass)
    }

    /// Mass-weighted center of all bodies.
    pub fn center_of_mass(&self) -> Option<(f64, f64)> {
        self.cells.first().map(|c| (c.com_x, c.com_y))
    }

    fn insert(&mut self, body: u32) {
        let b = self.bodies[body as usize];
        let mut cell = 0usize;
        loop {
            self.cells[cell].add_mass(&b);
            if let Some(children) = self.cells[cell].children {
                cell = children[self.cells[cell].quadrant(b.x, b.y)] as usize;
                continue;
            }

            let Some(head) = self.cells[cell].head else {
                self.cells[cell].head = Some(body);
                return;
            };
            let c = self.cells[cell];
            let h = self.bodies[head as usize];
            let coincident = (h.x - b.x).hypot(h.y - b.y) < EPSILON;
            if coincident || c.depth >= MAX_DEPTH || c.half < MIN_HALF_WIDTH {
                self.next[body as usize] = Some(head);
                self.cells[cell].head = Some(body);
                return;
            }

            let children = self.subdivide(cell);
            // The chain holds coincident bodies only, so it moves into a single quadrant.
            let target = children[c.quadrant(h.x, h.y)] as usize;
            let mut cur = Some(head);
            while let Some(j) = cur {
                let moved = self.bodies[j as usize];
                self.cells[target].add_mass(&moved);
                cur = self.next[j as usize];
            }
            self.cells[target].head = Some(head);
            self.cells[cell].head = None;

            cell = children[c.quadrant(b.x, b.y)] as usize;
        }
    }

    fn subdivide(&mut self, cell: usize) -> [u32; 4] {
        let c = self.cells[cell];
        let q = c.half / 2.0;
        let base = self.cells.len() as u32;
        let offsets = [(-q, -q), (q, -q), (-q, q), (q, q)];
        for (dx, dy) in offsets {
            self.cells.push(Cell::new(c.cx + dx, c.cy + dy, q, c.depth + 1));
        }
        let children = [base, base + 1, base + 2, base + 3];
        self.cells[cell].children = Some(children);
        children
    }

    /// Net repulsive force on body `target` from every other body.
    ///
    /// Leaf cells contribute exact pair forces. An internal cell that does not contain the
    /// target and satisfies `width / distance < theta` contributes one super-body at its center
    /// of mass. `theta == 0` therefore reproduces the direct pairwise sum.
    pub fn apply_repulsion(
        &self,
        target: usize,
        options: &PhysicsOptions,
        theta: f64,
    ) -> (f64, f64) {
        let mut force = (0.0, 0.0);
        if target < self.bodies.len() && !self.cells.is_empty() {
            self.accumulate(0, true, target, options, theta, &mut force);
        }
        force
    }

    fn accumulate(
        &self,
        cell: usize,
        holds_target: bool,
        target: usize,
        options: &PhysicsOptions,
        theta: f64,
        force: &mut (f64, f64),
    ) {
        let c = &self.cells[cell];
        if c.count == 0 {
            return;
        }
        let t = &self.bodies[target];

        let Some(children) = c.children else {
            let mut cur = c.head;
            while let Some(j) = cur {
                let j = j as usize;
                if j != target {
                    let (fx, fy) = pair_force(target, t, j, &self.bodies[j], options);
                    force.0 += fx;
                    force.1 += fy;
                }
                cur = self.next[j];
            }
            return;
        };

        if !holds_target {
            let dx = t.x - c.com_x;
            let dy = t.y - c.com_y;
            let d = dx.hypot(dy);
            if d > EPSILON && (c.half * 2.0) / d < theta {
                let mag = options.repulsion * t.mass * c.mass / d;
                force.0 += dx / d * mag;
                force.1 += dy / d * mag;
                return;
            }
        }

        let target_quadrant = holds_target.then(|| c.quadrant(t.x, t.y));
        for (q, &child) in children.iter().enumerate() {
            let inside = target_quadrant == Some(q);
            self.accumulate(child as usize, inside, target, options, theta, force);
        }
    }
}

/// Force that body `b` exerts on body `a`: inverse-distance repulsion plus a linear push while
/// the two are closer than their radii plus `min_distance`.
///
/// Coincident bodies separate along a direction derived from their indices; the direction is
/// antisymmetric so the pair moves apart instead of together.
pub fn pair_force(
    ai: usize,
    a: &Body,
    bi: usize,
    b: &Body,
    options: &PhysicsOptions,
) -> (f64, f64) {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dist = dx.hypot(dy);
    let (ux, uy, d) = if dist < EPSILON {
        let (lo, hi) = if ai < bi { (ai, bi) } else { (bi, ai) };
        let angle = GOLDEN_ANGLE * ((lo * 31 + hi) % 4096) as f64;
        let sign = if ai < bi { 1.0 } else { -1.0 };
        (angle.cos() * sign, angle.sin() * sign, EPSILON)
    } else {
        (dx / dist, dy / dist, dist)
    };

    let mut mag = options.repulsion * a.mass * b.mass / d;
    let contact = a.radius + b.radius + options.min_distance;
    if d < contact {
        mag += options.collision * (contact - d);
    }
    (ux * mag, uy * mag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f64, y: f64) -> Body {
        Body {
            x,
            y,
            mass: 1.0,
            radius: 1.0,
        }
    }

    #[test]
    fn single_body_feels_nothing() {
        let mut tree = QuadTree::new();
        tree.build([body(3.0, 4.0)]);
        assert_eq!(tree.apply_repulsion(0, &PhysicsOptions::default(), 0.8), (0.0, 0.0));
        assert_eq!(tree.center_of_mass(), Some((3.0, 4.0)));
    }

    #[test]
    fn coincident_bodies_share_a_leaf_and_separate() {
        let mut tree = QuadTree::new();
        tree.build([body(1.0, 1.0), body(1.0, 1.0), body(1.0, 1.0)]);
        assert_eq!(tree.cell_count(), 1);
        let o = PhysicsOptions::default();
        let f0 = tree.apply_repulsion(0, &o, 0.8);
        let f1 = tree.apply_repulsion(1, &o, 0.8);
        assert!(f0.0.is_finite() && f0.1.is_finite());
        assert!(f0.0.hypot(f0.1) > 0.0);
        assert_ne!(f0, f1);
    }

    #[test]
    fn rebuild_reuses_the_arena() {
        let mut tree = QuadTree::new();
        tree.build((0..64).map(|i| body(i as f64 * 7.0, (i % 8) as f64 * 13.0)));
        let cells = tree.cell_count();
        tree.build((0..64).map(|i| body(i as f64 * 7.0, (i % 8) as f64 * 13.0)));
        assert_eq!(tree.cell_count(), cells);
        tree.build(std::iter::empty());
        assert!(tree.is_empty());
        assert_eq!(tree.total_mass(), 0.0);
    }
}
