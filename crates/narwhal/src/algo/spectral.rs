//! One-shot global placement by pivot MDS.
//!
//! The graph is made connected with synthetic edges, compounds are collapsed onto their
//! representative leaves, and every leaf is described by its hop distances to a set of
//! far-apart pivots. The two principal components of those distance vectors become x and y.

use std::collections::VecDeque;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::graph::{GraphModel, Point};
use crate::options::{PhysicsOptions, SpectralOptions};
use crate::rng::XorShift64Star;
use crate::spatial::EPSILON;

const SMALL: f64 = 1e-12;
/// Hop distance assigned to unreachable nodes, relative to the pivot's farthest reachable node.
const UNREACHABLE_FACTOR: f64 = 1.5;
const MAX_OVERLAP_PASSES: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmbedReport {
    /// Leaves that received a position.
    pub leaves: usize,
    /// Connected components before unification.
    pub components: usize,
    pub synthetic_edges: usize,
    pub pivots: usize,
    /// Power iterations spent on the first and second eigenvector.
    pub iterations: (usize, usize),
    pub eigenvalues: (f64, f64),
    /// Overlap-removal passes that moved at least one pair.
    pub overlap_passes: usize,
}

#[derive(Debug, Clone)]
pub struct SpectralEmbedder {
    options: SpectralOptions,
    rng: XorShift64Star,
}

impl SpectralEmbedder {
    pub fn new(options: SpectralOptions, random_seed: u64) -> Self {
        Self {
            options,
            rng: XorShift64Star::new(random_seed),
        }
    }

    pub fn options(&self) -> &SpectralOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: SpectralOptions) {
        self.options = options;
    }

    /// Replaces every leaf position with a pivot MDS embedding.
    ///
    /// Mean edge length is scaled to the mean ideal spring length of `physics`. Fixed leaves keep
    /// their coordinates and the embedding is translated to agree with them on average; without
    /// fixed leaves the previous centroid is kept. Synthetic edges never survive the call.
    pub fn embed(&mut self, graph: &mut GraphModel, physics: &PhysicsOptions) -> EmbedReport {
        let started = Instant::now();
        let leaves = graph.leaf_slots();
        let mut report = EmbedReport {
            leaves: leaves.len(),
            ..EmbedReport::default()
        };
        if leaves.len() < 2 {
            graph.remove_synthetic_edges();
            graph.update_all_bounds();
            return report;
        }

        let (components, synthetic) = unify(graph);
        report.components = components;
        report.synthetic_edges = synthetic;

        let reduced = Reduced::from_graph(graph, &leaves);
        let n = reduced.slots.len();
        let k = pivot_count(n, &self.options);
        let (pivots, distances) = pivot_distances(&reduced.adjacency, k);
        report.pivots = pivots.len();

        let (mut coords, pca) = self.principal_coordinates(&distances);
        report.iterations = pca.iterations;
        report.eigenvalues = pca.eigenvalues;

        if coords.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            warn!("spectral embedding produced non-finite coordinates; keeping previous layout");
            graph.remove_synthetic_edges();
            graph.update_all_bounds();
            return report;
        }

        let target = reduced.mean_ideal_length(graph, physics);
        let current = reduced.mean_edge_length(&coords);
        let scale = if current > EPSILON { target / current } else { target };
        let jitter = self.options.jitter * target;
        for p in &mut coords {
            p.x = p.x * scale + self.rng.next_f64_signed() * jitter;
            p.y = p.y * scale + self.rng.next_f64_signed() * jitter;
        }

        place(graph, &reduced.slots, &coords);
        report.overlap_passes = remove_overlaps(graph, &reduced.slots);

        graph.remove_synthetic_edges();
        graph.update_all_bounds();

        debug!(
            leaves = n,
            pivots = report.pivots,
            components,
            synthetic,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "spectral embedding finished"
        );
        report
    }

    fn principal_coordinates(&mut self, distances: &DMatrix<f64>) -> (Vec<Point>, PcaStats) {
        let (k, n) = distances.shape();
        let mut centered = distances.clone();
        for i in 0..k {
            let mean = (0..n).map(|j| centered[(i, j)]).sum::<f64>() / n as f64;
            for j in 0..n {
                centered[(i, j)] -= mean;
            }
        }
        let cov = (&centered * centered.transpose()) / n as f64;

        let start = DVector::<f64>::from_fn(k, |_, _| self.rng.next_f64_signed());
        let (v1, lambda1, it1) = dominant_eigenpair(&cov, start, None, &self.options);

        let deflated = &cov - (&v1 * v1.transpose()) * lambda1;
        let start = DVector::<f64>::from_fn(k, |_, _| self.rng.next_f64_signed());
        let (v2, lambda2, it2) = dominant_eigenpair(&deflated, start, Some(&v1), &self.options);

        let xs = centered.transpose() * &v1;
        let ys = centered.transpose() * &v2;
        let coords = (0..n).map(|j| Point::new(xs[j], ys[j])).collect();
        (
            coords,
            PcaStats {
                iterations: (it1, it2),
                eigenvalues: (lambda1, lambda2),
            },
        )
    }
}

struct PcaStats {
    iterations: (usize, usize),
    eigenvalues: (f64, f64),
}

/// Leaf-only view of the graph: compound endpoints remapped to representatives, self edges
/// dropped, parallel edges merged.
struct Reduced {
    slots: Vec<usize>,
    edges: Vec<(usize, usize)>,
    adjacency: Vec<Vec<usize>>,
}

impl Reduced {
    fn from_graph(graph: &GraphModel, leaves: &[usize]) -> Self {
        let mut local = vec![usize::MAX; graph.len()];
        for (k, &slot) in leaves.iter().enumerate() {
            local[slot] = k;
        }
        let mut edges: Vec<(usize, usize)> = graph
            .edges()
            .iter()
            .filter_map(|e| {
                let a = local[graph.representative_slot(graph.index_of(&e.source)?)];
                let b = local[graph.representative_slot(graph.index_of(&e.target)?)];
                (a != b && a != usize::MAX && b != usize::MAX).then(|| (a.min(b), a.max(b)))
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let mut adjacency = vec![Vec::new(); leaves.len()];
        for &(a, b) in &edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        Self {
            slots: leaves.to_vec(),
            edges,
            adjacency,
        }
    }

    fn mean_edge_length(&self, coords: &[Point]) -> f64 {
        if self.edges.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .edges
            .iter()
            .map(|&(a, b)| coords[a].distance(coords[b]))
            .sum();
        total / self.edges.len() as f64
    }

    fn mean_ideal_length(&self, graph: &GraphModel, physics: &PhysicsOptions) -> f64 {
        let nodes = graph.nodes();
        if self.edges.is_empty() {
            let r = graph.settings().default_node_size / 2.0;
            return physics.ideal_length(r, r);
        }
        let total: f64 = self
            .edges
            .iter()
            .map(|&(a, b)| {
                physics.ideal_length(
                    nodes[self.slots[a]].radius(),
                    nodes[self.slots[b]].radius(),
                )
            })
            .sum();
        total / self.edges.len() as f64
    }
}

/// Joins every component to the largest one with a synthetic edge between the components'
/// highest-degree nodes. Returns `(components, synthetic edges added)`.
fn unify(graph: &mut GraphModel) -> (usize, usize) {
    let components = connected_components(graph);
    if components.len() <= 1 {
        return (components.len(), 0);
    }

    // Ties go to the lowest slot; components are discovered in slot order.
    let hub = |comp: &[usize]| {
        comp.iter()
            .copied()
            .max_by(|&a, &b| graph.degree(a).cmp(&graph.degree(b)).then(b.cmp(&a)))
            .unwrap_or(comp[0])
    };
    let hubs: Vec<usize> = components.iter().map(|c| hub(c.as_slice())).collect();
    let largest = components
        .iter()
        .enumerate()
        .max_by(|(i, a), (j, b)| a.len().cmp(&b.len()).then(j.cmp(i)))
        .map_or(0, |(i, _)| i);

    let mut added = 0;
    for (ci, &h) in hubs.iter().enumerate() {
        if ci != largest {
            graph.add_synthetic_edge(h, hubs[largest]);
            added += 1;
        }
    }
    (components.len(), added)
}

fn connected_components(graph: &GraphModel) -> Vec<Vec<usize>> {
    let n = graph.len();
    let mut visited = vec![false; n];
    let mut out: Vec<Vec<usize>> = Vec::new();
    let mut q: VecDeque<usize> = VecDeque::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        q.push_back(start);
        let mut comp: Vec<usize> = Vec::new();

        while let Some(v) = q.pop_front() {
            comp.push(v);
            for &u in graph.neighbors(v) {
                if !visited[u] {
                    visited[u] = true;
                    q.push_back(u);
                }
            }
        }

        comp.sort_unstable();
        out.push(comp);
    }

    out
}

fn pivot_count(n: usize, options: &SpectralOptions) -> usize {
    let k = if n <= options.min_pivots {
        n
    } else {
        options.min_pivots.max((n as f64).sqrt().ceil() as usize)
    };
    k.min(options.max_pivots).max(2).min(n)
}

fn bfs_hops(adjacency: &[Vec<usize>], source: usize) -> Vec<Option<u32>> {
    let mut dist: Vec<Option<u32>> = vec![None; adjacency.len()];
    let mut q: VecDeque<usize> = VecDeque::new();
    dist[source] = Some(0);
    q.push_back(source);
    while let Some(v) = q.pop_front() {
        let next = dist[v].map_or(0, |d| d.saturating_add(1));
        for &u in &adjacency[v] {
            if dist[u].is_none() {
                dist[u] = Some(next);
                q.push_back(u);
            }
        }
    }
    dist
}

/// MaxMin pivot selection. Row `i` of the returned matrix holds the hop distances from pivot
/// `i` to every node.
fn pivot_distances(adjacency: &[Vec<usize>], k: usize) -> (Vec<usize>, DMatrix<f64>) {
    let n = adjacency.len();
    let mut distances = DMatrix::<f64>::zeros(k, n);
    let mut min_dist = vec![f64::INFINITY; n];
    let mut pivots = Vec::with_capacity(k);

    let mut pivot = (0..n)
        .max_by(|&a, &b| adjacency[a].len().cmp(&adjacency[b].len()).then(b.cmp(&a)))
        .unwrap_or(0);
    for row in 0..k {
        pivots.push(pivot);
        let hops = bfs_hops(adjacency, pivot);
        let local_max = hops.iter().flatten().copied().max().unwrap_or(0) as f64;
        let unreachable = UNREACHABLE_FACTOR * local_max.max(1.0);

        let mut farthest = pivot;
        let mut best = f64::NEG_INFINITY;
        for j in 0..n {
            let d = hops[j].map_or(unreachable, f64::from);
            distances[(row, j)] = d;
            if d < min_dist[j] {
                min_dist[j] = d;
            }
            if min_dist[j] > best {
                best = min_dist[j];
                farthest = j;
            }
        }
        pivot = farthest;
    }
    (pivots, distances)
}

/// Power iteration for the dominant eigenpair of the symmetric matrix `m`, optionally kept
/// orthogonal to `against`. Runs `power_iterations` steps unless the Rayleigh quotient settles
/// within `eigen_tolerance` first.
fn dominant_eigenpair(
    m: &DMatrix<f64>,
    mut v: DVector<f64>,
    against: Option<&DVector<f64>>,
    options: &SpectralOptions,
) -> (DVector<f64>, f64, usize) {
    orthogonalize(&mut v, against);
    normalize_in_place(&mut v);

    let mut lambda = 0.0;
    let mut iterations = 0;
    for _ in 0..options.power_iterations.max(1) {
        iterations += 1;
        let mut w = m * &v;
        orthogonalize(&mut w, against);
        let next_lambda = v.dot(&w);
        let norm = w.norm();
        if !(norm.is_finite() && norm > SMALL) {
            lambda = next_lambda;
            break;
        }
        w /= norm;
        v = w;

        let settled = options
            .eigen_tolerance
            .is_some_and(|tol| (next_lambda - lambda).abs() <= tol * next_lambda.abs().max(SMALL));
        lambda = next_lambda;
        if settled {
            break;
        }
    }
    (v, lambda, iterations)
}

fn orthogonalize(v: &mut DVector<f64>, against: Option<&DVector<f64>>) {
    if let Some(u) = against {
        let proj = u.dot(v);
        *v -= u * proj;
    }
}

fn normalize_in_place(v: &mut DVector<f64>) {
    let norm = v.norm();
    if norm.is_finite() && norm > 0.0 {
        *v /= norm;
    }
}

fn place(graph: &mut GraphModel, slots: &[usize], coords: &[Point]) {
    let nodes = graph.nodes();
    let fixed: Vec<usize> = (0..slots.len())
        .filter(|&k| nodes[slots[k]].is_fixed())
        .collect();

    let (dx, dy) = if fixed.is_empty() {
        let before = graph.centroid_of(slots).unwrap_or_default();
        let n = coords.len() as f64;
        let (sx, sy) = coords.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        (before.x - sx / n, before.y - sy / n)
    } else {
        let m = fixed.len() as f64;
        let (sx, sy) = fixed.iter().fold((0.0, 0.0), |(sx, sy), &k| {
            let n = &nodes[slots[k]];
            (sx + n.x - coords[k].x, sy + n.y - coords[k].y)
        });
        (sx / m, sy / m)
    };

    let nodes = graph.nodes_mut();
    for (k, &slot) in slots.iter().enumerate() {
        let n = &mut nodes[slot];
        if n.is_fixed() {
            continue;
        }
        n.x = coords[k].x + dx;
        n.y = coords[k].y + dy;
        n.reset_motion();
    }
}

/// Pushes overlapping leaves apart along the line between their centers (a deterministic
/// direction when they coincide). Fixed leaves never move. Returns the passes that moved
/// something.
fn remove_overlaps(graph: &mut GraphModel, slots: &[usize]) -> usize {
    let max_diameter = slots
        .iter()
        .map(|&s| graph.nodes()[s].radius() * 2.0)
        .fold(0.0, f64::max);
    let nodes = graph.nodes_mut();
    let mut order: Vec<usize> = slots.to_vec();
    let mut passes = 0;

    for _ in 0..MAX_OVERLAP_PASSES {
        order.sort_by(|&a, &b| nodes[a].x.total_cmp(&nodes[b].x));
        let mut moved = false;
        for i in 0..order.len() {
            for j in (i + 1)..order.len() {
                let (a, b) = (order[i], order[j]);
                if nodes[b].x - nodes[a].x >= max_diameter {
                    break;
                }
                let (na, nb) = (&nodes[a], &nodes[b]);
                if na.is_fixed() && nb.is_fixed() {
                    continue;
                }
                let min_sep = na.radius() + nb.radius();
                let dx = nb.x - na.x;
                let dy = nb.y - na.y;
                let d = dx.hypot(dy);
                if d >= min_sep - 1e-9 {
                    continue;
                }
                let (ux, uy) = if d < EPSILON {
                    let angle = (a.min(b) * 31 + a.max(b)) as f64;
                    (angle.cos(), angle.sin())
                } else {
                    (dx / d, dy / d)
                };
                let push = min_sep - d;
                let (share_a, share_b) = match (na.is_fixed(), nb.is_fixed()) {
                    (true, _) => (0.0, push),
                    (_, true) => (push, 0.0),
                    _ => (push / 2.0, push / 2.0),
                };
                nodes[a].x -= ux * share_a;
                nodes[a].y -= uy * share_a;
                nodes[b].x += ux * share_b;
                nodes[b].y += uy * share_b;
                moved = true;
            }
        }
        if !moved {
            break;
        }
        passes += 1;
    }
    passes
}
