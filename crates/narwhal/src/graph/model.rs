use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::{Edge, EdgeSpec, Node, NodePosition, NodeSpec, Point, PositionSnapshot, Rect, Spring};
use crate::options::ModelSettings;
use crate::rng::XorShift64Star;

const SYNTHETIC_EDGE_PREFIX: &str = "__narwhal_unify_";

/// What a [`GraphModel::reconcile`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_updated: usize,
    pub edges_removed: usize,
    /// Self-loops and edges whose endpoints are not in the node set.
    pub edges_skipped: usize,
    /// Parent assignments refused because they named an unknown node or formed a cycle.
    pub parents_rejected: usize,
}

impl ReconcileReport {
    /// `true` when the model is structurally unchanged.
    pub fn is_unchanged(&self) -> bool {
        self.nodes_added == 0
            && self.nodes_updated == 0
            && self.nodes_removed == 0
            && self.edges_added == 0
            && self.edges_updated == 0
            && self.edges_removed == 0
    }
}

/// Mutable graph owned by the layout worker.
#[derive(Debug, Clone)]
pub struct GraphModel {
    nodes: Vec<Node>,
    node_index: FxHashMap<String, usize>,
    edges: Vec<Edge>,
    edge_index: FxHashMap<String, usize>,
    // Undirected, deduplicated neighbour slots per node (self-loops excluded).
    adjacency: Vec<Vec<usize>>,
    settings: ModelSettings,
    rng: XorShift64Star,
    synthetic_seq: u64,
    // Bumped whenever slots, edges or the hierarchy change.
    topology_version: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        Self::with_settings(ModelSettings::default())
    }

    pub fn with_settings(settings: ModelSettings) -> Self {
        Self::seeded(settings, 1)
    }

    /// `seed` drives the spawn jitter of nodes synced without a position.
    pub fn seeded(settings: ModelSettings, seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            node_index: FxHashMap::default(),
            edges: Vec::new(),
            edge_index: FxHashMap::default(),
            adjacency: Vec::new(),
            settings,
            rng: XorShift64Star::new(seed),
            synthetic_seq: 0,
            topology_version: 0,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.node_index.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).map(|idx| &self.nodes[idx])
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index.get(id).map(|&idx| &self.edges[idx])
    }

    pub fn neighbors(&self, idx: usize) -> &[usize] {
        self.adjacency.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, idx: usize) -> usize {
        self.neighbors(idx).len()
    }

    /// Changes whenever slot indices, edges or the hierarchy may have changed, so cached
    /// [`Spring`] lists can be invalidated.
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// Diffs the model against the full node and edge lists by id.
    ///
    /// Existing nodes keep their position and velocity; new nodes are dropped at their
    /// explicit position or jittered around their parent (or the origin). The hierarchy and
    /// adjacency are rebuilt from scratch and compound bounds recomputed. Calling it twice
    /// with the same input changes nothing the second time.
    pub fn reconcile(&mut self, nodes: &[NodeSpec], edges: &[EdgeSpec]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let mut wanted: FxHashMap<&str, &NodeSpec> = FxHashMap::default();
        let mut order: Vec<&str> = Vec::with_capacity(nodes.len());
        for spec in nodes {
            if wanted.insert(spec.id.as_str(), spec).is_some() {
                warn!(id = %spec.id, "duplicate node id in sync; keeping the last description");
            } else {
                order.push(spec.id.as_str());
            }
        }

        let before = self.nodes.len();
        self.nodes.retain(|n| wanted.contains_key(n.id.as_str()));
        report.nodes_removed = before - self.nodes.len();
        self.reindex_nodes();

        let default_size = self.settings.default_node_size;
        for id in &order {
            let spec = wanted[id];
            let (width, height) = sanitize_size(spec.fixed_size, default_size);
            let mass = match spec.mass {
                Some(m) if m.is_finite() && m > 0.0 => m,
                Some(m) => {
                    warn!(id = %spec.id, mass = m, "ignoring non-positive node mass");
                    1.0
                }
                None => 1.0,
            };

            if let Some(idx) = self.index_of(id) {
                let node = &mut self.nodes[idx];
                let changed = node.mass != mass
                    || node.leaf_width != width
                    || node.leaf_height != height
                    || node.hypernode != spec.hypernode
                    || node.pinned != spec.pinned
                    || node.parent.as_deref() != spec.parent_id.as_deref();
                node.mass = mass;
                node.leaf_width = width;
                node.leaf_height = height;
                node.hypernode = spec.hypernode;
                if spec.pinned && !node.pinned {
                    node.reset_motion();
                }
                node.pinned = spec.pinned;
                if changed {
                    report.nodes_updated += 1;
                }
                continue;
            }

            let explicit = match spec.position {
                Some(p) if p.x.is_finite() && p.y.is_finite() => Some(p),
                Some(p) => {
                    warn!(id = %spec.id, x = p.x, y = p.y, "ignoring non-finite node position");
                    None
                }
                None => None,
            };
            let Point { x, y } = match explicit {
                Some(p) => p,
                None => {
                    let around = spec
                        .parent_id
                        .as_deref()
                        .and_then(|p| self.index_of(p))
                        .map(|p| self.nodes[p].position())
                        .unwrap_or_default();
                    let jitter = self.settings.spawn_jitter;
                    Point::new(
                        around.x + self.rng.next_f64_signed() * jitter,
                        around.y + self.rng.next_f64_signed() * jitter,
                    )
                }
            };
            let mut node = Node::new(spec.id.clone(), x, y, width, height);
            node.mass = mass;
            node.hypernode = spec.hypernode;
            node.pinned = spec.pinned;
            self.node_index.insert(spec.id.clone(), self.nodes.len());
            self.nodes.push(node);
            report.nodes_added += 1;
        }

        for node in &mut self.nodes {
            node.parent = None;
            node.parent_slot = None;
            node.children.clear();
        }
        for id in &order {
            let spec = wanted[id];
            if let Some(parent) = spec.parent_id.as_deref() {
                if !self.attach(&spec.id, parent) {
                    report.parents_rejected += 1;
                }
            }
        }
        for node in &mut self.nodes {
            if node.children.is_empty() {
                node.width = node.leaf_width;
                node.height = node.leaf_height;
            }
        }

        let mut wanted_edges: FxHashMap<&str, &EdgeSpec> = FxHashMap::default();
        let mut edge_order: Vec<&str> = Vec::with_capacity(edges.len());
        for spec in edges {
            if wanted_edges.insert(spec.id.as_str(), spec).is_some() {
                warn!(id = %spec.id, "duplicate edge id in sync; keeping the last description");
            } else {
                edge_order.push(spec.id.as_str());
            }
        }

        let before = self.edges.len();
        let node_index = &self.node_index;
        self.edges.retain(|e| {
            !e.synthetic
                && wanted_edges
                    .get(e.id.as_str())
                    .is_some_and(|spec| edge_is_valid(spec, node_index))
        });
        report.edges_removed = before - self.edges.len();
        self.reindex_edges();

        for id in &edge_order {
            let spec = wanted_edges[id];
            if !edge_is_valid(spec, &self.node_index) {
                warn!(
                    id = %spec.id,
                    source = %spec.source_id,
                    target = %spec.target_id,
                    "skipping self-loop or edge with unknown endpoint"
                );
                report.edges_skipped += 1;
                continue;
            }
            let strength = if spec.strength.is_finite() {
                spec.strength.max(0.0)
            } else {
                1.0
            };
            if let Some(&idx) = self.edge_index.get(spec.id.as_str()) {
                let edge = &mut self.edges[idx];
                if edge.source != spec.source_id
                    || edge.target != spec.target_id
                    || edge.strength != strength
                {
                    edge.source.clone_from(&spec.source_id);
                    edge.target.clone_from(&spec.target_id);
                    edge.strength = strength;
                    report.edges_updated += 1;
                }
                continue;
            }
            self.edge_index.insert(spec.id.clone(), self.edges.len());
            self.edges.push(Edge {
                id: spec.id.clone(),
                source: spec.source_id.clone(),
                target: spec.target_id.clone(),
                strength,
                synthetic: false,
            });
            report.edges_added += 1;
        }

        self.rebuild_adjacency();
        self.update_all_bounds();
        self.topology_version += 1;

        debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            ?report,
            "graph reconciled"
        );
        report
    }

    /// Moves `child` under `parent` (or to the root when `None`).
    ///
    /// Returns `false` and leaves the hierarchy untouched for unknown ids, self-parenting, and
    /// assignments that would make `child` its own ancestor.
    pub fn set_parent(&mut self, child: &str, parent: Option<&str>) -> bool {
        let Some(ci) = self.index_of(child) else {
            warn!(child, "set_parent on unknown node");
            return false;
        };
        let old_root = self.nodes[ci].parent_slot.map(|p| self.root_of(p));
        let ok = match parent {
            Some(parent) => self.attach(child, parent),
            None => {
                self.detach(ci);
                true
            }
        };
        if ok {
            self.topology_version += 1;
            if let Some(root) = old_root {
                self.update_bounds_slot(root);
            }
            if let Some(p) = self.nodes[ci].parent_slot {
                let root = self.root_of(p);
                self.update_bounds_slot(root);
            }
        }
        ok
    }

    /// `true` if `ancestor` lies on the parent chain of `idx` (a node is not its own ancestor).
    pub fn is_ancestor(&self, ancestor: usize, idx: usize) -> bool {
        let mut cur = self.nodes.get(idx).and_then(|n| n.parent_slot);
        // The forest invariant bounds the walk; the counter guards against a corrupted chain.
        for _ in 0..self.nodes.len() {
            match cur {
                Some(p) if p == ancestor => return true,
                Some(p) => cur = self.nodes[p].parent_slot,
                None => return false,
            }
        }
        false
    }

    fn attach(&mut self, child: &str, parent: &str) -> bool {
        let (Some(ci), Some(pi)) = (self.index_of(child), self.index_of(parent)) else {
            warn!(child, parent, "rejecting parent assignment with unknown node");
            return false;
        };
        if ci == pi {
            warn!(child, "rejecting self-parenting");
            return false;
        }
        if self.is_ancestor(ci, pi) {
            warn!(child, parent, "rejecting parent assignment that would create a cycle");
            return false;
        }
        self.detach(ci);
        self.nodes[ci].parent = Some(parent.to_string());
        self.nodes[ci].parent_slot = Some(pi);
        self.nodes[pi].children.insert(child.to_string());
        true
    }

    fn detach(&mut self, ci: usize) {
        let old = self.nodes[ci].parent_slot.take();
        self.nodes[ci].parent = None;
        if let Some(oi) = old {
            let id = self.nodes[ci].id.clone();
            let parent = &mut self.nodes[oi];
            parent.children.shift_remove(&id);
            if parent.children.is_empty() {
                parent.width = parent.leaf_width;
                parent.height = parent.leaf_height;
            }
        }
    }

    fn root_of(&self, mut idx: usize) -> usize {
        for _ in 0..self.nodes.len() {
            match self.nodes[idx].parent_slot {
                Some(p) => idx = p,
                None => break,
            }
        }
        idx
    }

    pub(crate) fn child_slots(&self, idx: usize) -> Vec<usize> {
        self.nodes[idx]
            .children
            .iter()
            .filter_map(|c| self.node_index.get(c).copied())
            .collect()
    }

    /// Recomputes the center and size of compound `id` (and its compound descendants) from
    /// the union of the children's boxes plus `compound_padding`. Returns the new box.
    pub fn update_bounds_from_children(&mut self, id: &str) -> Option<Rect> {
        let idx = self.index_of(id)?;
        Some(self.update_bounds_slot(idx))
    }

    pub(crate) fn update_bounds_slot(&mut self, idx: usize) -> Rect {
        let children = self.child_slots(idx);
        let mut union: Option<Rect> = None;
        for c in children {
            let r = self.update_bounds_slot(c);
            union = Some(match union {
                Some(u) => u.union(r),
                None => r,
            });
        }
        let Some(union) = union else {
            return self.nodes[idx].rect();
        };
        let rect = union.inflate(self.settings.compound_padding);
        let center = rect.center();
        let node = &mut self.nodes[idx];
        node.x = center.x;
        node.y = center.y;
        node.width = rect.width();
        node.height = rect.height();
        rect
    }

    /// Refreshes the bounds of every compound, bottom-up from each root.
    pub fn update_all_bounds(&mut self) {
        for idx in 0..self.nodes.len() {
            if self.nodes[idx].parent_slot.is_none() && self.nodes[idx].is_compound() {
                self.update_bounds_slot(idx);
            }
        }
    }

    /// First leaf reached by repeatedly descending into the first child.
    pub fn representative(&self, id: &str) -> Option<&str> {
        let idx = self.index_of(id)?;
        Some(self.nodes[self.representative_slot(idx)].id())
    }

    pub(crate) fn representative_slot(&self, mut idx: usize) -> usize {
        for _ in 0..self.nodes.len() {
            let first = self.nodes[idx]
                .children
                .first()
                .and_then(|c| self.node_index.get(c));
            match first {
                Some(&c) => idx = c,
                None => break,
            }
        }
        idx
    }

    /// `idx` followed by all of its descendants, depth-first.
    pub(crate) fn subtree_slots(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            let mut children = self.child_slots(cur);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Moves `id` and every descendant by `(dx, dy)`.
    pub fn translate_subtree(&mut self, id: &str, dx: f64, dy: f64) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        self.translate_subtree_slot(idx, dx, dy);
        true
    }

    pub(crate) fn translate_subtree_slot(&mut self, idx: usize, dx: f64, dy: f64) {
        for slot in self.subtree_slots(idx) {
            let node = &mut self.nodes[slot];
            node.x += dx;
            node.y += dy;
        }
    }

    /// Sets or clears the drag flag on `id` and its whole subtree.
    pub fn set_dragging(&mut self, id: &str, dragging: bool) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        for slot in self.subtree_slots(idx) {
            let node = &mut self.nodes[slot];
            node.dragging = dragging;
            node.reset_motion();
        }
        true
    }

    pub fn leaf_slots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| !self.nodes[i].is_compound())
            .collect()
    }

    /// Edges as leaf slot pairs; compound endpoints are replaced by their representative and
    /// edges that collapse onto a single leaf are dropped.
    pub fn springs(&self) -> Vec<Spring> {
        self.edges
            .iter()
            .filter_map(|e| {
                let a = self.representative_slot(self.index_of(&e.source)?);
                let b = self.representative_slot(self.index_of(&e.target)?);
                (a != b).then_some(Spring {
                    a,
                    b,
                    strength: e.strength,
                })
            })
            .collect()
    }

    /// Adds an unstrengthed edge between two slots, marked synthetic. Returns its id.
    pub fn add_synthetic_edge(&mut self, a: usize, b: usize) -> String {
        self.synthetic_seq += 1;
        let id = format!("{SYNTHETIC_EDGE_PREFIX}{}", self.synthetic_seq);
        self.edge_index.insert(id.clone(), self.edges.len());
        self.edges.push(Edge {
            id: id.clone(),
            source: self.nodes[a].id.clone(),
            target: self.nodes[b].id.clone(),
            strength: 1.0,
            synthetic: true,
        });
        if a != b {
            if !self.adjacency[a].contains(&b) {
                self.adjacency[a].push(b);
            }
            if !self.adjacency[b].contains(&a) {
                self.adjacency[b].push(a);
            }
        }
        self.topology_version += 1;
        id
    }

    /// Drops every synthetic edge. Returns how many were removed.
    pub fn remove_synthetic_edges(&mut self) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| !e.synthetic);
        let removed = before - self.edges.len();
        if removed > 0 {
            self.reindex_edges();
            self.rebuild_adjacency();
            self.topology_version += 1;
        }
        removed
    }

    /// Mean position of the given slots.
    pub(crate) fn centroid_of(&self, slots: &[usize]) -> Option<Point> {
        if slots.is_empty() {
            return None;
        }
        let (sx, sy) = slots.iter().fold((0.0, 0.0), |(sx, sy), &i| {
            (sx + self.nodes[i].x, sy + self.nodes[i].y)
        });
        let n = slots.len() as f64;
        Some(Point::new(sx / n, sy / n))
    }

    /// Union of all node boxes.
    pub fn bounds(&self) -> Option<Rect> {
        self.nodes.iter().map(Node::rect).reduce(Rect::union)
    }

    pub fn snapshot(&self, generation: u64) -> PositionSnapshot {
        PositionSnapshot {
            generation,
            nodes: self
                .nodes
                .iter()
                .map(|n| NodePosition {
                    id: n.id.clone(),
                    x: n.x,
                    y: n.y,
                    width: n.width,
                    height: n.height,
                    fixed: n.is_fixed(),
                })
                .collect(),
        }
    }

    fn reindex_nodes(&mut self) {
        self.node_index.clear();
        for (i, n) in self.nodes.iter().enumerate() {
            self.node_index.insert(n.id.clone(), i);
        }
    }

    fn reindex_edges(&mut self) {
        self.edge_index.clear();
        for (i, e) in self.edges.iter().enumerate() {
            self.edge_index.insert(e.id.clone(), i);
        }
    }

    fn rebuild_adjacency(&mut self) {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for e in &self.edges {
            let (Some(a), Some(b)) = (self.index_of(&e.source), self.index_of(&e.target)) else {
                continue;
            };
            if a == b {
                continue;
            }
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }
        self.adjacency = adjacency;
    }
}

fn edge_is_valid(spec: &EdgeSpec, node_index: &FxHashMap<String, usize>) -> bool {
    spec.source_id != spec.target_id
        && node_index.contains_key(spec.source_id.as_str())
        && node_index.contains_key(spec.target_id.as_str())
}

fn sanitize_size(size: Option<(f64, f64)>, default: f64) -> (f64, f64) {
    match size {
        Some((w, h)) if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0 => (w, h),
        _ => (default, default),
    }
}
