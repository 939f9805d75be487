//! In-memory graph the engine lays out.
//!
//! Nodes live in an arena (`Vec<Node>`) addressed by slot index; ids are external strings
//! resolved through a hash map. The compound hierarchy is stored as id references (a parent
//! id plus an ordered set of child ids) so it can never own a cycle.

mod model;

pub use model::{GraphModel, ReconcileReport};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn from_center(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x: x - width / 2.0,
            min_y: y - height / 2.0,
            max_x: x + width / 2.0,
            max_y: y + height / 2.0,
        }
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn inflate(self, by: f64) -> Rect {
        Rect {
            min_x: self.min_x - by,
            min_y: self.min_y - by,
            max_x: self.max_x + by,
            max_y: self.max_y + by,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// `true` if `other` lies inside `self`, allowing `eps` of floating-point slack.
    pub fn contains_rect(&self, other: &Rect, eps: f64) -> bool {
        other.min_x >= self.min_x - eps
            && other.min_y >= self.min_y - eps
            && other.max_x <= self.max_x + eps
            && other.max_y <= self.max_y + eps
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub mass: f64,
    pub width: f64,
    pub height: f64,
    /// Pinned by the collaborator.
    pub pinned: bool,
    /// Held by an in-progress drag.
    pub dragging: bool,
    /// Synthetic node standing in for an n-ary relationship.
    pub hypernode: bool,

    // ForceAtlas2 adaptive-speed bookkeeping.
    pub previous_force: (f64, f64),
    pub swinging: f64,
    pub traction: f64,

    pub(crate) parent: Option<String>,
    pub(crate) children: IndexSet<String>,
    // Slot of `parent`, refreshed whenever the arena is reindexed.
    pub(crate) parent_slot: Option<usize>,
    // Size the node has while it is a leaf; compounds derive theirs from their children.
    pub(crate) leaf_width: f64,
    pub(crate) leaf_height: f64,
}

impl Node {
    pub(crate) fn new(id: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            mass: 1.0,
            width,
            height,
            pinned: false,
            dragging: false,
            hypernode: false,
            previous_force: (0.0, 0.0),
            swinging: 0.0,
            traction: 0.0,
            parent: None,
            children: IndexSet::new(),
            parent_slot: None,
            leaf_width: width,
            leaf_height: height,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn radius(&self) -> f64 {
        self.width.max(self.height) / 2.0
    }

    /// Excluded from physics (pinned or being dragged).
    pub fn is_fixed(&self) -> bool {
        self.pinned || self.dragging
    }

    pub fn is_compound(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_center(self.x, self.y, self.width, self.height)
    }

    pub(crate) fn reset_motion(&mut self) {
        self.vx = 0.0;
        self.vy = 0.0;
        self.previous_force = (0.0, 0.0);
        self.swinging = 0.0;
        self.traction = 0.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub(crate) id: String,
    pub source: String,
    pub target: String,
    pub strength: f64,
    /// Added by the spectral unification step; never outlives a Draft run.
    pub synthetic: bool,
}

impl Edge {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A spring between two leaf slots, compound endpoints already mapped to representatives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub a: usize,
    pub b: usize,
    pub strength: f64,
}

/// Node description pushed by the collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: String,
    pub mass: Option<f64>,
    /// `(width, height)`; the model default applies when absent.
    pub fixed_size: Option<(f64, f64)>,
    pub parent_id: Option<String>,
    pub hypernode: bool,
    pub pinned: bool,
    /// Initial position. Only honoured when the node is created.
    pub position: Option<Point>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.fixed_size = Some((width, height));
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    pub fn hypernode(mut self) -> Self {
        self.hypernode = true;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// Edge description pushed by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_strength() -> f64 {
    1.0
}

impl EdgeSpec {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            strength: default_strength(),
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }
}

/// One node of a [`PositionSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub fixed: bool,
}

/// Immutable read model handed to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Increases by one with every publication.
    pub generation: u64,
    pub nodes: Vec<NodePosition>,
}

impl PositionSnapshot {
    pub fn get(&self, id: &str) -> Option<&NodePosition> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_union_and_containment() {
        let a = Rect::from_center(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_center(20.0, 0.0, 10.0, 4.0);
        let u = a.union(b);
        assert_eq!(u.width(), 30.0);
        assert_eq!(u.height(), 10.0);
        assert!(u.contains_rect(&a, 0.0));
        assert!(u.contains_rect(&b, 0.0));
        assert!(!a.contains_rect(&u, 0.0));
        assert_eq!(u.center(), Point::new(10.0, 0.0));
    }

    #[test]
    fn fixed_is_pinned_or_dragging() {
        let mut n = Node::new("a", 0.0, 0.0, 20.0, 10.0);
        assert!(!n.is_fixed());
        n.dragging = true;
        assert!(n.is_fixed());
        n.dragging = false;
        n.pinned = true;
        assert!(n.is_fixed());
        assert_eq!(n.radius(), 10.0);
    }

    #[test]
    fn node_spec_reads_camel_case_json() {
        let spec: NodeSpec = serde_json::from_str(
            r#"{ "id": "a", "parentId": "g", "fixedSize": [30, 10], "hypernode": true }"#,
        )
        .unwrap();
        assert_eq!(
            spec,
            NodeSpec::new("a")
                .with_parent("g")
                .with_size(30.0, 10.0)
                .hypernode()
        );
        let edge: EdgeSpec =
            serde_json::from_str(r#"{ "id": "e", "sourceId": "a", "targetId": "b" }"#).unwrap();
        assert_eq!(edge.strength, 1.0);
    }
}
