//! Alignment and relative-placement constraints, enforced in position space.
//!
//! Enforcement moves nodes the least it can: alignment snaps the group onto a shared
//! coordinate, relative placement splits the missing separation between the pair. Compound
//! nodes are moved together with their subtree, and fixed nodes never move.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::graph::GraphModel;

/// Corrections smaller than this are treated as already satisfied.
const EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Listed nodes share one x coordinate.
    AlignVertical(Vec<String>),
    /// Listed nodes share one y coordinate.
    AlignHorizontal(Vec<String>),
    /// `x(left) + gap <= x(right)`.
    RelativeLeftRight {
        left: String,
        right: String,
        gap: f64,
    },
    /// `y(top) + gap <= y(bottom)`.
    RelativeTopBottom {
        top: String,
        bottom: String,
        gap: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    AlignVertical,
    AlignHorizontal,
    RelativeLeftRight,
    RelativeTopBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintParams {
    pub gap: f64,
}

/// Wire form of a [`Constraint`]: `{ "type": "alignVertical", "nodeIds": [..], "params": { "gap": 0 } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSpec {
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub params: ConstraintParams,
}

impl ConstraintSpec {
    /// Relative constraints read the first two ids; they resolve to `None` with fewer.
    pub fn into_constraint(self) -> Option<Constraint> {
        let gap = self.params.gap;
        match self.kind {
            ConstraintKind::AlignVertical => Some(Constraint::AlignVertical(self.node_ids)),
            ConstraintKind::AlignHorizontal => Some(Constraint::AlignHorizontal(self.node_ids)),
            ConstraintKind::RelativeLeftRight => {
                let mut ids = self.node_ids.into_iter();
                Some(Constraint::RelativeLeftRight {
                    left: ids.next()?,
                    right: ids.next()?,
                    gap,
                })
            }
            ConstraintKind::RelativeTopBottom => {
                let mut ids = self.node_ids.into_iter();
                Some(Constraint::RelativeTopBottom {
                    top: ids.next()?,
                    bottom: ids.next()?,
                    gap,
                })
            }
        }
    }
}

impl From<&Constraint> for ConstraintSpec {
    fn from(c: &Constraint) -> Self {
        let (kind, node_ids, gap) = match c {
            Constraint::AlignVertical(ids) => (ConstraintKind::AlignVertical, ids.clone(), 0.0),
            Constraint::AlignHorizontal(ids) => {
                (ConstraintKind::AlignHorizontal, ids.clone(), 0.0)
            }
            Constraint::RelativeLeftRight { left, right, gap } => (
                ConstraintKind::RelativeLeftRight,
                vec![left.clone(), right.clone()],
                *gap,
            ),
            Constraint::RelativeTopBottom { top, bottom, gap } => (
                ConstraintKind::RelativeTopBottom,
                vec![top.clone(), bottom.clone()],
                *gap,
            ),
        };
        Self {
            kind,
            node_ids,
            params: ConstraintParams { gap },
        }
    }
}

impl Constraint {
    /// Every node id the constraint refers to.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        let ids: Vec<&str> = match self {
            Self::AlignVertical(ids) | Self::AlignHorizontal(ids) => {
                ids.iter().map(String::as_str).collect()
            }
            Self::RelativeLeftRight { left, right, .. } => vec![left.as_str(), right.as_str()],
            Self::RelativeTopBottom { top, bottom, .. } => vec![top.as_str(), bottom.as_str()],
        };
        ids.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnforceReport {
    /// Passes run, including the final one that found nothing to fix.
    pub passes: usize,
    /// Node (or subtree) moves applied.
    pub corrections: usize,
    /// References to ids that are not in the graph, counted once per pass.
    pub unknown_ids: usize,
    /// `false` when the pass budget ran out with corrections still pending, or when a
    /// constraint between two fixed nodes cannot be met.
    pub converged: bool,
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Moves nodes until every constraint holds or `max_passes` is exhausted, then recomputes
/// compound bounds.
pub fn enforce(
    graph: &mut GraphModel,
    constraints: &[Constraint],
    max_passes: usize,
) -> EnforceReport {
    let mut report = EnforceReport::default();
    if constraints.is_empty() || graph.is_empty() {
        report.converged = true;
        return report;
    }

    for _ in 0..max_passes.max(1) {
        report.passes += 1;
        let mut pass = Pass::default();
        for c in constraints {
            match c {
                Constraint::AlignVertical(ids) => align(graph, ids, Axis::X, &mut pass),
                Constraint::AlignHorizontal(ids) => align(graph, ids, Axis::Y, &mut pass),
                Constraint::RelativeLeftRight { left, right, gap } => {
                    separate(graph, left, right, *gap, Axis::X, &mut pass)
                }
                Constraint::RelativeTopBottom { top, bottom, gap } => {
                    separate(graph, top, bottom, *gap, Axis::Y, &mut pass)
                }
            }
        }
        graph.update_all_bounds();
        report.corrections += pass.corrections;
        report.unknown_ids = pass.unknown_ids;
        if pass.corrections == 0 {
            report.converged = !pass.blocked;
            break;
        }
    }
    report
}

#[derive(Default)]
struct Pass {
    corrections: usize,
    unknown_ids: usize,
    blocked: bool,
}

fn coord(graph: &GraphModel, slot: usize, axis: Axis) -> f64 {
    let n = &graph.nodes()[slot];
    match axis {
        Axis::X => n.x,
        Axis::Y => n.y,
    }
}

// Fixed descendants stay where they are.
fn shift(graph: &mut GraphModel, slot: usize, by: f64, axis: Axis) {
    let (dx, dy) = match axis {
        Axis::X => (by, 0.0),
        Axis::Y => (0.0, by),
    };
    for s in graph.subtree_slots(slot) {
        let n = &mut graph.nodes_mut()[s];
        if !n.is_fixed() {
            n.x += dx;
            n.y += dy;
        }
    }
}

fn align(graph: &mut GraphModel, ids: &[String], axis: Axis, pass: &mut Pass) {
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut members: Vec<usize> = Vec::with_capacity(ids.len());
    for id in ids {
        match graph.index_of(id) {
            Some(slot) => {
                if seen.insert(slot) {
                    members.push(slot);
                }
            }
            None => pass.unknown_ids += 1,
        }
    }
    if members.len() < 2 {
        return;
    }

    let fixed: Vec<usize> = members
        .iter()
        .copied()
        .filter(|&s| graph.nodes()[s].is_fixed())
        .collect();
    let anchors = if fixed.is_empty() { &members } else { &fixed };
    let target =
        anchors.iter().map(|&s| coord(graph, s, axis)).sum::<f64>() / anchors.len() as f64;

    if fixed.len() > 1
        && fixed
            .iter()
            .any(|&s| (coord(graph, s, axis) - target).abs() > EPS)
    {
        pass.blocked = true;
    }

    for &slot in &members {
        if graph.nodes()[slot].is_fixed() {
            continue;
        }
        let delta = target - coord(graph, slot, axis);
        if delta.abs() > EPS {
            shift(graph, slot, delta, axis);
            pass.corrections += 1;
        }
    }
}

fn separate(
    graph: &mut GraphModel,
    first: &str,
    second: &str,
    gap: f64,
    axis: Axis,
    pass: &mut Pass,
) {
    let (a, b) = match (graph.index_of(first), graph.index_of(second)) {
        (Some(a), Some(b)) => (a, b),
        (a, b) => {
            pass.unknown_ids += usize::from(a.is_none()) + usize::from(b.is_none());
            return;
        }
    };
    if a == b {
        return;
    }
    let gap = if gap.is_finite() { gap.max(0.0) } else { 0.0 };
    let deficit = coord(graph, a, axis) + gap - coord(graph, b, axis);
    if deficit <= EPS {
        return;
    }

    let (fixed_a, fixed_b) = (graph.nodes()[a].is_fixed(), graph.nodes()[b].is_fixed());
    match (fixed_a, fixed_b) {
        (true, true) => {
            pass.blocked = true;
            return;
        }
        (true, false) => shift(graph, b, deficit, axis),
        (false, true) => shift(graph, a, -deficit, axis),
        (false, false) => {
            shift(graph, a, -deficit / 2.0, axis);
            shift(graph, b, deficit / 2.0, axis);
        }
    }
    pass.corrections += 1;
}
