//! Coordinate transforms applied by the Transform phase.
//!
//! A transform reorients the free part of the layout around its centroid. Fixed nodes keep
//! their coordinates, and compound bounds are rebuilt from the moved leaves afterwards.

use serde::{Deserialize, Serialize};

use crate::graph::GraphModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoordinateTransform {
    #[default]
    Identity,
    /// Mirror across the vertical axis through the centroid.
    FlipHorizontal,
    /// Mirror across the horizontal axis through the centroid.
    FlipVertical,
    /// Swap the x and y offsets.
    Transpose,
    /// Quarter turn, counter-clockwise in a y-up frame.
    Rotate90,
}

impl CoordinateTransform {
    pub fn is_identity(self) -> bool {
        self == Self::Identity
    }

    /// Maps an offset from the centroid.
    pub fn map(self, dx: f64, dy: f64) -> (f64, f64) {
        match self {
            Self::Identity => (dx, dy),
            Self::FlipHorizontal => (-dx, dy),
            Self::FlipVertical => (dx, -dy),
            Self::Transpose => (dy, dx),
            Self::Rotate90 => (-dy, dx),
        }
    }

    /// Applies the transform to every free leaf. Returns how many nodes moved.
    pub fn apply(self, graph: &mut GraphModel) -> usize {
        if self.is_identity() {
            return 0;
        }
        let free: Vec<usize> = graph
            .leaf_slots()
            .into_iter()
            .filter(|&i| !graph.nodes()[i].is_fixed())
            .collect();
        let Some(center) = graph.centroid_of(&free) else {
            return 0;
        };

        let nodes = graph.nodes_mut();
        for &i in &free {
            let n = &mut nodes[i];
            let (dx, dy) = self.map(n.x - center.x, n.y - center.y);
            n.x = center.x + dx;
            n.y = center.y + dy;
            n.reset_motion();
        }
        graph.update_all_bounds();
        free.len()
    }
}
