//! Spatial acceleration structures for the force simulation.

mod quadtree;

pub use quadtree::{Body, EPSILON, QuadTree, pair_force};
