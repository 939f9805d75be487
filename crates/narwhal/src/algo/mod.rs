pub mod constraints;
pub mod spectral;
pub mod transform;

pub use constraints::{
    Constraint, ConstraintKind, ConstraintParams, ConstraintSpec, EnforceReport, enforce,
};
pub use spectral::{EmbedReport, SpectralEmbedder};
pub use transform::CoordinateTransform;
