//! Hierarchical culling: BVH, occlusion seam, two-stage traversal

pub mod bvh;
pub mod occlusion;
pub mod spatial;

pub use bvh::{Bvh, LeafId};
pub use occlusion::{AlwaysVisible, HeightFloorOracle, OcclusionOracle};
pub use spatial::{CullResult, CullStage, CullStats, SpatialCulling};
