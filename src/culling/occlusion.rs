//! Occlusion oracle seam
//!
//! The hierarchical-Z implementation lives with the renderer. Culling only
//! needs a yes/no answer per bounding box.

use crate::core::types::Mat4;
use crate::math::Aabb;

/// Answers whether a box could still be visible behind already drawn geometry.
///
/// Implementations may return false positives but never false negatives.
pub trait OcclusionOracle {
    fn test_visible(&self, aabb: &Aabb, view: &Mat4, view_proj: &Mat4) -> bool;
}

impl<F> OcclusionOracle for F
where
    F: Fn(&Aabb, &Mat4, &Mat4) -> bool,
{
    fn test_visible(&self, aabb: &Aabb, view: &Mat4, view_proj: &Mat4) -> bool {
        self(aabb, view, view_proj)
    }
}

/// Oracle that never occludes anything
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysVisible;

impl OcclusionOracle for AlwaysVisible {
    fn test_visible(&self, _aabb: &Aabb, _view: &Mat4, _view_proj: &Mat4) -> bool {
        true
    }
}

/// Hides boxes lying entirely behind a horizontal occluder at `height` when
/// seen from above. Used by the headless driver and tests.
#[derive(Clone, Copy, Debug)]
pub struct HeightFloorOracle {
    pub height: f32,
}

impl OcclusionOracle for HeightFloorOracle {
    fn test_visible(&self, aabb: &Aabb, _view: &Mat4, _view_proj: &Mat4) -> bool {
        aabb.max.z >= self.height
    }
}
