//! View frustum and general convex volumes for culling

use crate::core::types::{Vec3, Mat4};
use super::aabb::Aabb;
use super::obb::Obb;
use super::plane::Plane;

/// View frustum with 6 inward-facing planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from view-projection matrix (Gribb/Hartmann).
    ///
    /// Assumes glam's `[0, 1]` clip depth, so the near plane is row 2 alone.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let near = Plane::from_vec4(rows[2]);
        let far = Plane::from_vec4(rows[3] - rows[2]);
        let left = Plane::from_vec4(rows[3] + rows[0]);
        let right = Plane::from_vec4(rows[3] - rows[0]);
        let top = Plane::from_vec4(rows[3] - rows[1]);
        let bottom = Plane::from_vec4(rows[3] + rows[1]);

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(point) >= 0.0)
    }

    /// Conservative overlap test
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.visible(&self.planes)
    }

    /// Whole box inside
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        aabb.included(&self.planes)
    }

    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        obb.visible(&self.planes)
    }
}

/// Convex region bounded by an arbitrary set of inward-facing planes
#[derive(Clone, Debug, Default)]
pub struct ConvexVolume {
    planes: Vec<Plane>,
}

impl ConvexVolume {
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Volume bounded by the 6 faces of an oriented box
    pub fn from_obb(obb: &Obb) -> Self {
        Self::new(obb.planes().to_vec())
    }

    pub fn push(&mut self, plane: Plane) {
        self.planes.push(plane);
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(point) >= 0.0)
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.visible(&self.planes)
    }

    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        aabb.included(&self.planes)
    }

    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        obb.visible(&self.planes)
    }
}

impl From<Frustum> for ConvexVolume {
    fn from(frustum: Frustum) -> Self {
        Self::new(frustum.planes.to_vec())
    }
}
