//! Axis-aligned bounding box

use crate::core::types::{Vec3, Mat4};
use super::plane::Plane;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Empty box: merging anything into it yields that thing.
    pub const INVALID: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: Vec3, half_extent: Vec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Smallest box holding every point, or [`Aabb::INVALID`] for none.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::INVALID;
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    /// `min <= max` on every axis
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get half-extents
    pub fn half_extent(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn surface_area(&self) -> f32 {
        let s = self.size();
        2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
    }

    /// Radius of the sphere around `center()` that encloses the box
    pub fn radius(&self) -> f32 {
        self.half_extent().length()
    }

    /// The 8 corners, bit 0 = x, bit 1 = y, bit 2 = z selects max
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            )
        })
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// Check if two AABBs intersect (touching counts)
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Interval intersection. The result is invalid (see [`Aabb::is_valid`])
    /// when the boxes do not overlap.
    pub fn intersect(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Interval intersection, `None` when the boxes do not overlap.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        let result = self.intersect(other);
        result.is_valid().then_some(result)
    }

    /// Expand AABB to include point
    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow in place to enclose `other`
    pub fn merge(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Pad every face outward by `margin`
    pub fn grown(&self, margin: Vec3) -> Aabb {
        Aabb {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Scale the extents about the center
    pub fn scaled(&self, factor: Vec3) -> Aabb {
        Aabb::from_center_half_extent(self.center(), self.half_extent() * factor.abs())
    }

    /// Box enclosing this one after an affine transform (Arvo's method)
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extent();
        let extent = Vec3::new(
            matrix.x_axis.x.abs() * half.x + matrix.y_axis.x.abs() * half.y + matrix.z_axis.x.abs() * half.z,
            matrix.x_axis.y.abs() * half.x + matrix.y_axis.y.abs() * half.y + matrix.z_axis.y.abs() * half.z,
            matrix.x_axis.z.abs() * half.x + matrix.y_axis.z.abs() * half.y + matrix.z_axis.z.abs() * half.z,
        );
        Aabb::from_center_half_extent(center, extent)
    }

    /// Extent of the box along a unit `normal`, measured from the center
    pub fn projected_radius(&self, normal: Vec3) -> f32 {
        let h = self.half_extent();
        normal.x.abs() * h.x + normal.y.abs() * h.y + normal.z.abs() * h.z
    }

    /// Strict containment: the whole box is on the positive side of every plane.
    pub fn included(&self, planes: &[Plane]) -> bool {
        let center = self.center();
        planes
            .iter()
            .all(|plane| plane.distance(center) - self.projected_radius(plane.normal) >= 0.0)
    }

    /// Conservative visibility: `false` only when the box is entirely behind
    /// some plane. May report boxes outside the region as visible.
    pub fn visible(&self, planes: &[Plane]) -> bool {
        let center = self.center();
        planes
            .iter()
            .all(|plane| plane.distance(center) + self.projected_radius(plane.normal) >= 0.0)
    }
}
