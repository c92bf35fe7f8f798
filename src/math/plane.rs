//! Oriented plane in Hessian normal form

use crate::core::types::{Vec3, Vec4};

/// A plane `normal · p + distance = 0`.
///
/// The normal is normalized on construction; points with positive signed
/// distance are on the side the normal faces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Create a plane, re-normalizing `normal` (and scaling `distance` with it).
    ///
    /// A zero normal is kept as-is; such a plane reports `distance` for every point.
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        if len > f32::EPSILON {
            Self {
                normal: normal / len,
                distance: distance / len,
            }
        } else {
            Self { normal, distance }
        }
    }

    /// Plane from packed `(a, b, c, d)` coefficients
    pub fn from_vec4(v: Vec4) -> Self {
        Self::new(Vec3::new(v.x, v.y, v.z), v.w)
    }

    /// Plane through `point` facing `normal`
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.normalize_or_zero();
        Self {
            normal: n,
            distance: -n.dot(point),
        }
    }

    /// Plane through three points, counter-clockwise winding faces the normal
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::from_point_normal(a, (b - a).cross(c - a))
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Negate normal and distance together in place.
    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.distance = -self.distance;
    }

    pub fn flipped(&self) -> Plane {
        Plane {
            normal: -self.normal,
            distance: -self.distance,
        }
    }

    /// Closest point on the plane
    pub fn project_point(&self, point: Vec3) -> Vec3 {
        point - self.normal * self.distance(point)
    }

    pub fn to_vec4(&self) -> Vec4 {
        self.normal.extend(self.distance)
    }
}
