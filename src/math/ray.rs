//! Ray type and operations

use crate::core::types::{Vec3, Mat4};
use super::aabb::Aabb;
use super::obb::Obb;

/// Direction components smaller than this are treated as axis-parallel.
const PARALLEL_EPSILON: f32 = 1e-8;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB intersection using slab method.
    ///
    /// Returns `Some((t_min, t_max))` with `t_min` clamped to 0 when the
    /// origin is inside. Near-zero direction components are handled as
    /// parallel slabs: the origin must lie within that slab.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        slab_test(self.origin, self.direction, aabb.min, aabb.max)
    }

    /// Ray-OBB intersection, running the slab test in the box's frame.
    pub fn intersects_obb(&self, obb: &Obb) -> Option<(f32, f32)> {
        let axes = obb.unit_axes();
        let half = obb.half_extents();
        let rel = self.origin - obb.center;
        let local_origin = Vec3::new(rel.dot(axes[0]), rel.dot(axes[1]), rel.dot(axes[2]));
        let local_dir = Vec3::new(
            self.direction.dot(axes[0]),
            self.direction.dot(axes[1]),
            self.direction.dot(axes[2]),
        );
        slab_test(local_origin, local_dir, -half, half)
    }

    /// Transform ray by matrix
    pub fn transform(&self, matrix: &Mat4) -> Ray {
        let new_origin = matrix.transform_point3(self.origin);
        let new_direction = matrix.transform_vector3(self.direction).normalize();
        Ray::new(new_origin, new_direction)
    }
}

fn slab_test(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<(f32, f32)> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < PARALLEL_EPSILON {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let t1 = (min[axis] - o) * inv;
        let t2 = (max[axis] - o) * inv;
        t_near = t_near.max(t1.min(t2));
        t_far = t_far.min(t1.max(t2));
        if t_near > t_far {
            return None;
        }
    }

    if t_far < 0.0 {
        return None;
    }
    Some((t_near.max(0.0), t_far))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.at(5.0), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_intersects_aabb_hit() {
        let ray = Ray::new(Vec3::new(-2.0, 0.5, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert!((t_near - 2.0).abs() < 0.001);
        assert!((t_far - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_intersects_aabb_miss() {
        let ray = Ray::new(Vec3::new(-2.0, 5.0, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(ray.intersects_aabb(&aabb).is_none());
    }

    #[test]
    fn test_intersects_aabb_inside() {
        let ray = Ray::new(Vec3::splat(0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (t_near, _) = ray.intersects_aabb(&aabb).unwrap();
        assert_eq!(t_near, 0.0);
    }

    #[test]
    fn test_box_behind_origin_is_miss() {
        let ray = Ray::new(Vec3::new(5.0, 0.5, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(ray.intersects_aabb(&aabb).is_none());
    }

    #[test]
    fn test_axis_parallel_ray() {
        // Straight down; x and y components are exactly zero
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let inside_slab = Ray::new(Vec3::new(0.5, 0.5, 10.0), -Vec3::Z);
        let outside_slab = Ray::new(Vec3::new(1.5, 0.5, 10.0), -Vec3::Z);

        let (t_near, t_far) = inside_slab.intersects_aabb(&aabb).unwrap();
        assert!((t_near - 9.0).abs() < 1e-5);
        assert!((t_far - 10.0).abs() < 1e-5);
        assert!(outside_slab.intersects_aabb(&aabb).is_none());
    }

    #[test]
    fn test_intersects_rotated_obb() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let rot = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let obb = Obb::from_transformed_aabb(&aabb, &rot);

        // Along x the rotated box reaches sqrt(2)
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let (t_near, _) = ray.intersects_obb(&obb).unwrap();
        assert!((t_near - (5.0 - 2f32.sqrt())).abs() < 1e-4);

        let miss = Ray::new(Vec3::new(-5.0, 1.6, 0.0), Vec3::X);
        assert!(miss.intersects_obb(&obb).is_none());
    }
}
