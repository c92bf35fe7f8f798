//! Oriented bounding box and separating-axis intersection

use crate::core::types::{Vec3, Mat4};
use super::aabb::Aabb;
use super::plane::Plane;

/// Cross products shorter than this (squared) are skipped as separating axes.
const SAT_AXIS_EPSILON: f32 = 1e-6;

/// Oriented bounding box.
///
/// Each entry of `axes` is a box axis scaled by the half-extent along it,
/// so `center ± axes[i]` are the face centers. The axes are expected to be
/// near-orthogonal; [`Obb::is_orthogonal`] checks this, nothing enforces it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obb {
    pub center: Vec3,
    pub axes: [Vec3; 3],
}

impl Obb {
    pub fn new(center: Vec3, axes: [Vec3; 3]) -> Self {
        Self { center, axes }
    }

    /// Build from unit axes and half-extents
    pub fn from_axes_half_extents(center: Vec3, unit_axes: [Vec3; 3], half_extents: Vec3) -> Self {
        Self {
            center,
            axes: [
                unit_axes[0] * half_extents.x,
                unit_axes[1] * half_extents.y,
                unit_axes[2] * half_extents.z,
            ],
        }
    }

    pub fn from_aabb(aabb: &Aabb) -> Self {
        let half = aabb.half_extent();
        Self {
            center: aabb.center(),
            axes: [Vec3::X * half.x, Vec3::Y * half.y, Vec3::Z * half.z],
        }
    }

    /// The box `aabb` after an affine transform (exact, unlike [`Aabb::transformed`])
    pub fn from_transformed_aabb(aabb: &Aabb, matrix: &Mat4) -> Self {
        let local = Self::from_aabb(aabb);
        Self {
            center: matrix.transform_point3(local.center),
            axes: local.axes.map(|axis| matrix.transform_vector3(axis)),
        }
    }

    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(self.axes[0].length(), self.axes[1].length(), self.axes[2].length())
    }

    /// Axis directions; a zero-length axis yields `Vec3::ZERO`.
    pub fn unit_axes(&self) -> [Vec3; 3] {
        self.axes.map(Vec3::normalize_or_zero)
    }

    /// True when every pair of axes has `|cos angle| <= tolerance`.
    pub fn is_orthogonal(&self, tolerance: f32) -> bool {
        let [a, b, c] = self.unit_axes();
        a.dot(b).abs() <= tolerance && b.dot(c).abs() <= tolerance && c.dot(a).abs() <= tolerance
    }

    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            let sx = if i & 1 != 0 { 1.0 } else { -1.0 };
            let sy = if i & 2 != 0 { 1.0 } else { -1.0 };
            let sz = if i & 4 != 0 { 1.0 } else { -1.0 };
            self.center + self.axes[0] * sx + self.axes[1] * sy + self.axes[2] * sz
        })
    }

    /// Tightest axis-aligned box around this one
    pub fn to_aabb(&self) -> Aabb {
        let extent = self.axes[0].abs() + self.axes[1].abs() + self.axes[2].abs();
        Aabb::from_center_half_extent(self.center, extent)
    }

    pub fn volume(&self) -> f32 {
        let h = self.half_extents();
        8.0 * h.x * h.y * h.z
    }

    pub fn surface_area(&self) -> f32 {
        let h = self.half_extents();
        8.0 * (h.x * h.y + h.y * h.z + h.z * h.x)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        let rel = point - self.center;
        let half = self.half_extents();
        let axes = self.unit_axes();
        (0..3).all(|i| rel.dot(axes[i]).abs() <= half[i] + 1e-5)
    }

    /// The six face planes, normals pointing into the box.
    pub fn planes(&self) -> [Plane; 6] {
        let axes = self.unit_axes();
        std::array::from_fn(|i| {
            let axis = i / 2;
            if i % 2 == 0 {
                Plane::from_point_normal(self.center - self.axes[axis], axes[axis])
            } else {
                Plane::from_point_normal(self.center + self.axes[axis], -axes[axis])
            }
        })
    }

    /// Extent along a unit `normal`: `sum |normal . axis_i|` over the scaled axes
    pub fn projected_radius(&self, normal: Vec3) -> f32 {
        self.axes.iter().map(|axis| normal.dot(*axis).abs()).sum()
    }

    /// Strict containment in the convex region described by `planes`.
    pub fn included(&self, planes: &[Plane]) -> bool {
        planes
            .iter()
            .all(|plane| plane.distance(self.center) - self.projected_radius(plane.normal) >= 0.0)
    }

    /// Conservative possibly-visible test against `planes`.
    pub fn visible(&self, planes: &[Plane]) -> bool {
        planes
            .iter()
            .all(|plane| plane.distance(self.center) + self.projected_radius(plane.normal) >= 0.0)
    }

    /// Separating-axis test over the 15 candidate axes.
    ///
    /// Touching boxes count as intersecting. Near-parallel edge pairs and
    /// zero-length axes are skipped. Symmetric: `a.intersects(&b) == b.intersects(&a)`.
    pub fn intersects(&self, other: &Obb) -> bool {
        let offset = other.center - self.center;
        let separates = |axis: Vec3| {
            offset.dot(axis).abs() > self.projected_radius(axis) + other.projected_radius(axis)
        };

        let a_axes = self.unit_axes();
        let b_axes = other.unit_axes();

        for axis in a_axes.iter().chain(b_axes.iter()) {
            if axis.length_squared() < SAT_AXIS_EPSILON {
                continue;
            }
            if separates(*axis) {
                return false;
            }
        }

        for a in &a_axes {
            for b in &b_axes {
                let axis = a.cross(*b);
                if axis.length_squared() < SAT_AXIS_EPSILON {
                    continue;
                }
                if separates(axis) {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_at(center: Vec3, half: f32) -> Obb {
        Obb::from_aabb(&Aabb::from_center_half_extent(center, Vec3::splat(half)))
    }

    #[test]
    fn test_axis_aligned_gap_and_overlap() {
        let a = cube_at(Vec3::ZERO, 1.0);
        let gap = cube_at(Vec3::new(3.0, 0.0, 0.0), 1.0);
        let overlap = cube_at(Vec3::new(1.9, 0.0, 0.0), 1.0);

        assert!(!a.intersects(&gap));
        assert!(a.intersects(&overlap));
    }

    #[test]
    fn test_separated_only_by_edge_cross_axis() {
        // A is a diamond in XY, B a diamond in YZ. Every face axis overlaps;
        // only Y = (A's Z edge) x (B's X edge) separates them.
        let cube = Aabb::from_center_half_extent(Vec3::ZERO, Vec3::splat(1.0));
        let a = Obb::from_transformed_aabb(&cube, &Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4));
        let place_b = |y: f32| {
            Obb::from_transformed_aabb(
                &cube,
                &(Mat4::from_translation(Vec3::new(0.0, y, 0.0))
                    * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_4)),
            )
        };

        let apart = place_b(2.9);
        assert!(!a.intersects(&apart));
        assert!(!apart.intersects(&a));

        let touching = place_b(2.7);
        assert!(a.intersects(&touching));
        assert!(touching.intersects(&a));
    }

    #[test]
    fn test_sat_symmetry_sampled() {
        let mut boxes = Vec::new();
        for i in 0..12 {
            let t = i as f32;
            let rot = Mat4::from_rotation_z(t * 0.37) * Mat4::from_rotation_x(t * 0.21);
            let aabb = Aabb::from_center_half_extent(
                Vec3::new((t * 1.3).sin() * 2.0, (t * 0.7).cos() * 2.0, t * 0.15),
                Vec3::new(0.5 + (t * 0.4).sin().abs(), 0.8, 0.3 + t * 0.05),
            );
            boxes.push(Obb::from_transformed_aabb(&aabb, &(Mat4::from_translation(aabb.center()) * rot * Mat4::from_translation(-aabb.center()))));
        }
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.intersects(b), b.intersects(a));
            }
        }
    }

    #[test]
    fn test_parallel_boxes_skip_degenerate_cross_products() {
        // Identical orientation: all 9 cross products are either zero or world axes
        let a = cube_at(Vec3::ZERO, 1.0);
        let b = cube_at(Vec3::new(0.0, 1.5, 0.5), 1.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_flat_box_zero_axis() {
        let flat = Obb::new(Vec3::ZERO, [Vec3::X, Vec3::Y, Vec3::ZERO]);
        let above = cube_at(Vec3::new(0.0, 0.0, 2.0), 1.0);
        let touching = cube_at(Vec3::new(0.0, 0.0, 0.5), 1.0);
        assert!(!flat.intersects(&above));
        assert!(flat.intersects(&touching));
        assert_eq!(flat.volume(), 0.0);
    }

    #[test]
    fn test_planes_face_inward() {
        let obb = Obb::from_transformed_aabb(
            &Aabb::from_center_half_extent(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 0.5)),
            &Mat4::from_rotation_z(0.3),
        );
        for plane in obb.planes() {
            assert!(plane.distance(obb.center) > 0.0);
        }
        for corner in obb.corners() {
            assert!(obb.contains_point(corner));
            for plane in obb.planes() {
                assert!(plane.distance(corner) > -1e-4);
            }
        }
    }

    #[test]
    fn test_orthogonality_check() {
        let good = cube_at(Vec3::ZERO, 1.0);
        assert!(good.is_orthogonal(1e-4));
        let skewed = Obb::new(Vec3::ZERO, [Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Z]);
        assert!(!skewed.is_orthogonal(1e-4));
    }

    #[test]
    fn test_to_aabb_encloses_corners() {
        let obb = Obb::from_transformed_aabb(
            &Aabb::new(Vec3::ZERO, Vec3::new(4.0, 1.0, 2.0)),
            &Mat4::from_rotation_y(0.8),
        );
        let aabb = obb.to_aabb().grown(Vec3::splat(1e-4));
        for corner in obb.corners() {
            assert!(aabb.contains_point(corner));
        }
    }

    #[test]
    fn test_included_visible_with_planes() {
        let planes = [Plane::new(Vec3::Z, 0.0)];
        let upright = Obb::from_aabb(&Aabb::from_center_half_extent(Vec3::new(0.0, 0.0, 1.2), Vec3::splat(1.0)));
        assert!(upright.included(&planes));
        let tilted = Obb::from_transformed_aabb(
            &Aabb::from_center_half_extent(Vec3::ZERO, Vec3::splat(1.0)),
            &(Mat4::from_translation(Vec3::new(0.0, 0.0, 1.2)) * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_4)),
        );
        // Rotated corner dips to 1.2 - sqrt(2) < 0
        assert!(!tilted.included(&planes));
        assert!(tilted.visible(&planes));
    }
}
