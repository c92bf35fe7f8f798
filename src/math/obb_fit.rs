//! Oriented box fitting for point sets
//!
//! A fast, deterministic heuristic in the spirit of "dito" fitting:
//!
//! 1. Approximate the diameter by projecting onto 13 fixed directions and
//!    keeping the direction whose extremal points are farthest apart.
//! 2. Pick the point farthest from that diameter line; the triangle it forms
//!    yields 9 primary-axis candidates.
//! 3. Each primary axis gets 5 secondary candidates in its perpendicular plane.
//! 4. Every (primary, secondary) pair completes to a frame with a cross
//!    product; the frame with the smallest `hx*hy + hy*hz + hz*hx` wins.
//!
//! The result is not a minimum-volume box. It is checked afterwards against
//! its own face planes and the outcome is reported in [`ObbFit::validated`].

use crate::core::types::Vec3;
use super::aabb::Aabb;
use super::obb::Obb;

const DEGENERATE_EPSILON: f32 = 1e-10;
const SECONDARY_CANDIDATES: usize = 5;

/// Fixed sampling directions for the diameter search (normalized at use).
const DIAMETER_DIRECTIONS: [Vec3; 13] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(1.0, 1.0, -1.0),
    Vec3::new(1.0, -1.0, 1.0),
    Vec3::new(1.0, -1.0, -1.0),
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, -1.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(0.0, 1.0, -1.0),
];

/// Outcome of [`fit_points`].
#[derive(Clone, Copy, Debug)]
pub struct ObbFit {
    pub obb: Obb,
    /// Every input point lay inside the box's face planes (within tolerance).
    /// A `false` fit is still usable but may clip a few points.
    pub validated: bool,
}

#[derive(Clone, Copy)]
struct Frame {
    axes: [Vec3; 3],
    min: Vec3,
    max: Vec3,
    cost: f32,
}

impl Frame {
    fn evaluate(points: &[Vec3], axes: [Vec3; 3]) -> Frame {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            let proj = Vec3::new(p.dot(axes[0]), p.dot(axes[1]), p.dot(axes[2]));
            min = min.min(proj);
            max = max.max(proj);
        }
        let h = (max - min) * 0.5;
        Frame {
            axes,
            min,
            max,
            cost: h.x * h.y + h.y * h.z + h.z * h.x,
        }
    }

    fn to_obb(self) -> Obb {
        let mid = (self.min + self.max) * 0.5;
        let center = self.axes[0] * mid.x + self.axes[1] * mid.y + self.axes[2] * mid.z;
        Obb::from_axes_half_extents(center, self.axes, (self.max - self.min) * 0.5)
    }
}

/// Fit an oriented box around `points`. Returns `None` for an empty slice.
pub fn fit_points(points: &[Vec3]) -> Option<ObbFit> {
    if points.is_empty() {
        return None;
    }

    let mut best = Frame::evaluate(points, [Vec3::X, Vec3::Y, Vec3::Z]);

    if let Some((p0, p1)) = approximate_diameter(points) {
        let p2 = farthest_from_line(points, p0, p1);
        for primary in primary_candidates(p0, p1, p2) {
            let reference = p1 - p0;
            for secondary in secondary_candidates(primary, reference) {
                let third = primary.cross(secondary);
                if third.length_squared() < DEGENERATE_EPSILON {
                    continue;
                }
                let frame = Frame::evaluate(points, [primary, secondary, third.normalize()]);
                if frame.cost < best.cost {
                    best = frame;
                }
            }
        }
    }

    let obb = best.to_obb();
    let validated = validate(&obb, points);
    if !validated {
        log::debug!("OBB fit over {} points failed plane validation", points.len());
    }
    Some(ObbFit { obb, validated })
}

/// Check that every point lies on the inner side of all six face planes.
pub fn validate(obb: &Obb, points: &[Vec3]) -> bool {
    let tolerance = 1e-4 * obb.half_extents().max_element().max(1.0);
    let planes = obb.planes();
    points
        .iter()
        .all(|p| planes.iter().all(|plane| plane.distance(*p) >= -tolerance))
}

/// Axis-aligned fallback, handy when callers want to compare fits.
pub fn fit_points_axis_aligned(points: &[Vec3]) -> Option<Obb> {
    if points.is_empty() {
        return None;
    }
    Some(Obb::from_aabb(&Aabb::from_points(points.iter().copied())))
}

fn approximate_diameter(points: &[Vec3]) -> Option<(Vec3, Vec3)> {
    let mut best: Option<(f32, Vec3, Vec3)> = None;

    for dir in DIAMETER_DIRECTIONS {
        let dir = dir.normalize();
        let mut lo = (f32::INFINITY, points[0]);
        let mut hi = (f32::NEG_INFINITY, points[0]);
        for p in points {
            let d = p.dot(dir);
            if d < lo.0 {
                lo = (d, *p);
            }
            if d > hi.0 {
                hi = (d, *p);
            }
        }
        let dist_sq = lo.1.distance_squared(hi.1);
        if best.is_none_or(|(current, _, _)| dist_sq > current) {
            best = Some((dist_sq, lo.1, hi.1));
        }
    }

    best.filter(|(dist_sq, _, _)| *dist_sq > DEGENERATE_EPSILON)
        .map(|(_, a, b)| (a, b))
}

fn farthest_from_line(points: &[Vec3], p0: Vec3, p1: Vec3) -> Vec3 {
    let dir = (p1 - p0).normalize();
    let mut best = (0.0f32, p0);
    for p in points {
        let rel = *p - p0;
        let perp = rel - dir * rel.dot(dir);
        let d = perp.length_squared();
        if d > best.0 {
            best = (d, *p);
        }
    }
    best.1
}

/// Nine primary directions derived from the triangle (p0, p1, p2): its three
/// edges, its normal, the three in-plane edge perpendiculars and the two
/// diagonals between the diameter edge and its perpendicular.
fn primary_candidates(p0: Vec3, p1: Vec3, p2: Vec3) -> Vec<Vec3> {
    let edges = [
        (p1 - p0).normalize_or_zero(),
        (p2 - p1).normalize_or_zero(),
        (p0 - p2).normalize_or_zero(),
    ];
    let normal = edges[0].cross(edges[1]).normalize_or_zero();

    let mut candidates = Vec::with_capacity(9);
    candidates.extend_from_slice(&edges);
    candidates.push(normal);
    for edge in edges {
        candidates.push(normal.cross(edge).normalize_or_zero());
    }
    let perp0 = normal.cross(edges[0]);
    candidates.push((edges[0] + perp0).normalize_or_zero());
    candidates.push((edges[0] - perp0).normalize_or_zero());

    candidates.retain(|c| c.length_squared() > 0.5);
    candidates
}

/// Five directions spread over the half-circle perpendicular to `primary`,
/// starting from `reference` projected into that plane.
fn secondary_candidates(primary: Vec3, reference: Vec3) -> [Vec3; SECONDARY_CANDIDATES] {
    let projected = reference - primary * reference.dot(primary);
    let tangent = if projected.length_squared() > DEGENERATE_EPSILON {
        projected.normalize()
    } else {
        primary.any_orthonormal_vector()
    };
    let bitangent = primary.cross(tangent);

    std::array::from_fn(|k| {
        let angle = k as f32 * std::f32::consts::PI / SECONDARY_CANDIDATES as f32;
        tangent * angle.cos() + bitangent * angle.sin()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Mat4;

    fn box_cloud(transform: &Mat4, half: Vec3) -> Vec<Vec3> {
        let mut points = Vec::new();
        for i in 0..=6 {
            for j in 0..=6 {
                for k in 0..=6 {
                    let local = Vec3::new(
                        (i as f32 / 3.0 - 1.0) * half.x,
                        (j as f32 / 3.0 - 1.0) * half.y,
                        (k as f32 / 3.0 - 1.0) * half.z,
                    );
                    points.push(transform.transform_point3(local));
                }
            }
        }
        points
    }

    #[test]
    fn test_empty_input() {
        assert!(fit_points(&[]).is_none());
    }

    #[test]
    fn test_single_point() {
        let fit = fit_points(&[Vec3::new(1.0, 2.0, 3.0)]).unwrap();
        assert!(fit.validated);
        assert!((fit.obb.center - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);
        assert_eq!(fit.obb.volume(), 0.0);
    }

    #[test]
    fn test_fit_contains_all_points() {
        let transform = Mat4::from_translation(Vec3::new(10.0, -4.0, 2.0))
            * Mat4::from_rotation_z(0.6)
            * Mat4::from_rotation_x(0.3);
        let points = box_cloud(&transform, Vec3::new(5.0, 2.0, 1.0));
        let fit = fit_points(&points).unwrap();

        assert!(fit.validated);
        assert!(fit.obb.is_orthogonal(1e-3));
        for p in &points {
            assert!(fit.obb.planes().iter().all(|pl| pl.distance(*p) > -1e-3));
        }
    }

    #[test]
    fn test_fit_never_worse_than_axis_aligned() {
        let transform = Mat4::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let points = box_cloud(&transform, Vec3::new(6.0, 1.0, 1.0));
        let fit = fit_points(&points).unwrap();
        let aligned = fit_points_axis_aligned(&points).unwrap();

        assert!(fit.obb.surface_area() <= aligned.surface_area() + 1e-3);
        // A 45 degree rotated slab is far tighter than its axis-aligned hull
        assert!(fit.obb.volume() < aligned.volume() * 0.5);
    }

    #[test]
    fn test_collinear_points() {
        let points: Vec<Vec3> = (0..10).map(|i| Vec3::new(1.0, 1.0, 0.0) * i as f32).collect();
        let fit = fit_points(&points).unwrap();
        assert!(fit.validated);
        let h = fit.obb.half_extents();
        let mut sorted = [h.x, h.y, h.z];
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(sorted[0] < 1e-3 && sorted[1] < 1e-3);
        assert!((sorted[2] - 9.0 * 2f32.sqrt() / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_deterministic() {
        let transform = Mat4::from_rotation_y(1.1);
        let points = box_cloud(&transform, Vec3::new(3.0, 2.0, 0.5));
        let a = fit_points(&points).unwrap();
        let b = fit_points(&points).unwrap();
        assert_eq!(a.obb, b.obb);
    }

    #[test]
    fn test_validate_rejects_outside_point() {
        let obb = Obb::from_aabb(&Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert!(validate(&obb, &[Vec3::splat(0.5), Vec3::ONE]));
        assert!(!validate(&obb, &[Vec3::splat(1.5)]));
    }
}
