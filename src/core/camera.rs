//! Viewer camera used for region selection and culling

use crate::core::types::{Vec3, Mat3, Mat4, Quat};
use crate::math::Frustum;

/// Camera with position, rotation, and projection parameters.
///
/// Camera space follows the usual right-handed convention (looking down -Z,
/// +Y up); the terrain world is Z-up, so [`Camera::look_at`] is normally
/// called with `Vec3::Z` as the up vector.
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation as quaternion
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.5,
            far: 10_000.0,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut camera = Self::new(position, 60.0, 16.0 / 9.0);
        camera.look_towards(target - position, up);
        camera
    }

    /// Point the camera along `direction`, keeping `up` as the vertical reference.
    pub fn look_towards(&mut self, direction: Vec3, up: Vec3) {
        let forward = direction.normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation.conjugate());
        let translation_matrix = Mat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Culling frustum for the current view
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get right direction (positive X in camera space)
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Get up direction (positive Y in camera space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Update aspect ratio (call on window resize)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.aspect = width / height;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 50.0), Vec3::new(0.0, 100.0, 50.0), Vec3::Z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_directions() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0), Vec3::Z);

        assert!((camera.forward() - Vec3::Y).length() < 0.001);
        assert!((camera.up() - Vec3::Z).length() < 0.001);
        assert!((camera.right() - Vec3::X).length() < 0.001);
    }

    #[test]
    fn test_view_matrix_translation() {
        let mut camera = Camera::new(Vec3::ZERO, 60.0, 1.0);
        camera.position = Vec3::new(10.0, 0.0, 0.0);

        let view = camera.view_matrix();
        let origin_in_camera = view.transform_point3(Vec3::ZERO);
        assert!((origin_in_camera.x - (-10.0)).abs() < 0.001);
    }

    #[test]
    fn test_frustum_sees_point_ahead() {
        let camera = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, 10.0, 0.0), Vec3::Z);
        let frustum = camera.frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 100.0, 0.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, -100.0, 0.0)));
    }
}
