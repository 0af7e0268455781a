//! Look-at camera with reversed-depth projection.
//!
//! The camera carries a strictly boolean `updated` flag: every mutation sets
//! it, and the consumer (the renderer's uniform refresh) clears it after
//! uploading. A freshly constructed camera starts marked updated so the first
//! refresh always uploads valid matrices.

use glam::{Mat4, Vec3};

/// Perspective projection parameters.
///
/// The produced matrix uses the reversed-depth convention: the near plane
/// maps to depth 1.0 and the far plane to 0.0, which pairs with a `Greater`
/// depth compare and a 0.0 depth clear. This spreads floating-point precision
/// far more evenly across the view distance than the conventional mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height of the render target.
    pub aspect: f32,
    /// Near plane distance (maps to depth 1.0).
    pub near: f32,
    /// Far plane distance (maps to depth 0.0).
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 256.0,
        }
    }
}

impl Projection {
    /// Create a perspective projection from a field of view in degrees.
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Build the reversed-depth projection matrix.
    pub fn matrix(&self) -> Mat4 {
        // Swapping the plane arguments of the standard [0,1] projection
        // reverses the depth mapping: near -> 1.0, far -> 0.0.
        Mat4::perspective_rh(self.fov_y, self.aspect, self.far, self.near)
    }
}

/// Camera for viewing the scene.
///
/// # Example
///
/// ```
/// use glam::Vec3;
/// use marigold_core::camera::Camera;
///
/// let mut camera = Camera::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO);
/// assert!(camera.updated());
/// camera.clear_updated();
/// camera.set_position(Vec3::new(1.0, 2.0, 5.0));
/// assert!(camera.updated());
/// ```
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    projection: Projection,
    updated: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    /// Create a camera at `position` looking at `target`, marked updated.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
            updated: true,
        }
    }

    /// Set the projection parameters.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self.updated = true;
        self
    }

    /// Move the camera, marking it updated.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.updated = true;
    }

    /// Aim the camera at a new target, marking it updated.
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        self.updated = true;
    }

    /// Update the aspect ratio after a target resize, marking it updated.
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.aspect = width / height.max(1.0);
        self.updated = true;
    }

    /// Camera world position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Point the camera looks at.
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Projection parameters.
    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Whether the camera changed since [`clear_updated`](Self::clear_updated)
    /// was last called.
    pub fn updated(&self) -> bool {
        self.updated
    }

    /// Clear the dirty flag. Called by the consumer after it has uploaded
    /// the current matrices.
    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    /// View matrix (right-handed look-at).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Reversed-depth projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Normalized forward direction.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_new_camera_is_marked_updated() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        assert!(camera.updated());
        camera.clear_updated();
        assert!(!camera.updated());
    }

    #[test]
    fn test_mutations_set_updated() {
        let mut camera = Camera::default();
        camera.clear_updated();

        camera.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert!(camera.updated());
        camera.clear_updated();

        camera.look_at(Vec3::new(0.0, 1.0, 0.0));
        assert!(camera.updated());
        camera.clear_updated();

        camera.set_aspect(1920.0, 1080.0);
        assert!(camera.updated());
    }

    #[test]
    fn test_view_matrix_moves_position_to_origin() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let eye = camera.view_matrix() * Vec4::new(0.0, 0.0, 5.0, 1.0);
        assert!(eye.truncate().length() < 1e-5);
    }

    #[test]
    fn test_projection_depth_is_reversed() {
        let proj = Projection::perspective(60.0, 1.0, 0.1, 100.0);
        let m = proj.matrix();

        // A point on the near plane lands at depth ~1, one on the far
        // plane at depth ~0.
        let near_clip = m * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far_clip = m * Vec4::new(0.0, 0.0, -100.0, 1.0);
        let near_depth = near_clip.z / near_clip.w;
        let far_depth = far_clip.z / far_clip.w;

        assert!((near_depth - 1.0).abs() < 1e-4);
        assert!(far_depth.abs() < 1e-4);
        assert!(near_depth > far_depth);
    }
}
