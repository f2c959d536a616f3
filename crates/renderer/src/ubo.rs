//! Uniform buffer contents for the mesh shaders.
//!
//! The vertex shader reads one [`MatrixBuffer`] per swapchain image at
//! binding 0. The struct uses `#[repr(C)]` and std140-compatible members so
//! it can be copied into the buffer byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use vkframe_core::CameraConfig;

/// World, view and projection matrices.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MatrixBuffer {
    pub world: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl MatrixBuffer {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl Default for MatrixBuffer {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

/// Fixed camera looking at the mesh.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl From<&CameraConfig> for Camera {
    fn from(config: &CameraConfig) -> Self {
        Self {
            eye: Vec3::from_array(config.eye),
            target: Vec3::from_array(config.target),
            up: Vec3::from_array(config.up),
            fov_y: config.fov_y,
            near: config.near,
            far: config.far,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Right-handed projection with `[0, 1]` depth and Y pointing down in
    /// clip space, as Vulkan expects.
    pub fn projection(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect_ratio, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Width over height, or 1 for a degenerate extent.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Rotation of the mesh about the world Y axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spin {
    /// Current angle in radians.
    pub angle: f32,
    /// Radians per second; negative turns clockwise seen from above.
    pub speed: f32,
}

impl Spin {
    pub fn new(speed: f32) -> Self {
        Self { angle: 0.0, speed }
    }

    /// Advances the angle by `dt` seconds, keeping it within one turn.
    pub fn advance(&mut self, dt: f32) {
        self.angle = (self.angle + self.speed * dt) % std::f32::consts::TAU;
    }

    pub fn world(&self) -> Mat4 {
        Mat4::from_rotation_y(self.angle)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec4;

    use super::*;

    fn camera() -> Camera {
        Camera::from(&CameraConfig::default())
    }

    #[test]
    fn test_matrix_buffer_size() {
        assert_eq!(MatrixBuffer::SIZE, 192);
        let matrices = MatrixBuffer::default();
        let bytes = bytemuck::bytes_of(&matrices);
        assert_eq!(bytes.len(), 192);
    }

    #[test]
    fn test_view_moves_target_onto_negative_z() {
        let camera = camera();
        let target = camera.view() * camera.target.extend(1.0);
        let distance = (camera.target - camera.eye).length();

        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.z, -distance, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y_and_maps_depth_to_unit_range() {
        let camera = camera();
        let proj = camera.projection(1.0);

        let up = proj * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(up.y / up.w < 0.0);

        let near = proj * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_tracks_aspect_ratio() {
        let camera = camera();
        let square = camera.projection(1.0);
        let wide = camera.projection(2.0);
        assert_relative_eq!(wide.x_axis.x * 2.0, square.x_axis.x, epsilon = 1e-5);
        assert_relative_eq!(wide.y_axis.y, square.y_axis.y, epsilon = 1e-5);
    }

    #[test]
    fn test_aspect_ratio_handles_zero_extent() {
        assert_relative_eq!(aspect_ratio(1600, 900), 16.0 / 9.0);
        assert_relative_eq!(aspect_ratio(0, 900), 1.0);
    }

    #[test]
    fn test_spin_advances_and_wraps() {
        let mut spin = Spin::new(-1.0);
        spin.advance(0.5);
        assert_relative_eq!(spin.angle, -0.5);

        spin.advance(2.0 * std::f32::consts::TAU);
        assert!(spin.angle.abs() < std::f32::consts::TAU);
        assert_relative_eq!(spin.angle, -0.5, epsilon = 1e-4);
    }

    #[test]
    fn test_spin_world_rotates_about_y() {
        let spin = Spin {
            angle: std::f32::consts::FRAC_PI_2,
            speed: 0.0,
        };
        let rotated = spin.world().transform_vector3(Vec3::X);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotated.z, -1.0, epsilon = 1e-6);
    }
}
