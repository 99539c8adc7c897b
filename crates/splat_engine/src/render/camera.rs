//! Orbit camera and the per-frame camera record read by the projection stage

use bytemuck::{Pod, Zeroable};

use crate::config::CameraConfig;
use crate::foundation::math::{to_column_major, Mat4, Point3, Vec3};

const MIN_DISTANCE: f32 = 0.1;
const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Camera data uploaded once per frame
///
/// Layout must match the `Camera` uniform block in `projection.comp`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// World to view transform
    pub view: [[f32; 4]; 4],
    /// View to clip transform
    pub projection: [[f32; 4]; 4],
    /// Eye position, w = 1
    pub position: [f32; 4],
    /// Framebuffer size in pixels
    pub screen_size: [u32; 2],
    /// tan(fov/2) horizontally and vertically
    pub tan_half_fov: [f32; 2],
    /// Near and far clip planes
    pub near_far: [f32; 2],
}

/// Size of [`CameraUniform`] in bytes
pub const CAMERA_UNIFORM_SIZE: usize = std::mem::size_of::<CameraUniform>();

/// Camera orbiting a target point
///
/// Input handlers only mutate the orbit parameters; matrices are derived on demand.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    target: Vec3,
    distance: f32,
    yaw: f32,
    pitch: f32,
    fov_y: f32,
    near: f32,
    far: f32,
    screen_width: u32,
    screen_height: u32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl OrbitCamera {
    /// Create a camera from settings, looking at the origin
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            target: Vec3::zeros(),
            distance: config.distance.max(MIN_DISTANCE),
            yaw: 0.0,
            pitch: config.pitch.clamp(-MAX_PITCH, MAX_PITCH),
            fov_y: config.fov_y_degrees.to_radians(),
            near: config.near,
            far: config.far,
            screen_width: 1600,
            screen_height: 900,
        }
    }

    /// Orbit around the target by yaw/pitch deltas in radians
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Move the target in the view plane
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let (right, up) = self.basis();
        self.target += (right * -delta_x + up * delta_y) * self.distance;
    }

    /// Move towards (positive) or away from the target
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance - delta).max(MIN_DISTANCE);
    }

    /// Update the aspect ratio source after a resize
    pub fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen_width = width;
        self.screen_height = height;
    }

    /// Current orbit distance
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Current pitch in radians
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Current orbit target
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Width over height, 1 while minimized
    pub fn aspect_ratio(&self) -> f32 {
        if self.screen_height == 0 {
            return 1.0;
        }
        self.screen_width as f32 / self.screen_height as f32
    }

    /// Eye position in world space
    pub fn position(&self) -> Vec3 {
        let offset = Vec3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset
    }

    fn basis(&self) -> (Vec3, Vec3) {
        let forward = (self.target - self.position()).normalize();
        let right = forward.cross(&Vec3::y()).normalize();
        let up = right.cross(&forward);
        (right, up)
    }

    /// Right-handed look-at view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position()),
            &Point3::from(self.target),
            &Vec3::y(),
        )
    }

    /// Right-handed perspective with [0, 1] depth and Vulkan's downward Y
    pub fn projection_matrix(&self) -> Mat4 {
        let f = 1.0 / (self.fov_y * 0.5).tan();
        let (near, far) = (self.near, self.far);
        let mut m = Mat4::zeros();
        m[(0, 0)] = f / self.aspect_ratio();
        m[(1, 1)] = -f;
        m[(2, 2)] = far / (near - far);
        m[(2, 3)] = -(far * near) / (far - near);
        m[(3, 2)] = -1.0;
        m
    }

    /// Pack the per-frame uniform record
    pub fn uniform(&self) -> CameraUniform {
        let tan_y = (self.fov_y * 0.5).tan();
        let position = self.position();
        CameraUniform {
            view: to_column_major(&self.view_matrix()),
            projection: to_column_major(&self.projection_matrix()),
            position: [position.x, position.y, position.z, 1.0],
            screen_size: [self.screen_width, self.screen_height],
            tan_half_fov: [tan_y * self.aspect_ratio(), tan_y],
            near_far: [self.near, self.far],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;
    use std::mem::offset_of;

    #[test]
    fn test_uniform_layout() {
        assert_eq!(offset_of!(CameraUniform, view), 0);
        assert_eq!(offset_of!(CameraUniform, projection), 64);
        assert_eq!(offset_of!(CameraUniform, position), 128);
        assert_eq!(offset_of!(CameraUniform, screen_size), 144);
        assert_eq!(offset_of!(CameraUniform, tan_half_fov), 152);
        assert_eq!(offset_of!(CameraUniform, near_far), 160);
        assert_eq!(CAMERA_UNIFORM_SIZE, 168);
    }

    #[test]
    fn test_uniform_bytes_place_screen_size() {
        let mut camera = OrbitCamera::default();
        camera.set_screen_size(640, 480);
        let uniform = camera.uniform();
        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(bytes.len(), 168);
        assert_eq!(u32::from_ne_bytes(bytes[144..148].try_into().unwrap()), 640);
        assert_eq!(u32::from_ne_bytes(bytes[148..152].try_into().unwrap()), 480);
        assert_eq!(f32::from_ne_bytes(bytes[160..164].try_into().unwrap()), 0.1);
    }

    #[test]
    fn test_default_orbit() {
        let camera = OrbitCamera::default();
        assert_relative_eq!(camera.distance(), 5.0);
        assert_relative_eq!(camera.pitch(), 0.3);
        assert_relative_eq!(camera.position().norm(), 5.0, epsilon = 1e-5);
        assert_relative_eq!(camera.aspect_ratio(), 1600.0 / 900.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = OrbitCamera::default();
        camera.rotate(0.0, 10.0);
        assert_relative_eq!(camera.pitch(), MAX_PITCH);
        camera.rotate(0.0, -20.0);
        assert_relative_eq!(camera.pitch(), -MAX_PITCH);
    }

    #[test]
    fn test_zoom_keeps_minimum_distance() {
        let mut camera = OrbitCamera::default();
        camera.zoom(100.0);
        assert_relative_eq!(camera.distance(), MIN_DISTANCE);
        camera.zoom(-2.0);
        assert_relative_eq!(camera.distance(), MIN_DISTANCE + 2.0);
    }

    #[test]
    fn test_pan_moves_target_not_distance() {
        let mut camera = OrbitCamera::default();
        camera.pan(10.0, 0.0);
        assert!(camera.target().norm() > 0.0);
        assert_relative_eq!((camera.position() - camera.target()).norm(), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_view_maps_target_onto_negative_z() {
        let camera = OrbitCamera::default();
        let target = camera.view_matrix() * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_depth_range_and_flip() {
        let camera = OrbitCamera::default();
        let proj = camera.projection_matrix();
        let near = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, -1000.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);

        let above = proj * Vector4::new(0.0, 1.0, -5.0, 1.0);
        assert!(above.y / above.w < 0.0, "+Y in view space must land in the top half");
    }

    #[test]
    fn test_tan_half_fov_pair() {
        let mut camera = OrbitCamera::default();
        camera.set_screen_size(200, 100);
        let uniform = camera.uniform();
        let tan_y = (45.0_f32.to_radians() * 0.5).tan();
        assert_relative_eq!(uniform.tan_half_fov[1], tan_y);
        assert_relative_eq!(uniform.tan_half_fov[0], tan_y * 2.0);
    }
}
