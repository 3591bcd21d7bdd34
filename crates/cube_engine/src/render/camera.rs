//! First-person fly camera
//!
//! Orientation is kept as yaw/pitch Euler angles in degrees; the basis
//! vectors are rebuilt whenever the angles change. Yaw starts at -90° so the
//! camera initially looks down -Z.

use crate::core::CameraConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};

/// Pitch limit in degrees, keeps the view from flipping over the pole
pub const PITCH_LIMIT: f32 = 89.0;

const DEFAULT_YAW: f32 = -90.0;
const DEFAULT_PITCH: f32 = 0.0;

/// Direction of a keyboard move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMovement {
    /// Along the view direction
    Forward,
    /// Against the view direction
    Backward,
    /// Against the right vector
    Left,
    /// Along the right vector
    Right,
}

/// Yaw/pitch camera driven by WASD and mouse deltas
#[derive(Debug, Clone)]
pub struct FlyCamera {
    /// Eye position in world space
    pub position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    speed: f32,
    sensitivity: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(&CameraConfig::default())
    }
}

impl FlyCamera {
    /// Camera at (0, 0, 3) looking down -Z
    pub fn new(config: &CameraConfig) -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            front: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::y(),
            right: Vec3::x(),
            world_up: Vec3::y(),
            yaw: DEFAULT_YAW,
            pitch: DEFAULT_PITCH,
            speed: config.speed,
            sensitivity: config.sensitivity,
        };
        camera.update_vectors();
        camera
    }

    /// Move by `speed * delta_time` along the chosen axis
    pub fn process_keyboard(&mut self, direction: CameraMovement, delta_time: f32) {
        let velocity = self.speed * delta_time;
        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
        }
    }

    /// Turn by a cursor delta in pixels; positive `y_offset` looks up
    pub fn process_mouse(&mut self, x_offset: f32, y_offset: f32) {
        self.yaw += x_offset * self.sensitivity;
        self.pitch = (self.pitch + y_offset * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// World-to-view transform
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.position + self.front, self.up)
    }

    /// Unit view direction
    pub fn front(&self) -> Vec3 {
        self.front
    }

    /// Unit right vector
    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Yaw in degrees
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in degrees
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    fn update_vectors(&mut self) {
        let yaw = utils::deg_to_rad(self.yaw);
        let pitch = utils::deg_to_rad(self.pitch);
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(&self.world_up).normalize();
        self.up = self.right.cross(&self.front);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_initial_orientation_looks_down_negative_z() {
        let camera = FlyCamera::default();
        assert_relative_eq!(camera.front(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(camera.right(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = FlyCamera::default();
        camera.process_mouse(0.0, 10_000.0);
        assert_relative_eq!(camera.pitch(), PITCH_LIMIT);
        camera.process_mouse(0.0, -100_000.0);
        assert_relative_eq!(camera.pitch(), -PITCH_LIMIT);
    }

    #[test]
    fn test_mouse_scales_by_sensitivity() {
        let mut camera = FlyCamera::default();
        camera.process_mouse(100.0, 50.0);
        assert_relative_eq!(camera.yaw(), -80.0, epsilon = 1e-4);
        assert_relative_eq!(camera.pitch(), 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_keyboard_moves_by_speed_times_delta() {
        let mut camera = FlyCamera::default();
        camera.process_keyboard(CameraMovement::Forward, 1.0);
        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-5);

        camera.process_keyboard(CameraMovement::Right, 0.4);
        assert_relative_eq!(camera.position, Vec3::new(1.0, 0.0, 0.5), epsilon = 1e-5);

        camera.process_keyboard(CameraMovement::Backward, 1.0);
        camera.process_keyboard(CameraMovement::Left, 0.4);
        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_view_matrix_places_eye_at_origin() {
        let camera = FlyCamera::default();
        let eye = camera.view_matrix() * camera.position.push(1.0);
        assert_relative_eq!(eye.xyz(), Vec3::zeros(), epsilon = 1e-5);
    }
}
