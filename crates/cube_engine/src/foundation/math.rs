//! Math utilities and types
//!
//! Thin aliases over nalgebra plus the projection helpers the renderer needs.

use nalgebra::{Matrix4, Point3, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}

/// Extension trait for Mat4 with the camera-facing constructors
pub trait Mat4Ext {
    /// Right-handed perspective projection for Vulkan clip space
    ///
    /// Depth maps to `[0, 1]` and the Y axis is flipped, so a world-space
    /// "up" ends up at the top of the framebuffer.
    fn perspective_vulkan(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Translation followed by a rotation about `axis`
    fn translate_rotate(translation: Vec3, axis: Vec3, angle: f32) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_vulkan(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let focal = 1.0 / (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = focal / aspect;
        result[(1, 1)] = -focal;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = near * far / (near - far);
        result[(3, 2)] = -1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn translate_rotate(translation: Vec3, axis: Vec3, angle: f32) -> Mat4 {
        let axis = Unit::new_normalize(axis);
        Mat4::new_translation(&translation) * Mat4::from_axis_angle(&axis, angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn project(m: &Mat4, p: Vec3) -> Vec3 {
        let clip = m * Vector4::new(p.x, p.y, p.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_perspective_depth_range_is_zero_to_one() {
        let proj = Mat4::perspective_vulkan(utils::deg_to_rad(60.0), 4.0 / 3.0, 0.1, 100.0);

        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -0.1)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(&proj, Vec3::new(0.0, 0.0, -100.0)).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = Mat4::perspective_vulkan(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);
        let above = project(&proj, Vec3::new(0.0, 1.0, -5.0));
        assert!(above.y < 0.0);
    }

    #[test]
    fn test_look_at_moves_target_onto_negative_z() {
        let view = Mat4::look_at(
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let origin = view.transform_point(&Point3::origin());
        assert_relative_eq!(origin.z, -3.0, epsilon = 1e-6);
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_deg_to_rad() {
        assert_relative_eq!(utils::deg_to_rad(180.0), constants::PI, epsilon = 1e-6);
        assert_relative_eq!(utils::deg_to_rad(-90.0), -constants::PI / 2.0, epsilon = 1e-6);
    }
}
