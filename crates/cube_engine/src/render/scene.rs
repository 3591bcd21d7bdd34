//! The fixed scene: one textured cube mesh drawn at ten placements

use crate::core::CameraConfig;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3};

/// Floats per vertex: position xyz followed by uv
pub const FLOATS_PER_VERTEX: usize = 5;

/// Number of cube instances drawn every frame
pub const CUBE_COUNT: usize = 10;

/// Degrees of extra rotation per cube index
pub const ROTATION_STEP_DEGREES: f32 = 20.0;

/// Axis every cube rotates about (normalized at use)
pub const ROTATION_AXIS: [f32; 3] = [1.0, 0.3, 0.5];

/// Unit cube, four vertices per face so each face gets its own uvs
#[rustfmt::skip]
pub const CUBE_VERTICES: [f32; 120] = [
    // front
    -0.5, -0.5,  0.5, 0.0, 0.0,
     0.5, -0.5,  0.5, 1.0, 0.0,
     0.5,  0.5,  0.5, 1.0, 1.0,
    -0.5,  0.5,  0.5, 0.0, 1.0,
    // left
    -0.5, -0.5, -0.5, 0.0, 0.0,
    -0.5, -0.5,  0.5, 1.0, 0.0,
    -0.5,  0.5,  0.5, 1.0, 1.0,
    -0.5,  0.5, -0.5, 0.0, 1.0,
    // right
     0.5, -0.5,  0.5, 0.0, 0.0,
     0.5, -0.5, -0.5, 1.0, 0.0,
     0.5,  0.5, -0.5, 1.0, 1.0,
     0.5,  0.5,  0.5, 0.0, 1.0,
    // back
    -0.5, -0.5, -0.5, 0.0, 0.0,
     0.5, -0.5, -0.5, 1.0, 0.0,
     0.5,  0.5, -0.5, 1.0, 1.0,
    -0.5,  0.5, -0.5, 0.0, 1.0,
    // top
    -0.5,  0.5,  0.5, 0.0, 0.0,
     0.5,  0.5,  0.5, 1.0, 0.0,
     0.5,  0.5, -0.5, 1.0, 1.0,
    -0.5,  0.5, -0.5, 0.0, 1.0,
    // bottom
    -0.5, -0.5, -0.5, 0.0, 0.0,
     0.5, -0.5, -0.5, 1.0, 0.0,
     0.5, -0.5,  0.5, 1.0, 1.0,
    -0.5, -0.5,  0.5, 0.0, 1.0,
];

/// Two triangles per face
#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
     0,  1,  2,  2,  3,  0,
     4,  5,  6,  6,  7,  4,
     8,  9, 10, 10, 11,  8,
    12, 13, 14, 14, 15, 12,
    16, 17, 18, 18, 19, 16,
    20, 21, 22, 22, 23, 20,
];

/// World positions of the cubes
pub const CUBE_POSITIONS: [[f32; 3]; CUBE_COUNT] = [
    [0.0, 0.0, 0.0],
    [2.0, 5.0, -15.0],
    [-1.5, -2.2, -2.5],
    [-3.8, -2.0, -12.3],
    [2.4, -0.4, -3.5],
    [-1.7, 3.0, -7.5],
    [1.3, -2.0, -2.5],
    [1.5, 2.0, -2.5],
    [1.5, 0.2, -1.5],
    [-1.3, 1.0, -1.5],
];

/// Model matrix of cube `index`: translate, then rotate 20° per index
pub fn model_matrix(index: usize) -> Mat4 {
    let [x, y, z] = CUBE_POSITIONS[index % CUBE_COUNT];
    let [ax, ay, az] = ROTATION_AXIS;
    let angle = utils::deg_to_rad(ROTATION_STEP_DEGREES * index as f32);
    Mat4::translate_rotate(Vec3::new(x, y, z), Vec3::new(ax, ay, az), angle)
}

/// Perspective projection for the current surface aspect ratio
pub fn projection(camera: &CameraConfig, aspect: f32) -> Mat4 {
    Mat4::perspective_vulkan(utils::deg_to_rad(camera.fov_degrees), aspect, camera.near, camera.far)
}

/// Width over height, 1.0 for a degenerate extent
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// `projection * view * model` for every cube, in draw order
pub fn cube_mvps(view: &Mat4, projection: &Mat4) -> [Mat4; CUBE_COUNT] {
    let view_projection = projection * view;
    std::array::from_fn(|index| view_projection * model_matrix(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mesh_sizes() {
        assert_eq!(CUBE_VERTICES.len() / FLOATS_PER_VERTEX, 24);
        assert_eq!(CUBE_INDICES.len(), 36);
        let vertex_count = (CUBE_VERTICES.len() / FLOATS_PER_VERTEX) as u32;
        assert!(CUBE_INDICES.iter().all(|&i| i < vertex_count));
    }

    #[test]
    fn test_uvs_stay_in_unit_range() {
        for vertex in CUBE_VERTICES.chunks_exact(FLOATS_PER_VERTEX) {
            assert!((0.0..=1.0).contains(&vertex[3]));
            assert!((0.0..=1.0).contains(&vertex[4]));
        }
    }

    #[test]
    fn test_first_cube_sits_at_origin_unrotated() {
        assert_relative_eq!(model_matrix(0), Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_model_translation_matches_position() {
        for (index, position) in CUBE_POSITIONS.iter().enumerate() {
            let model = model_matrix(index);
            assert_relative_eq!(model[(0, 3)], position[0], epsilon = 1e-6);
            assert_relative_eq!(model[(1, 3)], position[1], epsilon = 1e-6);
            assert_relative_eq!(model[(2, 3)], position[2], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mvp_composition_order() {
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -3.0));
        let proj = projection(&CameraConfig::default(), 800.0 / 600.0);
        let mvps = cube_mvps(&view, &proj);

        assert_eq!(mvps.len(), CUBE_COUNT);
        for (index, mvp) in mvps.iter().enumerate() {
            assert_relative_eq!(*mvp, proj * view * model_matrix(index), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_aspect_ratio_handles_zero() {
        assert_relative_eq!(aspect_ratio(800, 600), 800.0 / 600.0);
        assert_relative_eq!(aspect_ratio(0, 600), 1.0);
    }
}
