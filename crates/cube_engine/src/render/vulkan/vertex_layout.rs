//! Vertex input description for the cube mesh
//!
//! Vertices are tightly packed `f32`s: position xyz at offset 0, uv at
//! offset 12, 20 bytes per vertex.

use ash::vk;
use std::mem::size_of;

use crate::render::scene::FLOATS_PER_VERTEX;

/// Bytes between consecutive vertices
pub const VERTEX_STRIDE: u32 = (FLOATS_PER_VERTEX * size_of::<f32>()) as u32;

/// Byte offset of the uv attribute
pub const UV_OFFSET: u32 = (3 * size_of::<f32>()) as u32;

/// Binding 0, advanced per vertex
pub fn binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: VERTEX_STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Position at location 0, uv at location 1
pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32_SFLOAT,
            offset: UV_OFFSET,
        },
    ]
}
