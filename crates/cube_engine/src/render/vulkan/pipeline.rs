//! Graphics pipeline for dynamic rendering
//!
//! No render pass: attachment formats are declared through
//! `VkPipelineRenderingCreateInfo`. Viewport and scissor are dynamic so the
//! pipeline survives swapchain resizes.

use ash::{vk, Device};
use std::mem::size_of;

use crate::foundation::math::Mat4;
use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::descriptor_set::DescriptorSetLayout;
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::vertex_layout;

/// Size of the per-draw push constant block (one column-major mat4)
pub const MVP_PUSH_CONSTANT_SIZE: u32 = size_of::<Mat4>() as u32;

/// Stages that read the push constant block
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

/// Attachment formats the pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentFormats {
    /// Swapchain color format
    pub color: vk::Format,
    /// Depth format, if depth testing is on
    pub depth: Option<vk::Format>,
}

/// Push constant range covering the MVP matrix
pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: PUSH_CONSTANT_STAGES,
        offset: 0,
        size: MVP_PUSH_CONSTANT_SIZE,
    }
}

/// Graphics pipeline and its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    formats: AttachmentFormats,
}

impl GraphicsPipeline {
    /// Build the cube pipeline
    pub fn new(
        device: Device,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        set_layout: &DescriptorSetLayout,
        formats: AttachmentFormats,
    ) -> VulkanResult<Self> {
        let set_layouts = [set_layout.handle()];
        let push_constant_ranges = [push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None).map_err(VulkanError::Api)? };

        let mut built = Self {
            device,
            pipeline: vk::Pipeline::null(),
            layout,
            formats,
        };

        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [vertex_layout::binding_description()];
        let attributes = vertex_layout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // counts only; the rectangles are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_enabled = formats.depth.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth_enabled)
            .depth_write_enable(depth_enabled)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let color_formats = [formats.color];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(formats.depth.unwrap_or(vk::Format::UNDEFINED));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(built.layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            built
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };
        built.pipeline = pipelines.into_iter().next().ok_or_else(|| {
            VulkanError::InitializationFailed("create_graphics_pipelines returned no pipeline".to_string())
        })?;

        log::debug!("Created graphics pipeline for {:?}", formats);
        Ok(built)
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Attachment formats the pipeline was built for
    pub fn formats(&self) -> AttachmentFormats {
        self.formats
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
                self.pipeline = vk::Pipeline::null();
            }
            if self.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(self.layout, None);
                self.layout = vk::PipelineLayout::null();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constant_range_fits_one_matrix() {
        let range = push_constant_range();
        assert_eq!(range.size, 64);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
