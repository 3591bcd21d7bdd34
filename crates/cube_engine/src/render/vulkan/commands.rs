//! Command buffer management
//!
//! Command pool ownership, a checked recorder for dynamic rendering, one-time
//! submissions for uploads and the image layout transitions they need.

use ash::{vk, Device};

use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::image::has_stencil_component;

/// Command pool wrapper with RAII cleanup
///
/// Buffers are individually resettable so each in-flight slot can re-record
/// its own buffer.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Record, submit and wait for a one-time command buffer
    ///
    /// Blocks on `queue_wait_idle`, so this is meant for startup uploads only.
    /// The command buffer is freed on every exit path.
    pub fn submit_single_time<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandRecorder<'_>) -> VulkanResult<()>,
    {
        let command_buffer = self
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Driver returned no command buffer".to_string(),
            })?;
        let _guard = SingleTimeBuffer {
            device: &self.device,
            pool: self.command_pool,
            command_buffer,
        };

        let mut recorder = CommandRecorder::new(&self.device, command_buffer);
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&mut recorder)?;
        recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device.queue_wait_idle(queue).map_err(VulkanError::Api)
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        if self.command_pool == vk::CommandPool::null() {
            return;
        }
        unsafe {
            // Destroying the pool frees every buffer allocated from it
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
        self.command_pool = vk::CommandPool::null();
    }
}

struct SingleTimeBuffer<'a> {
    device: &'a Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl Drop for SingleTimeBuffer<'_> {
    fn drop(&mut self) {
        unsafe { self.device.free_command_buffers(self.pool, &[self.command_buffer]) };
    }
}

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Writes that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing the source accesses
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming the destination accesses
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the transitions the upload path performs
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    use vk::ImageLayout as L;

    match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        }),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        }),
        _ => Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Swapchain image: UNDEFINED to COLOR_ATTACHMENT_OPTIMAL before rendering
pub fn color_attachment_masks() -> TransitionMasks {
    TransitionMasks {
        src_access: vk::AccessFlags::empty(),
        dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
        dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
    }
}

/// Swapchain image: COLOR_ATTACHMENT_OPTIMAL to PRESENT_SRC_KHR after rendering
pub fn present_masks() -> TransitionMasks {
    TransitionMasks {
        src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags::empty(),
        src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    }
}

/// Shared depth image: discard last frame's contents and make it writable
///
/// Waits on the previous frame's depth writes since both slots share it.
pub fn depth_attachment_masks() -> TransitionMasks {
    TransitionMasks {
        src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        src_stage: vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
    }
}

/// Image aspect touched by a transition into `new`
pub fn transition_aspect(format: vk::Format, new: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Checked command buffer recorder
///
/// Tracks whether recording has begun so misuse turns into an error rather
/// than a validation failure.
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
    recording: bool,
}

impl<'a> CommandRecorder<'a> {
    /// Wrap an allocated command buffer
    pub fn new(device: &'a Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            recording: false,
        }
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Clear previously recorded commands
    pub fn reset(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        self.recording = false;
        Ok(())
    }

    /// Begin command recording
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<()> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        Ok(())
    }

    /// Finish recording
    pub fn end(&mut self) -> VulkanResult<()> {
        self.ensure_recording()?;
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        self.recording = false;
        Ok(())
    }

    fn ensure_recording(&self) -> VulkanResult<()> {
        if self.recording {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string(),
            })
        }
    }

    /// Record a single image memory barrier
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        masks: TransitionMasks,
    ) -> VulkanResult<()> {
        self.ensure_recording()?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
        Ok(())
    }

    /// Transition an image between two of the layouts the upload path uses
    pub fn transition_image_layout(
        &mut self,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = transition_masks(old_layout, new_layout)?;
        self.image_barrier(image, transition_aspect(format, new_layout), old_layout, new_layout, masks)
    }

    /// Copy `size` bytes between buffers
    pub fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        self.ensure_recording()?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]) };
        Ok(())
    }

    /// Copy tightly packed pixels into mip 0 of a color image in TRANSFER_DST layout
    pub fn copy_buffer_to_image(&mut self, src: vk::Buffer, image: vk::Image, extent: vk::Extent2D) -> VulkanResult<()> {
        self.ensure_recording()?;
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }
        Ok(())
    }

    /// Begin a dynamic rendering scope; it ends when the guard drops
    pub fn begin_rendering(&mut self, rendering_info: &vk::RenderingInfo) -> VulkanResult<ActiveRendering<'_, 'a>> {
        self.ensure_recording()?;
        unsafe { self.device.cmd_begin_rendering(self.command_buffer, rendering_info) };
        Ok(ActiveRendering { recorder: self })
    }
}

/// RAII guard for an open dynamic rendering scope
pub struct ActiveRendering<'r, 'a> {
    recorder: &'r mut CommandRecorder<'a>,
}

impl ActiveRendering<'_, '_> {
    fn device(&self) -> &Device {
        self.recorder.device
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.command_buffer
    }

    /// Set dynamic viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe { self.device().cmd_set_viewport(self.command_buffer(), 0, &[viewport]) };
    }

    /// Set dynamic scissor
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe { self.device().cmd_set_scissor(self.command_buffer(), 0, &[scissor]) };
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.command_buffer(), vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    /// Bind descriptor sets starting at set 0
    pub fn bind_descriptor_sets(&mut self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            );
        }
    }

    /// Bind a vertex buffer at binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.command_buffer(), 0, &[buffer], &[0]);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.command_buffer(), buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Push constants
    pub fn push_constants(&mut self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        unsafe {
            self.device()
                .cmd_push_constants(self.command_buffer(), layout, stages, 0, data);
        }
    }

    /// Draw a single instance of indexed geometry
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device()
                .cmd_draw_indexed(self.command_buffer(), index_count, 1, 0, 0, 0);
        }
    }
}

impl Drop for ActiveRendering<'_, '_> {
    fn drop(&mut self) {
        unsafe { self.device().cmd_end_rendering(self.command_buffer()) };
    }
}
