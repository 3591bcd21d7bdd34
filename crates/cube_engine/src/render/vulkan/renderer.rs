//! Vulkan renderer for the cube scene
//!
//! Owns every GPU object the scene needs and implements [`FrameBackend`] so
//! [`run_frame`] can drive it. Fields are declared in drop order: per-frame
//! objects first, the surface-bound swapchain after them and the context
//! last.

use ash::vk;

use crate::core::{ApplicationConfig, CameraConfig};
use crate::foundation::math::Mat4;
use crate::render::frame::{run_frame, AcquireOutcome, FrameBackend, FrameStatus, PresentOutcome};
use crate::render::scene::{self, CUBE_COUNT, CUBE_INDICES, CUBE_VERTICES};
use crate::render::vulkan::buffer::{BufferHandle, BufferHolder};
use crate::render::vulkan::commands::{
    color_attachment_masks, depth_attachment_masks, present_masks, CommandPool, CommandRecorder,
};
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::descriptor_set::{texture_layout_builder, DescriptorPool, DescriptorSetLayout, TEXTURE_BINDING};
use crate::render::vulkan::pipeline::{AttachmentFormats, GraphicsPipeline, PUSH_CONSTANT_STAGES};
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::swapchain::{SwapchainView, ViewState};
use crate::render::vulkan::sync::{SyncManager, MAX_FRAMES_IN_FLIGHT};
use crate::render::vulkan::texture::Texture2D;
use crate::render::vulkan::window::Window;

/// Color the swapchain image is cleared to
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Depth the depth attachment is cleared to
pub const CLEAR_DEPTH: f32 = 1.0;

/// Progress of one slot through a tick, used to undo an abandoned frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SlotProgress {
    acquired: bool,
    fence_reset: bool,
}

/// The cube renderer
pub struct VulkanRenderer {
    sync: SyncManager,
    slots: [SlotProgress; MAX_FRAMES_IN_FLIGHT],
    command_buffers: Vec<vk::CommandBuffer>,
    // owns the command buffers above
    _command_pool: CommandPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    // owns the descriptor sets above
    _descriptor_pool: DescriptorPool,
    pipeline: GraphicsPipeline,
    set_layout: DescriptorSetLayout,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    texture: Texture2D,
    vertices: BufferHandle,
    indices: BufferHandle,
    buffers: BufferHolder,
    swapchain: SwapchainView,
    camera: CameraConfig,
    use_depth: bool,
    framebuffer_size: (u32, u32),
    mvps: [Mat4; CUBE_COUNT],
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Bring up the device, swapchain and scene resources for `window`
    pub fn new(config: &ApplicationConfig, window: &mut Window) -> VulkanResult<Self> {
        let extensions = window.get_required_instance_extensions()?;
        let context = VulkanContext::new(&config.renderer, &extensions)?;
        log::info!("Using GPU {}", context.physical_device().name());

        let use_depth = config.renderer.use_depth;
        let swapchain = SwapchainView::new(&context, window, use_depth)?;

        let device = context.device().clone();
        let command_pool = CommandPool::new(device.clone(), context.queue_family_index())?;
        let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        let mut buffers = BufferHolder::new();
        let vertices = buffers.upload(&CUBE_VERTICES, vk::BufferUsageFlags::VERTEX_BUFFER, &context, &command_pool)?;
        let indices = buffers.upload(&CUBE_INDICES, vk::BufferUsageFlags::INDEX_BUFFER, &context, &command_pool)?;
        let texture = Texture2D::from_file(&config.assets.texture_path, &context, &command_pool)?;

        let set_layout = texture_layout_builder().build(&device)?;
        let descriptor_pool = DescriptorPool::new(device.clone())?;
        let descriptor_sets = descriptor_pool.allocate_per_frame(&set_layout)?;
        for &set in &descriptor_sets {
            descriptor_pool.write_combined_image_sampler(set, TEXTURE_BINDING, texture.view(), texture.sampler());
        }

        let shaders = &config.renderer.shaders;
        let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &vertex_shader,
            &fragment_shader,
            &set_layout,
            attachment_formats(&swapchain),
        )?;

        let sync = SyncManager::new(&device)?;
        let framebuffer_size = window.get_framebuffer_size();

        log::info!("Renderer ready: {} frames in flight, depth {}", MAX_FRAMES_IN_FLIGHT, use_depth);
        Ok(Self {
            sync,
            slots: [SlotProgress::default(); MAX_FRAMES_IN_FLIGHT],
            command_buffers,
            _command_pool: command_pool,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            pipeline,
            set_layout,
            vertex_shader,
            fragment_shader,
            texture,
            vertices,
            indices,
            buffers,
            swapchain,
            camera: config.camera.clone(),
            use_depth,
            framebuffer_size,
            mvps: [Mat4::identity(); CUBE_COUNT],
            context,
        })
    }

    /// Render one tick with the given camera view
    ///
    /// `resize_requested` is the host's resize flag; it is cleared once the
    /// swapchain has been rebuilt for the new size.
    pub fn draw_frame(&mut self, view: &Mat4, framebuffer_size: (u32, u32), resize_requested: &mut bool) -> FrameStatus {
        self.framebuffer_size = framebuffer_size;
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            return FrameStatus::Skipped;
        }

        let extent = self.swapchain.extent();
        let projection = scene::projection(&self.camera, scene::aspect_ratio(extent.width, extent.height));
        self.mvps = scene::cube_mvps(view, &projection);

        let slot = self.sync.current_frame();
        let mut counter = self.sync.counter();
        let status = run_frame(self, &mut counter, resize_requested);
        if counter.current() != slot {
            self.sync.advance();
        }
        status
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Device context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Swapchain extent in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Hand a slot left half way through a tick back to a reusable state
    ///
    /// An acquired image's semaphore is consumed and a reset fence is
    /// signaled through an empty submission, so the next wait on the slot
    /// cannot block forever. The image itself is only returned by rebuilding
    /// the swapchain, so the view is marked stale.
    fn release_slot(&mut self, slot: usize) {
        let progress = std::mem::take(&mut self.slots[slot]);
        if !progress.acquired && !progress.fence_reset {
            return;
        }
        if progress.acquired {
            self.swapchain.mark_stale();
        }

        let sync = self.sync.frame(slot);
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::BOTTOM_OF_PIPE];
        let mut submit_info = vk::SubmitInfo::builder();
        if progress.acquired {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }
        let fence = if progress.fence_reset {
            sync.in_flight.handle()
        } else {
            vk::Fence::null()
        };

        let result = unsafe {
            self.context
                .device()
                .queue_submit(self.context.queue(), &[submit_info.build()], fence)
        };
        if let Err(err) = result {
            log::warn!("Could not release frame slot {}: {}", slot, err);
        }
    }

    fn record_commands(&self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let index = image_index as usize;
        let (image, view) = match (self.swapchain.images().get(index), self.swapchain.image_views().get(index)) {
            (Some(&image), Some(&view)) => (image, view),
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("swapchain image {} out of range", image_index),
                })
            }
        };
        let extent = self.swapchain.extent();
        let depth = self.swapchain.depth();

        let mut recorder = CommandRecorder::new(self.context.device(), self.command_buffers[slot]);
        recorder.begin(vk::CommandBufferUsageFlags::empty())?;
        recorder.image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            color_attachment_masks(),
        )?;
        if let Some(depth) = depth {
            recorder.image_barrier(
                depth.image(),
                depth.aspect(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                depth_attachment_masks(),
            )?;
        }

        let color_attachments = [vk::RenderingAttachmentInfo::builder()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue { float32: CLEAR_COLOR },
            })
            .build()];
        let depth_attachment = depth.map(|depth| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(depth.view())
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: CLEAR_DEPTH,
                        stencil: 0,
                    },
                })
                .build()
        });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        {
            let mut pass = recorder.begin_rendering(&rendering_info)?;
            pass.set_viewport(vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(render_area);
            pass.bind_pipeline(self.pipeline.handle());
            pass.bind_descriptor_sets(self.pipeline.layout(), &self.descriptor_sets[slot..=slot]);
            pass.bind_vertex_buffer(self.vertices.handle);
            pass.bind_index_buffer(self.indices.handle);

            let index_count = self.indices.count as u32;
            for mvp in &self.mvps {
                pass.push_constants(
                    self.pipeline.layout(),
                    PUSH_CONSTANT_STAGES,
                    bytemuck::cast_slice(mvp.as_slice()),
                );
                pass.draw_indexed(index_count);
            }
        }

        recorder.image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            present_masks(),
        )?;
        recorder.end()
    }
}

/// Formats the pipeline must be built for to render into `swapchain`
fn attachment_formats(swapchain: &SwapchainView) -> AttachmentFormats {
    AttachmentFormats {
        color: swapchain.format().format,
        depth: swapchain.depth().map(|depth| depth.format()),
    }
}

impl FrameBackend for VulkanRenderer {
    fn swapchain_ready(&self) -> bool {
        self.swapchain.state() == ViewState::Ready
    }

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.sync.frame(slot).in_flight.wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let semaphore = self.sync.frame(slot).image_available.handle();
        let result = unsafe {
            self.swapchain
                .loader()
                .acquire_next_image(self.swapchain.handle(), u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => {
                self.slots[slot].acquired = true;
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal,
                })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.swapchain.mark_stale();
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.sync.frame(slot).in_flight.reset()?;
        self.slots[slot].fence_reset = true;
        CommandRecorder::new(self.context.device(), self.command_buffers[slot]).reset()
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        self.record_commands(slot, image_index)
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let sync = self.sync.frame(slot);
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[slot]];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device()
                .queue_submit(self.context.queue(), &[submit_info.build()], sync.in_flight.handle())
                .map_err(VulkanError::Api)?;
        }
        self.slots[slot] = SlotProgress::default();
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [self.sync.frame(slot).render_finished.handle()];
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain.loader().queue_present(self.context.queue(), &present_info) };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.swapchain.mark_stale();
                Ok(PresentOutcome::Stale)
            }
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let (width, height) = self.framebuffer_size;
        if width == 0 || height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "framebuffer is zero-sized".to_string(),
            });
        }

        self.swapchain.recreate(&self.context, self.use_depth, self.framebuffer_size)?;

        let formats = attachment_formats(&self.swapchain);
        if formats != self.pipeline.formats() {
            log::info!("Attachment formats changed to {:?}, rebuilding pipeline", formats);
            self.pipeline = GraphicsPipeline::new(
                self.context.device().clone(),
                &self.vertex_shader,
                &self.fragment_shader,
                &self.set_layout,
                formats,
            )?;
        }
        Ok(())
    }

    fn abandon(&mut self, slot: usize) {
        self.release_slot(slot);
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(err) = self.context.wait_idle() {
            log::warn!("device_wait_idle failed during shutdown: {}", err);
        }
        log::debug!(
            "Releasing renderer ({} buffers, texture {}x{})",
            self.buffers.len(),
            self.texture.extent().width,
            self.texture.extent().height
        );
    }
}
