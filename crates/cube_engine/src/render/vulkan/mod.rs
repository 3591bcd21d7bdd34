//! Vulkan rendering backend
//!
//! Every GPU object is owned by a wrapper that releases it on drop and
//! tolerates never having been created.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod image;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex_layout;
pub mod window;

pub use buffer::{Buffer, BufferHandle, BufferHolder, DeviceBuffer, StagingBuffer};
pub use commands::{CommandPool, CommandRecorder};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use image::{AllocatedImage, DepthBuffer};
pub use pipeline::GraphicsPipeline;
pub use renderer::VulkanRenderer;
pub use shader::ShaderModule;
pub use swapchain::{SwapchainView, ViewState};
pub use sync::{Fence, FrameCounter, FrameSync, Semaphore, SyncManager, MAX_FRAMES_IN_FLIGHT};
pub use texture::{RgbaImage, Texture2D};
pub use window::{Window, WindowError};
