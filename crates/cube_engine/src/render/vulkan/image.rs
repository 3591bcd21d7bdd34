//! Device-local images and the depth buffer
//!
//! One allocation per image; the view is created alongside and owned by the
//! same wrapper.

use ash::{vk, Device};

use crate::render::vulkan::buffer::find_memory_type;
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Whether a depth format also carries stencil bits
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT | vk::Format::S8_UINT
    )
}

/// First candidate whose tiling supports every requested feature
///
/// `query` returns the format properties the device reports.
pub fn find_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    query: F,
) -> VulkanResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let properties = query(format);
            match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or(VulkanError::NoSupportedFormat)
}

/// Highest-precision depth format usable as an optimal-tiling attachment
pub fn choose_depth_format(context: &VulkanContext) -> VulkanResult<vk::Format> {
    let instance = context.instance();
    let physical_device = context.physical_device().device;
    find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| unsafe { instance.get_physical_device_format_properties(physical_device, format) },
    )
}

/// Create a 2D view over mip 0 / layer 0
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api) }
}

/// Parameters for a single-mip 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Size in pixels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Aspect used for the view
    pub aspect: vk::ImageAspectFlags,
}

/// Device-local image, its memory and a view
pub struct AllocatedImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl AllocatedImage {
    /// Create, allocate, bind and view an optimal-tiling image
    ///
    /// Anything created before a failing step is released when the partially
    /// built wrapper drops.
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> VulkanResult<Self> {
        let device = context.device().clone();

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.create_image(&create_info, None).map_err(VulkanError::Api)? };

        let mut allocated = Self {
            device,
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            format: desc.format,
            extent: desc.extent,
        };

        let requirements = unsafe { allocated.device.get_image_memory_requirements(image) };
        let memory_type = find_memory_type(
            &context.physical_device().memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        allocated.memory = unsafe {
            allocated
                .device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            allocated
                .device
                .bind_image_memory(image, allocated.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        allocated.view = create_image_view(&allocated.device, image, desc.format, desc.aspect)?;
        Ok(allocated)
    }

    /// Get the image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Get the view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if self.image != vk::Image::null() {
                self.device.destroy_image(self.image, None);
                self.image = vk::Image::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

/// Depth attachment shared by every frame
pub struct DepthBuffer {
    image: AllocatedImage,
}

impl DepthBuffer {
    /// Create a depth attachment matching `extent`
    pub fn new(context: &VulkanContext, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<Self> {
        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        let image = AllocatedImage::new(
            context,
            ImageDesc {
                extent,
                format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect,
            },
        )?;
        log::debug!("Depth buffer {}x{} {:?}", extent.width, extent.height, format);
        Ok(Self { image })
    }

    /// Get the depth image
    pub fn image(&self) -> vk::Image {
        self.image.image()
    }

    /// Get the depth view
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Depth format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    /// Aspect mask covering depth and, when present, stencil
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        if has_stencil_component(self.format()) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    }
}
