//! Surface, swapchain, per-image views and the depth attachment
//!
//! [`SwapchainView`] walks a small state machine:
//!
//! ```text
//! Unbound ──surface──▶ Bound ──recreate──▶ Ready ◀──recreate── Stale
//!                                            └─────mark_stale────▶┘
//! any ──destroy──▶ Destroyed
//! ```
//!
//! Image views are only ever replaced as a whole list, so the number of
//! views always equals the number of swapchain images (both may be zero).

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::image::{choose_depth_format, create_image_view, DepthBuffer};
use crate::render::vulkan::window::Window;

/// Lifecycle of a [`SwapchainView`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No surface yet
    Unbound,
    /// Surface exists, no swapchain yet
    Bound,
    /// Swapchain, views and depth match the surface
    Ready,
    /// Needs a recreate before the next frame
    Stale,
    /// Everything released
    Destroyed,
}

impl ViewState {
    /// Whether a recreate may run from this state
    pub fn can_recreate(self) -> bool {
        matches!(self, ViewState::Bound | ViewState::Ready | ViewState::Stale)
    }

    /// State after a stale notification
    pub fn marked_stale(self) -> Self {
        match self {
            ViewState::Ready => ViewState::Stale,
            other => other,
        }
    }

    /// Whether `destroy` still has handles to release
    ///
    /// True even for `Unbound`: teardown skips null handles one by one.
    pub fn needs_teardown(self) -> bool {
        self != ViewState::Destroyed
    }

    /// State after a recreate attempt
    pub fn after_recreate(self, succeeded: bool) -> Self {
        match (self.can_recreate(), succeeded) {
            (false, _) => self,
            (true, true) => ViewState::Ready,
            (true, false) => ViewState::Stale,
        }
    }
}

/// What the surface reports about itself
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    /// Extent limits, transform and image counts
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query the surface through the physical device
    pub fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// B8G8R8A8_SRGB with sRGB non-linear color space, else the first reported
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first().copied())
        .ok_or(VulkanError::NoSupportedFormat)
}

/// MAILBOX when available, otherwise FIFO (always supported)
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the framebuffer size clamped to the surface limits
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Swapchain image usage: always color attachment, transfer source when offered
pub fn choose_image_usage(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    let wanted = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC;
    wanted & (capabilities.supported_usage_flags | vk::ImageUsageFlags::COLOR_ATTACHMENT)
}

/// Build one view per image, all or nothing
///
/// When `create` fails part way, the views made so far are handed to
/// `destroy` and the error is returned, so callers never hold a partial list.
pub fn build_views<C, D>(images: &[vk::Image], mut create: C, mut destroy: D) -> VulkanResult<Vec<vk::ImageView>>
where
    C: FnMut(vk::Image) -> VulkanResult<vk::ImageView>,
    D: FnMut(vk::ImageView),
{
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        match create(image) {
            Ok(view) => views.push(view),
            Err(err) => {
                views.drain(..).for_each(&mut destroy);
                return Err(err);
            }
        }
    }
    Ok(views)
}

/// Everything tied to the window surface
pub struct SwapchainView {
    state: ViewState,
    device: Device,
    surface_loader: Surface,
    swapchain_loader: SwapchainLoader,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Option<DepthBuffer>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl SwapchainView {
    /// Create the surface for `window` and build the first swapchain
    pub fn new(context: &VulkanContext, window: &mut Window, use_depth: bool) -> VulkanResult<Self> {
        let surface = window.create_vulkan_surface(context.instance().handle())?;

        let mut view = Self {
            state: ViewState::Unbound,
            device: context.device().clone(),
            surface_loader: context.surface_loader().clone(),
            swapchain_loader: context.swapchain_loader().clone(),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
        };
        view.state = ViewState::Bound;

        let supported = unsafe {
            view.surface_loader
                .get_physical_device_surface_support(
                    context.physical_device().device,
                    context.queue_family_index(),
                    surface,
                )
                .map_err(VulkanError::Api)?
        };
        if !supported {
            return Err(VulkanError::PresentationNotSupported(context.queue_family_index()));
        }

        view.recreate(context, use_depth, window.get_framebuffer_size())?;
        Ok(view)
    }

    /// Flag the swapchain as no longer matching the surface
    pub fn mark_stale(&mut self) {
        self.state = self.state.marked_stale();
    }

    /// Rebuild swapchain, views and (optionally) depth for the current surface
    ///
    /// The caller must make sure the device is idle.
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        use_depth: bool,
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<()> {
        if !self.state.can_recreate() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("cannot recreate swapchain in state {:?}", self.state),
            });
        }

        let result = self.rebuild(context, use_depth, framebuffer_size);
        self.state = self.state.after_recreate(result.is_ok());
        result
    }

    fn rebuild(&mut self, context: &VulkanContext, use_depth: bool, framebuffer_size: (u32, u32)) -> VulkanResult<()> {
        let support = SwapchainSupport::query(&self.surface_loader, context.physical_device().device, self.surface)?;
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "surface has zero extent".to_string(),
            });
        }

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(support.capabilities.min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(choose_image_usage(&support.capabilities))
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        self.destroy_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.format = format;
        self.extent = extent;

        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };
        let device = &self.device;
        self.image_views = build_views(
            &images,
            |image| create_image_view(device, image, format.format, vk::ImageAspectFlags::COLOR),
            |view| unsafe { device.destroy_image_view(view, None) },
        )?;
        self.images = images;

        self.depth = None;
        if use_depth {
            let depth_format = choose_depth_format(context)?;
            self.depth = Some(DepthBuffer::new(context, extent, depth_format)?);
        }

        log::info!(
            "Swapchain {}x{} {:?} {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            self.images.len()
        );
        Ok(())
    }

    fn destroy_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.images.clear();
    }

    /// Release views, swapchain, depth and surface
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn destroy(&mut self) {
        if !self.state.needs_teardown() {
            return;
        }

        self.destroy_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.depth = None;
        if self.surface != vk::SurfaceKHR::null() {
            unsafe { self.surface_loader.destroy_surface(self.surface, None) };
            self.surface = vk::SurfaceKHR::null();
        }
        self.state = ViewState::Destroyed;
    }

    /// Current lifecycle state
    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Swapchain images
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Depth attachment, when enabled
    pub fn depth(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    /// Surface format in use
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for SwapchainView {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_current_extent() {
        let caps = capabilities(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let extent = choose_extent(&caps, (1024, 768));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_framebuffer_when_undefined() {
        let caps = capabilities(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (800, 600));

        let extent = choose_extent(&caps, (10_000, 0));
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn test_fifo_only_selects_fifo() {
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_mailbox_preferred() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_srgb_surface_format_preferred() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap(), srgb);
        assert_eq!(choose_surface_format(&[unorm]).unwrap(), unorm);
        assert!(matches!(choose_surface_format(&[]), Err(VulkanError::NoSupportedFormat)));
    }

    #[test]
    fn test_image_usage_drops_unsupported_transfer() {
        let mut caps = capabilities(vk::Extent2D::default());
        assert!(choose_image_usage(&caps).contains(vk::ImageUsageFlags::TRANSFER_SRC));

        caps.supported_usage_flags = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        assert_eq!(choose_image_usage(&caps), vk::ImageUsageFlags::COLOR_ATTACHMENT);
    }

    #[test]
    fn test_view_count_matches_image_count() {
        let images: Vec<vk::Image> = (1..=3).map(vk::Image::from_raw).collect();
        let views = build_views(&images, |image| Ok(vk::ImageView::from_raw(image.as_raw() + 100)), |_| {}).unwrap();
        assert_eq!(views.len(), images.len());
    }

    #[test]
    fn test_failed_view_leaves_no_partial_list() {
        let images: Vec<vk::Image> = (1..=4).map(vk::Image::from_raw).collect();
        let mut destroyed = Vec::new();
        let result = build_views(
            &images,
            |image| {
                if image.as_raw() == 3 {
                    Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
                } else {
                    Ok(vk::ImageView::from_raw(image.as_raw() + 100))
                }
            },
            |view| destroyed.push(view.as_raw()),
        );
        assert!(result.is_err());
        assert_eq!(destroyed, vec![101, 102]);
    }

    #[test]
    fn test_state_transitions() {
        assert!(!ViewState::Unbound.can_recreate());
        assert_eq!(ViewState::Bound.after_recreate(true), ViewState::Ready);
        assert_eq!(ViewState::Ready.marked_stale(), ViewState::Stale);
        assert_eq!(ViewState::Stale.after_recreate(true), ViewState::Ready);
        assert_eq!(ViewState::Stale.after_recreate(false), ViewState::Stale);
        assert_eq!(ViewState::Bound.marked_stale(), ViewState::Bound);
        assert_eq!(ViewState::Destroyed.after_recreate(true), ViewState::Destroyed);
        assert_eq!(ViewState::Destroyed.marked_stale(), ViewState::Destroyed);
    }

    // Handle wrappers (buffers, images, sync objects, pipeline, descriptors)
    // null-check in Drop, so a never-created handle is skipped by construction.
    #[test]
    fn test_destroy_is_terminal_and_repeatable() {
        for start in [ViewState::Unbound, ViewState::Bound, ViewState::Ready, ViewState::Stale] {
            assert!(start.needs_teardown(), "{:?} must release its handles", start);
        }

        let destroyed = ViewState::Destroyed;
        assert!(!destroyed.needs_teardown());
        assert!(!destroyed.can_recreate());
        assert_eq!(destroyed.marked_stale(), ViewState::Destroyed);
        assert_eq!(destroyed.after_recreate(false), ViewState::Destroyed);
    }

    #[test]
    #[ignore = "requires a display and a Vulkan 1.3 capable GPU"]
    fn test_views_follow_images_on_gpu() {
        use crate::core::config::VulkanRendererConfig;

        let mut window = Window::new("swapchain test", 320, 240).expect("window");
        let extensions = window.get_required_instance_extensions().expect("extensions");
        let config = VulkanRendererConfig::default().with_validation(false);
        let context = VulkanContext::new(&config, &extensions).expect("Vulkan device");

        let mut view = SwapchainView::new(&context, &mut window, true).expect("swapchain");
        assert_eq!(view.state(), ViewState::Ready);
        assert!(!view.images().is_empty());
        assert_eq!(view.image_views().len(), view.images().len());
        assert!(view.depth().is_some());

        view.mark_stale();
        view.recreate(&context, false, window.get_framebuffer_size()).expect("recreate");
        assert_eq!(view.image_views().len(), view.images().len());
        assert!(view.depth().is_none());

        view.destroy();
        view.destroy();
        assert_eq!(view.state(), ViewState::Destroyed);
    }
}
