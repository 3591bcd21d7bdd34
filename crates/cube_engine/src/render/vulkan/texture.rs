//! Sampled 2D textures
//!
//! Pixels go through the same staging path as buffers, bracketed by the
//! layout transitions into and out of TRANSFER_DST_OPTIMAL.

use ash::{vk, Device};
use std::path::Path;

use crate::render::vulkan::buffer::StagingBuffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::image::{AllocatedImage, ImageDesc};

/// Texel format used for color textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Decoded RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 rows
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    /// Decode an image file, forcing four channels
    pub fn load(path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| VulkanError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|source| VulkanError::ImageDecode {
            path: path.display().to_string(),
            source,
        })?;
        let rgba = decoded.to_rgba8();

        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }

    /// Check that the pixel buffer matches the dimensions
    pub fn validate(&self) -> VulkanResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "RGBA image {}x{} has {} bytes, expected {}",
                    self.width,
                    self.height,
                    self.pixels.len(),
                    expected
                ),
            });
        }
        Ok(())
    }
}

/// Anisotropy to request from the sampler, if the feature is enabled
pub fn sampler_anisotropy(feature_enabled: bool, device_max: f32) -> Option<f32> {
    (feature_enabled && device_max >= 1.0).then_some(device_max)
}

/// Texture with image, memory, view and sampler
pub struct Texture2D {
    image: AllocatedImage,
    sampler: vk::Sampler,
    device: Device,
}

impl Texture2D {
    /// Load and upload an image file
    pub fn from_file(path: impl AsRef<Path>, context: &VulkanContext, pool: &CommandPool) -> VulkanResult<Self> {
        let path = path.as_ref();
        let image = RgbaImage::load(path)?;
        log::info!("Loaded texture {} ({}x{})", path.display(), image.width, image.height);
        Self::from_rgba(&image, context, pool)
    }

    /// Upload already decoded pixels
    pub fn from_rgba(source: &RgbaImage, context: &VulkanContext, pool: &CommandPool) -> VulkanResult<Self> {
        source.validate()?;
        let staging = StagingBuffer::with_bytes(context, &source.pixels)?;

        let extent = vk::Extent2D {
            width: source.width,
            height: source.height,
        };
        let image = AllocatedImage::new(
            context,
            ImageDesc {
                extent,
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        pool.submit_single_time(context.queue(), |recorder| {
            recorder.transition_image_layout(
                image.image(),
                TEXTURE_FORMAT,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            recorder.copy_buffer_to_image(staging.handle(), image.image(), extent)?;
            recorder.transition_image_layout(
                image.image(),
                TEXTURE_FORMAT,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;
        drop(staging);

        let physical_device = context.physical_device();
        let anisotropy = sampler_anisotropy(
            physical_device.anisotropy_enabled(),
            physical_device.properties.limits.max_sampler_anisotropy,
        );
        let sampler = create_sampler(context.device(), anisotropy)?;

        Ok(Self {
            image,
            sampler,
            device: context.device().clone(),
        })
    }

    /// Get the image view
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Get the sampler
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        if self.sampler != vk::Sampler::null() {
            unsafe { self.device.destroy_sampler(self.sampler, None) };
            self.sampler = vk::Sampler::null();
        }
    }
}

fn create_sampler(device: &Device, anisotropy: Option<f32>) -> VulkanResult<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(anisotropy.is_some())
        .max_anisotropy(anisotropy.unwrap_or(1.0))
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::Api) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_follows_device_limit() {
        assert_eq!(sampler_anisotropy(true, 16.0), Some(16.0));
        assert_eq!(sampler_anisotropy(false, 16.0), None);
        assert_eq!(sampler_anisotropy(true, 0.0), None);
    }

    #[test]
    fn test_rgba_validation() {
        let ok = RgbaImage {
            width: 2,
            height: 1,
            pixels: vec![0; 8],
        };
        assert!(ok.validate().is_ok());

        let short = RgbaImage {
            width: 2,
            height: 2,
            pixels: vec![0; 8],
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RgbaImage::load("no/such/texture.png");
        assert!(matches!(result, Err(VulkanError::Io { .. })));
    }

    #[test]
    fn test_decoded_png_is_forced_to_rgba() {
        let gray = image::GrayImage::from_pixel(3, 2, image::Luma([200]));
        let mut encoded = std::io::Cursor::new(Vec::new());
        gray.write_to(&mut encoded, image::ImageFormat::Png).unwrap();

        let path = std::env::temp_dir().join("cube_engine_texture_test.png");
        std::fs::write(&path, encoded.into_inner()).unwrap();
        let loaded = RgbaImage::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((loaded.width, loaded.height), (3, 2));
        assert_eq!(loaded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&loaded.pixels[..4], &[200, 200, 200, 255]);
    }
}
