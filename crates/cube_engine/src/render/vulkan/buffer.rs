//! Buffer management and the staging upload path
//!
//! Every GPU buffer gets its own allocation. Device-local data is written
//! through a host-visible staging buffer that lives only for the duration of
//! the upload call.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};

/// Find a memory type allowed by `type_filter` that has every flag in `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = (memory_properties.memory_type_count as usize).min(memory_properties.memory_types.len());
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|&(index, memory_type)| {
            type_filter & (1 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Element count and byte size of an upload, rejecting empty input
pub fn upload_layout<T>(data: &[T]) -> VulkanResult<(usize, vk::DeviceSize)> {
    if data.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "Cannot upload an empty buffer".to_string(),
        });
    }
    Ok((data.len(), std::mem::size_of_val(data) as vk::DeviceSize))
}

/// Buffer wrapper with RAII cleanup
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer with its own memory allocation
    ///
    /// If allocation or binding fails the buffer handle is destroyed before
    /// the error is returned.
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mut created = Self {
            device,
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };

        let requirements = unsafe { created.device.get_buffer_memory_requirements(buffer) };
        let memory_type = find_memory_type(
            &context.physical_device().memory_properties,
            requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        created.memory = unsafe {
            created
                .device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            created
                .device
                .bind_buffer_memory(buffer, created.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(created)
    }

    /// Copy `bytes` into a host-visible buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {} bytes exceeds buffer size {}", bytes.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Copy the contents of a host-visible buffer out
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let len = self.size as usize;
        let mut bytes = vec![0_u8; len];
        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(bytes)
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.buffer != vk::Buffer::null() {
                self.device.destroy_buffer(self.buffer, None);
                self.buffer = vk::Buffer::null();
            }
            if self.memory != vk::DeviceMemory::null() {
                self.device.free_memory(self.memory, None);
                self.memory = vk::DeviceMemory::null();
            }
        }
    }
}

/// Host-visible, coherent transfer source
///
/// Dropped at the end of the upload that created it, whichever way that
/// upload exits.
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer holding a copy of `bytes`
    pub fn with_bytes(context: &VulkanContext, bytes: &[u8]) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(bytes)?;
        Ok(Self { buffer })
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Device-local buffer together with the number of elements it holds
pub struct DeviceBuffer {
    buffer: Buffer,
    count: usize,
}

impl DeviceBuffer {
    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of elements uploaded
    pub fn count(&self) -> usize {
        self.count
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Copyable reference to a buffer owned by a [`BufferHolder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    /// Raw buffer handle
    pub handle: vk::Buffer,
    /// Number of elements
    pub count: usize,
    /// Size in bytes
    pub size: vk::DeviceSize,
}

/// Upload `data` into a new device-local buffer
///
/// The staging copy is freed before this returns, on success and on every
/// error path.
pub fn upload_to_device<T: Pod>(
    data: &[T],
    usage: vk::BufferUsageFlags,
    context: &VulkanContext,
    pool: &CommandPool,
) -> VulkanResult<DeviceBuffer> {
    let (count, size) = upload_layout(data)?;
    let staging = StagingBuffer::with_bytes(context, bytemuck::cast_slice(data))?;

    let buffer = Buffer::new(
        context,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    pool.submit_single_time(context.queue(), |recorder| {
        recorder.copy_buffer(staging.handle(), buffer.handle(), size)
    })?;

    log::debug!("Uploaded {} elements ({} bytes) with usage {:?}", count, size, usage);
    Ok(DeviceBuffer { buffer, count })
}

/// Copy a device-local buffer back to the host
///
/// The buffer must have been created with `TRANSFER_SRC` usage.
pub fn read_back<T: Pod>(buffer: &DeviceBuffer, context: &VulkanContext, pool: &CommandPool) -> VulkanResult<Vec<T>> {
    let readback = Buffer::new(
        context,
        buffer.size(),
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    pool.submit_single_time(context.queue(), |recorder| {
        recorder.copy_buffer(buffer.handle(), readback.handle(), buffer.size())
    })?;

    let bytes = readback.read_bytes()?;
    Ok(bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Owns every static buffer uploaded at startup
#[derive(Default)]
pub struct BufferHolder {
    buffers: Vec<DeviceBuffer>,
}

impl BufferHolder {
    /// Create an empty holder
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `data` and keep the resulting buffer alive until the holder drops
    pub fn upload<T: Pod>(
        &mut self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        context: &VulkanContext,
        pool: &CommandPool,
    ) -> VulkanResult<BufferHandle> {
        let buffer = upload_to_device(data, usage, context, pool)?;
        let handle = BufferHandle {
            handle: buffer.handle(),
            count: buffer.count(),
            size: buffer.size(),
        };
        self.buffers.push(buffer);
        Ok(handle)
    }

    /// Number of buffers owned
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether nothing has been uploaded
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::VulkanRendererConfig;
    use crate::render::scene::{CUBE_INDICES, CUBE_VERTICES};

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, property_flags) in properties.memory_types.iter_mut().zip(flags) {
            slot.property_flags = *property_flags;
        }
        properties
    }

    #[test]
    fn test_find_memory_type_respects_filter_and_flags() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&properties, 0b111, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&properties, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert!(matches!(
            find_memory_type(&properties, 0b011, host),
            Err(VulkanError::NoSuitableMemoryType)
        ));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&properties, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn test_upload_layout_counts_elements() {
        assert_eq!(upload_layout(&CUBE_VERTICES).unwrap(), (120, 480));
        assert_eq!(upload_layout(&CUBE_INDICES).unwrap(), (36, 144));
        assert!(upload_layout::<f32>(&[]).is_err());
    }

    #[test]
    fn test_empty_holder_drops_cleanly() {
        let holder = BufferHolder::default();
        assert!(holder.is_empty());
        assert_eq!(holder.len(), 0);
        drop(holder);
    }

    fn headless() -> (VulkanContext, CommandPool) {
        let config = VulkanRendererConfig::default().with_validation(false);
        let context = VulkanContext::new(&config, &[]).expect("Vulkan device");
        let pool = CommandPool::new(context.device().clone(), context.queue_family_index()).expect("pool");
        (context, pool)
    }

    #[test]
    #[ignore = "requires a Vulkan 1.3 capable GPU"]
    fn test_upload_round_trip_on_gpu() {
        let (context, pool) = headless();
        let data: Vec<f32> = (0..120).map(|i| i as f32 * 0.5).collect();

        let buffer = upload_to_device(
            &data,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            &context,
            &pool,
        )
        .unwrap();
        let copied: Vec<f32> = read_back(&buffer, &context, &pool).unwrap();

        assert_eq!(bytemuck::cast_slice::<f32, u8>(&copied), bytemuck::cast_slice::<f32, u8>(&data));
        drop(buffer);
        drop(pool);
    }

    #[test]
    #[ignore = "requires a Vulkan 1.3 capable GPU"]
    fn test_holder_uploads_cube_geometry_on_gpu() {
        let (context, pool) = headless();
        let mut holder = BufferHolder::new();

        let vertices = holder
            .upload(&CUBE_VERTICES, vk::BufferUsageFlags::VERTEX_BUFFER, &context, &pool)
            .unwrap();
        let indices = holder
            .upload(&CUBE_INDICES, vk::BufferUsageFlags::INDEX_BUFFER, &context, &pool)
            .unwrap();

        assert_ne!(vertices.handle, vk::Buffer::null());
        assert_ne!(indices.handle, vk::Buffer::null());
        assert_eq!(vertices.count, 120);
        assert_eq!(indices.count, 36);
        assert_eq!(holder.len(), 2);
        drop(holder);
        drop(pool);
    }
}
