//! GPU buffer management.
//!
//! # Overview
//!
//! - [`BufferUsage`] picks Vulkan usage flags and memory location
//! - [`Buffer`] wraps a `vk::Buffer` with gpu-allocator managed memory
//! - [`UniformBuffer`] keeps one host-visible copy of a `Pod` block per swapchain image
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vbparts_rhi::device::Device;
//! use vbparts_rhi::buffer::{Buffer, BufferUsage, UniformBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vbparts_rhi::RhiError> {
//! let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer =
//!     Buffer::new_with_data(device.clone(), BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//!
//! let time = UniformBuffer::new(device, 3, 0.0f32)?;
//! time.update(1, &2.5)?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data written once by the CPU
    Vertex,
    /// 16-bit index data written once by the CPU
    Index,
    /// Per-frame shader constants
    Uniform,
    /// Written by a compute shader, then read as vertex input
    ParticleStorage,
    /// Host-visible source for buffer-to-image copies
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::ParticleStorage => {
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::VERTEX_BUFFER
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::ParticleStorage => MemoryLocation::GpuOnly,
            // Small, written from the CPU
            BufferUsage::Vertex
            | BufferUsage::Index
            | BufferUsage::Uniform
            | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::ParticleStorage => "particle storage",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer wrapper with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer initialized with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails or the memory is not host-visible.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would overrun the buffer or the memory
    /// is not mapped.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking {} buffer allocation: {}", self.usage.name(), e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// One uniform buffer per swapchain image holding a `T`.
///
/// Image `i` only ever reads copy `i`, so the CPU can write the copy for the
/// image it just acquired while older images are still in flight.
pub struct UniformBuffer<T: Pod> {
    buffers: Vec<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Creates `count` copies, each initialized to `initial`.
    ///
    /// # Errors
    ///
    /// Returns an error if any buffer creation fails.
    pub fn new(device: Arc<Device>, count: usize, initial: T) -> RhiResult<Self> {
        let buffers = (0..count)
            .map(|_| {
                Buffer::new_with_data(
                    device.clone(),
                    BufferUsage::Uniform,
                    bytemuck::bytes_of(&initial),
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            buffers,
            _marker: PhantomData,
        })
    }

    /// Overwrites copy `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `index` is out of range.
    pub fn update(&self, index: usize, value: &T) -> RhiResult<()> {
        self.buffers
            .get(index)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "uniform copy {} out of {}",
                    index,
                    self.buffers.len()
                ))
            })?
            .write_data(0, bytemuck::bytes_of(value))
    }

    /// Overwrites every copy.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    pub fn update_all(&self, value: &T) -> RhiResult<()> {
        for buffer in &self.buffers {
            buffer.write_data(0, bytemuck::bytes_of(value))?;
        }
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Returns the buffer backing copy `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn buffer(&self, index: usize) -> &Buffer {
        &self.buffers[index]
    }

    /// Borrowed buffers in image order, for descriptor writes.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_storage_is_vertex_and_storage() {
        let usage = BufferUsage::ParticleStorage.to_vk_usage();
        assert!(usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
        assert!(usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert_eq!(
            BufferUsage::ParticleStorage.memory_location(),
            MemoryLocation::GpuOnly
        );
    }

    #[test]
    fn test_host_written_buffers_are_mappable() {
        for usage in [
            BufferUsage::Vertex,
            BufferUsage::Index,
            BufferUsage::Uniform,
            BufferUsage::Staging,
        ] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu, "{}", usage.name());
        }
    }

    #[test]
    fn test_buffer_usage_flags() {
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
        assert_send_sync::<UniformBuffer<[f32; 4]>>();
    }
}
