//! GPU buffer management.
//!
//! Vertex and index data live in device-local memory and are filled once
//! through a staging buffer. Uniform buffers stay host-visible so the frame
//! loop can overwrite them every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::{Buffer, BufferUsage};
//! use vkframe_rhi::command::CommandPool;
//! use vkframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), vkframe_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// How a buffer is used, which fixes its usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Per-image shader constants, rewritten by the CPU every frame.
    Uniform,
    /// Host-visible source of a transfer.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Locks the device allocator, mapping a poisoned lock to an error.
pub fn lock_allocator(allocator: &Mutex<Allocator>) -> RhiResult<MutexGuard<'_, Allocator>> {
    allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
}

/// Buffer handle plus its gpu-allocator allocation.
///
/// Dropping the buffer frees the allocation, then destroys the handle.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BufferError`] for a zero size, or an allocator
    /// error if no memory type satisfies the usage.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::BufferError(format!(
                "{} buffer size must be greater than 0",
                usage.name()
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None) }.map_err(
            |result| {
                error!("Buffer::new: failed to create {} buffer: {:?}", usage.name(), result);
                RhiError::Creation {
                    object: "buffer",
                    result,
                }
            },
        )?;

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = lock_allocator(device.allocator()).and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location: usage.memory_location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                error!("Buffer::new: failed to allocate {} buffer memory: {}", usage.name(), e);
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on Drop cleans up on any failure.
        let buffer = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };

        if let Some(allocation) = &buffer.allocation {
            unsafe {
                buffer.device.handle().bind_buffer_memory(
                    buffer.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(buffer)
    }

    /// Creates a host-visible buffer holding `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and fills it through a staging buffer.
    ///
    /// Blocks until the copy has completed; the staging buffer is released
    /// before returning.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, staging.size())?;

        pool.submit_one_time(|cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), staging.size());
            Ok(())
        })?;

        debug!(
            "Uploaded {} bytes into device-local {} buffer",
            data.len(),
            usage.name()
        );

        Ok(buffer)
    }

    /// Copies `data` into host-visible memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BufferError`] if the range exceeds the buffer or
    /// the memory is not mapped.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        check_write_range(self.size, offset, data.len())?;

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::BufferError(format!("{} buffer memory is not mapped", self.usage.name()))
            })?;

        // SAFETY: the range was checked above and the mapping stays valid for
        // the allocation's lifetime.
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
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
            match lock_allocator(self.device.allocator()) {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} buffer allocation: {:?}", self.usage.name(), e);
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

fn check_write_range(size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::BufferError(format!(
            "write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_buffers_are_transfer_destinations() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert!(
                usage
                    .to_vk_usage()
                    .contains(vk::BufferUsageFlags::TRANSFER_DST)
            );
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
        }
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
    }

    #[test]
    fn test_host_visible_usages() {
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_write_range_checks() {
        assert!(check_write_range(64, 0, 64).is_ok());
        assert!(check_write_range(64, 32, 32).is_ok());
        assert!(matches!(
            check_write_range(64, 32, 33),
            Err(RhiError::BufferError(_))
        ));
        assert!(check_write_range(64, u64::MAX, 1).is_err());
    }
}
