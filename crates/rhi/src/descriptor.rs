//! Descriptor sets for the per-image uniform buffer.
//!
//! The viewer binds exactly one resource to its shaders: a uniform buffer at
//! binding 0 read by the vertex stage. [`DescriptorSetLayout`] describes it,
//! [`DescriptorPool`] hands out one set per swapchain image, and
//! [`write_uniform_buffer`] points a set at its buffer.
//!
//! Destroying the pool releases every set allocated from it, so sets are
//! never freed individually.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Binding index of the matrix uniform buffer.
pub const UNIFORM_BINDING: u32 = 0;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates the layout with a single vertex-stage uniform buffer.
    pub fn uniform_buffer(device: Arc<Device>) -> RhiResult<Self> {
        let bindings = [uniform_buffer_binding(
            UNIFORM_BINDING,
            vk::ShaderStageFlags::VERTEX,
        )];
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)
        }
        .map_err(|result| {
            error!(
                "DescriptorSetLayout::uniform_buffer: creation failed: {:?}",
                result
            );
            RhiError::Creation {
                object: "descriptor set layout",
                result,
            }
        })?;

        debug!("Created descriptor set layout with {} binding(s)", bindings.len());

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Pool sized for `max_sets` uniform-buffer descriptor sets.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn for_uniform_buffers(device: Arc<Device>, max_sets: u32) -> RhiResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(max_sets)];

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None) }
            .map_err(|result| {
                error!("DescriptorPool::for_uniform_buffers: creation failed: {:?}", result);
                RhiError::Creation {
                    object: "descriptor pool",
                    result,
                }
            })?;

        debug!("Created descriptor pool: max_sets={}", max_sets);

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates `count` sets sharing `layout`.
    pub fn allocate(
        &self,
        layout: &DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Points `set` at the whole of `buffer` as its uniform buffer.
pub fn write_uniform_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let buffer_infos = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(UNIFORM_BINDING)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_infos);

    unsafe {
        device
            .handle()
            .update_descriptor_sets(std::slice::from_ref(&write), &[]);
    }
}

#[inline]
fn uniform_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = uniform_buffer_binding(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
