//! Depth buffer management.
//!
//! The depth image is sized by the swapchain and rebuilt with it. Its format
//! is the first of [`DEPTH_FORMAT_CANDIDATES`] that the GPU can use as an
//! optimally tiled depth attachment. Right after creation the image is moved
//! from `UNDEFINED` into the attachment layout the render pass expects.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use vkframe_rhi::buffer::lock_allocator;
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first depth format usable as an optimally tiled attachment.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedDepthFormat`] if none of the candidates
/// qualifies.
pub fn find_depth_format(instance: &Instance, device: &Device) -> RhiResult<vk::Format> {
    select_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
        instance
            .handle()
            .get_physical_device_format_properties(device.physical_device(), format)
    })
}

fn select_format<F>(candidates: &[vk::Format], mut properties: F) -> RhiResult<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| {
            error!("find_depth_format: none of {:?} is supported", candidates);
            RhiError::UnsupportedDepthFormat(candidates.to_vec())
        })
}

#[inline]
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Access masks and pipeline stages for a supported layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Looks up the barrier parameters for `old -> new`.
///
/// The depth attachment transition is the only one this renderer performs.
pub fn layout_transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            })
        }
        (from, to) => {
            error!("layout_transition_masks: {:?} -> {:?} is not supported", from, to);
            Err(RhiError::UnsupportedLayoutTransition { from, to })
        }
    }
}

/// Depth image, its memory and its view.
///
/// Dropped in order view, image, allocation.
pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates the depth buffer and transitions it to
    /// `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` using a one-time command buffer.
    pub fn new(
        device: Arc<Device>,
        command_pool: &CommandPool,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None) }.map_err(
            |result| {
                error!("DepthBuffer::new: failed to create image: {:?}", result);
                RhiError::Creation {
                    object: "depth image",
                    result,
                }
            },
        )?;

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = lock_allocator(device.allocator()).and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: "depth_buffer",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                error!("DepthBuffer::new: failed to allocate memory: {}", e);
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        // Drop releases whatever has been created so far.
        let mut depth = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: Some(allocation),
            format,
            extent,
        };

        if let Some(allocation) = &depth.allocation {
            unsafe {
                depth.device.handle().bind_image_memory(
                    depth.image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(depth.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        depth.image_view = unsafe { depth.device.handle().create_image_view(&view_info, None) }
            .map_err(|result| {
                error!("DepthBuffer::new: failed to create view: {:?}", result);
                RhiError::Creation {
                    object: "depth image view",
                    result,
                }
            })?;

        depth.transition(
            command_pool,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;

        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(depth)
    }

    fn transition(
        &self,
        command_pool: &CommandPool,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = layout_transition_masks(old, new)?;

        let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
        if has_stencil_component(self.format) {
            aspect_mask |= vk::ImageAspectFlags::STENCIL;
        }

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        command_pool.submit_one_time(|cmd| {
            cmd.image_barrier(masks.src_stage, masks.dst_stage, &barrier);
            Ok(())
        })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.image_view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match lock_allocator(self.device.allocator()) {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free depth buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking depth buffer allocation: {}", e),
            }
        }

        debug!(
            "Destroyed depth buffer: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_capable() -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    #[test]
    fn test_select_format_prefers_first_supported() {
        let format = select_format(&DEPTH_FORMAT_CANDIDATES, |_| depth_capable()).unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_select_format_skips_unsupported() {
        let format = select_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                depth_capable()
            } else {
                vk::FormatProperties {
                    linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            }
        })
        .unwrap();
        assert_eq!(format, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn test_select_format_fails_without_support() {
        let result = select_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default());
        match result {
            Err(RhiError::UnsupportedDepthFormat(tried)) => {
                assert_eq!(tried, DEPTH_FORMAT_CANDIDATES.to_vec());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_stencil_component() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_depth_attachment_transition() {
        let masks = layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
        assert!(
            masks
                .dst_access
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
    }

    #[test]
    fn test_unknown_transition_is_rejected() {
        let result = layout_transition_masks(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
        );
        assert!(matches!(
            result,
            Err(RhiError::UnsupportedLayoutTransition {
                from: vk::ImageLayout::PRESENT_SRC_KHR,
                to: vk::ImageLayout::GENERAL,
            })
        ));
    }
}
