//! Swapchain management.
//!
//! [`SwapchainConfig::select`] turns the surface's reported capabilities and
//! the current framebuffer size into a deterministic swapchain configuration:
//!
//! - **Format**: `B8G8R8A8_UNORM` with `SRGB_NONLINEAR`, otherwise the first
//!   format the surface reports.
//! - **Present mode**: `MAILBOX`, otherwise `FIFO` (always supported).
//! - **Extent**: the surface's current extent, unless its width is the
//!   `u32::MAX` sentinel, in which case the framebuffer size clamped into
//!   `[min_image_extent, max_image_extent]`.
//! - **Image count**: `min_image_count + 1`, capped at `max_image_count`
//!   when that is non-zero.
//!
//! [`Swapchain`] builds the swapchain and one view per image, and tears both
//! down again on [`Swapchain::destroy`] or drop.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Surface format the swapchain asks for first.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The negotiated swapchain parameters.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    /// Chooses format, present mode, extent and image count.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface reports no formats.
    pub fn select(
        support: &SwapchainSupportDetails,
        framebuffer_width: u32,
        framebuffer_height: u32,
    ) -> RhiResult<Self> {
        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("surface reports no formats".to_string())
        })?;

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(
                &support.capabilities,
                framebuffer_width,
                framebuffer_height,
            ),
            image_count: determine_image_count(&support.capabilities),
        })
    }
}

/// Vulkan swapchain together with the views of its images.
///
/// The swapchain keeps its own copy of the surface and surface loader so it
/// can be rebuilt from nothing but a new framebuffer size.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    /// Creates a swapchain for the given surface and framebuffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface queries fail, the surface offers no
    /// usable format or present mode, or swapchain or view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        framebuffer_width: u32,
        framebuffer_height: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut swapchain = Self {
            device,
            swapchain_loader,
            surface_loader: surface_loader.clone(),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            config: SwapchainConfig {
                surface_format: PREFERRED_SURFACE_FORMAT,
                present_mode: vk::PresentModeKHR::FIFO,
                extent: vk::Extent2D::default(),
                image_count: 0,
            },
        };
        swapchain.build(framebuffer_width, framebuffer_height)?;
        Ok(swapchain)
    }

    /// Builds the swapchain and its views into an empty wrapper.
    fn build(&mut self, framebuffer_width: u32, framebuffer_height: u32) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let config = SwapchainConfig::select(&support, framebuffer_width, framebuffer_height)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            config.extent.width,
            config.extent.height,
            config.surface_format.format,
            config.surface_format.color_space,
            config.present_mode,
            config.image_count
        );

        let graphics_family = self.device.graphics_family();
        let present_family = self.device.present_family();
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &queue_family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|result| {
                error!("Swapchain::build: failed to create swapchain: {:?}", result);
                RhiError::Creation {
                    object: "swapchain",
                    result,
                }
            })?;
        self.swapchain = swapchain;
        self.config = config;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        self.image_views =
            create_image_views(&self.device, &self.images, config.surface_format.format)?;

        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Tears down and rebuilds the swapchain for a new framebuffer size.
    ///
    /// The caller must make sure the GPU no longer uses any swapchain image,
    /// typically by waiting for the device to go idle.
    pub fn recreate(&mut self, framebuffer_width: u32, framebuffer_height: u32) -> RhiResult<()> {
        info!(
            "Recreating swapchain for framebuffer {}x{}",
            framebuffer_width, framebuffer_height
        );
        self.destroy();
        self.build(framebuffer_width, framebuffer_height)
    }

    /// Acquires the next presentable image, signaling `semaphore` when it is
    /// ready. Blocks without a timeout.
    ///
    /// Returns `(image_index, suboptimal)`. Stale-surface conditions come back
    /// as the raw `vk::Result` for the caller to classify.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// Returns true if the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    /// Number of images the driver actually created.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// True once the swapchain has been torn down.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.swapchain == vk::SwapchainKHR::null()
    }

    /// Destroys the image views, then the swapchain, leaving an empty
    /// wrapper. Does nothing if already destroyed.
    pub fn destroy(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();

        if self.is_destroyed() {
            return;
        }

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.config.extent.width,
            self.config.extent.height,
            self.images.len()
        );
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Picks [`PREFERRED_SURFACE_FORMAT`] if offered, else the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let Some(&preferred) = formats.iter().find(|f| is_preferred_format(f)) {
        return Some(preferred);
    }

    let first = formats.first().copied()?;
    warn!(
        "Preferred surface format unavailable, using {:?} / {:?}",
        first.format, first.color_space
    );
    Some(first)
}

fn is_preferred_format(format: &vk::SurfaceFormatKHR) -> bool {
    format.format == PREFERRED_SURFACE_FORMAT.format
        && format.color_space == PREFERRED_SURFACE_FORMAT.color_space
}

/// MAILBOX when available, FIFO otherwise.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's extent unless it carries the `u32::MAX` sentinel.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_width: u32,
    framebuffer_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    // Not `clamp`: a driver reporting min > max must not panic us.
    vk::Extent2D {
        width: framebuffer_width.max(min.width).min(max.width),
        height: framebuffer_height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by a non-zero maximum.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(result) => {
                error!("Swapchain: failed to create image view: {:?}", result);
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::Creation {
                    object: "swapchain image view",
                    result,
                });
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn assert_extent(extent: vk::Extent2D, width: u32, height: u32) {
        assert_eq!((extent.width, extent.height), (width, height));
    }

    fn sentinel_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_srgb_nonlinear() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_requires_matching_color_space() {
        let formats = vec![
            format(
                vk::Format::A2B10G10R10_UNORM_PACK32,
                vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            ),
            format(
                vk::Format::B8G8R8A8_UNORM,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::A2B10G10R10_UNORM_PACK32);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::HDR10_ST2084_EXT);
    }

    #[test]
    fn test_choose_surface_format_empty() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_returns_reported_extent_unchanged() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..sentinel_caps()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_extent(extent, 1920, 1080);

        // Reported extents outside the limits are still returned verbatim.
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 5000,
                height: 10,
            },
            ..sentinel_caps()
        };
        assert_eq!(choose_extent(&capabilities, 800, 600).width, 5000);
    }

    #[test]
    fn test_choose_extent_clamps_framebuffer_on_sentinel() {
        let capabilities = sentinel_caps();

        assert_extent(choose_extent(&capabilities, 3000, 3000), 2000, 2000);
        assert_extent(choose_extent(&capabilities, 50, 50), 100, 100);
        assert_extent(choose_extent(&capabilities, 800, 600), 800, 600);
        // Each axis is clamped on its own.
        assert_extent(choose_extent(&capabilities, 50, 2500), 100, 2000);
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 4);
    }

    #[test]
    fn test_select_combines_all_choices() {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                ..sentinel_caps()
            },
            formats: vec![
                format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                PREFERRED_SURFACE_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let config = SwapchainConfig::select(&support, 900, 900).unwrap();
        assert!(is_preferred_format(&config.surface_format));
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_extent(config.extent, 900, 900);
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn test_select_rejects_empty_format_list() {
        let support = SwapchainSupportDetails {
            capabilities: sentinel_caps(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainConfig::select(&support, 800, 600),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate.clone()
        };
        assert!(!no_modes.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate
        };
        assert!(!no_formats.is_adequate());
    }
}
