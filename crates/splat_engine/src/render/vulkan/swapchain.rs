//! Vulkan swapchain management
//!
//! Handles swapchain creation and in-place recreation following RAII principles.
//! Selection policy lives in small free functions so it can be tested without a surface.

use ash::{vk, Device};
use ash::extensions::khr::Swapchain as SwapchainLoader;

use super::{VulkanContext, VulkanError, VulkanResult, WAIT_FOREVER};

/// Preferred surface format
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the preferred format/color-space pair, else the first reported one
pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|sf| sf.format == PREFERRED_FORMAT.format && sf.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| available.first())
        .copied()
}

/// Prefer MAILBOX; FIFO is always supported
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    available
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's fixed extent, or clamp the framebuffer size when the surface is adaptive
///
/// Never returns a zero dimension; a swapchain cannot be created with one.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return vk::Extent2D {
            width: caps.current_extent.width.max(1),
            height: caps.current_extent.height.max(1),
        };
    }

    let fit = |size: u32, min: u32, max: u32| size.min(max).max(min).max(1);
    vk::Extent2D {
        width: fit(window_extent.width, caps.min_image_extent.width, caps.max_image_extent.width),
        height: fit(window_extent.height, caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped when the surface reports a maximum
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain for the context's surface
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let mut swapchain = Self {
            device: context.device().clone(),
            swapchain_loader: context.swapchain_loader()?.clone(),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: PREFERRED_FORMAT,
            extent: vk::Extent2D::default(),
        };
        swapchain.build(context, window_extent)?;

        log::info!(
            "Swapchain created: {:?}/{:?}, {}x{}, {} images",
            swapchain.format.format,
            swapchain.format.color_space,
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len()
        );
        Ok(swapchain)
    }

    /// Rebuild images and views in place, handing the old swapchain to the driver
    ///
    /// The device must be idle.
    pub fn recreate(&mut self, context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<()> {
        self.destroy_image_views();
        self.build(context, window_extent)?;

        log::info!(
            "Swapchain recreated: {}x{}, {} images",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(())
    }

    fn build(&mut self, context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<()> {
        let surface = context.surface().ok_or_else(|| {
            VulkanError::InitializationFailed("Swapchain requires a presentation surface".to_string())
        })?;
        let surface_loader = context.surface_loader();
        let physical_device = context.physical_device().device;

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(VulkanError::Api)?
        };
        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(VulkanError::Api)?
        };

        let format = choose_surface_format(&surface_formats).ok_or_else(|| {
            VulkanError::InitializationFailed("Surface reports no formats".to_string())
        })?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&surface_caps, window_extent);
        let image_count = choose_image_count(&surface_caps);

        let queue_families = [context.graphics_queue_family(), context.present_queue_family()];
        let old_swapchain = self.swapchain;

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if queue_families[0] == queue_families[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        // The old handle is retired once the new one exists.
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.images.clear();

        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };
        let image_views = self.create_image_views(&images, format.format)?;

        self.images = images;
        self.image_views = image_views;
        self.format = format;
        self.extent = extent;

        log::debug!("Swapchain present mode {:?}, requested {} images", present_mode, image_count);
        Ok(())
    }

    /// One view per image; on failure the views made so far are destroyed
    fn create_image_views(&self, images: &[vk::Image], format: vk::Format) -> VulkanResult<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(images.len());
        for &image in images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match unsafe { self.device.create_image_view(&create_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        unsafe { self.device.destroy_image_view(view, None) };
                    }
                    return Err(VulkanError::Api(e));
                }
            }
        }
        Ok(views)
    }

    fn destroy_image_views(&mut self) {
        for image_view in self.image_views.drain(..) {
            unsafe { self.device.destroy_image_view(image_view, None) };
        }
    }

    /// Acquire the next image, signaling `acquired` when it is ready
    ///
    /// Returns the image index and the suboptimal flag.
    pub fn acquire_next_image(&self, acquired: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                WAIT_FOREVER,
                acquired,
                vk::Fence::null(),
            )
        }
    }

    /// Queue an image for presentation; `Ok(true)` means suboptimal
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Number of presentable images actually created
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2048 },
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_format_prefers_srgb_pair() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, PREFERRED_FORMAT]), Some(PREFERRED_FORMAT));
        assert_eq!(choose_surface_format(&[unorm]), Some(unorm));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_surface_format_requires_matching_color_space() {
        let wrong_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        let other = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[wrong_space, other]), Some(wrong_space));
    }

    #[test]
    fn test_present_mode_fallback() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_extent_uses_fixed_surface_extent() {
        let window = vk::Extent2D { width: 10, height: 10 };
        assert_eq!(
            choose_extent(&caps((1280, 720), 2, 3), window),
            vk::Extent2D { width: 1280, height: 720 }
        );
    }

    #[test]
    fn test_extent_clamps_adaptive_surface() {
        let adaptive = caps((u32::MAX, u32::MAX), 2, 3);
        assert_eq!(
            choose_extent(&adaptive, vk::Extent2D { width: 800, height: 600 }),
            vk::Extent2D { width: 800, height: 600 }
        );
        assert_eq!(
            choose_extent(&adaptive, vk::Extent2D { width: 10, height: 9000 }),
            vk::Extent2D { width: 64, height: 2048 }
        );
    }

    #[test]
    fn test_extent_never_zero() {
        let window = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(
            choose_extent(&caps((0, 0), 2, 3), window),
            vk::Extent2D { width: 1, height: 1 }
        );

        let mut adaptive = caps((u32::MAX, u32::MAX), 2, 3);
        adaptive.min_image_extent = vk::Extent2D { width: 0, height: 0 };
        assert_eq!(
            choose_extent(&adaptive, vk::Extent2D { width: 0, height: 0 }),
            vk::Extent2D { width: 1, height: 1 }
        );
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 2, 8)), 3);
        assert_eq!(choose_image_count(&caps((1, 1), 3, 3)), 3);
    }
}
