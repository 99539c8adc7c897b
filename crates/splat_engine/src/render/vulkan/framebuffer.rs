//! Presentation framebuffers
//!
//! Splats are composited by compute; the only attachment is the swapchain image
//! the present pass clears. One framebuffer exists per swapchain image and is
//! rebuilt with it.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Single-attachment framebuffer for the present pass
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over one swapchain image view
    ///
    /// `extent` must be the swapchain extent the view was created for.
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        image_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let attachments = [image_view];
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device.create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// Handle passed to `CommandRecorder::begin_render_pass`
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
