//! GPU objects owned per frame slot and per swapchain image

use ash::{vk, Device};

use crate::render::camera::{CameraUniform, CAMERA_UNIFORM_SIZE};
use crate::render::vulkan::{
    CommandManager, Fence, Framebuffer, GpuBuffer, Semaphore, VulkanContext, VulkanResult,
};

/// Synchronization and camera buffers for one frame slot
pub struct FrameSlotResources {
    /// Signaled when the acquired image is ready
    pub image_acquired: Semaphore,
    /// Signaled when the slot's submission completes; created signaled
    pub in_flight: Fence,
    /// Host-visible camera record, rewritten every frame
    pub camera_staging: GpuBuffer,
    /// Device-local copy read by the projection stage
    pub camera_uniform: GpuBuffer,
}

impl FrameSlotResources {
    /// Create one slot's objects
    pub fn new(context: &VulkanContext, commands: &CommandManager) -> VulkanResult<Self> {
        let device = context.device().clone();
        let size = CAMERA_UNIFORM_SIZE as vk::DeviceSize;

        let mut camera_staging =
            GpuBuffer::host_visible(context, vk::BufferUsageFlags::TRANSFER_SRC, size)?;
        camera_staging.upload_pod(&[CameraUniform::default()])?;

        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
            camera_staging,
            camera_uniform: GpuBuffer::device_local(
                context,
                commands,
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                size,
                None,
            )?,
        })
    }
}

/// Objects sized by the swapchain image count
pub struct PerImageResources {
    /// Framebuffer over the image's view
    pub framebuffer: Framebuffer,
    /// Signaled when rendering into the image finished; presentation waits on it
    pub render_finished: Semaphore,
}

impl PerImageResources {
    /// Create the framebuffer and signal for one swapchain image
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        image_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        Ok(Self {
            framebuffer: Framebuffer::new(device.clone(), render_pass, image_view, extent)?,
            render_finished: Semaphore::new(device.clone())?,
        })
    }
}
