//! Command buffer management
//!
//! One pool of long-lived per-frame recordings, re-recorded from scratch every
//! frame, plus a separate synchronous path for one-shot transfers.

use ash::{vk, Device};

use super::{Fence, VulkanContext, VulkanError, VulkanResult};
use crate::render::frame::FRAMES_IN_FLIGHT;

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device.create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device.allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffers.
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Per-frame recordings and the immediate submission path
pub struct CommandManager {
    device: Device,
    queue: vk::Queue,
    frame_buffers: Vec<vk::CommandBuffer>,
    immediate_buffer: vk::CommandBuffer,
    immediate_fence: Fence,
    // Pools are only kept alive here; they drop after the fence.
    #[allow(dead_code)]
    immediate_pool: CommandPool,
    #[allow(dead_code)]
    frame_pool: CommandPool,
}

impl CommandManager {
    /// Create pools on the graphics queue family
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.device().clone();
        let family = context.graphics_queue_family();

        let frame_pool = CommandPool::new(device.clone(), family)?;
        let frame_buffers = frame_pool.allocate_command_buffers(FRAMES_IN_FLIGHT as u32)?;

        let immediate_pool = CommandPool::new(device.clone(), family)?;
        let immediate_buffer = immediate_pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No immediate command buffer".to_string()))?;
        // Signaled so the first immediate submit does not block.
        let immediate_fence = Fence::new(device.clone(), true)?;

        log::debug!("Command manager ready: {} frame recordings", frame_buffers.len());

        Ok(Self {
            device,
            queue: context.graphics_queue(),
            frame_buffers,
            immediate_buffer,
            immediate_fence,
            immediate_pool,
            frame_pool,
        })
    }

    /// The slot's long-lived recording
    pub fn frame_command_buffer(&self, slot: usize) -> VulkanResult<vk::CommandBuffer> {
        self.frame_buffers.get(slot).copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {slot} out of range"),
        })
    }

    /// Reset the slot's recording and begin a fresh one
    pub fn begin_frame(&self, slot: usize) -> VulkanResult<CommandRecorder> {
        let command_buffer = self.frame_command_buffer(slot)?;

        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }

        let mut recorder = CommandRecorder::new(command_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        Ok(recorder)
    }

    /// Record, submit and wait for a one-shot command buffer
    ///
    /// Fully synchronous and serialized; meant for setup-time transfers only.
    /// The fence is reset only once the recording is complete, so a failed
    /// `record` leaves the manager ready for the next call.
    pub fn immediate_submit<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> VulkanResult<()>,
    {
        self.immediate_fence.wait()?;

        unsafe {
            self.device
                .reset_command_buffer(self.immediate_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }

        let mut recorder = CommandRecorder::new(self.immediate_buffer, self.device.clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(&self.device, self.immediate_buffer)?;
        let command_buffer = recorder.end()?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        self.immediate_fence.reset()?;
        let submitted = unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], self.immediate_fence.handle())
                .map_err(VulkanError::Api)
        };
        if let Err(e) = submitted {
            self.immediate_fence.signal_on(self.queue)?;
            return Err(e);
        }

        self.immediate_fence.wait()
    }

    #[cfg(test)]
    fn immediate_fence_signaled(&self) -> VulkanResult<bool> {
        self.immediate_fence.is_signaled()
    }
}

/// Type-safe command buffer recorder
pub struct CommandRecorder {
    command_buffer: vk::CommandBuffer,
    device: Device,
    recording: bool,
}

impl CommandRecorder {
    /// Wrap a command buffer that is not yet recording
    pub fn new(command_buffer: vk::CommandBuffer, device: Device) -> Self {
        Self {
            command_buffer,
            device,
            recording: false,
        }
    }

    /// Begin command recording
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<&mut Self> {
        if self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string()
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.recording = true;
        Ok(self)
    }

    /// Raw handle for commands issued by other components
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Device the buffer was allocated from
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Begin an inline render pass; it ends when the guard drops
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> VulkanResult<ActiveRenderPass<'_>> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string()
            });
        }

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(ActiveRenderPass { recorder: self })
    }

    /// End command recording
    pub fn end(mut self) -> VulkanResult<vk::CommandBuffer> {
        if !self.recording {
            return Err(VulkanError::InvalidOperation {
                reason: "Command buffer not recording".to_string()
            });
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.recording = false;
        Ok(self.command_buffer)
    }
}

/// Active render pass, ended on drop
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
}

impl Drop for ActiveRenderPass<'_> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_immediate_recording_keeps_manager_usable() {
        let context = match VulkanContext::headless("splat_engine command tests") {
            Ok(context) => context,
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                return;
            }
        };
        let commands = CommandManager::new(&context).unwrap();

        let failed = commands.immediate_submit(|_, _| {
            Err(VulkanError::InvalidOperation {
                reason: "copy rejected".to_string(),
            })
        });
        assert!(matches!(failed, Err(VulkanError::InvalidOperation { .. })));
        assert!(commands.immediate_fence_signaled().unwrap());

        commands.immediate_submit(|_, _| Ok(())).unwrap();
        assert!(commands.immediate_fence_signaled().unwrap());
    }
}
