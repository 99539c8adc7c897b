//! Vulkan implementation of the frame engine's GPU seam

use ash::vk;

use super::frame_resources::PerImageResources;
use super::RenderResources;
use crate::render::camera::CameraUniform;
use crate::render::frame::{
    rebuild_per_image, AcquireOutcome, FrameBackend, FramePlan, PresentOutcome, SurfaceInfo,
};
use crate::render::stages::ProjectionParams;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Borrowed view of the renderer for one engine call
pub(super) struct VulkanFrameBackend<'a> {
    pub(super) context: &'a VulkanContext,
    pub(super) resources: &'a mut RenderResources,
    pub(super) clear_color: [f32; 4],
}

impl VulkanFrameBackend<'_> {
    fn slot(&self, slot: usize) -> VulkanResult<&super::FrameSlotResources> {
        self.resources.frame_slots.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {slot} out of range"),
        })
    }

    fn image(&self, image_index: u32) -> VulkanResult<&PerImageResources> {
        self.resources
            .per_image
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("Swapchain image {image_index} has no framebuffer"),
            })
    }
}

impl FrameBackend for VulkanFrameBackend<'_> {
    type Error = VulkanError;

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slot(slot)?.in_flight.wait()
    }

    fn write_frame_uniforms(&mut self, slot: usize, camera: &CameraUniform) -> VulkanResult<()> {
        let resources = self.resources.frame_slots.get_mut(slot).ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: format!("Frame slot {slot} out of range"),
            }
        })?;
        resources.camera_staging.upload_pod(std::slice::from_ref(camera))
    }

    fn prepare_stages(&mut self, plan: &FramePlan) -> VulkanResult<()> {
        let params = ProjectionParams::new(plan.point_count, plan.tile_grid, plan.sh);
        self.resources.stages.prepare(plan.slot, params);
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let acquired = self.slot(slot)?.image_acquired.handle();
        match self.resources.swapchain.acquire_next_image(acquired) {
            // Suboptimal images are still rendered; presentation reports it.
            Ok((image_index, _suboptimal)) => Ok(AcquireOutcome::Acquired { image_index }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn reset_slot_fence(&mut self, slot: usize) -> VulkanResult<()> {
        self.slot(slot)?.in_flight.reset()
    }

    fn record_frame(&mut self, plan: &FramePlan, image_index: u32) -> VulkanResult<()> {
        let device = self.context.device();
        let framebuffer = self.image(image_index)?.framebuffer.handle();
        let slot = self.slot(plan.slot)?;
        let resources = &*self.resources;

        let mut recorder = resources.commands.begin_frame(plan.slot)?;
        let command_buffer = recorder.handle();

        slot.camera_staging.record_copy(device, command_buffer, &slot.camera_uniform)?;

        if plan.has_points() && resources.scene.is_some() {
            resources.stages.record(device, command_buffer)?;
        }

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: plan.extent,
        };
        {
            let _pass = recorder.begin_render_pass(
                resources.render_pass.handle(),
                framebuffer,
                render_area,
                &clear_values,
            )?;
        }

        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let slot_resources = self.slot(slot)?;
        let wait_semaphores = [slot_resources.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.image(image_index)?.render_finished.handle()];
        let command_buffers = [self.resources.commands.frame_command_buffer(slot)?];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device()
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info],
                    slot_resources.in_flight.handle(),
                )
                .map_err(VulkanError::Api)
        }
    }

    fn abandon_frame(&mut self, slot: usize) -> VulkanResult<()> {
        let slot_resources = self.slot(slot)?;
        let wait_semaphores = [slot_resources.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::BOTTOM_OF_PIPE];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .build();

        unsafe {
            self.context
                .device()
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info],
                    slot_resources.in_flight.handle(),
                )
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let render_finished = self.image(image_index)?.render_finished.handle();
        match self
            .resources
            .swapchain
            .present(self.context.present_queue(), image_index, render_finished)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::NeedsRecreation),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    fn rebuild_swapchain(&mut self, window_extent: vk::Extent2D) -> VulkanResult<SurfaceInfo> {
        let device = self.context.device();
        let resources = &mut *self.resources;

        // Framebuffers reference the old views.
        resources.per_image.clear();
        resources.swapchain.recreate(self.context, window_extent)?;

        let extent = resources.swapchain.extent();
        let render_pass = resources.render_pass.handle();
        let views = resources.swapchain.image_views();
        rebuild_per_image(&mut resources.per_image, resources.swapchain.image_count(), |index| {
            PerImageResources::new(device, render_pass, views[index], extent)
        })?;

        Ok(SurfaceInfo {
            extent,
            image_count: resources.swapchain.image_count(),
        })
    }
}
