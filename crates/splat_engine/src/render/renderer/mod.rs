//! Gaussian-splat renderer
//!
//! [`SplatRenderer`] owns every GPU object and drives the [`FrameEngine`]
//! through a borrowed Vulkan backend. Teardown is explicit: see
//! [`SplatRenderer::shutdown`].

mod backend;
pub mod frame_resources;

use std::mem::ManuallyDrop;

use ash::vk;

pub use frame_resources::{FrameSlotResources, PerImageResources};

use backend::VulkanFrameBackend;
use crate::assets::{ShLayout, SplatSet};
use crate::config::RendererConfig;
use crate::render::camera::CameraUniform;
use crate::render::frame::{rebuild_per_image, FrameEngine, FrameOutcome, SurfaceInfo, FRAMES_IN_FLIGHT};
use crate::render::scene::SceneBuffers;
use crate::render::stages::StagePipeline;
use crate::render::vulkan::{
    BufferView, CommandManager, RenderPass, Swapchain, VulkanContext, VulkanError, VulkanResult, Window,
};

/// Everything created from the context, released leaves first
pub(crate) struct RenderResources {
    scene: Option<SceneBuffers>,
    frame_slots: Vec<FrameSlotResources>,
    per_image: Vec<PerImageResources>,
    stages: StagePipeline,
    commands: CommandManager,
    render_pass: RenderPass,
    swapchain: Swapchain,
}

impl RenderResources {
    /// Release in dependency order; the device must be idle
    fn destroy(self) {
        let Self {
            scene,
            frame_slots,
            per_image,
            stages,
            commands,
            render_pass,
            swapchain,
        } = self;

        drop(scene);
        drop(frame_slots);
        drop(per_image);
        drop(stages);
        drop(commands);
        drop(render_pass);
        drop(swapchain);
    }

    fn camera_views(&self) -> Vec<BufferView> {
        self.frame_slots
            .iter()
            .map(|slot| slot.camera_uniform.view())
            .collect()
    }
}

/// Window-backed splat renderer
pub struct SplatRenderer {
    resources: ManuallyDrop<RenderResources>,
    engine: FrameEngine,
    clear_color: [f32; 4],
    released: bool,
    context: VulkanContext,
}

impl SplatRenderer {
    /// Build the context, swapchain, stages and frame slots
    ///
    /// Any failure releases whatever was already created.
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::InitializationFailed)?;
        log::debug!("Creating SplatRenderer...");

        let context = VulkanContext::new(window, &config.application_name, config.validation_enabled())?;
        let device = context.device().clone();

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(&context, vk::Extent2D { width, height })?;
        let render_pass = RenderPass::new_present_pass(device.clone(), swapchain.format().format)?;
        let commands = CommandManager::new(&context)?;
        let stages = StagePipeline::new(&device, &config.shaders)?;

        let frame_slots = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameSlotResources::new(&context, &commands))
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut per_image = Vec::new();
        let views = swapchain.image_views();
        rebuild_per_image(&mut per_image, swapchain.image_count(), |index| {
            PerImageResources::new(&device, render_pass.handle(), views[index], swapchain.extent())
        })?;

        let engine = FrameEngine::new(SurfaceInfo {
            extent: swapchain.extent(),
            image_count: swapchain.image_count(),
        });

        log::info!(
            "SplatRenderer ready on {} ({}x{})",
            context.physical_device().name(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            resources: ManuallyDrop::new(RenderResources {
                scene: None,
                frame_slots,
                per_image,
                stages,
                commands,
                render_pass,
                swapchain,
            }),
            engine,
            clear_color: config.clear_color,
            released: false,
            context,
        })
    }

    /// Replace the scene with `splats`; an empty set clears it
    ///
    /// Blocks until the GPU is idle so no in-flight frame reads the old buffers.
    pub fn load_point_cloud(&mut self, splats: &SplatSet) -> VulkanResult<()> {
        if splats.is_empty() {
            log::warn!("Point cloud is empty; rendering background only");
            return self.clear_scene();
        }

        self.context.wait_idle()?;
        self.resources.scene = None;
        self.engine.set_scene(0, ShLayout::EMPTY);

        let scene = SceneBuffers::upload(&self.context, &self.resources.commands, splats)?;
        let projection = self.resources.stages.projection().ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: "Pipeline has no projection stage".to_string(),
            }
        })?;
        scene.bind_projection(self.context.device(), projection, &self.resources.camera_views())?;

        self.engine.set_scene(scene.point_count(), scene.sh_layout());
        self.resources.scene = Some(scene);
        Ok(())
    }

    /// Drop the scene; frames degrade to a clear
    pub fn clear_scene(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()?;
        self.resources.scene = None;
        self.engine.set_scene(0, ShLayout::EMPTY);
        Ok(())
    }

    /// Forward a framebuffer resize; 0×0 pauses rendering
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.engine.handle_resize(width, height);
    }

    /// True while the window is minimized
    pub fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    /// Render and present one frame; `None` while paused
    pub fn draw_frame(&mut self, camera: &CameraUniform) -> VulkanResult<Option<FrameOutcome>> {
        let mut backend = VulkanFrameBackend {
            context: &self.context,
            resources: &mut self.resources,
            clear_color: self.clear_color,
        };
        self.engine.draw_frame(&mut backend, camera)
    }

    /// Rebuild the swapchain at the window's current size
    ///
    /// Blocks on window events while the framebuffer is 0×0.
    pub fn recreate_swapchain(&mut self, window: &mut Window) -> VulkanResult<SurfaceInfo> {
        let (mut width, mut height) = window.framebuffer_size();
        while width == 0 || height == 0 {
            window.wait_events();
            (width, height) = window.framebuffer_size();
        }

        let mut backend = VulkanFrameBackend {
            context: &self.context,
            resources: &mut self.resources,
            clear_color: self.clear_color,
        };
        let surface = self
            .engine
            .recreate(&mut backend, vk::Extent2D { width, height })?
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Swapchain recreation requested for a minimized window".to_string(),
            })?;
        Ok(surface)
    }

    /// Current presentation extent
    pub fn extent(&self) -> vk::Extent2D {
        self.engine.extent()
    }

    /// Points in the loaded cloud
    pub fn point_count(&self) -> u32 {
        self.engine.point_count()
    }

    /// Wait for the GPU and release every resource, context last
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.context.wait_idle() {
            log::warn!("wait_idle failed during shutdown: {e}");
        }
        // Safety: `released` guards against a second take.
        let resources = unsafe { ManuallyDrop::take(&mut self.resources) };
        resources.destroy();
        log::debug!("SplatRenderer resources released");
    }
}

impl Drop for SplatRenderer {
    fn drop(&mut self) {
        self.release();
    }
}
