//! Raster stage: per-tile alpha compositing into the presented image
//!
//! Not implemented. Loads its program and records nothing, like the sort stage.

use std::path::Path;

use ash::{vk, Device};

use super::StageCore;
use crate::render::vulkan::{DescriptorSetLayoutBuilder, VulkanResult};

/// Raster stage
pub struct RasterStage {
    core: StageCore,
}

impl RasterStage {
    /// Load `raster.comp`
    pub fn new(device: &Device, shader_path: &Path) -> VulkanResult<Self> {
        let layout = DescriptorSetLayoutBuilder::new().build(device)?;
        let core = StageCore::new(device, "Raster", shader_path, layout, 0)?;
        log::warn!("Raster stage is not implemented; frames show the clear color only");
        Ok(Self { core })
    }

    /// Always false until compositing exists
    pub fn is_implemented(&self) -> bool {
        false
    }

    /// Records nothing
    pub fn record(&self, _device: &Device, _command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        Ok(())
    }

    pub(super) fn core(&self) -> &StageCore {
        &self.core
    }

    pub(super) fn core_mut(&mut self) -> &mut StageCore {
        &mut self.core
    }
}
