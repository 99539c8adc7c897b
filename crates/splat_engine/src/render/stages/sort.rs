//! Sort stage: orders visible splats by (tile, depth)
//!
//! The program body is not written yet. The stage loads its shader and owns a
//! pipeline, but records nothing; frames then show only the background clear.

use std::path::Path;

use ash::{vk, Device};

use super::StageCore;
use crate::render::vulkan::{DescriptorSetLayoutBuilder, VulkanResult};

/// Sort stage
pub struct SortStage {
    core: StageCore,
}

impl SortStage {
    /// Load `sort.comp`
    pub fn new(device: &Device, shader_path: &Path) -> VulkanResult<Self> {
        let layout = DescriptorSetLayoutBuilder::new().build(device)?;
        let core = StageCore::new(device, "Sort", shader_path, layout, 0)?;
        log::warn!("Sort stage is not implemented; splats are not ordered");
        Ok(Self { core })
    }

    /// Always false until the key sort exists
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
