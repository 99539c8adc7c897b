//! Compute stages of the splat pipeline
//!
//! Projection, Sort and Raster form a closed set recorded in that order every
//! frame. Each stage owns one compute program and one descriptor set per frame
//! slot; recording binds the current slot's set, pushes parameters, dispatches
//! and appends a write-to-read barrier for the next stage.

pub mod projection;
pub mod raster;
pub mod sort;

use std::path::Path;

use ash::{vk, Device};

pub use projection::{ProjectionParams, ProjectionStage, PROJECTED_SPLAT_SIZE};
pub use raster::RasterStage;
pub use sort::SortStage;

use crate::config::StageShaderConfig;
use crate::foundation::math::div_ceil;
use crate::render::frame::FRAMES_IN_FLIGHT;
use crate::render::vulkan::{
    compute_write_to_read_barrier, write_buffer_bindings, BufferBinding, ComputeProgram,
    DescriptorPool, DescriptorSetLayout, VulkanError, VulkanResult,
};

/// Invocations per workgroup, matching `local_size_x` in every stage shader
pub const WORKGROUP_SIZE: u32 = 256;

/// Workgroups needed to cover `elements` invocations
pub const fn workgroup_count(elements: u32) -> u32 {
    div_ceil(elements, WORKGROUP_SIZE)
}

/// Descriptor pool and one set per frame slot
struct StageBindings {
    // Sets are freed with the pool.
    #[allow(dead_code)]
    pool: DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

/// State shared by every stage: program, per-slot bindings, current slot
pub struct StageCore {
    name: &'static str,
    program: ComputeProgram,
    bindings: Option<StageBindings>,
    frame_index: usize,
}

impl StageCore {
    /// Load the program and allocate per-slot sets when the layout has bindings
    pub fn new(
        device: &Device,
        name: &'static str,
        shader_path: &Path,
        set_layout: DescriptorSetLayout,
        push_constant_size: u32,
    ) -> VulkanResult<Self> {
        let program = ComputeProgram::new(device, shader_path, set_layout, push_constant_size)?;

        let bindings = if program.set_layout().bindings().is_empty() {
            None
        } else {
            let pool = DescriptorPool::for_layout(device, program.set_layout(), FRAMES_IN_FLIGHT as u32)?;
            let layouts = vec![program.set_layout().handle(); FRAMES_IN_FLIGHT];
            let sets = pool.allocate_descriptor_sets(&layouts)?;
            Some(StageBindings { pool, sets })
        };

        log::debug!(
            "{name} stage loaded from {} ({} bindings, {} push bytes)",
            shader_path.display(),
            program.set_layout().bindings().len(),
            push_constant_size
        );

        Ok(Self {
            name,
            program,
            bindings,
            frame_index: 0,
        })
    }

    /// Rewrite one slot's bindings
    ///
    /// The slot must not be in flight.
    pub fn update_bindings(&self, device: &Device, slot: usize, map: &[BufferBinding]) -> VulkanResult<()> {
        match &self.bindings {
            Some(bindings) => {
                let set = *bindings.sets.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
                    reason: format!("{} stage has no bindings for slot {slot}", self.name),
                })?;
                write_buffer_bindings(device, self.program.set_layout(), set, map)
            }
            None if map.is_empty() => Ok(()),
            None => Err(VulkanError::InvalidOperation {
                reason: format!("{} stage declares no bindings", self.name),
            }),
        }
    }

    /// Select the slot whose bindings the next recording uses
    pub fn set_frame_index(&mut self, slot: usize) {
        self.frame_index = slot % FRAMES_IN_FLIGHT;
    }

    /// Bind, push, dispatch `elements` invocations, then barrier
    pub fn record_dispatch(
        &self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        push: &[u8],
        elements: u32,
    ) -> VulkanResult<()> {
        let set = self
            .bindings
            .as_ref()
            .and_then(|bindings| bindings.sets.get(self.frame_index).copied());
        self.program.bind(command_buffer, set);
        if !push.is_empty() {
            self.program.push_constants(command_buffer, push)?;
        }

        unsafe {
            device.cmd_dispatch(command_buffer, workgroup_count(elements), 1, 1);
        }
        compute_write_to_read_barrier(device, command_buffer);
        Ok(())
    }

    /// Stage name for logs
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Closed set of pipeline stages
pub enum ComputeStage {
    /// Point → screen-space splat
    Projection(ProjectionStage),
    /// (tile, depth) ordering
    Sort(SortStage),
    /// Per-tile alpha compositing
    Raster(RasterStage),
}

impl ComputeStage {
    fn core(&self) -> &StageCore {
        match self {
            Self::Projection(stage) => stage.core(),
            Self::Sort(stage) => stage.core(),
            Self::Raster(stage) => stage.core(),
        }
    }

    fn core_mut(&mut self) -> &mut StageCore {
        match self {
            Self::Projection(stage) => stage.core_mut(),
            Self::Sort(stage) => stage.core_mut(),
            Self::Raster(stage) => stage.core_mut(),
        }
    }

    /// Stage name for logs
    pub fn name(&self) -> &'static str {
        self.core().name()
    }

    /// False for stages whose program body does not exist yet
    pub fn is_implemented(&self) -> bool {
        match self {
            Self::Projection(_) => true,
            Self::Sort(stage) => stage.is_implemented(),
            Self::Raster(stage) => stage.is_implemented(),
        }
    }

    /// Select the slot whose bindings the next recording uses
    pub fn set_frame_index(&mut self, slot: usize) {
        self.core_mut().set_frame_index(slot);
    }

    /// Append this stage's commands
    pub fn record(&self, device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        match self {
            Self::Projection(stage) => stage.record(device, command_buffer),
            Self::Sort(stage) => stage.record(device, command_buffer),
            Self::Raster(stage) => stage.record(device, command_buffer),
        }
    }
}

/// The three stages in recording order
pub struct StagePipeline {
    stages: [ComputeStage; 3],
}

impl StagePipeline {
    /// Load every stage program; any failure aborts construction
    pub fn new(device: &Device, shaders: &StageShaderConfig) -> VulkanResult<Self> {
        let stages = [
            ComputeStage::Projection(ProjectionStage::new(device, Path::new(&shaders.projection))?),
            ComputeStage::Sort(SortStage::new(device, Path::new(&shaders.sort))?),
            ComputeStage::Raster(RasterStage::new(device, Path::new(&shaders.raster))?),
        ];
        Ok(Self { stages })
    }

    /// Projection stage, for binding and parameter updates
    pub fn projection(&self) -> Option<&ProjectionStage> {
        self.stages.iter().find_map(|stage| match stage {
            ComputeStage::Projection(projection) => Some(projection),
            _ => None,
        })
    }

    fn projection_mut(&mut self) -> Option<&mut ProjectionStage> {
        self.stages.iter_mut().find_map(|stage| match stage {
            ComputeStage::Projection(projection) => Some(projection),
            _ => None,
        })
    }

    /// Point every stage at `slot` and refresh projection parameters
    pub fn prepare(&mut self, slot: usize, params: ProjectionParams) {
        for stage in &mut self.stages {
            stage.set_frame_index(slot);
        }
        if let Some(projection) = self.projection_mut() {
            projection.set_parameters(params);
        }
    }

    /// Record all implemented stages in order
    ///
    /// Stages without a program body were reported at construction and are
    /// left out, so the frame degrades to the presentation clear.
    pub fn record(&self, device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        for stage in self.stages.iter().filter(|stage| stage.is_implemented()) {
            stage.record(device, command_buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(0), 0);
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(256), 1);
        assert_eq!(workgroup_count(257), 2);
        assert_eq!(workgroup_count(1_000_000), 3907);
    }
}
