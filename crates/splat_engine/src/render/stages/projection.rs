//! Projection stage: 3D Gaussians to screen-space splats

use std::path::Path;

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};

use super::StageCore;
use crate::assets::ShLayout;
use crate::render::tiles::TileGrid;
use crate::render::vulkan::{BufferBinding, DescriptorSetLayoutBuilder, VulkanResult};

/// Bytes per projected splat written by the shader
pub const PROJECTED_SPLAT_SIZE: u64 = 48;

/// Binding indices shared with `projection.comp`
pub mod binding {
    /// Camera uniform
    pub const CAMERA: u32 = 0;
    /// Point positions, 3 floats each
    pub const POSITIONS: u32 = 1;
    /// Base color, 3 floats each
    pub const BASE_COLOR: u32 = 2;
    /// Higher-order color coefficients
    pub const SH_REST: u32 = 3;
    /// Opacity, 1 float each
    pub const OPACITY: u32 = 4;
    /// Scale, 3 floats each
    pub const SCALE: u32 = 5;
    /// Rotation quaternion, 4 floats each
    pub const ROTATION: u32 = 6;
    /// Output splats
    pub const PROJECTED: u32 = 7;
    /// Output visibility flags
    pub const VISIBILITY: u32 = 8;
    /// Output per-point tile footprint counts
    pub const TILE_COUNTS: u32 = 9;
}

/// Push block for `projection.comp`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ProjectionParams {
    /// Number of points to project
    pub point_count: u32,
    /// Tiles per row
    pub tiles_x: u32,
    /// Tiles per column
    pub tiles_y: u32,
    /// Highest color-coefficient degree evaluated, -1 when empty
    pub sh_degree: i32,
    /// Coefficients stored per channel for each point in the `SH_REST` buffer
    pub sh_stride: u32,
}

impl ProjectionParams {
    /// Parameters for one frame
    pub fn new(point_count: u32, tile_grid: TileGrid, sh: ShLayout) -> Self {
        Self {
            point_count,
            tiles_x: tile_grid.tiles_x,
            tiles_y: tile_grid.tiles_y,
            sh_degree: sh.degree,
            sh_stride: sh.coeffs_per_channel,
        }
    }
}

fn layout_builder() -> DescriptorSetLayoutBuilder {
    let compute = vk::ShaderStageFlags::COMPUTE;
    let builder = DescriptorSetLayoutBuilder::new().add_uniform_buffer(binding::CAMERA, compute);
    (binding::POSITIONS..=binding::TILE_COUNTS)
        .fold(builder, |builder, index| builder.add_storage_buffer(index, compute))
}

/// Projection stage
pub struct ProjectionStage {
    core: StageCore,
    params: ProjectionParams,
}

impl ProjectionStage {
    /// Load `projection.comp` and allocate per-slot bindings
    pub fn new(device: &Device, shader_path: &Path) -> VulkanResult<Self> {
        let layout = layout_builder().build(device)?;
        let core = StageCore::new(
            device,
            "Projection",
            shader_path,
            layout,
            std::mem::size_of::<ProjectionParams>() as u32,
        )?;
        Ok(Self {
            core,
            params: ProjectionParams::default(),
        })
    }

    /// Rewrite one slot's bindings
    pub fn update_bindings(&self, device: &Device, slot: usize, map: &[BufferBinding]) -> VulkanResult<()> {
        self.core.update_bindings(device, slot, map)
    }

    /// Set the parameters pushed by the next recording
    pub fn set_parameters(&mut self, params: ProjectionParams) {
        self.params = params;
    }

    /// One invocation per point
    pub fn record(&self, device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        if self.params.point_count == 0 {
            return Ok(());
        }
        self.core.record_dispatch(
            device,
            command_buffer,
            bytemuck::bytes_of(&self.params),
            self.params.point_count,
        )
    }

    pub(super) fn core(&self) -> &StageCore {
        &self.core
    }

    pub(super) fn core_mut(&mut self) -> &mut StageCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SplatSet;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<ProjectionParams>(), 20);
        assert_eq!(std::mem::offset_of!(ProjectionParams, point_count), 0);
        assert_eq!(std::mem::offset_of!(ProjectionParams, tiles_x), 4);
        assert_eq!(std::mem::offset_of!(ProjectionParams, tiles_y), 8);
        assert_eq!(std::mem::offset_of!(ProjectionParams, sh_degree), 12);
        assert_eq!(std::mem::offset_of!(ProjectionParams, sh_stride), 16);
    }

    #[test]
    fn test_params_from_tile_grid() {
        let grid = TileGrid { tiles_x: 50, tiles_y: 38 };
        let sh = ShLayout { degree: 3, coeffs_per_channel: 15 };
        let params = ProjectionParams::new(1000, grid, sh);
        assert_eq!(bytemuck::cast::<_, [u32; 5]>(params), [1000, 50, 38, 3, 15]);
    }

    #[test]
    fn test_pushed_stride_matches_loaded_coefficients() {
        let points = 4;
        let mut splats = SplatSet::with_capacity(points, 7);
        for _ in 0..points {
            splats.positions.extend([0.0, 0.0, -2.0]);
            splats.base_color.extend([0.5, 0.5, 0.5]);
            splats.sh_rest.extend([0.1; 21]);
            splats.opacity.push(1.0);
            splats.scale.extend([-3.0; 3]);
            splats.rotation.extend([1.0, 0.0, 0.0, 0.0]);
        }

        let grid = TileGrid { tiles_x: 4, tiles_y: 4 };
        let params = ProjectionParams::new(points as u32, grid, splats.sh_layout());
        assert_eq!(params.sh_degree, 1);
        assert_eq!(params.sh_stride as usize, splats.sh_rest.len() / (3 * points));
        assert_eq!(params.sh_stride, 7);
    }

    #[test]
    fn test_layout_declares_all_roles() {
        let builder = layout_builder();
        let bindings: Vec<_> = builder.bindings().iter().map(|b| (b.binding, b.descriptor_type)).collect();
        assert_eq!(bindings.len(), 10);
        assert_eq!(bindings[0], (binding::CAMERA, vk::DescriptorType::UNIFORM_BUFFER));
        assert!(bindings[1..]
            .iter()
            .all(|&(_, ty)| ty == vk::DescriptorType::STORAGE_BUFFER));
        assert_eq!(bindings[9].0, binding::TILE_COUNTS);
    }
}
