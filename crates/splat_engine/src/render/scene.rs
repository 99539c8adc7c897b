//! GPU copy of the loaded point cloud
//!
//! Inputs are device-local and read-only after upload. Projection outputs are
//! duplicated per frame slot so consecutive frames never share a write target.

use ash::{vk, Device};

use crate::assets::{ShLayout, SplatSet};
use crate::render::frame::FRAMES_IN_FLIGHT;
use crate::render::stages::projection::binding;
use crate::render::stages::{ProjectionStage, PROJECTED_SPLAT_SIZE};
use crate::render::vulkan::{
    BufferBinding, BufferView, CommandManager, GpuBuffer, VulkanContext, VulkanError, VulkanResult,
};

const STORAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::STORAGE_BUFFER;

/// Attribute arrays, one buffer each
struct SceneInputs {
    positions: GpuBuffer,
    base_color: GpuBuffer,
    sh_rest: GpuBuffer,
    opacity: GpuBuffer,
    scale: GpuBuffer,
    rotation: GpuBuffer,
}

/// Projection outputs owned by one frame slot
struct SlotOutputs {
    projected: GpuBuffer,
    visibility: GpuBuffer,
    tile_counts: GpuBuffer,
}

impl SlotOutputs {
    fn new(context: &VulkanContext, commands: &CommandManager, points: u64) -> VulkanResult<Self> {
        let word = std::mem::size_of::<u32>() as u64;
        Ok(Self {
            projected: GpuBuffer::device_local(context, commands, STORAGE, points * PROJECTED_SPLAT_SIZE, None)?,
            visibility: GpuBuffer::device_local(context, commands, STORAGE, points * word, None)?,
            tile_counts: GpuBuffer::device_local(context, commands, STORAGE, points * word, None)?,
        })
    }
}

/// Device buffers for one point cloud
pub struct SceneBuffers {
    inputs: SceneInputs,
    outputs: Vec<SlotOutputs>,
    point_count: u32,
    sh: ShLayout,
}

impl SceneBuffers {
    /// Upload every attribute array and allocate per-slot outputs
    ///
    /// The caller must make sure no frame reads the previous scene.
    pub fn upload(context: &VulkanContext, commands: &CommandManager, splats: &SplatSet) -> VulkanResult<Self> {
        splats.validate().map_err(|e| VulkanError::InvalidOperation {
            reason: format!("Point cloud rejected: {e}"),
        })?;
        let point_count = u32::try_from(splats.len()).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("{} points exceed the addressable count", splats.len()),
        })?;

        let input = |data: &[f32]| {
            let bytes: &[u8] = bytemuck::cast_slice(data);
            GpuBuffer::device_local(context, commands, STORAGE, bytes.len() as u64, Some(bytes))
        };
        let inputs = SceneInputs {
            positions: input(&splats.positions)?,
            base_color: input(&splats.base_color)?,
            sh_rest: input(&splats.sh_rest)?,
            opacity: input(&splats.opacity)?,
            scale: input(&splats.scale)?,
            rotation: input(&splats.rotation)?,
        };

        let outputs = (0..FRAMES_IN_FLIGHT)
            .map(|_| SlotOutputs::new(context, commands, u64::from(point_count)))
            .collect::<VulkanResult<Vec<_>>>()?;

        let sh = splats.sh_layout();
        log::info!(
            "Uploaded {} splats (SH degree {}, {} coefficients per channel) to the GPU",
            point_count,
            sh.degree,
            sh.coeffs_per_channel
        );

        Ok(Self {
            inputs,
            outputs,
            point_count,
            sh,
        })
    }

    /// Binding map for the projection stage in `slot`
    pub fn projection_bindings(&self, slot: usize, camera: BufferView) -> VulkanResult<[BufferBinding; 10]> {
        let outputs = self.outputs.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No scene outputs for slot {slot}"),
        })?;
        Ok([
            BufferBinding::new(binding::CAMERA, camera),
            BufferBinding::new(binding::POSITIONS, self.inputs.positions.view()),
            BufferBinding::new(binding::BASE_COLOR, self.inputs.base_color.view()),
            BufferBinding::new(binding::SH_REST, self.inputs.sh_rest.view()),
            BufferBinding::new(binding::OPACITY, self.inputs.opacity.view()),
            BufferBinding::new(binding::SCALE, self.inputs.scale.view()),
            BufferBinding::new(binding::ROTATION, self.inputs.rotation.view()),
            BufferBinding::new(binding::PROJECTED, outputs.projected.view()),
            BufferBinding::new(binding::VISIBILITY, outputs.visibility.view()),
            BufferBinding::new(binding::TILE_COUNTS, outputs.tile_counts.view()),
        ])
    }

    /// Point every slot's projection bindings at this scene
    ///
    /// `camera_buffers[slot]` is that slot's device-local camera uniform.
    pub fn bind_projection(
        &self,
        device: &Device,
        projection: &ProjectionStage,
        camera_buffers: &[BufferView],
    ) -> VulkanResult<()> {
        for (slot, &camera) in camera_buffers.iter().enumerate() {
            let bindings = self.projection_bindings(slot, camera)?;
            projection.update_bindings(device, slot, &bindings)?;
        }
        Ok(())
    }

    /// Number of points uploaded
    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    /// Color-coefficient layout of the uploaded cloud
    pub fn sh_layout(&self) -> ShLayout {
        self.sh
    }
}
