//! SPIR-V loading and compute pipelines

use std::ffi::CStr;
use std::path::Path;

use ash::{vk, Device};

use super::{DescriptorSetLayout, VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| {
            VulkanError::InitializationFailed(format!("Invalid SPIR-V: {e}"))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe {
            device.create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load shader from a SPIR-V file
    pub fn from_file(device: Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let shader_error = |reason: String| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| shader_error(e.to_string()))?;
        Self::from_bytes(device, &bytes).map_err(|e| match e {
            VulkanError::InitializationFailed(reason) => shader_error(reason),
            other => other,
        })
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Compute pipeline plus its descriptor layout and push range
pub struct ComputeProgram {
    device: Device,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    set_layout: DescriptorSetLayout,
    push_constant_size: u32,
}

impl ComputeProgram {
    /// Load `shader_path` and build a compute pipeline with entry point `main`
    pub fn new(
        device: &Device,
        shader_path: impl AsRef<Path>,
        set_layout: DescriptorSetLayout,
        push_constant_size: u32,
    ) -> VulkanResult<Self> {
        let shader = ShaderModule::from_file(device.clone(), &shader_path)?;
        let entry_point = CStr::from_bytes_with_nul(b"main\0")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;

        let set_layouts = [set_layout.handle()];
        let push_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: push_constant_size,
        }];
        let mut layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        if push_constant_size > 0 {
            layout_info = layout_info.push_constant_ranges(&push_ranges);
        }

        let pipeline_layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.handle())
            .name(entry_point)
            .build();
        let pipeline_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(pipeline_layout)
            .build();

        let pipeline = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipeline {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device: device.clone(),
            pipeline,
            pipeline_layout,
            set_layout,
            push_constant_size,
        })
    }

    /// Bind the pipeline and one descriptor set
    pub fn bind(&self, command_buffer: vk::CommandBuffer, set: Option<vk::DescriptorSet>) {
        unsafe {
            self.device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::COMPUTE, self.pipeline);
            if let Some(set) = set {
                self.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::COMPUTE,
                    self.pipeline_layout,
                    0,
                    &[set],
                    &[],
                );
            }
        }
    }

    /// Push the parameter block; its size must match the declared range
    pub fn push_constants(&self, command_buffer: vk::CommandBuffer, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as u32 != self.push_constant_size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Push block is {} bytes, program expects {}",
                    bytes.len(),
                    self.push_constant_size
                ),
            });
        }
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytes,
            );
        }
        Ok(())
    }

    /// Descriptor layout of this program
    pub fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }
}

impl Drop for ComputeProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
