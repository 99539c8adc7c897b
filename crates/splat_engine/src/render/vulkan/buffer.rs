//! GPU buffer resources backed by VMA allocations
//!
//! A [`GpuBuffer`] is either device-local (seeded once through a transient staging
//! copy, then never touched by the host) or host-visible (persistently mapped and
//! rewritten by the frame slot that owns it).

use std::ptr::NonNull;
use std::sync::Arc;

use ash::{vk, Device};
use vk_mem::Alloc;

use super::{CommandManager, VulkanContext, VulkanError, VulkanResult};

/// Smallest allocation handed to the driver; empty attribute arrays still need a valid binding
pub const MIN_BUFFER_SIZE: vk::DeviceSize = 4;

/// Buffer handle plus the byte range a binding should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    /// Vulkan buffer handle
    pub buffer: vk::Buffer,
    /// Bound range in bytes
    pub range: vk::DeviceSize,
}

/// Memory lifecycle of a buffer
enum BufferMemory {
    DeviceLocal,
    HostVisible { mapped: NonNull<u8> },
}

/// One GPU buffer and its allocation; move-only, released exactly once on drop
pub struct GpuBuffer {
    allocator: Arc<vk_mem::Allocator>,
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    memory: BufferMemory,
}

impl GpuBuffer {
    /// Create a device-local buffer, optionally seeded with `data`
    ///
    /// Seeding goes through a transient host-visible buffer and a blocking
    /// immediate submission; no host pointer is retained afterwards.
    pub fn device_local(
        context: &VulkanContext,
        commands: &CommandManager,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        data: Option<&[u8]>,
    ) -> VulkanResult<Self> {
        let size = size.max(MIN_BUFFER_SIZE);
        let usage = if data.is_some() {
            usage | vk::BufferUsageFlags::TRANSFER_DST
        } else {
            usage
        };

        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (buffer, allocation) = Self::allocate(context, usage, size, &allocation_info)?;
        let target = Self {
            allocator: Arc::clone(context.allocator()),
            buffer,
            allocation,
            size,
            memory: BufferMemory::DeviceLocal,
        };

        if let Some(bytes) = data.filter(|bytes| !bytes.is_empty()) {
            if bytes.len() as vk::DeviceSize > size {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("Initial data ({} bytes) exceeds buffer size ({size})", bytes.len()),
                });
            }

            let mut staging = Self::host_visible(
                context,
                vk::BufferUsageFlags::TRANSFER_SRC,
                bytes.len() as vk::DeviceSize,
            )?;
            staging.upload(bytes)?;

            let copy_size = bytes.len() as vk::DeviceSize;
            commands.immediate_submit(|device, command_buffer| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: copy_size,
                };
                unsafe {
                    device.cmd_copy_buffer(command_buffer, staging.buffer, target.buffer, &[region]);
                }
                buffer_barrier(
                    device,
                    command_buffer,
                    target.buffer,
                    (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                    (vk::PipelineStageFlags::COMPUTE_SHADER, vk::AccessFlags::SHADER_READ),
                );
                Ok(())
            })?;
        }

        Ok(target)
    }

    /// Create a persistently mapped, host-coherent buffer
    pub fn host_visible(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        Self::mapped(context, usage, size, vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE)
    }

    fn mapped(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        access: vk_mem::AllocationCreateFlags,
    ) -> VulkanResult<Self> {
        let size = size.max(MIN_BUFFER_SIZE);
        let allocation_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::Auto,
            flags: access,
            required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            ..Default::default()
        };
        let (buffer, mut allocation) = Self::allocate(context, usage, size, &allocation_info)?;
        let allocator = Arc::clone(context.allocator());

        let mapped = match unsafe { allocator.map_memory(&mut allocation) } {
            Ok(ptr) => NonNull::new(ptr),
            Err(e) => {
                unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
                return Err(VulkanError::Api(e));
            }
        };
        let Some(mapped) = mapped else {
            unsafe { allocator.destroy_buffer(buffer, &mut allocation) };
            return Err(VulkanError::InvalidOperation {
                reason: "Mapping returned a null pointer".to_string(),
            });
        };

        Ok(Self {
            allocator,
            buffer,
            allocation,
            size,
            memory: BufferMemory::HostVisible { mapped },
        })
    }

    fn allocate(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
        allocation_info: &vk_mem::AllocationCreateInfo,
    ) -> VulkanResult<(vk::Buffer, vk_mem::Allocation)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            context
                .allocator()
                .create_buffer(&buffer_info, allocation_info)
                .map_err(|e| VulkanError::from_allocation(e, size))
        }
    }

    /// Copy bytes into a host-visible buffer
    ///
    /// The caller must have waited for every submission that reads this buffer.
    pub fn upload(&mut self, data: &[u8]) -> VulkanResult<()> {
        let BufferMemory::HostVisible { mapped } = self.memory else {
            return Err(VulkanError::InvalidOperation {
                reason: "Upload called on non-mapped buffer".to_string(),
            });
        };
        if data.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Upload size exceeds buffer size ({} > {})", data.len(), self.size),
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr(), data.len());
        }
        Ok(())
    }

    /// Copy plain-old-data values into a host-visible buffer
    pub fn upload_pod<T: bytemuck::Pod>(&mut self, values: &[T]) -> VulkanResult<()> {
        self.upload(bytemuck::cast_slice(values))
    }

    /// Record a copy of this buffer into `dst`
    ///
    /// Bracketed by host-write → transfer-read on the source and
    /// transfer-write → shader-read on the destination.
    pub fn record_copy(
        &self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        dst: &GpuBuffer,
    ) -> VulkanResult<()> {
        if dst.size < self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Copy destination too small ({} < {})", dst.size, self.size),
            });
        }

        buffer_barrier(
            device,
            command_buffer,
            self.buffer,
            (vk::PipelineStageFlags::HOST, vk::AccessFlags::HOST_WRITE),
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ),
        );

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: self.size,
        };
        unsafe {
            device.cmd_copy_buffer(command_buffer, self.buffer, dst.buffer, &[region]);
        }

        buffer_barrier(
            device,
            command_buffer,
            dst.buffer,
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
            (
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::UNIFORM_READ | vk::AccessFlags::SHADER_READ,
            ),
        );
        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// True for persistently mapped buffers
    pub fn is_mapped(&self) -> bool {
        matches!(self.memory, BufferMemory::HostVisible { .. })
    }

    /// Whole-buffer binding view
    pub fn view(&self) -> BufferView {
        BufferView {
            buffer: self.buffer,
            range: self.size,
        }
    }

    #[cfg(test)]
    fn read_back(&self, context: &VulkanContext, commands: &CommandManager) -> VulkanResult<Vec<u8>> {
        let readback = Self::mapped(
            context,
            vk::BufferUsageFlags::TRANSFER_DST,
            self.size,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
        )?;
        commands.immediate_submit(|device, command_buffer| {
            let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: self.size };
            unsafe {
                device.cmd_copy_buffer(command_buffer, self.buffer, readback.buffer, &[region]);
            }
            buffer_barrier(
                device,
                command_buffer,
                readback.buffer,
                (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
                (vk::PipelineStageFlags::HOST, vk::AccessFlags::HOST_READ),
            );
            Ok(())
        })?;

        let BufferMemory::HostVisible { mapped } = readback.memory else {
            unreachable!("readback buffers are always mapped");
        };
        let bytes = unsafe { std::slice::from_raw_parts(mapped.as_ptr(), self.size as usize) };
        Ok(bytes.to_vec())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.is_mapped() {
                self.allocator.unmap_memory(&mut self.allocation);
            }
            self.allocator.destroy_buffer(self.buffer, &mut self.allocation);
        }
    }
}

fn buffer_barrier(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    buffer: vk::Buffer,
    (src_stage, src_access): (vk::PipelineStageFlags, vk::AccessFlags),
    (dst_stage, dst_access): (vk::PipelineStageFlags, vk::AccessFlags),
) {
    let barrier = vk::BufferMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[barrier],
            &[],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> Option<(VulkanContext, CommandManager)> {
        let context = match VulkanContext::headless("splat_engine buffer tests") {
            Ok(context) => context,
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                return None;
            }
        };
        let commands = CommandManager::new(&context).ok()?;
        Some((context, commands))
    }

    #[test]
    fn test_device_local_upload_round_trip() {
        let Some((context, commands)) = gpu() else { return };
        let data: Vec<u8> = (0..1024u32).flat_map(|i| (i * 7919).to_le_bytes()).collect();

        let buffer = GpuBuffer::device_local(
            &context,
            &commands,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            data.len() as vk::DeviceSize,
            Some(&data),
        )
        .unwrap();

        assert!(!buffer.is_mapped());
        assert_eq!(buffer.read_back(&context, &commands).unwrap(), data);
    }

    #[test]
    fn test_upload_rejects_device_local() {
        let Some((context, commands)) = gpu() else { return };
        let mut buffer = GpuBuffer::device_local(
            &context,
            &commands,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            64,
            None,
        )
        .unwrap();

        match buffer.upload(&[0u8; 16]) {
            Err(VulkanError::InvalidOperation { reason }) => {
                assert_eq!(reason, "Upload called on non-mapped buffer");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_upload_rejects_oversized_data() {
        let Some((context, _commands)) = gpu() else { return };
        let mut buffer =
            GpuBuffer::host_visible(&context, vk::BufferUsageFlags::TRANSFER_SRC, 16).unwrap();

        assert!(buffer.upload(&[1u8; 16]).is_ok());
        assert!(matches!(
            buffer.upload(&[1u8; 17]),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_empty_buffer_gets_minimum_size() {
        let Some((context, commands)) = gpu() else { return };
        let buffer = GpuBuffer::device_local(
            &context,
            &commands,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            0,
            Some(&[]),
        )
        .unwrap();
        assert_eq!(buffer.size(), MIN_BUFFER_SIZE);
    }
}
