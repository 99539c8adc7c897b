//! Vulkan rendering backend
//!
//! Thin RAII wrappers over `ash`. Each wrapper owns exactly one kind of handle
//! and must be dropped before the [`VulkanContext`] it was created from.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use buffer::{BufferView, GpuBuffer, MIN_BUFFER_SIZE};
pub use commands::{ActiveRenderPass, CommandManager, CommandPool, CommandRecorder};
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult,
};
pub use descriptor::{
    write_buffer_bindings, BufferBinding, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use framebuffer::Framebuffer;
pub use render_pass::RenderPass;
pub use shader::{ComputeProgram, ShaderModule};
pub use swapchain::Swapchain;
pub use sync::{compute_write_to_read_barrier, Fence, Semaphore, WAIT_FOREVER};
pub use window::{Window, WindowError, WindowResult};
