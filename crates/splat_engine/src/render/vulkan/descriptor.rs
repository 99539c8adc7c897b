//! Descriptor set layouts, pools and buffer bindings

use ash::{vk, Device};

use super::{BufferView, VulkanError, VulkanResult};

/// Descriptor set layout builder for compute bindings
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a storage buffer binding
    pub fn add_storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Pool sizes needed to allocate `sets` copies of this layout
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                }),
            }
        }
        sizes
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool sized exactly for a number of sets of one layout
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool holding `max_sets` sets of `layout`
    pub fn for_layout(device: &Device, layout: &DescriptorSetLayout, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = layout.pool_sizes(max_sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self { pool, device: device.clone() })
    }

    /// Allocate one set per entry of `layouts`
    pub fn allocate_descriptor_sets(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::Api)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// One logical buffer role bound at a binding index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// Binding index in the set layout
    pub binding: u32,
    /// Buffer and range to bind
    pub view: BufferView,
}

impl BufferBinding {
    /// Bind `view` at `binding`
    pub fn new(binding: u32, view: BufferView) -> Self {
        Self { binding, view }
    }
}

/// Descriptor type for each entry of `map`, in order
///
/// Every declared binding must be covered exactly once.
fn binding_types(
    declared: &[vk::DescriptorSetLayoutBinding],
    map: &[BufferBinding],
) -> VulkanResult<Vec<vk::DescriptorType>> {
    if map.len() != declared.len() {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "Binding map has {} entries, layout expects {}",
                map.len(),
                declared.len()
            ),
        });
    }

    let mut types = Vec::with_capacity(map.len());
    for (position, entry) in map.iter().enumerate() {
        if map[..position].iter().any(|earlier| earlier.binding == entry.binding) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Binding {} appears more than once", entry.binding),
            });
        }
        let ty = declared
            .iter()
            .find(|b| b.binding == entry.binding)
            .map(|b| b.descriptor_type)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("Binding {} is not declared in the layout", entry.binding),
            })?;
        types.push(ty);
    }
    Ok(types)
}

/// Point every binding of `set` at its buffer
///
/// Every layout binding must be covered exactly once.
pub fn write_buffer_bindings(
    device: &Device,
    layout: &DescriptorSetLayout,
    set: vk::DescriptorSet,
    bindings: &[BufferBinding],
) -> VulkanResult<()> {
    let types = binding_types(layout.bindings(), bindings)?;

    let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = bindings
        .iter()
        .map(|b| {
            [vk::DescriptorBufferInfo {
                buffer: b.view.buffer,
                offset: 0,
                range: b.view.range,
            }]
        })
        .collect();

    let writes: Vec<vk::WriteDescriptorSet> = bindings
        .iter()
        .zip(&buffer_infos)
        .zip(types)
        .map(|((binding, info), ty)| {
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(binding.binding)
                .dst_array_element(0)
                .descriptor_type(ty)
                .buffer_info(info)
                .build()
        })
        .collect();

    unsafe { device.update_descriptor_sets(&writes, &[]) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> Vec<vk::DescriptorSetLayoutBinding> {
        DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .bindings()
            .to_vec()
    }

    fn entry(binding: u32) -> BufferBinding {
        BufferBinding::new(binding, BufferView { buffer: vk::Buffer::null(), range: 16 })
    }

    #[test]
    fn test_binding_types_follow_map_order() {
        let types = binding_types(&declared(), &[entry(2), entry(0), entry(1)]).unwrap();
        assert_eq!(
            types,
            vec![
                vk::DescriptorType::STORAGE_BUFFER,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::STORAGE_BUFFER,
            ]
        );
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let result = binding_types(&declared(), &[entry(0), entry(1), entry(1)]);
        match result {
            Err(VulkanError::InvalidOperation { reason }) => {
                assert_eq!(reason, "Binding 1 appears more than once");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_and_missing_bindings_rejected() {
        assert!(binding_types(&declared(), &[entry(0), entry(1), entry(7)]).is_err());
        assert!(binding_types(&declared(), &[entry(0), entry(1)]).is_err());
    }
}
