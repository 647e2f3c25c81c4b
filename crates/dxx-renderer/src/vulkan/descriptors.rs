//! Texture descriptor pool and set layout.
//!
//! Every texture binds through the same single-binding layout (one combined
//! image sampler at binding 0), so one pool and one layout cover the whole
//! renderer. The pool is a bounded table with no eviction policy: running it
//! dry is a reported failure, not a silent drop.

use ash::vk;

use super::VulkanContext;

/// Maximum number of simultaneously resident texture descriptor sets.
pub const MAX_TEXTURES: u32 = 1024;

/// Descriptor pool and the shared per-texture set layout.
pub struct TextureDescriptors {
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    device: ash::Device,
}

impl TextureDescriptors {
    /// Create the pool and layout.
    pub unsafe fn new(ctx: &VulkanContext) -> Result<Self, String> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: MAX_TEXTURES,
        }];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(MAX_TEXTURES)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = ctx
            .device
            .create_descriptor_pool(&pool_info, None)
            .map_err(|e| format!("Failed to create descriptor pool: {:?}", e))?;

        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = match ctx.device.create_descriptor_set_layout(&layout_info, None) {
            Ok(l) => l,
            Err(e) => {
                ctx.device.destroy_descriptor_pool(pool, None);
                return Err(format!("Failed to create descriptor set layout: {:?}", e));
            }
        };

        Ok(Self {
            pool,
            layout,
            device: ctx.device.clone(),
        })
    }

    /// The per-texture set layout, shared with the pipeline layout.
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Allocate one texture descriptor set.
    pub unsafe fn allocate_set(&self) -> Result<vk::DescriptorSet, String> {
        let layouts = [self.layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = self
            .device
            .allocate_descriptor_sets(&alloc_info)
            .map_err(|e| format!("Texture descriptor pool exhausted ({} sets): {:?}", MAX_TEXTURES, e))?;
        Ok(sets[0])
    }

    /// Point a set at an image view + sampler.
    pub unsafe fn write_set(
        &self,
        set: vk::DescriptorSet,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) {
        let image_info = vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };

        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info));

        self.device.update_descriptor_sets(&[write], &[]);
    }

    /// Return a set to the pool.
    pub unsafe fn free_set(&self, set: vk::DescriptorSet) {
        let _ = self.device.free_descriptor_sets(self.pool, &[set]);
    }

    /// Destroy the layout and pool.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.device.destroy_descriptor_set_layout(self.layout, None);
        ctx.device.destroy_descriptor_pool(self.pool, None);
        self.layout = vk::DescriptorSetLayout::null();
        self.pool = vk::DescriptorPool::null();
    }
}
