//! Texture upload and binding.
//!
//! Game bitmaps arrive as raw RGBA bytes at arbitrary sizes. The mobile GPU
//! prefers power-of-two layouts, so storage is padded up and the texture
//! carries UV scale factors mapping the logical region back onto [0,1]
//! texture space. Upload goes through a staging buffer with two layout
//! transitions in a synchronous single-use command buffer; texture creation
//! is not a per-frame path.

use ash::vk;

use super::memory::Image;
use super::{CommandManager, MemoryManager, TextureDescriptors, VulkanContext};

/// Round up to the next power of two.
pub fn next_power_of_two(mut v: u32) -> u32 {
    v = v.wrapping_sub(1);
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

/// A GPU-resident texture with its sampler and bindable descriptor set.
///
/// Owned by whichever game asset references it; destroyed through
/// [`TextureManager::destroy_texture`] when that asset is freed.
pub struct Texture {
    image: Option<Image>,
    sampler: vk::Sampler,
    descriptor_set: vk::DescriptorSet,
    /// Logical dimensions the caller uploaded.
    pub width: u32,
    pub height: u32,
    /// Padded (power-of-two) storage dimensions.
    pub padded_width: u32,
    pub padded_height: u32,
    /// Scale factors mapping logical UVs onto the padded image.
    pub u_scale: f32,
    pub v_scale: f32,
}

impl Texture {
    /// True until the texture is destroyed.
    pub fn is_valid(&self) -> bool {
        self.image.is_some()
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// Owns the reserved white texture and tracks the currently bound
/// descriptor set.
pub struct TextureManager {
    white: Texture,
    bound_set: vk::DescriptorSet,
}

impl TextureManager {
    /// Create the manager and its reserved 1x1 opaque-white texture.
    ///
    /// The white texture is substituted whenever no texture is bound, so
    /// flat-colored draws share the textured descriptor-binding path.
    pub unsafe fn new(
        ctx: &VulkanContext,
        memory: &MemoryManager,
        commands: &CommandManager,
        descriptors: &TextureDescriptors,
    ) -> Result<Self, String> {
        let white = Self::create(ctx, memory, commands, descriptors, 1, 1, &[255, 255, 255, 255])?;
        let bound_set = white.descriptor_set;
        Ok(Self { white, bound_set })
    }

    /// Upload an RGBA pixel buffer into a new texture.
    pub unsafe fn create(
        ctx: &VulkanContext,
        memory: &MemoryManager,
        commands: &CommandManager,
        descriptors: &TextureDescriptors,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<Texture, String> {
        if width == 0 || height == 0 {
            return Err("Texture dimensions must be nonzero".to_string());
        }
        let logical_size = width as usize * height as usize * 4;
        if rgba.len() < logical_size {
            return Err(format!(
                "Texture data too small: {} bytes for {}x{}",
                rgba.len(),
                width,
                height
            ));
        }

        let padded_width = next_power_of_two(width);
        let padded_height = next_power_of_two(height);
        let padded_size = padded_width as vk::DeviceSize * padded_height as vk::DeviceSize * 4;

        // Stage the pixels, padding rows with zero fill when needed
        let staging = memory.create_staging_buffer(padded_size, "texture staging")?;
        let Some(mapped) = staging.mapped_ptr() else {
            memory.destroy_buffer(staging);
            return Err("Staging buffer is not host-visible".to_string());
        };
        if width == padded_width && height == padded_height {
            std::ptr::copy_nonoverlapping(rgba.as_ptr(), mapped, logical_size);
        } else {
            std::ptr::write_bytes(mapped, 0, padded_size as usize);
            let src_pitch = width as usize * 4;
            let dst_pitch = padded_width as usize * 4;
            for row in 0..height as usize {
                std::ptr::copy_nonoverlapping(
                    rgba.as_ptr().add(row * src_pitch),
                    mapped.add(row * dst_pitch),
                    src_pitch,
                );
            }
        }

        let image = match memory.create_texture_2d(padded_width, padded_height, "texture") {
            Ok(image) => image,
            Err(e) => {
                memory.destroy_buffer(staging);
                return Err(e);
            }
        };

        // Upload: undefined -> transfer-dst -> shader-read, synchronously
        let upload = commands.begin_single_time().and_then(|cmd| {
            commands.transition_image_layout(
                cmd,
                image.handle,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            );
            commands.copy_buffer_to_image(
                cmd,
                staging.handle,
                image.handle,
                padded_width,
                padded_height,
            );
            commands.transition_image_layout(
                cmd,
                image.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            );
            commands.end_single_time(ctx, cmd)
        });

        memory.destroy_buffer(staging);

        if let Err(e) = upload {
            memory.destroy_image(image);
            return Err(e);
        }

        // Nearest filtering keeps the chunky look of the source art
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(0.0);

        let sampler = match ctx.device.create_sampler(&sampler_info, None) {
            Ok(s) => s,
            Err(e) => {
                memory.destroy_image(image);
                return Err(format!("Failed to create sampler: {:?}", e));
            }
        };

        let descriptor_set = match descriptors.allocate_set() {
            Ok(set) => set,
            Err(e) => {
                ctx.device.destroy_sampler(sampler, None);
                memory.destroy_image(image);
                return Err(e);
            }
        };
        descriptors.write_set(descriptor_set, image.view, sampler);

        Ok(Texture {
            image: Some(image),
            sampler,
            descriptor_set,
            width,
            height,
            padded_width,
            padded_height,
            u_scale: width as f32 / padded_width as f32,
            v_scale: height as f32 / padded_height as f32,
        })
    }

    /// Destroy a texture. Safe to call on an already-destroyed handle.
    pub unsafe fn destroy_texture(
        ctx: &VulkanContext,
        memory: &MemoryManager,
        descriptors: &TextureDescriptors,
        texture: &mut Texture,
    ) {
        if texture.descriptor_set != vk::DescriptorSet::null() {
            descriptors.free_set(texture.descriptor_set);
            texture.descriptor_set = vk::DescriptorSet::null();
        }
        if texture.sampler != vk::Sampler::null() {
            ctx.device.destroy_sampler(texture.sampler, None);
            texture.sampler = vk::Sampler::null();
        }
        if let Some(image) = texture.image.take() {
            memory.destroy_image(image);
        }
    }

    /// Select the texture used by subsequent textured draws. `None` (or a
    /// destroyed texture) selects the reserved white texture.
    pub fn bind(&mut self, texture: Option<&Texture>) {
        self.bound_set = match texture {
            Some(t) if t.is_valid() => t.descriptor_set,
            _ => self.white.descriptor_set,
        };
    }

    /// Descriptor set for the currently bound texture.
    pub fn bound_set(&self) -> vk::DescriptorSet {
        self.bound_set
    }

    /// Reset the binding to the white texture (start of frame).
    pub fn reset_binding(&mut self) {
        self.bound_set = self.white.descriptor_set;
    }

    /// Descriptor set of the reserved white texture.
    pub fn white_set(&self) -> vk::DescriptorSet {
        self.white.descriptor_set
    }

    /// Destroy the reserved white texture.
    pub unsafe fn destroy(
        &mut self,
        ctx: &VulkanContext,
        memory: &MemoryManager,
        descriptors: &TextureDescriptors,
    ) {
        Self::destroy_texture(ctx, memory, descriptors, &mut self.white);
        self.bound_set = vk::DescriptorSet::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    // ============================================================
    // next_power_of_two
    // ============================================================

    #[test]
    fn test_next_power_of_two_exact() {
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(2), 2);
        assert_eq!(next_power_of_two(64), 64);
        assert_eq!(next_power_of_two(256), 256);
        assert_eq!(next_power_of_two(1024), 1024);
    }

    #[test]
    fn test_next_power_of_two_rounds_up() {
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(5), 8);
        assert_eq!(next_power_of_two(60), 64);
        assert_eq!(next_power_of_two(100), 128);
        assert_eq!(next_power_of_two(320), 512);
        assert_eq!(next_power_of_two(65), 128);
    }

    // ============================================================
    // Padding / UV scale math
    // ============================================================

    fn padded_and_scale(w: u32, h: u32) -> (u32, u32, f32, f32) {
        let tw = next_power_of_two(w);
        let th = next_power_of_two(h);
        (tw, th, w as f32 / tw as f32, h as f32 / th as f32)
    }

    #[test]
    fn test_padding_idempotent_on_pow2() {
        let (tw, th, us, vs) = padded_and_scale(64, 64);
        assert_eq!((tw, th), (64, 64));
        assert_eq!((us, vs), (1.0, 1.0));
    }

    #[test]
    fn test_padding_non_pow2() {
        let (tw, th, us, vs) = padded_and_scale(100, 60);
        assert_eq!((tw, th), (128, 64));
        assert_eq!(us, 100.0 / 128.0);
        assert_eq!(vs, 60.0 / 64.0);
    }

    #[test]
    fn test_padding_one_by_one() {
        let (tw, th, us, vs) = padded_and_scale(1, 1);
        assert_eq!((tw, th), (1, 1));
        assert_eq!((us, vs), (1.0, 1.0));
    }

    // ============================================================
    // Bind resolution
    // ============================================================

    fn dummy_texture(set: u64, valid: bool) -> Texture {
        Texture {
            image: valid.then(|| Image {
                handle: vk::Image::null(),
                view: vk::ImageView::null(),
                allocation: None,
                format: vk::Format::R8G8B8A8_UNORM,
                extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
            }),
            sampler: vk::Sampler::null(),
            descriptor_set: vk::DescriptorSet::from_raw(set),
            width: 1,
            height: 1,
            padded_width: 1,
            padded_height: 1,
            u_scale: 1.0,
            v_scale: 1.0,
        }
    }

    fn manager_with_white(set: u64) -> TextureManager {
        let white = dummy_texture(set, true);
        let bound_set = white.descriptor_set;
        TextureManager { white, bound_set }
    }

    #[test]
    fn test_bind_none_selects_white() {
        let mut mgr = manager_with_white(1);
        let tex = dummy_texture(2, true);
        mgr.bind(Some(&tex));
        assert_eq!(mgr.bound_set(), tex.descriptor_set());
        mgr.bind(None);
        assert_eq!(mgr.bound_set(), mgr.white_set());
    }

    #[test]
    fn test_bind_destroyed_texture_selects_white() {
        let mut mgr = manager_with_white(1);
        let dead = dummy_texture(3, false);
        assert!(!dead.is_valid());
        mgr.bind(Some(&dead));
        assert_eq!(mgr.bound_set(), mgr.white_set());
    }

    #[test]
    fn test_reset_binding_returns_to_white() {
        let mut mgr = manager_with_white(1);
        let tex = dummy_texture(2, true);
        mgr.bind(Some(&tex));
        mgr.reset_binding();
        assert_eq!(mgr.bound_set(), mgr.white_set());
    }
}
