//! Baked graphics pipeline table.
//!
//! The legacy API toggles blend and depth state dynamically; here every
//! reachable combination is a pre-built pipeline object, looked up at draw
//! time by (draw variant, blend mode). All pipelines share one layout and
//! one 80-byte push-constant block.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::renderer::Vertex;

use super::VulkanContext;

// ============================================================================
// SPIR-V bytecode (compiled at build time by glslc)
// ============================================================================

macro_rules! spv {
    ($name:expr) => {
        include_bytes!(concat!(env!("OUT_DIR"), "/spirv/", $name))
    };
}

const TEXTURED_VERT_SPV: &[u8] = spv!("textured.vert.spv");
const TEXTURED_FRAG_SPV: &[u8] = spv!("textured.frag.spv");
const FLAT_VERT_SPV: &[u8] = spv!("flat.vert.spv");
const FLAT_FRAG_SPV: &[u8] = spv!("flat.frag.spv");

// ============================================================================
// Draw variant and blend mode (pipeline table keys)
// ============================================================================

/// Draw variant: topology, texturing, and depth behavior baked together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Textured 3D geometry (walls, robots).
    Textured3d,
    /// Flat-shaded 3D (lasers, wireframe props).
    Flat3d,
    /// 3D lines.
    Line3d,
    /// 2D textured (bitmaps, HUD, menus).
    Textured2d,
    /// 2D flat color (rectangles, fades).
    Flat2d,
    /// 2D lines.
    Line2d,
}

impl PipelineVariant {
    pub const COUNT: usize = 6;

    pub const ALL: [PipelineVariant; Self::COUNT] = [
        PipelineVariant::Textured3d,
        PipelineVariant::Flat3d,
        PipelineVariant::Line3d,
        PipelineVariant::Textured2d,
        PipelineVariant::Flat2d,
        PipelineVariant::Line2d,
    ];

    /// Table index.
    pub fn index(self) -> usize {
        match self {
            PipelineVariant::Textured3d => 0,
            PipelineVariant::Flat3d => 1,
            PipelineVariant::Line3d => 2,
            PipelineVariant::Textured2d => 3,
            PipelineVariant::Flat2d => 4,
            PipelineVariant::Line2d => 5,
        }
    }

    /// Variant for a triangle draw.
    pub fn for_triangles(textured: bool, is_3d: bool) -> Self {
        match (textured, is_3d) {
            (true, true) => PipelineVariant::Textured3d,
            (true, false) => PipelineVariant::Textured2d,
            (false, true) => PipelineVariant::Flat3d,
            (false, false) => PipelineVariant::Flat2d,
        }
    }

    /// Variant for a line draw.
    pub fn for_lines(is_3d: bool) -> Self {
        if is_3d {
            PipelineVariant::Line3d
        } else {
            PipelineVariant::Line2d
        }
    }

    pub fn textured(self) -> bool {
        matches!(self, PipelineVariant::Textured3d | PipelineVariant::Textured2d)
    }

    pub fn is_3d(self) -> bool {
        matches!(
            self,
            PipelineVariant::Textured3d | PipelineVariant::Flat3d | PipelineVariant::Line3d
        )
    }

    pub fn is_line(self) -> bool {
        matches!(self, PipelineVariant::Line3d | PipelineVariant::Line2d)
    }

    /// Primitive topology. Fans never reach the pipeline: the draw facade
    /// flattens them to triangle lists first.
    pub fn topology(self) -> vk::PrimitiveTopology {
        if self.is_line() {
            vk::PrimitiveTopology::LINE_LIST
        } else {
            vk::PrimitiveTopology::TRIANGLE_LIST
        }
    }
}

/// Blend mode: exactly three discrete states, never interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// src_alpha, 1-src_alpha.
    Normal,
    /// src_alpha, one.
    AdditiveAlpha,
    /// one, one.
    AdditiveColor,
}

impl BlendMode {
    pub const COUNT: usize = 3;

    pub const ALL: [BlendMode; Self::COUNT] = [
        BlendMode::Normal,
        BlendMode::AdditiveAlpha,
        BlendMode::AdditiveColor,
    ];

    /// Table index.
    pub fn index(self) -> usize {
        match self {
            BlendMode::Normal => 0,
            BlendMode::AdditiveAlpha => 1,
            BlendMode::AdditiveColor => 2,
        }
    }

    /// Color blend factors (src, dst).
    pub fn blend_factors(self) -> (vk::BlendFactor, vk::BlendFactor) {
        match self {
            BlendMode::Normal => (
                vk::BlendFactor::SRC_ALPHA,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ),
            BlendMode::AdditiveAlpha => (vk::BlendFactor::SRC_ALPHA, vk::BlendFactor::ONE),
            BlendMode::AdditiveColor => (vk::BlendFactor::ONE, vk::BlendFactor::ONE),
        }
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        BlendMode::Normal
    }
}

// ============================================================================
// Push constants
// ============================================================================

/// Push-constant block shared by all pipelines: combined MVP matrix plus
/// the alpha-test reference, padded to 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct PushConstants {
    pub mvp: [f32; 16],
    pub alpha_ref: f32,
    pub pad: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<PushConstants>() == 80);

// ============================================================================
// Pipeline set
// ============================================================================

/// All 18 pipelines (6 variants x 3 blend modes), one shared layout.
///
/// Immutable after creation; the render pass is stable across resizes, so
/// these are never rebuilt.
pub struct PipelineSet {
    pipelines: [[vk::Pipeline; BlendMode::COUNT]; PipelineVariant::COUNT],
    layout: vk::PipelineLayout,
}

impl PipelineSet {
    /// Build every pipeline against the given render pass.
    pub unsafe fn new(
        ctx: &VulkanContext,
        render_pass: vk::RenderPass,
        texture_set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self, String> {
        let push_range = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<PushConstants>() as u32,
        }];

        let set_layouts = [texture_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_range);

        let layout = ctx
            .device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| format!("Failed to create pipeline layout: {:?}", e))?;

        let textured_vert = Self::create_shader_module(ctx, TEXTURED_VERT_SPV);
        let textured_frag = Self::create_shader_module(ctx, TEXTURED_FRAG_SPV);
        let flat_vert = Self::create_shader_module(ctx, FLAT_VERT_SPV);
        let flat_frag = Self::create_shader_module(ctx, FLAT_FRAG_SPV);

        let (textured_vert, textured_frag, flat_vert, flat_frag) =
            match (textured_vert, textured_frag, flat_vert, flat_frag) {
                (Ok(a), Ok(b), Ok(c), Ok(d)) => (a, b, c, d),
                (a, b, c, d) => {
                    let mut err = String::from("Failed to create shader modules");
                    for m in [a, b, c, d] {
                        match m {
                            Ok(m) => ctx.device.destroy_shader_module(m, None),
                            Err(e) => err = e,
                        }
                    }
                    ctx.device.destroy_pipeline_layout(layout, None);
                    return Err(err);
                }
            };

        let mut pipelines = [[vk::Pipeline::null(); BlendMode::COUNT]; PipelineVariant::COUNT];
        let mut error = None;

        'build: for variant in PipelineVariant::ALL {
            let (vert, frag) = if variant.textured() {
                (textured_vert, textured_frag)
            } else {
                (flat_vert, flat_frag)
            };

            for blend in BlendMode::ALL {
                match Self::build_pipeline(ctx, layout, render_pass, variant, blend, vert, frag) {
                    Ok(p) => pipelines[variant.index()][blend.index()] = p,
                    Err(e) => {
                        error = Some(e);
                        break 'build;
                    }
                }
            }
        }

        ctx.device.destroy_shader_module(textured_vert, None);
        ctx.device.destroy_shader_module(textured_frag, None);
        ctx.device.destroy_shader_module(flat_vert, None);
        ctx.device.destroy_shader_module(flat_frag, None);

        if let Some(e) = error {
            for row in &pipelines {
                for &p in row {
                    if p != vk::Pipeline::null() {
                        ctx.device.destroy_pipeline(p, None);
                    }
                }
            }
            ctx.device.destroy_pipeline_layout(layout, None);
            return Err(e);
        }

        Ok(Self { pipelines, layout })
    }

    /// Create a shader module from SPIR-V bytecode.
    unsafe fn create_shader_module(
        ctx: &VulkanContext,
        spirv: &[u8],
    ) -> Result<vk::ShaderModule, String> {
        // SPIR-V bytecode must be realigned to u32 words.
        let code: Vec<u32> = spirv
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        ctx.device
            .create_shader_module(&create_info, None)
            .map_err(|e| format!("Failed to create shader module: {:?}", e))
    }

    /// Build one pipeline for a (variant, blend) pair.
    unsafe fn build_pipeline(
        ctx: &VulkanContext,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        variant: PipelineVariant,
        blend: BlendMode,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
    ) -> Result<vk::Pipeline, String> {
        let entry_name = c"main";

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry_name),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry_name),
        ];

        // Vertex input: position, color, texcoord interleaved
        let binding_desc = [vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)];

        let attr_descs = [
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32A32_SFLOAT)
                .offset(12),
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(28),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_desc)
            .vertex_attribute_descriptions(&attr_descs);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(variant.topology())
            .primitive_restart_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // The engine does its own visibility work, so no face culling.
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 3D variants depth test and write; 2D overlays draw on top of
        // everything in submission order.
        let depth_enable = variant.is_3d();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_enable)
            .depth_write_enable(depth_enable)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let (src_factor, dst_factor) = blend.blend_factors();
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(src_factor)
            .dst_color_blend_factor(dst_factor)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = ctx
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|e| format!("Failed to create pipeline {:?}/{:?}: {:?}", variant, blend, e.1))?;

        Ok(pipelines[0])
    }

    /// Look up the pipeline for a (variant, blend) pair.
    pub fn get(&self, variant: PipelineVariant, blend: BlendMode) -> vk::Pipeline {
        self.pipelines[variant.index()][blend.index()]
    }

    /// The shared pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Destroy all pipelines and the layout.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        for row in &mut self.pipelines {
            for p in row {
                if *p != vk::Pipeline::null() {
                    ctx.device.destroy_pipeline(*p, None);
                    *p = vk::Pipeline::null();
                }
            }
        }
        ctx.device.destroy_pipeline_layout(self.layout, None);
        self.layout = vk::PipelineLayout::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // PipelineVariant
    // ============================================================

    #[test]
    fn test_variant_indices_are_distinct() {
        let mut seen = [false; PipelineVariant::COUNT];
        for v in PipelineVariant::ALL {
            assert!(!seen[v.index()]);
            seen[v.index()] = true;
        }
    }

    #[test]
    fn test_variant_for_triangles() {
        assert_eq!(
            PipelineVariant::for_triangles(true, true),
            PipelineVariant::Textured3d
        );
        assert_eq!(
            PipelineVariant::for_triangles(true, false),
            PipelineVariant::Textured2d
        );
        assert_eq!(
            PipelineVariant::for_triangles(false, true),
            PipelineVariant::Flat3d
        );
        assert_eq!(
            PipelineVariant::for_triangles(false, false),
            PipelineVariant::Flat2d
        );
    }

    #[test]
    fn test_variant_for_lines() {
        assert_eq!(PipelineVariant::for_lines(true), PipelineVariant::Line3d);
        assert_eq!(PipelineVariant::for_lines(false), PipelineVariant::Line2d);
    }

    #[test]
    fn test_line_variants_use_line_list() {
        for v in PipelineVariant::ALL {
            let expected = if v.is_line() {
                vk::PrimitiveTopology::LINE_LIST
            } else {
                vk::PrimitiveTopology::TRIANGLE_LIST
            };
            assert_eq!(v.topology(), expected);
        }
    }

    #[test]
    fn test_variant_3d_and_textured_flags() {
        assert!(PipelineVariant::Textured3d.is_3d());
        assert!(PipelineVariant::Textured3d.textured());
        assert!(!PipelineVariant::Textured2d.is_3d());
        assert!(PipelineVariant::Line3d.is_3d());
        assert!(!PipelineVariant::Line3d.textured());
        assert!(!PipelineVariant::Flat2d.is_3d());
        assert!(!PipelineVariant::Flat2d.textured());
    }

    // ============================================================
    // BlendMode
    // ============================================================

    #[test]
    fn test_blend_indices_are_distinct() {
        let mut seen = [false; BlendMode::COUNT];
        for b in BlendMode::ALL {
            assert!(!seen[b.index()]);
            seen[b.index()] = true;
        }
    }

    #[test]
    fn test_blend_factors() {
        assert_eq!(
            BlendMode::Normal.blend_factors(),
            (
                vk::BlendFactor::SRC_ALPHA,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA
            )
        );
        assert_eq!(
            BlendMode::AdditiveAlpha.blend_factors(),
            (vk::BlendFactor::SRC_ALPHA, vk::BlendFactor::ONE)
        );
        assert_eq!(
            BlendMode::AdditiveColor.blend_factors(),
            (vk::BlendFactor::ONE, vk::BlendFactor::ONE)
        );
    }

    #[test]
    fn test_default_blend_is_normal() {
        assert_eq!(BlendMode::default(), BlendMode::Normal);
    }

    // ============================================================
    // PushConstants
    // ============================================================

    #[test]
    fn test_push_constants_layout() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 80);
        assert_eq!(std::mem::offset_of!(PushConstants, mvp), 0);
        assert_eq!(std::mem::offset_of!(PushConstants, alpha_ref), 64);
    }

    #[test]
    fn test_vertex_attribute_offsets() {
        assert_eq!(std::mem::size_of::<Vertex>(), 36);
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 28);
    }
}
