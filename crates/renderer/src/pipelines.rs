//! Descriptor set layouts and the three graphics pipelines.
//!
//! Mesh pipelines (opaque and transparent) share one layout:
//!
//! | Set | Binding | Content |
//! |-----|---------|---------|
//! | 0   | 0       | [`FrameUniforms`] |
//! | 1   | 0..=6   | material textures, in [`TextureSlot`] order |
//! | 1   | 7       | [`MaterialUniforms`] |
//!
//! plus [`DrawPushConstants`] for the vertex and fragment stages. The
//! composite pipeline reads set 0 with the opaque color, accumulation and
//! revealage targets at bindings 0..=2.

use std::mem::offset_of;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use translucent_resources::{
    DrawPushConstants, FrameUniforms, MaterialUniforms, TextureSlot, Vertex,
};
use translucent_rhi::RhiResult;
use translucent_rhi::descriptor::{
    DescriptorSetLayout, combined_image_sampler_binding, uniform_buffer_binding,
};
use translucent_rhi::device::Device;
use translucent_rhi::pipeline::{
    ColorBlendAttachment, CullMode, DepthState, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use translucent_rhi::shader::{Shader, ShaderStage};
use translucent_rhi::vertex::{attribute, float_format, interleaved_binding};

use crate::passes::PassGraph;

pub const FRAME_SET: u32 = 0;
pub const MATERIAL_SET: u32 = 1;
pub const MATERIAL_UNIFORM_BINDING: u32 = TextureSlot::COUNT as u32;
/// Number of targets sampled by the composite pass.
pub const COMPOSITE_INPUTS: u32 = 3;

pub const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

pub const MESH_VERTEX_SHADER: &str = "mesh.vert.spv";
pub const OPAQUE_FRAGMENT_SHADER: &str = "opaque.frag.spv";
pub const TRANSPARENT_FRAGMENT_SHADER: &str = "transparent.frag.spv";
pub const COMPOSITE_VERTEX_SHADER: &str = "composite.vert.spv";
pub const COMPOSITE_FRAGMENT_SHADER: &str = "composite.frag.spv";

/// [`Vertex`] attributes at locations 0..=5.
pub fn mesh_vertex_attributes() -> [vk::VertexInputAttributeDescription; 6] {
    [
        attribute(0, float_format(3), offset_of!(Vertex, position)),
        attribute(1, float_format(3), offset_of!(Vertex, normal)),
        attribute(2, float_format(2), offset_of!(Vertex, uv0)),
        attribute(3, float_format(2), offset_of!(Vertex, uv1)),
        attribute(4, float_format(4), offset_of!(Vertex, tangent)),
        attribute(5, float_format(4), offset_of!(Vertex, color)),
    ]
}

pub fn draw_push_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: PUSH_STAGES,
        offset: 0,
        size: DrawPushConstants::size() as u32,
    }
}

pub fn frame_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    vec![uniform_buffer_binding(0, PUSH_STAGES)]
}

pub fn material_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let mut bindings: Vec<_> = (0..MATERIAL_UNIFORM_BINDING)
        .map(|binding| combined_image_sampler_binding(binding, vk::ShaderStageFlags::FRAGMENT))
        .collect();
    bindings.push(uniform_buffer_binding(MATERIAL_UNIFORM_BINDING, PUSH_STAGES));
    bindings
}

pub fn composite_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    (0..COMPOSITE_INPUTS)
        .map(|binding| combined_image_sampler_binding(binding, vk::ShaderStageFlags::FRAGMENT))
        .collect()
}

/// Descriptor set layouts shared by pipelines and the sets allocated
/// against them.
pub struct SetLayouts {
    pub composite: DescriptorSetLayout,
    pub material: DescriptorSetLayout,
    pub frame: DescriptorSetLayout,
}

impl SetLayouts {
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            frame: DescriptorSetLayout::new(device.clone(), &frame_bindings())?,
            material: DescriptorSetLayout::new(device.clone(), &material_bindings())?,
            composite: DescriptorSetLayout::new(device.clone(), &composite_bindings())?,
        })
    }
}

pub struct Pipelines {
    composite: Pipeline,
    transparent: Pipeline,
    opaque: Pipeline,
    composite_layout: PipelineLayout,
    mesh_layout: PipelineLayout,
}

impl Pipelines {
    /// Loads the SPIR-V shaders from `shader_dir` and builds all pipelines.
    /// Shader modules are released once the pipelines exist.
    pub fn new(
        device: &Arc<Device>,
        shader_dir: &Path,
        layouts: &SetLayouts,
        passes: &PassGraph,
    ) -> RhiResult<Self> {
        let load = |name: &str, stage| Shader::from_spirv_file(device.clone(), &shader_dir.join(name), stage);

        let mesh_vert = load(MESH_VERTEX_SHADER, ShaderStage::Vertex)?;
        let opaque_frag = load(OPAQUE_FRAGMENT_SHADER, ShaderStage::Fragment)?;
        let transparent_frag = load(TRANSPARENT_FRAGMENT_SHADER, ShaderStage::Fragment)?;
        let composite_vert = load(COMPOSITE_VERTEX_SHADER, ShaderStage::Vertex)?;
        let composite_frag = load(COMPOSITE_FRAGMENT_SHADER, ShaderStage::Fragment)?;

        let mesh_layout = PipelineLayout::new(
            device.clone(),
            &[layouts.frame.handle(), layouts.material.handle()],
            &[draw_push_range()],
        )?;
        let composite_layout =
            PipelineLayout::new(device.clone(), &[layouts.composite.handle()], &[])?;

        let binding = interleaved_binding(std::mem::size_of::<Vertex>());
        let attributes = mesh_vertex_attributes();

        let opaque = GraphicsPipelineBuilder::new("opaque")
            .shaders(&mesh_vert, &opaque_frag)
            .vertex_input(binding, &attributes)
            .cull_mode(CullMode::Back)
            .depth(DepthState::READ_WRITE)
            .blend_attachments(&[ColorBlendAttachment::replace()])
            .render_pass(passes.opaque(), 0)
            .build(device.clone(), &mesh_layout)?;

        // Back faces of glass contribute to the weighted sum as well.
        let transparent = GraphicsPipelineBuilder::new("transparent")
            .shaders(&mesh_vert, &transparent_frag)
            .vertex_input(binding, &attributes)
            .cull_mode(CullMode::None)
            .depth(DepthState::READ_ONLY)
            .blend_attachments(&[
                ColorBlendAttachment::accumulation(),
                ColorBlendAttachment::revealage(),
            ])
            .render_pass(passes.transparency(), 0)
            .build(device.clone(), &mesh_layout)?;

        let composite = GraphicsPipelineBuilder::new("composite")
            .shaders(&composite_vert, &composite_frag)
            .cull_mode(CullMode::None)
            .blend_attachments(&[ColorBlendAttachment::replace()])
            .render_pass(passes.present(), 0)
            .build(device.clone(), &composite_layout)?;

        info!(
            "Pipelines ready (frame uniforms {} B, material uniforms {} B, push constants {} B)",
            FrameUniforms::size(),
            MaterialUniforms::size(),
            DrawPushConstants::size()
        );

        Ok(Self {
            composite,
            transparent,
            opaque,
            composite_layout,
            mesh_layout,
        })
    }

    #[inline]
    pub fn opaque(&self) -> &Pipeline {
        &self.opaque
    }

    #[inline]
    pub fn transparent(&self) -> &Pipeline {
        &self.transparent
    }

    #[inline]
    pub fn composite(&self) -> &Pipeline {
        &self.composite
    }

    #[inline]
    pub fn mesh_layout(&self) -> &PipelineLayout {
        &self.mesh_layout
    }

    #[inline]
    pub fn composite_layout(&self) -> &PipelineLayout {
        &self.composite_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_attributes_follow_vertex_layout() {
        let attributes = mesh_vertex_attributes();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 40, 56]);
        for (location, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, location as u32);
            assert_eq!(attribute.binding, 0);
        }
        assert_eq!(attributes[4].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(
            interleaved_binding(std::mem::size_of::<Vertex>()).stride,
            72
        );
    }

    #[test]
    fn test_push_range_fits_guaranteed_minimum() {
        let range = draw_push_range();
        assert_eq!(range.offset, 0);
        assert!(range.size <= 128);
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_material_bindings() {
        let bindings = material_bindings();
        assert_eq!(bindings.len(), TextureSlot::COUNT + 1);
        for (i, binding) in bindings[..TextureSlot::COUNT].iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
            assert_eq!(
                binding.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
        }
        let uniforms = bindings[TextureSlot::COUNT];
        assert_eq!(uniforms.binding, MATERIAL_UNIFORM_BINDING);
        assert_eq!(uniforms.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn test_composite_bindings() {
        let bindings = composite_bindings();
        assert_eq!(bindings.len(), COMPOSITE_INPUTS as usize);
        assert!(
            bindings
                .iter()
                .all(|b| b.stage_flags == vk::ShaderStageFlags::FRAGMENT)
        );
    }

    #[test]
    fn test_frame_binding_is_uniform_buffer() {
        let bindings = frame_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }
}
