//! Pipeline layouts and graphics pipelines.
//!
//! [`GraphicsPipelineBuilder`] targets one subpass of a [`RenderPass`]:
//! sample count and the number of color blend states must agree with it.
//! Viewport and scissor are always dynamic.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        debug!(
            "Created pipeline layout with {} set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    name: &'static str,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Pipeline '{}' destroyed", self.name);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::Front => vk::CullModeFlags::FRONT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    OneMinusSrcColor,
}

impl BlendFactor {
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        }
    }
}

/// Per-attachment blend state. Blend op is always `ADD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    /// `None` writes the fragment unblended.
    pub color: Option<(BlendFactor, BlendFactor)>,
    pub alpha: Option<(BlendFactor, BlendFactor)>,
    pub write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self::replace()
    }
}

impl ColorBlendAttachment {
    /// Overwrites the attachment.
    pub fn replace() -> Self {
        Self {
            color: None,
            alpha: None,
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Sums premultiplied, weighted color and weights: `dst += src`.
    pub fn accumulation() -> Self {
        Self {
            color: Some((BlendFactor::One, BlendFactor::One)),
            alpha: Some((BlendFactor::One, BlendFactor::One)),
            write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Multiplies the single-channel revealage by each fragment's
    /// transmittance: `dst *= 1 - src`.
    pub fn revealage() -> Self {
        Self {
            color: Some((BlendFactor::Zero, BlendFactor::OneMinusSrcColor)),
            alpha: Some((BlendFactor::Zero, BlendFactor::OneMinusSrcAlpha)),
            write_mask: vk::ColorComponentFlags::R,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        let enabled = self.color.is_some() || self.alpha.is_some();
        let (src_color, dst_color) = self.color.unwrap_or((BlendFactor::One, BlendFactor::Zero));
        let (src_alpha, dst_alpha) = self.alpha.unwrap_or((BlendFactor::One, BlendFactor::Zero));

        vk::PipelineColorBlendAttachmentState {
            blend_enable: enabled.into(),
            src_color_blend_factor: src_color.to_vk(),
            dst_color_blend_factor: dst_color.to_vk(),
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: src_alpha.to_vk(),
            dst_alpha_blend_factor: dst_alpha.to_vk(),
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: self.write_mask,
        }
    }
}

/// Depth test configuration. `None` on the builder disables depth entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub write: bool,
    pub compare: CompareOp,
}

impl DepthState {
    pub const READ_WRITE: Self = Self {
        write: true,
        compare: CompareOp::Less,
    };

    /// Tests against existing depth without modifying it.
    pub const READ_ONLY: Self = Self {
        write: false,
        compare: CompareOp::LessOrEqual,
    };
}

pub struct GraphicsPipelineBuilder<'a> {
    name: &'static str,
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: CullMode,
    depth: Option<DepthState>,
    blend_attachments: Vec<ColorBlendAttachment>,
    render_pass: Option<&'a RenderPass>,
    subpass: u32,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: CullMode::Back,
            depth: None,
            blend_attachments: Vec::new(),
            render_pass: None,
            subpass: 0,
        }
    }

    pub fn shaders(mut self, vertex: &'a Shader, fragment: &'a Shader) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    /// Vertex layout. Leave unset for pipelines that generate vertices in
    /// the shader.
    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = vec![binding];
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = Some(depth);
        self
    }

    /// One blend state per color attachment of the subpass, in order.
    pub fn blend_attachments(mut self, attachments: &[ColorBlendAttachment]) -> Self {
        self.blend_attachments = attachments.to_vec();
        self
    }

    pub fn render_pass(mut self, render_pass: &'a RenderPass, subpass: u32) -> Self {
        self.render_pass = Some(render_pass);
        self.subpass = subpass;
        self
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (Some(vertex_shader), Some(fragment_shader)) =
            (self.vertex_shader, self.fragment_shader)
        else {
            return Err(RhiError::PipelineError(format!(
                "'{}': vertex and fragment shaders are required",
                self.name
            )));
        };
        let render_pass = self.render_pass.ok_or_else(|| {
            RhiError::PipelineError(format!("'{}': render pass is required", self.name))
        })?;

        let pass_desc = render_pass.desc();
        check_blend_count(
            self.name,
            pass_desc.subpass.color.len(),
            self.blend_attachments.len(),
        )?;
        if self.depth.is_some() && pass_desc.subpass.depth.is_none() {
            return Err(RhiError::PipelineError(format!(
                "'{}': depth state set but render pass '{}' has no depth attachment",
                self.name, pass_desc.name
            )));
        }

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(pass_desc.samples());

        let depth = self.depth;
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth.is_some())
            .depth_write_enable(depth.is_some_and(|d| d.write))
            .depth_compare_op(depth.map_or(vk::CompareOp::ALWAYS, |d| d.compare.to_vk()))
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_states: Vec<_> = self.blend_attachments.iter().map(|a| a.to_vk()).collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_states);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(self.subpass);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError(format!("'{}': no pipeline returned", self.name))
        })?;

        info!("Graphics pipeline '{}' created", self.name);
        Ok(Pipeline {
            device,
            pipeline,
            name: self.name,
        })
    }
}

fn check_blend_count(name: &str, color_attachments: usize, blend_states: usize) -> RhiResult<()> {
    if color_attachments != blend_states {
        return Err(RhiError::PipelineError(format!(
            "'{}': {} blend states for {} color attachments",
            name, blend_states, color_attachments
        )));
    }
    Ok(())
}
