//! Single-subpass render passes built with `vkCreateRenderPass2`.
//!
//! A [`RenderPassDesc`] is plain data so attachment layouts, load/store
//! behavior and dependencies can be checked without a device. Multisample
//! depth is resolved in-pass through `VkSubpassDescriptionDepthStencilResolve`.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// One attachment slot of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentDesc {
    fn to_vk(self) -> vk::AttachmentDescription2<'static> {
        vk::AttachmentDescription2::default()
            .format(self.format)
            .samples(self.samples)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }
}

/// Attachment index and the layout it has during the subpass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentRef {
    pub index: u32,
    pub layout: vk::ImageLayout,
}

impl AttachmentRef {
    pub const fn new(index: u32, layout: vk::ImageLayout) -> Self {
        Self { index, layout }
    }

    fn to_vk(self, aspect: vk::ImageAspectFlags) -> vk::AttachmentReference2<'static> {
        vk::AttachmentReference2::default()
            .attachment(self.index)
            .layout(self.layout)
            .aspect_mask(aspect)
    }
}

/// The subpass's attachment usage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassDesc {
    pub color: Vec<AttachmentRef>,
    /// Empty, or one resolve target per color attachment.
    pub resolve: Vec<AttachmentRef>,
    pub depth: Option<AttachmentRef>,
    /// Single-sample target for the multisampled depth attachment.
    pub depth_resolve: Option<AttachmentRef>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl Dependency {
    fn to_vk(self) -> vk::SubpassDependency2<'static> {
        vk::SubpassDependency2::default()
            .src_subpass(self.src_subpass)
            .dst_subpass(self.dst_subpass)
            .src_stage_mask(self.src_stage)
            .dst_stage_mask(self.dst_stage)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub name: &'static str,
    pub attachments: Vec<AttachmentDesc>,
    pub subpass: SubpassDesc,
    pub dependencies: Vec<Dependency>,
}

impl RenderPassDesc {
    /// Checks references and sample counts: all color and depth attachments
    /// of the subpass share one sample count, and resolve targets are
    /// single-sample.
    pub fn validate(&self) -> RhiResult<()> {
        let fail = |msg: String| Err(RhiError::RenderPassError(format!("{}: {}", self.name, msg)));

        let subpass = &self.subpass;
        let all_refs = subpass
            .color
            .iter()
            .chain(&subpass.resolve)
            .chain(subpass.depth.iter())
            .chain(subpass.depth_resolve.iter());
        for r in all_refs {
            if r.index as usize >= self.attachments.len() {
                return fail(format!("attachment {} out of range", r.index));
            }
        }

        if !subpass.resolve.is_empty() && subpass.resolve.len() != subpass.color.len() {
            return fail(format!(
                "{} resolve targets for {} color attachments",
                subpass.resolve.len(),
                subpass.color.len()
            ));
        }

        let mut samples = subpass
            .color
            .iter()
            .chain(subpass.depth.iter())
            .map(|r| self.attachments[r.index as usize].samples);
        if let Some(first) = samples.next()
            && samples.any(|s| s != first)
        {
            return fail("attachments disagree on sample count".to_string());
        }

        for r in subpass.resolve.iter().chain(subpass.depth_resolve.iter()) {
            if self.attachments[r.index as usize].samples != vk::SampleCountFlags::TYPE_1 {
                return fail(format!("resolve target {} is multisampled", r.index));
            }
        }

        if subpass.depth_resolve.is_some() && subpass.depth.is_none() {
            return fail("depth resolve without a depth attachment".to_string());
        }

        Ok(())
    }

    /// Sample count used by the subpass.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.subpass
            .color
            .first()
            .or(self.subpass.depth.as_ref())
            .and_then(|r| self.attachments.get(r.index as usize))
            .map(|a| a.samples)
            .unwrap_or(vk::SampleCountFlags::TYPE_1)
    }
}

pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    pub fn new(device: Arc<Device>, desc: RenderPassDesc) -> RhiResult<Self> {
        desc.validate()?;

        let attachments: Vec<_> = desc.attachments.iter().map(|a| a.to_vk()).collect();
        let color: Vec<_> = desc
            .subpass
            .color
            .iter()
            .map(|r| r.to_vk(vk::ImageAspectFlags::COLOR))
            .collect();
        let resolve: Vec<_> = desc
            .subpass
            .resolve
            .iter()
            .map(|r| r.to_vk(vk::ImageAspectFlags::COLOR))
            .collect();
        let depth = desc
            .subpass
            .depth
            .map(|r| r.to_vk(vk::ImageAspectFlags::DEPTH));
        let depth_resolve = desc
            .subpass
            .depth_resolve
            .map(|r| r.to_vk(vk::ImageAspectFlags::DEPTH));

        let mut depth_resolve_info = depth_resolve.as_ref().map(|target| {
            vk::SubpassDescriptionDepthStencilResolve::default()
                .depth_resolve_mode(vk::ResolveModeFlags::SAMPLE_ZERO)
                .stencil_resolve_mode(vk::ResolveModeFlags::NONE)
                .depth_stencil_resolve_attachment(target)
        });

        let mut subpass = vk::SubpassDescription2::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color);
        if !resolve.is_empty() {
            subpass = subpass.resolve_attachments(&resolve);
        }
        if let Some(depth) = depth.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth);
        }
        if let Some(info) = depth_resolve_info.as_mut() {
            subpass = subpass.push_next(info);
        }

        let subpasses = [subpass];
        let dependencies: Vec<_> = desc.dependencies.iter().map(|d| d.to_vk()).collect();
        let create_info = vk::RenderPassCreateInfo2::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass2(&create_info, None)? };
        debug!(
            "Created render pass '{}' with {} attachments",
            desc.name,
            desc.attachments.len()
        );

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.desc.attachments.len()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass '{}'", self.desc.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(format: vk::Format, samples: vk::SampleCountFlags) -> AttachmentDesc {
        AttachmentDesc {
            format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    fn msaa_desc() -> RenderPassDesc {
        RenderPassDesc {
            name: "test",
            attachments: vec![
                attachment(vk::Format::R16G16B16A16_SFLOAT, vk::SampleCountFlags::TYPE_4),
                attachment(vk::Format::D32_SFLOAT, vk::SampleCountFlags::TYPE_4),
                attachment(vk::Format::R16G16B16A16_SFLOAT, vk::SampleCountFlags::TYPE_1),
                attachment(vk::Format::D32_SFLOAT, vk::SampleCountFlags::TYPE_1),
            ],
            subpass: SubpassDesc {
                color: vec![AttachmentRef::new(
                    0,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                )],
                resolve: vec![AttachmentRef::new(
                    2,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                )],
                depth: Some(AttachmentRef::new(
                    1,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                )),
                depth_resolve: Some(AttachmentRef::new(
                    3,
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                )),
            },
            dependencies: vec![],
        }
    }

    #[test]
    fn test_valid_msaa_pass() {
        let desc = msaa_desc();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn test_rejects_out_of_range_reference() {
        let mut desc = msaa_desc();
        desc.subpass.depth_resolve = Some(AttachmentRef::new(
            9,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        assert!(matches!(
            desc.validate(),
            Err(RhiError::RenderPassError(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_samples() {
        let mut desc = msaa_desc();
        desc.attachments[1].samples = vk::SampleCountFlags::TYPE_2;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_rejects_multisampled_resolve_target() {
        let mut desc = msaa_desc();
        desc.attachments[3].samples = vk::SampleCountFlags::TYPE_4;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_rejects_depth_resolve_without_depth() {
        let mut desc = msaa_desc();
        desc.subpass.depth = None;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_color_only_pass_defaults_to_single_sample() {
        let desc = RenderPassDesc {
            name: "empty",
            attachments: vec![],
            subpass: SubpassDesc::default(),
            dependencies: vec![],
        };
        assert!(desc.validate().is_ok());
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_1);
    }
}
