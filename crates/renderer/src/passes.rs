//! The three render passes of a frame.
//!
//! ```text
//! opaque        color + depth (MSAA), resolved to single-sample color/depth
//!   | barrier:  color -> shader read, depth -> read-only depth
//! transparency  accum (clear 0) + reveal (clear 1), depth loaded read-only
//!   | barrier:  accum, reveal -> shader read
//! present       full-screen composite into the acquired swapchain image
//! ```
//!
//! Pass descriptions are plain data built by free functions so their load
//! and store behavior and layouts can be checked without a device.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use translucent_rhi::RhiResult;
use translucent_rhi::device::Device;
use translucent_rhi::render_pass::{
    AttachmentDesc, AttachmentRef, Dependency, RenderPass, RenderPassDesc, SubpassDesc,
};

use crate::targets::{ACCUM_FORMAT, COLOR_FORMAT, REVEAL_FORMAT};

const COLOR_ATTACHMENT: vk::ImageLayout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
const DEPTH_ATTACHMENT: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
const DEPTH_READ_ONLY: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;

const FRAGMENT_TESTS: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw()
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

/// Opaque geometry with depth test and write.
///
/// Single-sample: `[color, depth]`, both stored. Multisampled:
/// `[msaa color, msaa depth, color resolve, depth resolve]`, where only the
/// resolve targets are stored. Final layouts stay attachment layouts; the
/// hand-off to later passes is an explicit barrier.
pub fn opaque_pass_desc(samples: vk::SampleCountFlags, depth_format: vk::Format) -> RenderPassDesc {
    let multisampled = samples != vk::SampleCountFlags::TYPE_1;
    let store = if multisampled {
        vk::AttachmentStoreOp::DONT_CARE
    } else {
        vk::AttachmentStoreOp::STORE
    };

    let mut attachments = vec![
        AttachmentDesc {
            format: COLOR_FORMAT,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: store,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: COLOR_ATTACHMENT,
        },
        AttachmentDesc {
            format: depth_format,
            samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: store,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: DEPTH_ATTACHMENT,
        },
    ];
    let mut subpass = SubpassDesc {
        color: vec![AttachmentRef::new(0, COLOR_ATTACHMENT)],
        depth: Some(AttachmentRef::new(1, DEPTH_ATTACHMENT)),
        ..Default::default()
    };

    if multisampled {
        attachments.push(resolve_target(COLOR_FORMAT, COLOR_ATTACHMENT));
        attachments.push(resolve_target(depth_format, DEPTH_ATTACHMENT));
        subpass.resolve = vec![AttachmentRef::new(2, COLOR_ATTACHMENT)];
        subpass.depth_resolve = Some(AttachmentRef::new(3, DEPTH_ATTACHMENT));
    }

    RenderPassDesc {
        name: "opaque",
        attachments,
        subpass,
        // The previous frame's transparency and present passes may still be
        // reading these targets.
        dependencies: vec![Dependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | FRAGMENT_TESTS,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | FRAGMENT_TESTS,
            src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        }],
    }
}

fn resolve_target(format: vk::Format, layout: vk::ImageLayout) -> AttachmentDesc {
    AttachmentDesc {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: layout,
    }
}

/// Weighted blended transparency: `[accum, reveal, depth]`.
///
/// Both color targets are cleared every frame, even with nothing to draw,
/// so the composite always reads defined values. Depth is loaded from the
/// opaque pass and only tested.
pub fn transparency_pass_desc(depth_format: vk::Format) -> RenderPassDesc {
    let cleared = |format| AttachmentDesc {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: COLOR_ATTACHMENT,
    };

    RenderPassDesc {
        name: "transparency",
        attachments: vec![
            cleared(ACCUM_FORMAT),
            cleared(REVEAL_FORMAT),
            AttachmentDesc {
                format: depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::LOAD,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: DEPTH_READ_ONLY,
                final_layout: DEPTH_READ_ONLY,
            },
        ],
        subpass: SubpassDesc {
            color: vec![
                AttachmentRef::new(0, COLOR_ATTACHMENT),
                AttachmentRef::new(1, COLOR_ATTACHMENT),
            ],
            depth: Some(AttachmentRef::new(2, DEPTH_READ_ONLY)),
            ..Default::default()
        },
        // Previous frame's composite may still sample accum and reveal.
        dependencies: vec![Dependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        }],
    }
}

/// Composite into the presentable image, which leaves ready to present.
pub fn present_pass_desc(swapchain_format: vk::Format) -> RenderPassDesc {
    RenderPassDesc {
        name: "present",
        attachments: vec![AttachmentDesc {
            format: swapchain_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }],
        subpass: SubpassDesc {
            color: vec![AttachmentRef::new(0, COLOR_ATTACHMENT)],
            ..Default::default()
        },
        // Orders the layout transition after the acquire semaphore wait,
        // which happens at color attachment output.
        dependencies: vec![Dependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        }],
    }
}

/// Clear values for the opaque pass, one per attachment.
pub fn opaque_clear_values(clear_color: [f32; 4], attachments: usize) -> Vec<vk::ClearValue> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    };
    let depth = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    };
    // Resolve targets are not cleared, but the array must cover them.
    [color, depth].into_iter().cycle().take(attachments).collect()
}

/// Accumulation starts empty and revealage fully revealed.
pub fn transparency_clear_values() -> [vk::ClearValue; 3] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0; 4],
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [1.0; 4],
            },
        },
        vk::ClearValue::default(),
    ]
}

pub fn present_clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }]
}

/// The three render passes. Only the present pass depends on the swapchain,
/// through its format.
pub struct PassGraph {
    present: RenderPass,
    transparency: RenderPass,
    opaque: RenderPass,
}

impl PassGraph {
    pub fn new(
        device: &Arc<Device>,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
        swapchain_format: vk::Format,
    ) -> RhiResult<Self> {
        let opaque = RenderPass::new(device.clone(), opaque_pass_desc(samples, depth_format))?;
        let transparency = RenderPass::new(device.clone(), transparency_pass_desc(depth_format))?;
        let present = RenderPass::new(device.clone(), present_pass_desc(swapchain_format))?;

        info!(
            "Pass graph created: opaque x{}, transparency, present {:?}",
            samples.as_raw(),
            swapchain_format
        );

        Ok(Self {
            present,
            transparency,
            opaque,
        })
    }

    #[inline]
    pub fn opaque(&self) -> &RenderPass {
        &self.opaque
    }

    #[inline]
    pub fn transparency(&self) -> &RenderPass {
        &self.transparency
    }

    #[inline]
    pub fn present(&self) -> &RenderPass {
        &self.present
    }

    /// Format the present pass was built for.
    pub fn present_format(&self) -> vk::Format {
        self.present.desc().attachments[0].format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn test_opaque_single_sample_stores_directly() {
        let desc = opaque_pass_desc(vk::SampleCountFlags::TYPE_1, DEPTH);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.attachments.len(), 2);
        assert!(desc.subpass.resolve.is_empty());
        assert!(desc.subpass.depth_resolve.is_none());
        for attachment in &desc.attachments {
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        }
        assert_eq!(desc.attachments[1].final_layout, DEPTH_ATTACHMENT);
    }

    #[test]
    fn test_opaque_multisampled_resolves_color_and_depth() {
        let desc = opaque_pass_desc(vk::SampleCountFlags::TYPE_4, DEPTH);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.attachments.len(), 4);
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_4);

        // Multisampled contents are discarded; only resolves are kept.
        assert_eq!(desc.attachments[0].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(desc.attachments[1].store_op, vk::AttachmentStoreOp::DONT_CARE);
        for resolve in &desc.attachments[2..] {
            assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
            assert_eq!(resolve.store_op, vk::AttachmentStoreOp::STORE);
        }
        assert_eq!(desc.subpass.resolve, vec![AttachmentRef::new(2, COLOR_ATTACHMENT)]);
        assert_eq!(
            desc.subpass.depth_resolve,
            Some(AttachmentRef::new(3, DEPTH_ATTACHMENT))
        );
    }

    #[test]
    fn test_transparency_clears_targets_and_loads_depth() {
        let desc = transparency_pass_desc(DEPTH);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_1);

        let [accum, reveal, depth] = desc.attachments[..] else {
            panic!("expected three attachments");
        };
        assert_eq!(accum.format, ACCUM_FORMAT);
        assert_eq!(reveal.format, REVEAL_FORMAT);
        assert_eq!(accum.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(reveal.load_op, vk::AttachmentLoadOp::CLEAR);

        assert_eq!(depth.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(depth.initial_layout, DEPTH_READ_ONLY);
        assert_eq!(desc.subpass.depth.map(|r| r.layout), Some(DEPTH_READ_ONLY));
    }

    #[test]
    fn test_transparency_clear_values() {
        let [accum, reveal, _] = transparency_clear_values();
        unsafe {
            assert_eq!(accum.color.float32, [0.0; 4]);
            assert_eq!(reveal.color.float32[0], 1.0);
        }
    }

    #[test]
    fn test_present_ends_ready_to_present() {
        let desc = present_pass_desc(vk::Format::B8G8R8A8_SRGB);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.attachments.len(), 1);
        assert_eq!(desc.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(desc.subpass.depth.is_none());
        assert_eq!(desc.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_opaque_clear_values_cover_attachments() {
        let values = opaque_clear_values([0.1, 0.2, 0.3, 1.0], 4);
        assert_eq!(values.len(), 4);
        unsafe {
            assert_eq!(values[0].color.float32, [0.1, 0.2, 0.3, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
        }
    }

    #[test]
    fn test_depth_formats_agree_across_passes() {
        let opaque = opaque_pass_desc(vk::SampleCountFlags::TYPE_2, DEPTH);
        let transparency = transparency_pass_desc(DEPTH);
        let resolved_depth = opaque.subpass.depth_resolve.map(|r| opaque.attachments[r.index as usize]);
        let tested_depth = transparency.subpass.depth.map(|r| transparency.attachments[r.index as usize]);
        assert_eq!(resolved_depth.map(|a| a.format), tested_depth.map(|a| a.format));
        assert_eq!(resolved_depth.map(|a| a.samples), tested_depth.map(|a| a.samples));
    }
}
