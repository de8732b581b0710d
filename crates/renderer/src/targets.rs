//! Extent-dependent render targets.
//!
//! The opaque pass renders into a (possibly multisampled) color and depth
//! pair and resolves both to single-sample images. The transparency pass
//! accumulates into two single-sample targets and tests against the resolved
//! depth. The present pass samples the resolved color and both transparency
//! targets.
//!
//! All targets are created together for one extent and destroyed together,
//! in reverse creation order, on resize.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use translucent_rhi::RhiResult;
use translucent_rhi::device::Device;
use translucent_rhi::image::{Image, ImageDesc};

/// Shaded opaque color, before compositing.
pub const COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Weighted premultiplied color sum (rgb) and weight sum (a).
pub const ACCUM_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
/// Product of transparent coverages.
pub const REVEAL_FORMAT: vk::Format = vk::Format::R16_SFLOAT;
/// Depth formats in order of preference.
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Creation parameters of every target for one extent.
///
/// The multisampled pair exists only when the opaque pass uses more than
/// one sample; otherwise the opaque pass writes `color` and `depth` directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDescs {
    pub msaa_color: Option<ImageDesc>,
    pub color: ImageDesc,
    pub msaa_depth: Option<ImageDesc>,
    pub depth: ImageDesc,
    pub accum: ImageDesc,
    pub reveal: ImageDesc,
}

impl TargetDescs {
    pub fn new(
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
    ) -> Self {
        let single = |name, format, usage| ImageDesc {
            name,
            format,
            extent,
            samples: vk::SampleCountFlags::TYPE_1,
            usage,
        };
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;
        let transient = |name, format, usage: vk::ImageUsageFlags| {
            multisampled.then_some(ImageDesc {
                name,
                format,
                extent,
                samples,
                usage: usage | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            })
        };

        let color_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
        let depth_usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        let sampled_color = color_usage | vk::ImageUsageFlags::SAMPLED;

        Self {
            msaa_color: transient("opaque color (msaa)", COLOR_FORMAT, color_usage),
            color: single("opaque color", COLOR_FORMAT, sampled_color),
            msaa_depth: transient("depth (msaa)", depth_format, depth_usage),
            depth: single("depth", depth_format, depth_usage),
            accum: single("oit accumulation", ACCUM_FORMAT, sampled_color),
            reveal: single("oit revealage", REVEAL_FORMAT, sampled_color),
        }
    }

    /// Sample count of the opaque pass.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.msaa_color
            .map_or(vk::SampleCountFlags::TYPE_1, |desc| desc.samples)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.color.extent
    }

    /// All descriptors in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageDesc> {
        self.msaa_color
            .iter()
            .chain(std::iter::once(&self.color))
            .chain(self.msaa_depth.iter())
            .chain([&self.depth, &self.accum, &self.reveal])
    }
}

/// The images described by [`TargetDescs`].
pub struct RenderTargets {
    // Fields drop in declaration order: the reverse of creation.
    reveal: Image,
    accum: Image,
    depth: Image,
    msaa_depth: Option<Image>,
    color: Image,
    msaa_color: Option<Image>,
    descs: TargetDescs,
}

impl RenderTargets {
    pub fn new(device: &Arc<Device>, descs: TargetDescs) -> RhiResult<Self> {
        let create = |desc: ImageDesc| Image::new(device.clone(), desc);

        let msaa_color = descs.msaa_color.map(create).transpose()?;
        let color = create(descs.color)?;
        let msaa_depth = descs.msaa_depth.map(create).transpose()?;
        let depth = create(descs.depth)?;
        let accum = create(descs.accum)?;
        let reveal = create(descs.reveal)?;

        info!(
            "Render targets created: {}x{}, {} sample(s), depth {:?}",
            descs.extent().width,
            descs.extent().height,
            descs.samples().as_raw(),
            descs.depth.format
        );

        Ok(Self {
            reveal,
            accum,
            depth,
            msaa_depth,
            color,
            msaa_color,
            descs,
        })
    }

    #[inline]
    pub fn descs(&self) -> &TargetDescs {
        &self.descs
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.descs.extent()
    }

    /// Single-sample opaque color, sampled by the present pass.
    #[inline]
    pub fn color(&self) -> &Image {
        &self.color
    }

    /// Single-sample depth, tested by the transparency pass.
    #[inline]
    pub fn depth(&self) -> &Image {
        &self.depth
    }

    #[inline]
    pub fn accum(&self) -> &Image {
        &self.accum
    }

    #[inline]
    pub fn reveal(&self) -> &Image {
        &self.reveal
    }

    /// Views in the attachment order of the opaque pass: color and depth,
    /// followed by their resolve targets when multisampled.
    pub fn opaque_views(&self) -> Vec<vk::ImageView> {
        match (&self.msaa_color, &self.msaa_depth) {
            (Some(msaa_color), Some(msaa_depth)) => vec![
                msaa_color.view(),
                msaa_depth.view(),
                self.color.view(),
                self.depth.view(),
            ],
            _ => vec![self.color.view(), self.depth.view()],
        }
    }

    /// Views in the attachment order of the transparency pass.
    pub fn transparency_views(&self) -> [vk::ImageView; 3] {
        [self.accum.view(), self.reveal.view(), self.depth.view()]
    }
}
