//! Sampled RGBA8 textures uploaded through a staging buffer.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::OneTimeSubmit;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, LayoutTransition};

/// Color encoding of texel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    /// Color data such as base color and emissive maps.
    Srgb,
    /// Non-color data such as normals, roughness or thickness.
    Linear,
}

impl ColorSpace {
    pub fn rgba8_format(self) -> vk::Format {
        match self {
            ColorSpace::Srgb => vk::Format::R8G8B8A8_SRGB,
            ColorSpace::Linear => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

/// A shader-readable image in `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Uploads tightly packed RGBA8 `pixels` of size `width` x `height`.
    pub fn from_rgba8(
        device: Arc<Device>,
        uploader: &OneTimeSubmit,
        width: u32,
        height: u32,
        pixels: &[u8],
        color_space: ColorSpace,
    ) -> RhiResult<Self> {
        let expected = rgba8_len(width, height);
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            ImageDesc {
                name: "texture",
                format: color_space.rgba8_format(),
                extent,
                samples: vk::SampleCountFlags::TYPE_1,
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            },
        )?;
        let staging = Buffer::new_with_data(device, BufferUsage::Staging, pixels)?;

        uploader.run(|cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[image.barrier(LayoutTransition::UPLOAD)],
            );
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[image.barrier(LayoutTransition::UPLOADED_TO_SAMPLED)],
            );
            Ok(())
        })?;

        debug!("Uploaded {}x{} {:?} texture", width, height, color_space);
        Ok(Self { image })
    }

    /// A 1x1 opaque white texture, bound wherever a material has no map.
    pub fn white(device: Arc<Device>, uploader: &OneTimeSubmit) -> RhiResult<Self> {
        Self::from_rgba8(device, uploader, 1, 1, &[255; 4], ColorSpace::Linear)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

#[inline]
pub fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_space_formats() {
        assert_eq!(ColorSpace::Srgb.rgba8_format(), vk::Format::R8G8B8A8_SRGB);
        assert_eq!(
            ColorSpace::Linear.rgba8_format(),
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_rgba8_len() {
        assert_eq!(rgba8_len(1, 1), 4);
        assert_eq!(rgba8_len(256, 128), 131_072);
        assert_eq!(rgba8_len(0, 16), 0);
    }
}
