//! Decoded images, normalized to tightly packed RGBA8.

use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

use crate::error::{ResourceError, ResourceResult};

/// Channel layout of decoded pixel data as delivered by the asset decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    R16,
    Rg16,
    Rgb16,
    Rgba16,
    Rgb32F,
    Rgba32F,
}

/// An image ready for upload: `width * height` RGBA8 texels.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// Converts decoded pixels to RGBA8.
    ///
    /// Single-channel data is replicated into rgb. Two-channel data keeps
    /// its channels in r and g, since glTF uses them as data rather than
    /// luminance and alpha.
    pub fn from_pixels(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> ResourceResult<Self> {
        let len = pixels.len();
        let mismatch = || {
            ResourceError::UnsupportedImage(format!(
                "{width}x{height} {layout:?} image with {len} bytes"
            ))
        };

        let image = match layout {
            PixelLayout::Rgba8 => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgba8),
            PixelLayout::Rgb8 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgb8),
            PixelLayout::R8 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageLuma8),
            PixelLayout::Rg8 => ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, pixels)
                .map(|rg| DynamicImage::ImageRgba8(rg_to_rgba(&rg))),
            PixelLayout::R16 => {
                ImageBuffer::<Luma<u16>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(DynamicImage::ImageLuma16)
            }
            PixelLayout::Rg16 => {
                ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(|rg| DynamicImage::ImageRgba8(rg_to_rgba(&DynamicImage::ImageLumaA16(rg).to_luma_alpha8())))
            }
            PixelLayout::Rgb16 => {
                ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(DynamicImage::ImageRgb16)
            }
            PixelLayout::Rgba16 => {
                ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(DynamicImage::ImageRgba16)
            }
            PixelLayout::Rgb32F => {
                ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(DynamicImage::ImageRgb32F)
            }
            PixelLayout::Rgba32F => {
                ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, bytemuck::pod_collect_to_vec(&pixels))
                    .map(DynamicImage::ImageRgba32F)
            }
        }
        .ok_or_else(mismatch)?;

        Ok(Self {
            width,
            height,
            rgba: image.to_rgba8().into_raw(),
        })
    }

    /// A single opaque white texel.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }
}

/// Moves two-channel data into r and g with b = 0 and opaque alpha.
fn rg_to_rgba(rg: &ImageBuffer<LumaA<u8>, Vec<u8>>) -> ImageBuffer<Rgba<u8>, Vec<u8>> {
    ImageBuffer::from_fn(rg.width(), rg.height(), |x, y| {
        let [r, g] = rg.get_pixel(x, y).0;
        Rgba([r, g, 0, 255])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_passthrough() {
        let pixels = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let image = ImageData::from_pixels(2, 1, PixelLayout::Rgba8, pixels.clone()).unwrap();
        assert_eq!(image.rgba, pixels);
    }

    #[test]
    fn test_rgb8_gets_opaque_alpha() {
        let image = ImageData::from_pixels(1, 1, PixelLayout::Rgb8, vec![10, 20, 30]).unwrap();
        assert_eq!(image.rgba, vec![10, 20, 30, 255]);
    }

    #[test]
    fn test_r8_replicates() {
        let image = ImageData::from_pixels(1, 1, PixelLayout::R8, vec![77]).unwrap();
        assert_eq!(image.rgba, vec![77, 77, 77, 255]);
    }

    #[test]
    fn test_rg8_keeps_channels() {
        let image = ImageData::from_pixels(1, 1, PixelLayout::Rg8, vec![40, 200]).unwrap();
        assert_eq!(image.rgba, vec![40, 200, 0, 255]);
    }

    #[test]
    fn test_rgba16_narrows() {
        let texel: [u16; 4] = [0, u16::MAX, u16::MAX, u16::MAX];
        let bytes = bytemuck::cast_slice(&texel).to_vec();
        let image = ImageData::from_pixels(1, 1, PixelLayout::Rgba16, bytes).unwrap();
        assert_eq!(image.rgba, vec![0, 255, 255, 255]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let result = ImageData::from_pixels(2, 2, PixelLayout::Rgba8, vec![0; 4]);
        assert!(matches!(result, Err(ResourceError::UnsupportedImage(_))));
    }

    #[test]
    fn test_white() {
        let white = ImageData::white();
        assert_eq!((white.width, white.height), (1, 1));
        assert_eq!(white.rgba, vec![255, 255, 255, 255]);
    }
}
