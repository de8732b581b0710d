//! Shader payloads: per-frame uniforms, per-material uniforms and per-draw
//! push constants.
//!
//! All structures are `#[repr(C)]`, implement `bytemuck::Pod` and follow
//! std140 rules: only `Mat4`, `Vec4` and scalars, with explicit padding so
//! that no `Vec4` straddles a 16-byte boundary.
//!
//! # Example
//!
//! ```
//! use glam::{Mat4, Vec3};
//! use translucent_resources::ubo::FrameUniforms;
//!
//! let frame = FrameUniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::new(0.0, 0.0, 5.0));
//! let bytes: &[u8] = bytemuck::bytes_of(&frame);
//! assert_eq!(bytes.len(), FrameUniforms::size());
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use translucent_scene::{MAX_POINT_LIGHTS, PointLight};

use crate::material::{AlphaMode, Material, TextureSlot, TextureTransform};

/// Per-frame uniform block (set 0, binding 0).
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view |
/// | 64     | 64   | projection |
/// | 128    | 64   | light_positions |
/// | 192    | 64   | light_colors |
/// | 256    | 16   | camera_position |
/// | 272    | 4    | exposure |
/// | 276    | 4    | gamma |
/// | 280    | 4    | ibl_scale |
/// | 284    | 4    | _padding |
///
/// Total size: 288 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz world position, w unused.
    pub light_positions: [Vec4; MAX_POINT_LIGHTS],
    /// rgb radiance, w unused.
    pub light_colors: [Vec4; MAX_POINT_LIGHTS],
    /// xyz world position, w = 1.
    pub camera_position: Vec4,
    pub exposure: f32,
    pub gamma: f32,
    pub ibl_scale: f32,
    pub _padding: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO)
    }
}

impl FrameUniforms {
    /// Camera matrices with no lights and neutral tone settings.
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3) -> Self {
        Self {
            view,
            projection,
            light_positions: [Vec4::ZERO; MAX_POINT_LIGHTS],
            light_colors: [Vec4::ZERO; MAX_POINT_LIGHTS],
            camera_position: camera_position.extend(1.0),
            exposure: 1.0,
            gamma: 1.0,
            ibl_scale: 1.0,
            _padding: 0.0,
        }
    }

    pub fn with_lights(mut self, lights: &[PointLight; MAX_POINT_LIGHTS]) -> Self {
        for (i, light) in lights.iter().enumerate() {
            self.light_positions[i] = light.position.extend(1.0);
            self.light_colors[i] = light.radiance().extend(1.0);
        }
        self
    }

    pub fn with_tone(mut self, exposure: f32, gamma: f32, ibl_scale: f32) -> Self {
        self.exposure = exposure;
        self.gamma = gamma;
        self.ibl_scale = ibl_scale;
        self
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Texture transform packed for the GPU.
///
/// `offset_scale` = (offset.x, offset.y, scale.x, scale.y),
/// `rotation_tex_coord` = (rotation, uv set, 0, 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuTextureTransform {
    pub offset_scale: Vec4,
    pub rotation_tex_coord: Vec4,
}

impl From<&TextureTransform> for GpuTextureTransform {
    fn from(transform: &TextureTransform) -> Self {
        Self {
            offset_scale: Vec4::new(
                transform.offset.x,
                transform.offset.y,
                transform.scale.x,
                transform.scale.y,
            ),
            rotation_tex_coord: Vec4::new(transform.rotation, transform.tex_coord as f32, 0.0, 0.0),
        }
    }
}

impl Default for GpuTextureTransform {
    fn default() -> Self {
        (&TextureTransform::default()).into()
    }
}

/// Per-material uniform block (set 1, binding 7).
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 160  | transforms (base color, metallic-roughness, normal, occlusion, emissive) |
/// | 160    | 16   | emissive_factor |
///
/// Total size: 176 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub transforms: [GpuTextureTransform; 5],
    /// rgb emissive factor, w unused.
    pub emissive_factor: Vec4,
}

impl MaterialUniforms {
    pub fn from_material(material: &Material) -> Self {
        let transforms = TextureSlot::TRANSFORMED.map(|slot| {
            material
                .texture(slot)
                .map(|texture| GpuTextureTransform::from(&texture.transform))
                .unwrap_or_default()
        });
        Self {
            transforms,
            emissive_factor: material.emissive.extend(0.0),
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Per-draw push constants, visible to the vertex and fragment stages.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | model |
/// | 64     | 16   | base_color |
/// | 80     | 4    | metallic |
/// | 84     | 4    | roughness |
/// | 88     | 4    | alpha_mask |
/// | 92     | 4    | alpha_cutoff |
/// | 96     | 4    | texture_flags |
/// | 100    | 4    | transmission_factor |
/// | 104    | 4    | thickness_factor |
/// | 108    | 4    | _padding |
/// | 112    | 16   | attenuation |
///
/// Total size: 128 bytes, the guaranteed minimum push constant range.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawPushConstants {
    /// Model root transform times the node world transform.
    pub model: Mat4,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// 1.0 when the material is alpha-tested.
    pub alpha_mask: f32,
    pub alpha_cutoff: f32,
    /// Bound texture slots, see [`TextureSlot::flag`].
    pub texture_flags: u32,
    pub transmission_factor: f32,
    pub thickness_factor: f32,
    pub _padding: f32,
    /// rgb attenuation color, w attenuation distance.
    pub attenuation: Vec4,
}

impl DrawPushConstants {
    pub fn new(model: Mat4, material: &Material) -> Self {
        // The shaders treat a non-positive distance as "no attenuation".
        let distance = if material.attenuation_distance.is_finite() {
            material.attenuation_distance
        } else {
            0.0
        };
        Self {
            model,
            base_color: material.base_color,
            metallic: material.metallic,
            roughness: material.roughness,
            alpha_mask: if material.alpha_mode == AlphaMode::Mask {
                1.0
            } else {
                0.0
            },
            alpha_cutoff: material.alpha_cutoff,
            texture_flags: material.texture_flags(),
            transmission_factor: material.transmission_factor,
            thickness_factor: material.thickness_factor,
            _padding: 0.0,
            attenuation: material.attenuation_color.extend(distance),
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::TextureRef;
    use glam::Vec2;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_frame_uniforms_layout() {
        assert_eq!(size_of::<FrameUniforms>(), 288);
        assert_eq!(offset_of!(FrameUniforms, light_positions), 128);
        assert_eq!(offset_of!(FrameUniforms, light_colors), 192);
        assert_eq!(offset_of!(FrameUniforms, camera_position), 256);
        assert_eq!(offset_of!(FrameUniforms, exposure), 272);
        assert_eq!(offset_of!(FrameUniforms, ibl_scale), 280);
    }

    #[test]
    fn test_frame_uniforms_lights() {
        let lights = [PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::new(1.0, 0.5, 0.0),
            intensity: 2.0,
        }; MAX_POINT_LIGHTS];
        let frame = FrameUniforms::default().with_lights(&lights);

        assert_eq!(frame.light_positions[3], Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(frame.light_colors[0], Vec4::new(2.0, 1.0, 0.0, 1.0));
        assert_eq!(frame.camera_position.w, 1.0);
    }

    #[test]
    fn test_material_uniforms_layout() {
        assert_eq!(size_of::<GpuTextureTransform>(), 32);
        assert_eq!(size_of::<MaterialUniforms>(), 176);
        assert_eq!(offset_of!(MaterialUniforms, emissive_factor), 160);
    }

    #[test]
    fn test_material_uniforms_pack_transforms() {
        let mut material = Material {
            emissive: Vec3::new(0.5, 0.25, 1.0),
            ..Default::default()
        };
        material.set_texture(
            TextureSlot::Normal,
            Some(TextureRef {
                image: 0,
                transform: TextureTransform {
                    offset: Vec2::new(0.1, 0.2),
                    scale: Vec2::new(2.0, 3.0),
                    rotation: 0.5,
                    tex_coord: 1,
                },
            }),
        );

        let uniforms = MaterialUniforms::from_material(&material);
        let normal = uniforms.transforms[TextureSlot::Normal.index()];
        assert_eq!(normal.offset_scale, Vec4::new(0.1, 0.2, 2.0, 3.0));
        assert_eq!(normal.rotation_tex_coord, Vec4::new(0.5, 1.0, 0.0, 0.0));

        // Unbound slots get the identity transform.
        let base = uniforms.transforms[TextureSlot::BaseColor.index()];
        assert_eq!(base.offset_scale, Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(uniforms.emissive_factor, Vec4::new(0.5, 0.25, 1.0, 0.0));
    }

    #[test]
    fn test_push_constants_layout() {
        assert_eq!(size_of::<DrawPushConstants>(), 128);
        assert_eq!(offset_of!(DrawPushConstants, base_color), 64);
        assert_eq!(offset_of!(DrawPushConstants, alpha_cutoff), 92);
        assert_eq!(offset_of!(DrawPushConstants, texture_flags), 96);
        assert_eq!(offset_of!(DrawPushConstants, attenuation), 112);
    }

    #[test]
    fn test_push_constants_from_material() {
        let material = Material {
            alpha_mode: AlphaMode::Mask,
            alpha_cutoff: 0.3,
            transmission_factor: 0.6,
            attenuation_distance: 2.0,
            attenuation_color: Vec3::new(0.9, 0.8, 0.7),
            ..Default::default()
        };
        let push = DrawPushConstants::new(Mat4::IDENTITY, &material);

        assert_eq!(push.alpha_mask, 1.0);
        assert_eq!(push.alpha_cutoff, 0.3);
        assert_eq!(push.transmission_factor, 0.6);
        assert_eq!(push.attenuation, Vec4::new(0.9, 0.8, 0.7, 2.0));
    }

    #[test]
    fn test_push_constants_infinite_attenuation() {
        let push = DrawPushConstants::new(Mat4::IDENTITY, &Material::default());
        assert_eq!(push.attenuation.w, 0.0);
        assert_eq!(push.alpha_mask, 0.0);
        assert_eq!(push.texture_flags, 0);
    }

    #[test]
    fn test_bytemuck_cast() {
        let push = DrawPushConstants::new(Mat4::IDENTITY, &Material::default());
        assert_eq!(bytemuck::bytes_of(&push).len(), DrawPushConstants::size());
        assert_eq!(
            bytemuck::bytes_of(&MaterialUniforms::default()).len(),
            MaterialUniforms::size()
        );
        assert_eq!(
            bytemuck::bytes_of(&FrameUniforms::default()).len(),
            FrameUniforms::size()
        );
    }
}
