//! PBR materials and their transparency classification.

use glam::{Vec2, Vec3, Vec4};

/// How the base color alpha is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlphaMode {
    /// Alpha is ignored unless the base color factor itself is translucent.
    #[default]
    Opaque,
    /// Fragments below the cutoff are discarded; the rest are opaque.
    Mask,
    /// Alpha-blended.
    Blend,
}

/// Texture slots a material can bind, in descriptor binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor,
    MetallicRoughness,
    Normal,
    Occlusion,
    Emissive,
    Transmission,
    Thickness,
}

impl TextureSlot {
    pub const COUNT: usize = 7;

    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::MetallicRoughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
        TextureSlot::Transmission,
        TextureSlot::Thickness,
    ];

    /// Slots whose transform is forwarded to the shaders.
    pub const TRANSFORMED: [TextureSlot; 5] = [
        TextureSlot::BaseColor,
        TextureSlot::MetallicRoughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Presence bit in [`Material::texture_flags`].
    #[inline]
    pub fn flag(self) -> u32 {
        1 << self.index()
    }

    /// Color slots are stored in sRGB; everything else is linear data.
    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureSlot::BaseColor | TextureSlot::Emissive)
    }
}

/// `KHR_texture_transform` parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub scale: Vec2,
    /// Counter-clockwise rotation in radians.
    pub rotation: f32,
    /// UV set the texture is sampled with.
    pub tex_coord: u32,
}

impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            tex_coord: 0,
        }
    }
}

/// A material's reference to one of the model's images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRef {
    /// Index into [`crate::Model::images`].
    pub image: usize,
    pub transform: TextureTransform,
}

impl TextureRef {
    pub fn new(image: usize) -> Self {
        Self {
            image,
            transform: TextureTransform::default(),
        }
    }
}

/// Metallic-roughness material with the transmission and volume extensions.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: Option<String>,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub transmission_factor: f32,
    pub thickness_factor: f32,
    /// Distance light travels before reaching `attenuation_color`.
    /// Infinite means no attenuation.
    pub attenuation_distance: f32,
    pub attenuation_color: Vec3,
    pub textures: [Option<TextureRef>; TextureSlot::COUNT],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            emissive: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            transmission_factor: 0.0,
            thickness_factor: 0.0,
            attenuation_distance: f32::INFINITY,
            attenuation_color: Vec3::ONE,
            textures: [None; TextureSlot::COUNT],
        }
    }
}

impl Material {
    #[inline]
    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureRef> {
        self.textures[slot.index()].as_ref()
    }

    pub fn set_texture(&mut self, slot: TextureSlot, texture: Option<TextureRef>) {
        self.textures[slot.index()] = texture;
    }

    /// Whether draws using this material belong in the transparency pass.
    ///
    /// `Blend` is transparent and `Mask` is alpha-tested. Otherwise a base
    /// color alpha below one makes it transparent. Transmission, as a factor
    /// or a texture, forces transparency over all of the above.
    pub fn is_transparent(&self) -> bool {
        let by_alpha = match self.alpha_mode {
            AlphaMode::Blend => true,
            AlphaMode::Mask => false,
            AlphaMode::Opaque => self.base_color.w < 1.0,
        };
        by_alpha || self.has_transmission()
    }

    #[inline]
    pub fn has_transmission(&self) -> bool {
        self.transmission_factor > 0.0 || self.texture(TextureSlot::Transmission).is_some()
    }

    /// Bit set of the bound texture slots, see [`TextureSlot::flag`].
    pub fn texture_flags(&self) -> u32 {
        TextureSlot::ALL
            .iter()
            .filter(|slot| self.texture(**slot).is_some())
            .fold(0, |flags, slot| flags | slot.flag())
    }
}
