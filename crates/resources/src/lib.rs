//! Asset data consumed by the renderer.
//!
//! - glTF loading into an arena scene graph ([`Model::load`])
//! - Meshes with interleaved vertices and local bounds
//! - PBR materials with transmission and volume, and their transparency
//!   classification
//! - Images normalized to RGBA8
//! - Shader payload layouts ([`ubo`])

mod error;
mod loader;
pub mod material;
pub mod mesh;
pub mod model;
pub mod pixels;
pub mod ubo;

pub use error::{ResourceError, ResourceResult};
pub use material::{AlphaMode, Material, TextureRef, TextureSlot, TextureTransform};
pub use mesh::{Mesh, Vertex};
pub use model::Model;
pub use pixels::{ImageData, PixelLayout};
pub use ubo::{DrawPushConstants, FrameUniforms, GpuTextureTransform, MaterialUniforms};
