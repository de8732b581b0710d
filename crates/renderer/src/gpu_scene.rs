//! GPU copies of the loaded models.
//!
//! Created once at load time and read-only afterwards, so material sets are
//! shared by every frame in flight.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use translucent_resources::{Material, MaterialUniforms, Mesh, Model, TextureSlot};
use translucent_rhi::{RhiError, RhiResult};
use translucent_rhi::buffer::{Buffer, BufferUsage};
use translucent_rhi::command::OneTimeSubmit;
use translucent_rhi::descriptor::{
    DescriptorPool, sampled_image, write_combined_images, write_uniform_buffer,
};
use translucent_rhi::device::Device;
use translucent_rhi::sampler::{Sampler, SamplerDesc};
use translucent_rhi::texture::{ColorSpace, Texture};

use crate::pipelines::{MATERIAL_UNIFORM_BINDING, SetLayouts};

/// Device-local geometry of one mesh.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl GpuMesh {
    /// Uploads `mesh`, or returns `None` for a mesh with nothing to draw.
    fn upload(device: &Arc<Device>, uploader: &OneTimeSubmit, mesh: &Mesh) -> RhiResult<Option<Self>> {
        if mesh.indices.is_empty() || mesh.vertices.is_empty() {
            return Ok(None);
        }
        let vertex_buffer = upload_buffer(
            device,
            uploader,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = upload_buffer(
            device,
            uploader,
            BufferUsage::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        Ok(Some(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        }))
    }

    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// A material's descriptor set and the uniform block it points at.
struct GpuMaterial {
    set: vk::DescriptorSet,
    _uniforms: Buffer,
}

pub struct GpuModel {
    meshes: Vec<Option<GpuMesh>>,
    materials: Vec<GpuMaterial>,
    /// Used by meshes without a valid material index.
    default_material: GpuMaterial,
    textures: Vec<Texture>,
}

impl GpuModel {
    /// Geometry of mesh `index`, `None` if it was empty.
    pub fn mesh(&self, index: usize) -> Option<&GpuMesh> {
        self.meshes.get(index).and_then(Option::as_ref)
    }

    /// Set 1 for `mesh`.
    pub fn material_set(&self, mesh: &Mesh) -> vk::DescriptorSet {
        mesh.material
            .and_then(|index| self.materials.get(index))
            .unwrap_or(&self.default_material)
            .set
    }

    #[inline]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

pub struct GpuScene {
    models: Vec<GpuModel>,
    _descriptor_pool: DescriptorPool,
    _white: Texture,
    _sampler: Sampler,
}

impl GpuScene {
    pub fn new(device: &Arc<Device>, layouts: &SetLayouts, models: &[Model]) -> RhiResult<Self> {
        let uploader = OneTimeSubmit::new(device.clone())?;
        let sampler = Sampler::new(device.clone(), SamplerDesc::material(device.limits()))?;
        let white = Texture::white(device.clone(), &uploader)?;
        let descriptor_pool =
            DescriptorPool::for_layout(device.clone(), &layouts.material, material_set_count(models))?;

        let mut gpu_models = Vec::with_capacity(models.len());
        for model in models {
            let textures = upload_textures(device, &uploader, model)?;
            let views: Vec<vk::ImageView> = textures.iter().map(Texture::view).collect();
            let ctx = MaterialContext {
                device,
                pool: &descriptor_pool,
                layouts,
                sampler: sampler.handle(),
                white: white.view(),
                views: &views,
            };

            let materials = model
                .materials
                .iter()
                .map(|material| ctx.create(material))
                .collect::<RhiResult<Vec<_>>>()?;
            let default_material = ctx.create(&Material::default())?;

            let meshes = model
                .meshes
                .iter()
                .map(|mesh| GpuMesh::upload(device, &uploader, mesh))
                .collect::<RhiResult<Vec<_>>>()?;

            info!(
                "Uploaded model '{}': {} meshes, {} materials, {} textures",
                model.name,
                meshes.iter().flatten().count(),
                materials.len(),
                textures.len()
            );

            gpu_models.push(GpuModel {
                meshes,
                materials,
                default_material,
                textures,
            });
        }

        debug!(
            "GPU scene ready: {} model(s), {} texture(s)",
            gpu_models.len(),
            gpu_models.iter().map(GpuModel::texture_count).sum::<usize>()
        );

        Ok(Self {
            models: gpu_models,
            _descriptor_pool: descriptor_pool,
            _white: white,
            _sampler: sampler,
        })
    }

    #[inline]
    pub fn model(&self, index: usize) -> Option<&GpuModel> {
        self.models.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

struct MaterialContext<'a> {
    device: &'a Arc<Device>,
    pool: &'a DescriptorPool,
    layouts: &'a SetLayouts,
    sampler: vk::Sampler,
    white: vk::ImageView,
    views: &'a [vk::ImageView],
}

impl MaterialContext<'_> {
    fn create(&self, material: &Material) -> RhiResult<GpuMaterial> {
        let uniforms = MaterialUniforms::from_material(material);
        let buffer = Buffer::new(
            self.device.clone(),
            BufferUsage::Uniform,
            MaterialUniforms::size() as vk::DeviceSize,
        )?;
        buffer.write_pod(&uniforms)?;

        let set = self
            .pool
            .allocate(&self.layouts.material, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("material descriptor set".to_string()))?;

        let images = slot_views(material, self.views, self.white)
            .map(|view| sampled_image(self.sampler, view));
        write_combined_images(self.device, set, 0, &images);
        write_uniform_buffer(
            self.device,
            set,
            MATERIAL_UNIFORM_BINDING,
            buffer.handle(),
            MaterialUniforms::size() as vk::DeviceSize,
        );

        Ok(GpuMaterial {
            set,
            _uniforms: buffer,
        })
    }
}

/// One set per material plus a default per model.
pub fn material_set_count(models: &[Model]) -> u32 {
    models.iter().map(|m| m.materials.len() as u32 + 1).sum()
}

/// Image view for every texture slot of `material`, falling back to `white`
/// for empty slots and dangling image indices.
pub fn slot_views(
    material: &Material,
    views: &[vk::ImageView],
    white: vk::ImageView,
) -> [vk::ImageView; TextureSlot::COUNT] {
    TextureSlot::ALL.map(|slot| {
        material
            .texture(slot)
            .and_then(|texture| views.get(texture.image))
            .copied()
            .unwrap_or(white)
    })
}

fn upload_textures(device: &Arc<Device>, uploader: &OneTimeSubmit, model: &Model) -> RhiResult<Vec<Texture>> {
    let srgb = model.srgb_images();
    model
        .images
        .iter()
        .zip(srgb)
        .map(|(image, srgb)| {
            let color_space = if srgb { ColorSpace::Srgb } else { ColorSpace::Linear };
            Texture::from_rgba8(
                device.clone(),
                uploader,
                image.width,
                image.height,
                &image.rgba,
                color_space,
            )
        })
        .collect()
}

/// Creates a device-local buffer holding `data`, copied through a staging
/// buffer.
fn upload_buffer(
    device: &Arc<Device>,
    uploader: &OneTimeSubmit,
    usage: BufferUsage,
    data: &[u8],
) -> RhiResult<Buffer> {
    let size = data.len() as vk::DeviceSize;
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, data)?;
    let buffer = Buffer::new(device.clone(), usage, size)?;
    uploader.run(|cmd| {
        cmd.copy_buffer(staging.handle(), buffer.handle(), size);
        Ok(())
    })?;
    debug!("Uploaded {} bytes to {} buffer", size, usage.name());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use translucent_resources::TextureRef;

    fn view(raw: u64) -> vk::ImageView {
        vk::ImageView::from_raw(raw)
    }

    #[test]
    fn test_empty_slots_use_white() {
        let white = view(99);
        let views = slot_views(&Material::default(), &[view(1), view(2)], white);
        assert!(views.iter().all(|&v| v == white));
    }

    #[test]
    fn test_bound_slots_follow_binding_order() {
        let mut material = Material::default();
        material.set_texture(TextureSlot::BaseColor, Some(TextureRef::new(1)));
        material.set_texture(TextureSlot::Transmission, Some(TextureRef::new(0)));

        let white = view(99);
        let views = slot_views(&material, &[view(10), view(11)], white);

        assert_eq!(views[TextureSlot::BaseColor.index()], view(11));
        assert_eq!(views[TextureSlot::Transmission.index()], view(10));
        assert_eq!(views[TextureSlot::Normal.index()], white);
    }

    #[test]
    fn test_dangling_image_index_falls_back() {
        let mut material = Material::default();
        material.set_texture(TextureSlot::Emissive, Some(TextureRef::new(7)));
        let white = view(99);
        let views = slot_views(&material, &[view(1)], white);
        assert_eq!(views[TextureSlot::Emissive.index()], white);
    }

    #[test]
    fn test_material_set_count_includes_defaults() {
        let a = Model {
            materials: vec![Material::default(); 3],
            ..Default::default()
        };
        let b = Model::default();
        assert_eq!(material_set_count(&[a, b]), 5);
        assert_eq!(material_set_count(&[]), 0);
    }

    #[test]
    fn test_gpu_scene_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<GpuScene>();
    }
}
