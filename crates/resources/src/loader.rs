//! glTF 2.0 import through the `gltf` crate.

use std::path::Path;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use tracing::{debug, info, warn};
use translucent_scene::{Node, NodeHandle, NodeTransform, SceneGraph, Transform};

use crate::error::{ResourceError, ResourceResult};
use crate::material::{AlphaMode, Material, TextureRef, TextureSlot, TextureTransform};
use crate::mesh::{Mesh, Vertex};
use crate::model::Model;
use crate::pixels::{ImageData, PixelLayout};

pub(crate) fn load_gltf(path: &Path) -> ResourceResult<Model> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let (document, buffers, images) = gltf::import(path).map_err(|e| ResourceError::GltfLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let images = images
        .into_iter()
        .map(convert_image)
        .collect::<ResourceResult<Vec<_>>>()?;
    let materials: Vec<Material> = document.materials().map(|m| convert_material(&m)).collect();

    // glTF meshes hold several primitives; each primitive becomes one Mesh
    // and nodes reference the flattened indices.
    let mut meshes = Vec::new();
    let mut primitive_ranges: Vec<Vec<usize>> = Vec::with_capacity(document.meshes().len());
    for mesh in document.meshes() {
        let mut indices = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "Skipping {:?} primitive in mesh {:?}",
                    primitive.mode(),
                    mesh.name()
                );
                continue;
            }
            indices.push(meshes.len());
            meshes.push(read_primitive(&mesh, &primitive, &buffers)?);
        }
        primitive_ranges.push(indices);
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| ResourceError::NoScene(path.to_path_buf()))?;

    let mut graph = SceneGraph::new();
    for node in scene.nodes() {
        add_node(&mut graph, None, &node, &primitive_ranges);
    }

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let model = Model {
        name,
        graph,
        meshes,
        materials,
        images,
        transform: Mat4::IDENTITY,
    };

    info!(
        "Loaded '{}': {} nodes, {} meshes, {} materials, {} images, {} triangles",
        path.display(),
        model.graph.len(),
        model.meshes.len(),
        model.materials.len(),
        model.images.len(),
        model.total_triangle_count()
    );

    Ok(model)
}

fn add_node(
    graph: &mut SceneGraph,
    parent: Option<NodeHandle>,
    node: &gltf::Node<'_>,
    primitive_ranges: &[Vec<usize>],
) {
    let meshes = node
        .mesh()
        .and_then(|mesh| primitive_ranges.get(mesh.index()))
        .cloned()
        .unwrap_or_default();

    let mut scene_node = Node::new(node_transform(node.transform())).with_meshes(meshes);
    if let Some(name) = node.name() {
        scene_node = scene_node.with_name(name);
    }

    let handle = match parent {
        Some(parent) => graph.add_child(parent, scene_node),
        None => Some(graph.add_root(scene_node)),
    };
    let Some(handle) = handle else {
        return;
    };

    for child in node.children() {
        add_node(graph, Some(handle), &child, primitive_ranges);
    }
}

/// A baked matrix is kept as-is; decomposed TRS stays decomposed.
fn node_transform(transform: gltf::scene::Transform) -> NodeTransform {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => {
            NodeTransform::Matrix(Mat4::from_cols_array_2d(&matrix))
        }
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Transform::new()
            .with_position(Vec3::from_array(translation))
            .with_rotation(Quat::from_array(rotation))
            .with_scale(Vec3::from_array(scale))
            .into(),
    }
}

fn read_primitive(
    mesh: &gltf::Mesh<'_>,
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> ResourceResult<Mesh> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions = reader.read_positions().ok_or_else(|| {
        ResourceError::NoPositionData(mesh.name().unwrap_or("unnamed").to_string())
    })?;
    let mut vertices: Vec<Vertex> = positions
        .map(|position| Vertex {
            position,
            ..Default::default()
        })
        .collect();

    if let Some(normals) = reader.read_normals() {
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = normal;
        }
    }
    if let Some(uvs) = reader.read_tex_coords(0) {
        for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
            vertex.uv0 = uv;
        }
    }
    if let Some(uvs) = reader.read_tex_coords(1) {
        for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
            vertex.uv1 = uv;
        }
    }
    if let Some(tangents) = reader.read_tangents() {
        for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
            vertex.tangent = tangent;
        }
    }
    if let Some(colors) = reader.read_colors(0) {
        for (vertex, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
            vertex.color = color;
        }
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };

    debug!(
        "Primitive {} of {:?}: {} vertices, {} indices",
        primitive.index(),
        mesh.name(),
        vertices.len(),
        indices.len()
    );

    Ok(Mesh::new(vertices, indices, primitive.material().index()))
}

fn convert_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let mut converted = Material {
        name: material.name().map(str::to_owned),
        base_color: Vec4::from_array(pbr.base_color_factor()),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: Vec3::from_array(material.emissive_factor()),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        double_sided: material.double_sided(),
        ..Default::default()
    };

    converted.set_texture(
        TextureSlot::BaseColor,
        pbr.base_color_texture().as_ref().map(texture_ref),
    );
    converted.set_texture(
        TextureSlot::MetallicRoughness,
        pbr.metallic_roughness_texture().as_ref().map(texture_ref),
    );
    converted.set_texture(
        TextureSlot::Normal,
        material
            .normal_texture()
            .map(|normal| plain_texture_ref(&normal.texture(), normal.tex_coord())),
    );
    converted.set_texture(
        TextureSlot::Occlusion,
        material
            .occlusion_texture()
            .map(|occlusion| plain_texture_ref(&occlusion.texture(), occlusion.tex_coord())),
    );
    converted.set_texture(
        TextureSlot::Emissive,
        material.emissive_texture().as_ref().map(texture_ref),
    );

    if let Some(transmission) = material.transmission() {
        converted.transmission_factor = transmission.transmission_factor();
        converted.set_texture(
            TextureSlot::Transmission,
            transmission.transmission_texture().as_ref().map(texture_ref),
        );
    }

    if let Some(volume) = material.volume() {
        converted.thickness_factor = volume.thickness_factor();
        converted.attenuation_distance = volume.attenuation_distance();
        converted.attenuation_color = Vec3::from_array(volume.attenuation_color());
        converted.set_texture(
            TextureSlot::Thickness,
            volume.thickness_texture().as_ref().map(texture_ref),
        );
    }

    converted
}

/// Texture reference honoring `KHR_texture_transform`, whose `texCoord`
/// overrides the one on the texture info.
fn texture_ref(info: &gltf::texture::Info<'_>) -> TextureRef {
    let transform = match info.texture_transform() {
        Some(transform) => TextureTransform {
            offset: Vec2::from_array(transform.offset()),
            scale: Vec2::from_array(transform.scale()),
            rotation: transform.rotation(),
            tex_coord: transform.tex_coord().unwrap_or_else(|| info.tex_coord()),
        },
        None => TextureTransform {
            tex_coord: info.tex_coord(),
            ..Default::default()
        },
    };
    TextureRef {
        image: info.texture().source().index(),
        transform,
    }
}

fn plain_texture_ref(texture: &gltf::Texture<'_>, tex_coord: u32) -> TextureRef {
    TextureRef {
        image: texture.source().index(),
        transform: TextureTransform {
            tex_coord,
            ..Default::default()
        },
    }
}

fn convert_image(data: gltf::image::Data) -> ResourceResult<ImageData> {
    use gltf::image::Format;

    let layout = match data.format {
        Format::R8 => PixelLayout::R8,
        Format::R8G8 => PixelLayout::Rg8,
        Format::R8G8B8 => PixelLayout::Rgb8,
        Format::R8G8B8A8 => PixelLayout::Rgba8,
        Format::R16 => PixelLayout::R16,
        Format::R16G16 => PixelLayout::Rg16,
        Format::R16G16B16 => PixelLayout::Rgb16,
        Format::R16G16B16A16 => PixelLayout::Rgba16,
        Format::R32G32B32FLOAT => PixelLayout::Rgb32F,
        Format::R32G32B32A32FLOAT => PixelLayout::Rgba32F,
    };
    ImageData::from_pixels(data.width, data.height, layout, data.pixels)
}
