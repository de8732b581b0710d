//! Loaded models: node graph, meshes, materials and images.

use std::path::Path;

use glam::Mat4;
use translucent_scene::{Aabb, SceneGraph};

use crate::error::ResourceResult;
use crate::loader;
use crate::material::{Material, TextureSlot};
use crate::mesh::Mesh;
use crate::pixels::ImageData;

/// A model as the renderer consumes it.
///
/// Nodes in `graph` reference `meshes` by index; meshes reference
/// `materials` and materials reference `images` the same way.
#[derive(Debug, Default)]
pub struct Model {
    pub name: String,
    pub graph: SceneGraph,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub images: Vec<ImageData>,
    /// Placement of the whole model, applied on top of every node's world
    /// transform.
    pub transform: Mat4,
}

impl Model {
    /// Loads a glTF 2.0 file (`.gltf` or `.glb`).
    pub fn load(path: impl AsRef<Path>) -> ResourceResult<Self> {
        loader::load_gltf(path.as_ref())
    }

    /// Material for `mesh`. Meshes without a valid material index get
    /// `None` and draw with [`Material::default`].
    pub fn material(&self, mesh: &Mesh) -> Option<&Material> {
        mesh.material.and_then(|index| self.materials.get(index))
    }

    /// World-space bounds of every mesh instance, including `transform`.
    pub fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.graph.traverse(|_, node, world| {
            let world = self.transform * world;
            for mesh in node.meshes.iter().filter_map(|&i| self.meshes.get(i)) {
                bounds = bounds.union(&mesh.bounds.transformed(world));
            }
        });
        bounds
    }

    /// For each image, whether a material samples it as color data.
    pub fn srgb_images(&self) -> Vec<bool> {
        let mut srgb = vec![false; self.images.len()];
        for material in &self.materials {
            for slot in TextureSlot::ALL.into_iter().filter(|slot| slot.is_srgb()) {
                if let Some(texture) = material.texture(slot)
                    && let Some(flag) = srgb.get_mut(texture.image)
                {
                    *flag = true;
                }
            }
        }
        srgb
    }

    pub fn total_vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }
}
