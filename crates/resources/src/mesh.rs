//! CPU-side mesh data.

use bytemuck::{Pod, Zeroable};
use translucent_scene::Aabb;

/// Interleaved vertex consumed by the mesh pipelines.
///
/// | Offset | Field    |
/// |--------|----------|
/// | 0      | position |
/// | 12     | normal   |
/// | 24     | uv0      |
/// | 32     | uv1      |
/// | 40     | tangent  |
/// | 56     | color    |
///
/// Plain arrays keep the struct free of SIMD alignment padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    /// xyz tangent, w bitangent sign.
    pub tangent: [f32; 4],
    pub color: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            uv0: [0.0; 2],
            uv1: [0.0; 2],
            tangent: [1.0, 0.0, 0.0, 1.0],
            color: [1.0; 4],
        }
    }
}

/// One drawable primitive: triangle list, local bounds and material.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
    /// Index into [`crate::Model::materials`]. `None` draws with the
    /// default material.
    pub material: Option<usize>,
}

impl Mesh {
    /// Builds a mesh and computes its bounds from the vertex positions.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, material: Option<usize>) -> Self {
        let bounds = Aabb::from_points(vertices.iter().map(|v| v.position.into()));
        Self {
            vertices,
            indices,
            bounds,
            material,
        }
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 72);
        assert_eq!(std::mem::offset_of!(Vertex, uv1), 32);
        assert_eq!(std::mem::offset_of!(Vertex, tangent), 40);
        assert_eq!(std::mem::offset_of!(Vertex, color), 56);
    }

    #[test]
    fn test_mesh_bounds_from_positions() {
        let vertex = |position| Vertex {
            position,
            ..Default::default()
        };
        let mesh = Mesh::new(
            vec![
                vertex([-1.0, 0.0, 2.0]),
                vertex([3.0, -2.0, 0.0]),
                vertex([0.0, 1.0, 1.0]),
            ],
            vec![0, 1, 2],
            Some(0),
        );

        assert_eq!(mesh.bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(mesh.bounds.max, Vec3::new(3.0, 1.0, 2.0));
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.index_count(), 3);
    }
}
