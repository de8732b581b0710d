//! Per-frame draw lists.
//!
//! Every mesh instance in the loaded models becomes one [`DrawItem`]. Items
//! whose material blends or transmits go to the transparent list, sorted
//! farthest first; everything else is drawn by the opaque pass in traversal
//! order.

use glam::{Mat4, Vec3};
use tracing::{trace, warn};

use translucent_resources::{Material, Mesh, Model};

/// One mesh instance to draw this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    /// Index into the model slice the lists were gathered from.
    pub model: usize,
    /// Index into that model's meshes.
    pub mesh: usize,
    /// Node world transform with the model's placement applied.
    pub world: Mat4,
    /// Distance from the camera to the center of the world-space bounds.
    pub distance: f32,
    pub transparent: bool,
}

/// The opaque and transparent lists of one frame.
#[derive(Debug, Default)]
pub struct DrawLists {
    pub opaque: Vec<DrawItem>,
    /// Sorted by descending [`DrawItem::distance`].
    pub transparent: Vec<DrawItem>,
    /// Node mesh references with no mesh behind them, left out of both lists.
    pub dangling: usize,
}

impl DrawLists {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.dangling = 0;
    }

    /// Rebuilds both lists for `models` seen from `camera_position`, reusing
    /// the previous frame's allocations.
    pub fn gather(&mut self, models: &[Model], camera_position: Vec3) {
        self.clear();

        for (model_index, model) in models.iter().enumerate() {
            model.graph.traverse(|_, node, node_world| {
                let world = model.transform * node_world;
                for &mesh_index in &node.meshes {
                    let Some(mesh) = model.meshes.get(mesh_index) else {
                        self.dangling += 1;
                        continue;
                    };
                    let center = mesh.bounds.transformed(world).center();
                    let item = DrawItem {
                        model: model_index,
                        mesh: mesh_index,
                        world,
                        distance: center.distance(camera_position),
                        transparent: is_transparent(model, mesh),
                    };
                    if item.transparent {
                        self.transparent.push(item);
                    } else {
                        self.opaque.push(item);
                    }
                }
            });
        }

        if self.dangling > 0 {
            warn!(
                "{} node mesh reference(s) point past the mesh tables, not drawn",
                self.dangling
            );
        }

        // Stable, so equal distances keep traversal order between frames.
        self.transparent
            .sort_by(|a, b| b.distance.total_cmp(&a.distance));

        trace!(
            "Gathered {} opaque and {} transparent draws",
            self.opaque.len(),
            self.transparent.len()
        );
    }
}

/// Convenience wrapper around [`DrawLists::gather`].
pub fn gather(models: &[Model], camera_position: Vec3) -> DrawLists {
    let mut lists = DrawLists::new();
    lists.gather(models, camera_position);
    lists
}

/// Meshes without a valid material draw with the default material, which is
/// opaque.
fn is_transparent(model: &Model, mesh: &Mesh) -> bool {
    model.material(mesh).is_some_and(Material::is_transparent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use translucent_resources::{AlphaMode, Vertex};
    use translucent_scene::{Node, Transform};

    fn triangle(material: Option<usize>) -> Mesh {
        let vertex = |x: f32, y: f32| Vertex {
            position: [x, y, 0.0],
            ..Default::default()
        };
        Mesh::new(
            vec![vertex(-0.5, -0.5), vertex(0.5, -0.5), vertex(0.0, 0.5)],
            vec![0, 1, 2],
            material,
        )
    }

    fn blend() -> Material {
        Material {
            alpha_mode: AlphaMode::Blend,
            ..Default::default()
        }
    }

    /// One root node per entry of `depths`; node `i` draws mesh `i` at that
    /// distance along -Z.
    fn row_model(meshes: Vec<Mesh>, materials: Vec<Material>, depths: &[f32]) -> Model {
        let mut model = Model {
            meshes,
            materials,
            transform: Mat4::IDENTITY,
            ..Default::default()
        };
        for (i, &z) in depths.iter().enumerate() {
            model.graph.add_root(
                Node::new(Transform::new().with_position(Vec3::new(0.0, 0.0, -z)))
                    .with_meshes(vec![i]),
            );
        }
        model
    }

    #[test]
    fn test_every_item_lands_in_exactly_one_list() {
        let materials = vec![Material::default(), blend()];
        let meshes = vec![
            triangle(Some(0)),
            triangle(Some(1)),
            triangle(None),
            triangle(Some(9)),
        ];
        let model = row_model(meshes, materials, &[1.0, 2.0, 3.0, 4.0]);

        let lists = gather(std::slice::from_ref(&model), Vec3::ZERO);

        assert_eq!(lists.len(), 4);
        assert!(lists.opaque.iter().all(|item| !item.transparent));
        assert!(lists.transparent.iter().all(|item| item.transparent));

        let mut seen: Vec<usize> = lists
            .opaque
            .iter()
            .chain(&lists.transparent)
            .map(|item| item.mesh)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_missing_material_is_opaque() {
        let model = row_model(vec![triangle(None), triangle(Some(3))], Vec::new(), &[1.0, 2.0]);
        let lists = gather(std::slice::from_ref(&model), Vec3::ZERO);
        assert_eq!(lists.opaque.len(), 2);
        assert!(lists.transparent.is_empty());
    }

    #[test]
    fn test_classification_uses_material() {
        let translucent_base = Material {
            base_color: Vec4::new(1.0, 1.0, 1.0, 0.5),
            ..Default::default()
        };
        let cutout = Material {
            alpha_mode: AlphaMode::Mask,
            base_color: Vec4::new(1.0, 1.0, 1.0, 0.3),
            ..Default::default()
        };
        let glass = Material {
            transmission_factor: 0.6,
            ..Default::default()
        };
        let materials = vec![translucent_base, cutout, glass];
        let meshes = vec![triangle(Some(0)), triangle(Some(1)), triangle(Some(2))];
        let model = row_model(meshes, materials, &[1.0, 2.0, 3.0]);

        let lists = gather(std::slice::from_ref(&model), Vec3::ZERO);

        let opaque: Vec<usize> = lists.opaque.iter().map(|item| item.mesh).collect();
        assert_eq!(opaque, vec![1]);
        assert_eq!(lists.transparent.len(), 2);
    }

    #[test]
    fn test_transparent_sorted_far_to_near() {
        let materials = vec![blend()];
        let meshes = (0..4).map(|_| triangle(Some(0))).collect();
        let model = row_model(meshes, materials, &[3.0, 10.0, 1.0, 6.0]);

        let lists = gather(std::slice::from_ref(&model), Vec3::ZERO);

        let order: Vec<usize> = lists.transparent.iter().map(|item| item.mesh).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
        assert!((lists.transparent[0].distance - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_equal_distances_keep_order_across_gathers() {
        let materials = vec![blend()];
        let meshes = (0..5).map(|_| triangle(Some(0))).collect();
        let model = row_model(meshes, materials, &[2.0; 5]);
        let models = [model];

        let mut lists = DrawLists::new();
        lists.gather(&models, Vec3::ZERO);
        let first: Vec<usize> = lists.transparent.iter().map(|item| item.mesh).collect();
        assert_eq!(first, vec![0, 1, 2, 3, 4]);

        for _ in 0..3 {
            lists.gather(&models, Vec3::ZERO);
            let again: Vec<usize> = lists.transparent.iter().map(|item| item.mesh).collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_world_includes_model_transform() {
        let mut model = row_model(vec![triangle(None)], Vec::new(), &[0.0]);
        model.transform = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));

        let lists = gather(std::slice::from_ref(&model), Vec3::ZERO);

        let item = lists.opaque[0];
        assert_eq!(item.world.w_axis.x, 5.0);
        assert!((item.distance - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_indices_refer_to_model_slice() {
        let first = row_model(vec![triangle(None)], Vec::new(), &[1.0]);
        let second = row_model(vec![triangle(Some(0)), triangle(Some(0))], vec![blend()], &[1.0, 2.0]);

        let lists = gather(&[first, second], Vec3::ZERO);

        assert_eq!(lists.opaque[0].model, 0);
        assert!(lists.transparent.iter().all(|item| item.model == 1));
    }

    #[test]
    fn test_regather_replaces_previous_lists() {
        let model = row_model(vec![triangle(None)], Vec::new(), &[1.0]);
        let mut lists = DrawLists::new();
        lists.gather(std::slice::from_ref(&model), Vec3::ZERO);
        lists.gather(std::slice::from_ref(&model), Vec3::ZERO);
        assert_eq!(lists.len(), 1);

        lists.gather(&[], Vec3::ZERO);
        assert!(lists.is_empty());
    }

    #[test]
    fn test_dangling_mesh_reference_is_counted() {
        let mut model = row_model(vec![triangle(None)], Vec::new(), &[1.0]);
        model
            .graph
            .add_root(Node::new(Transform::new()).with_meshes(vec![5]));

        let mut lists = gather(std::slice::from_ref(&model), Vec3::ZERO);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists.dangling, 1);

        // Regathering starts the count over.
        lists.gather(&[], Vec3::ZERO);
        assert_eq!(lists.dangling, 0);
    }
}
