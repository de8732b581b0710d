//! Arena scene graph.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeHandle`]. A child is
//! always added after its parent, so the graph is acyclic by construction and
//! parent links never own anything.

use glam::Mat4;
use tracing::warn;

use crate::transform::NodeTransform;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub transform: NodeTransform,
    /// Indices into the owning model's mesh table.
    pub meshes: Vec<usize>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

impl Node {
    pub fn new(transform: impl Into<NodeTransform>) -> Self {
        Self {
            transform: transform.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meshes(mut self, meshes: Vec<usize>) -> Self {
        self.meshes = meshes;
        self
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeHandle>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, node: Node) -> NodeHandle {
        let handle = self.push(node, None);
        self.roots.push(handle);
        handle
    }

    /// Adds `node` under `parent`. Returns `None` if `parent` is not in this
    /// graph.
    pub fn add_child(&mut self, parent: NodeHandle, node: Node) -> Option<NodeHandle> {
        if parent.0 >= self.nodes.len() {
            warn!(
                "Parent node {} not in graph of {} nodes",
                parent.0,
                self.nodes.len()
            );
            return None;
        }
        let handle = self.push(node, Some(parent));
        self.nodes[parent.0].children.push(handle);
        Some(handle)
    }

    fn push(&mut self, mut node: Node, parent: Option<NodeHandle>) -> NodeHandle {
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        NodeHandle(self.nodes.len() - 1)
    }

    #[inline]
    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle.0)
    }

    #[inline]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeHandle(i), node))
    }

    /// Node-to-graph-root matrix, composed along the parent chain.
    pub fn world_matrix(&self, handle: NodeHandle) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.get(handle);
        while let Some(node) = current {
            matrix = node.transform.local_matrix() * matrix;
            current = node.parent.and_then(|p| self.get(p));
        }
        matrix
    }

    /// Visits every node reachable from the roots depth-first, parents
    /// before children and siblings in insertion order, with its accumulated
    /// world matrix.
    pub fn traverse(&self, mut visit: impl FnMut(NodeHandle, &Node, Mat4)) {
        let mut stack: Vec<(NodeHandle, Mat4)> = self
            .roots
            .iter()
            .rev()
            .map(|&root| (root, Mat4::IDENTITY))
            .collect();

        while let Some((handle, parent_world)) = stack.pop() {
            let Some(node) = self.get(handle) else {
                continue;
            };
            let world = parent_world * node.transform.local_matrix();
            visit(handle, node, world);
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;
    use glam::Vec3;

    fn translated(x: f32, y: f32, z: f32) -> Node {
        Node::new(Transform::new().with_position(Vec3::new(x, y, z)))
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root(translated(10.0, 0.0, 0.0));
        let child = graph.add_child(root, translated(0.0, 5.0, 0.0)).unwrap();
        let grandchild = graph.add_child(child, translated(0.0, 0.0, 1.0)).unwrap();

        let p = graph.world_matrix(grandchild).transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(10.0, 5.0, 1.0));
        assert_eq!(graph.get(grandchild).unwrap().parent(), Some(child));
    }

    #[test]
    fn test_baked_matrix_in_chain() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root(Node::new(Mat4::from_scale(Vec3::splat(2.0))));
        let child = graph.add_child(root, translated(1.0, 0.0, 0.0)).unwrap();

        let p = graph.world_matrix(child).transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_traverse_depth_first_order() {
        let mut graph = SceneGraph::new();
        let a = graph.add_root(Node::default().with_name("a"));
        let b = graph.add_child(a, Node::default().with_name("b")).unwrap();
        graph.add_child(b, Node::default().with_name("c"));
        graph.add_child(a, Node::default().with_name("d"));
        graph.add_root(Node::default().with_name("e"));

        let mut order = Vec::new();
        graph.traverse(|_, node, _| order.push(node.name.clone().unwrap()));
        assert_eq!(order, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_traverse_matches_world_matrix() {
        let mut graph = SceneGraph::new();
        let root = graph.add_root(translated(1.0, 2.0, 3.0));
        let child = graph.add_child(root, translated(-1.0, 0.0, 0.0)).unwrap();
        graph.add_child(child, translated(0.0, 0.0, 7.0));

        graph.traverse(|handle, _, world| {
            assert_eq!(world, graph.world_matrix(handle));
        });
    }

    #[test]
    fn test_add_child_to_missing_parent() {
        let mut graph = SceneGraph::new();
        let mut other = SceneGraph::new();
        other.add_root(Node::default());
        let foreign = other.add_root(Node::default());

        assert!(graph.add_child(foreign, Node::default()).is_none());
        assert!(graph.is_empty());
    }
}
