//! Local node transforms.
//!
//! A node's local transform is either a baked matrix or a decomposed
//! translation/rotation/scale, never both. World matrices are composed by the
//! scene graph, not stored here.

use glam::{Mat4, Quat, Vec3};

/// Translation, rotation and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// `T * R * S`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

/// How a node positions itself relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeTransform {
    Matrix(Mat4),
    Trs(Transform),
}

impl Default for NodeTransform {
    fn default() -> Self {
        NodeTransform::Trs(Transform::default())
    }
}

impl NodeTransform {
    pub fn local_matrix(&self) -> Mat4 {
        match self {
            NodeTransform::Matrix(matrix) => *matrix,
            NodeTransform::Trs(trs) => trs.matrix(),
        }
    }
}

impl From<Transform> for NodeTransform {
    fn from(trs: Transform) -> Self {
        NodeTransform::Trs(trs)
    }
}

impl From<Mat4> for NodeTransform {
    fn from(matrix: Mat4) -> Self {
        NodeTransform::Matrix(matrix)
    }
}

/// Inverse transpose of the upper 3x3, for transforming normals. Falls back
/// to identity for singular matrices.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    const EPSILON: f32 = 1e-6;
    if model.determinant().abs() < EPSILON {
        Mat4::IDENTITY
    } else {
        model.inverse().transpose()
    }
}
