//! Scene description: arena node graph, transforms, bounds, camera and
//! lights.

pub mod bounds;
pub mod camera;
pub mod graph;
pub mod light;
pub mod transform;

pub use bounds::Aabb;
pub use camera::{Camera, OrbitController};
pub use graph::{Node, NodeHandle, SceneGraph};
pub use light::{MAX_POINT_LIGHTS, PointLight, lights_around};
pub use transform::{NodeTransform, Transform, normal_matrix};
