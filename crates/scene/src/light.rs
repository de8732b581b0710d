//! Point lights.

use glam::Vec3;

use crate::bounds::Aabb;

/// Number of point lights fed to the shaders.
pub const MAX_POINT_LIGHTS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

impl PointLight {
    /// Light color scaled by intensity, as the shaders consume it.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Four white lights above the corners of `bounds`, bright enough to reach
/// its center.
pub fn lights_around(bounds: &Aabb) -> [PointLight; MAX_POINT_LIGHTS] {
    let center = bounds.center();
    let radius = bounds.radius().max(1.0);
    let height = center.y + radius;
    let intensity = radius * radius * 4.0;

    [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)].map(|(x, z)| PointLight {
        position: Vec3::new(center.x + x * radius, height, center.z + z * radius),
        color: Vec3::ONE,
        intensity,
    })
}
