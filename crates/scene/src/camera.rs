//! Perspective camera and an orbit controller.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::bounds::Aabb;

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the aspect ratio; ignores degenerate sizes.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.rotation * Vec3::Y)
    }

    /// Right-handed perspective with Y flipped for Vulkan clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward != Vec3::ZERO {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, forward);
        }
    }
}

/// Orbits a target point at a given distance. Yaw turns around +Y, pitch
/// tilts toward the poles and is clamped short of them.
#[derive(Clone, Debug)]
pub struct OrbitController {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    /// Fraction of the distance per scroll line.
    pub zoom_speed: f32,
    pub min_distance: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 5.0,
            yaw: 0.0,
            pitch: 0.0,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            min_distance: 0.01,
        }
    }
}

impl OrbitController {
    const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

    /// Centers on `bounds` at a distance that fits them in `fov_y`.
    pub fn frame(bounds: &Aabb, fov_y: f32) -> Self {
        let radius = bounds.radius().max(0.1);
        let distance = radius / (fov_y * 0.5).sin();
        Self {
            target: bounds.center(),
            distance,
            min_distance: radius * 0.01,
            ..Default::default()
        }
    }

    pub fn rotate(&mut self, drag: Vec2) {
        self.yaw -= drag.x * self.rotate_speed;
        self.pitch = (self.pitch - drag.y * self.rotate_speed)
            .clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Positive lines move closer.
    pub fn zoom(&mut self, lines: f32) {
        let factor = (1.0 - lines * self.zoom_speed).max(0.1);
        self.distance = (self.distance * factor).max(self.min_distance);
    }

    pub fn eye(&self) -> Vec3 {
        let offset = Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        );
        self.target + offset * self.distance
    }

    /// Places `camera` on the orbit and adjusts its clip planes to the
    /// distance.
    pub fn apply(&self, camera: &mut Camera) {
        camera.position = self.eye();
        camera.look_at(self.target);
        camera.near = (self.distance * 0.01).max(0.001);
        camera.far = self.distance * 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let proj = camera.projection_matrix();
        let reference = Mat4::perspective_rh(camera.fov_y, camera.aspect, camera.near, camera.far);
        assert_eq!(proj.y_axis.y, -reference.y_axis.y);
    }

    #[test]
    fn test_default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let p = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 0.0, -5.0)).length() < EPSILON);
    }

    #[test]
    fn test_set_viewport_ignores_zero() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_eq!(camera.aspect, 2.0);
        camera.set_viewport(0, 400);
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn test_orbit_eye_at_distance() {
        let mut orbit = OrbitController {
            target: Vec3::new(1.0, 0.0, 0.0),
            distance: 3.0,
            ..Default::default()
        };
        assert!((orbit.eye() - Vec3::new(1.0, 0.0, 3.0)).length() < EPSILON);

        orbit.rotate(Vec2::new(120.0, -80.0));
        assert!((orbit.eye().distance(orbit.target) - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_orbit_pitch_clamped() {
        let mut orbit = OrbitController::default();
        orbit.rotate(Vec2::new(0.0, -1.0e6));
        assert!(orbit.pitch < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn test_zoom_respects_minimum() {
        let mut orbit = OrbitController::default();
        for _ in 0..1000 {
            orbit.zoom(5.0);
        }
        assert!(orbit.distance >= orbit.min_distance);
    }

    #[test]
    fn test_apply_points_camera_at_target() {
        let orbit = OrbitController::frame(&Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)), 1.0);
        let mut camera = Camera::default();
        orbit.apply(&mut camera);
        let to_target = (orbit.target - camera.position).normalize();
        assert!((camera.forward() - to_target).length() < EPSILON);
    }
}
