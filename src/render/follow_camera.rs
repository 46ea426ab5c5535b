//! Follow Camera — third-person damped orbit-around-target (spec.md §4.8).

use crate::math::{quat_to_yaw, Quat, Vec3};
use crate::render::backend::SceneBackend;

/// Tuning constants for one follow camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowCameraConfig {
    pub height: f32,
    pub distance: f32,
    pub look_at_height: f32,
    pub damping: f32,
}

impl Default for FollowCameraConfig {
    fn default() -> Self {
        Self {
            height: 2.5,
            distance: 5.0,
            look_at_height: 1.2,
            damping: 0.12,
        }
    }
}

/// Rotates `v` about the world +Y axis by `yaw` radians.
fn rotate_y(v: Vec3, yaw: f32) -> Vec3 {
    let (sin, cos) = yaw.sin_cos();
    Vec3::new(v.x * cos + v.z * sin, v.y, -v.x * sin + v.z * cos)
}

/// Third-person damped follow camera. Has no target until
/// [`FollowCamera::set_target`] is called.
pub struct FollowCamera {
    config: FollowCameraConfig,
    current_position: Vec3,
    current_lookat: Vec3,
    has_target: bool,
}

impl FollowCamera {
    pub fn new(config: FollowCameraConfig) -> Self {
        Self {
            config,
            current_position: Vec3::ZERO,
            current_lookat: Vec3::ZERO,
            has_target: false,
        }
    }

    /// Snaps the camera directly to the ideal offset for `target_position`/
    /// `target_rotation` (no damping) — spec.md §4.8 "on initial target-set:
    /// snap current to ideal... to avoid a fly-in."
    pub fn set_target(&mut self, target_position: Vec3, target_rotation: Quat) {
        let (ideal_offset, ideal_lookat) = self.ideal(target_position, target_rotation);
        self.current_position = ideal_offset;
        self.current_lookat = ideal_lookat;
        self.has_target = true;
    }

    fn ideal(&self, target_position: Vec3, target_rotation: Quat) -> (Vec3, Vec3) {
        let yaw = quat_to_yaw(target_rotation);
        let ideal_offset = rotate_y(Vec3::new(0.0, self.config.height, -self.config.distance), yaw) + target_position;
        let ideal_lookat = target_position + Vec3::new(0.0, self.config.look_at_height, 0.0);
        (ideal_offset, ideal_lookat)
    }

    /// One frame's update (spec.md §4.8). If no target has been set yet,
    /// this is a no-op.
    pub fn update(&mut self, backend: &mut dyn SceneBackend, target_position: Vec3, target_rotation: Quat) {
        if !self.has_target {
            self.set_target(target_position, target_rotation);
        } else {
            let (ideal_offset, ideal_lookat) = self.ideal(target_position, target_rotation);
            self.current_position = self.current_position.lerp(ideal_offset, self.config.damping);
            self.current_lookat = self.current_lookat.lerp(ideal_lookat, self.config.damping);
        }
        backend.set_camera(self.current_position, self.current_lookat);
    }

    pub fn position(&self) -> Vec3 {
        self.current_position
    }

    pub fn lookat(&self) -> Vec3 {
        self.current_lookat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullSceneBackend;

    #[test]
    fn initial_target_set_snaps_without_damping() {
        let mut camera = FollowCamera::new(FollowCameraConfig::default());
        let mut backend = NullSceneBackend::default();
        camera.update(&mut backend, Vec3::ZERO, Quat::IDENTITY);
        // Facing +Z (identity yaw), the camera should sit behind the
        // target, i.e. negative Z in the target's local frame.
        assert!(camera.position().z < 0.0);
        assert!((camera.position().y - FollowCameraConfig::default().height).abs() < 1e-5);
    }

    #[test]
    fn damping_moves_partway_toward_ideal_each_frame() {
        let mut camera = FollowCamera::new(FollowCameraConfig::default());
        let mut backend = NullSceneBackend::default();
        camera.update(&mut backend, Vec3::ZERO, Quat::IDENTITY);
        let start = camera.position();

        camera.update(&mut backend, Vec3::new(0.0, 0.0, 10.0), Quat::IDENTITY);
        let after_one = camera.position();

        assert!(after_one.z > start.z, "camera should have moved toward the new ideal offset");
        assert!(after_one.z < 10.0 - FollowCameraConfig::default().distance, "damped movement should not reach the ideal in one frame");
    }
}
