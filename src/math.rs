//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly.

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

/// Extract the yaw (rotation about +Y) from a quaternion, discarding any
/// pitch/roll. Used by the character controller, which only ever steers
/// around the vertical axis.
///
/// Not a general Euler decomposition — exact only for yaw-only rotations, an
/// approximation otherwise (fine here since the controller only ever
/// produces yaw-only rotations itself via [`yaw_to_quat`]).
pub fn quat_to_yaw(rotation: Quat) -> f32 {
    let (x, y, z, w) = (rotation.x, rotation.y, rotation.z, rotation.w);
    (2.0 * (w * y + z * x)).atan2(1.0 - 2.0 * (x * x + y * y))
}

/// Build a yaw-only rotation (about +Y), the inverse of [`quat_to_yaw`].
pub fn yaw_to_quat(yaw: f32) -> Quat {
    let half = yaw * 0.5;
    Quat::from_xyzw(0.0, half.sin(), 0.0, half.cos())
}
