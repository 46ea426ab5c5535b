//! Transform Sync — the render-side reader of the shared transform buffer
//! (spec.md §4.5). Computes one interpolation alpha per render frame from
//! wall-clock time and the physics worker's published timing, then blends
//! `previous → current` for every registered slot.

use crate::math::{Quat, Vec3};
use crate::shared::SharedTransformBuffer;

/// Default interval assumed when the buffer's published `interval_ms` is
/// `≤ 0` (spec.md §4.5 step 2) — i.e. before physics has published its
/// first frame.
pub const DEFAULT_INTERVAL_MS: f64 = 1000.0 / 60.0;

/// The result of one [`TransformSync::begin_frame`] call: the interpolation
/// weight for this render frame, and whether a new physics frame was
/// observed since the last call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSync {
    pub alpha: f32,
    pub new_frame: bool,
    pub counter: u32,
}

/// Per-render-worker state: just the last frame counter observed, so
/// `new_frame` can be computed. Everything else in spec.md §4.5 is stateless
/// given `(now_ms, buffer)`.
#[derive(Debug, Default)]
pub struct TransformSync {
    last_seen: u32,
    has_seen: bool,
}

impl TransformSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps 1–3 of spec.md §4.5: observe the frame counter, read timing,
    /// compute alpha. Call once per render frame before interpolating any
    /// entity.
    pub fn begin_frame(&mut self, buffer: &SharedTransformBuffer, now_ms: f64) -> FrameSync {
        let counter = buffer.observe_frame();
        let new_frame = !self.has_seen || counter != self.last_seen;
        self.last_seen = counter;
        self.has_seen = true;

        let (current_time, interval) = buffer.read_timing();
        let interval = if interval <= 0.0 { DEFAULT_INTERVAL_MS } else { interval };
        let raw = (now_ms - current_time) / interval;
        let alpha = raw.clamp(0.0, 1.0) as f32;

        FrameSync { alpha, new_frame, counter }
    }

    /// Step 4 of spec.md §4.5: reads `(previous, current)` for `slot` and
    /// blends them at `alpha` — position by linear interpolation, rotation
    /// by spherical linear interpolation on the short arc (`glam::Quat::slerp`
    /// already flips the shortest-path sign internally, matching the
    /// "flip one quaternion if dot < 0" rule spec.md §4.5 spells out).
    pub fn interpolate(buffer: &SharedTransformBuffer, slot: u32, alpha: f32) -> (Vec3, Quat) {
        let (previous, current) = buffer.read_transform(slot);
        let position = previous.position.lerp(current.position, alpha);
        let rotation = previous.rotation.normalize().slerp(current.rotation.normalize(), alpha);
        (position, rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(prev: Vec3, cur: Vec3, current_time: f64, interval: f64) -> SharedTransformBuffer {
        let buf = SharedTransformBuffer::with_capacity(1);
        buf.write_transform(0, prev, Quat::IDENTITY);
        buf.write_transform(0, cur, Quat::IDENTITY);
        buf.publish_frame(current_time, interval);
        buf
    }

    #[test]
    fn alpha_is_linear_between_zero_and_one() {
        let buf = buffer_with(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 1000.0, 16.0);
        let mut sync = TransformSync::new();
        let frame = sync.begin_frame(&buf, 1008.0);
        assert!((frame.alpha - 0.5).abs() < 1e-6);
    }

    #[test]
    fn alpha_clamps_below_zero_and_above_one() {
        let buf = buffer_with(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 1000.0, 16.0);
        let mut sync = TransformSync::new();
        assert_eq!(sync.begin_frame(&buf, 500.0).alpha, 0.0);
        assert_eq!(sync.begin_frame(&buf, 5000.0).alpha, 1.0);
    }

    #[test]
    fn missing_interval_falls_back_to_default() {
        let buf = SharedTransformBuffer::with_capacity(1);
        buf.publish_frame(0.0, 0.0);
        let mut sync = TransformSync::new();
        let frame = sync.begin_frame(&buf, DEFAULT_INTERVAL_MS / 2.0);
        assert!((frame.alpha - 0.5).abs() < 1e-6);
    }

    #[test]
    fn new_frame_is_true_exactly_once_per_publish() {
        let buf = SharedTransformBuffer::with_capacity(1);
        buf.publish_frame(0.0, 16.0);
        let mut sync = TransformSync::new();
        assert!(sync.begin_frame(&buf, 0.0).new_frame);
        assert!(!sync.begin_frame(&buf, 1.0).new_frame);
        buf.publish_frame(16.0, 16.0);
        assert!(sync.begin_frame(&buf, 16.0).new_frame);
    }

    #[test]
    fn interpolate_blends_position_componentwise() {
        let buf = buffer_with(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 20.0, -4.0), 0.0, 16.0);
        let (position, _) = TransformSync::interpolate(&buf, 0, 0.25);
        assert!((position.x - 2.5).abs() < 1e-5);
        assert!((position.y - 5.0).abs() < 1e-5);
        assert!((position.z - (-1.0)).abs() < 1e-5);
    }
}
