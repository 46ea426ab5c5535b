//! Data types crossing the Host → Physics RPC boundary.
//!
//! Grounded on the collider/body shape taxonomy in a rapier3d-based ECS
//! integration (rigid body type + shape enum pattern), adapted to the
//! variant set this spec actually needs.

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// How a rigid body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Static,
    Dynamic,
    KinematicPositionBased,
}

/// Collider geometry. Half-extents, not full extents, matching rapier3d's
/// own collider-builder convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Cuboid {
        half_x: f32,
        half_y: f32,
        half_z: f32,
    },
    Ball {
        radius: f32,
    },
    Capsule {
        half_height: f32,
        radius: f32,
    },
    HeightField {
        rows: u32,
        cols: u32,
        heights: Vec<f32>,
        scale: Vec3,
    },
}

/// Spawn-time body configuration, carried over the Host → Physics RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBodyConfig {
    pub kind: BodyKind,
    pub shape: ColliderShape,
    pub friction: Option<f32>,
    pub restitution: Option<f32>,
    pub density: Option<f32>,
    pub emits_collision_events: bool,
}

impl PhysicsBodyConfig {
    pub fn static_body(shape: ColliderShape) -> Self {
        Self {
            kind: BodyKind::Static,
            shape,
            friction: None,
            restitution: None,
            density: None,
            emits_collision_events: false,
        }
    }

    pub fn dynamic_body(shape: ColliderShape) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            shape,
            friction: None,
            restitution: None,
            density: None,
            emits_collision_events: false,
        }
    }
}

/// One frame's worth of player input. Six independent booleans, no analog
/// axes — matches what the character controller actually consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub sprint: bool,
}

/// Tuning for a kinematic character controller, carried over the
/// `spawn_player` RPC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterControllerConfig {
    pub half_width: f32,
    pub half_height: f32,
    pub half_length: f32,
    pub step_height: f32,
    pub snap_to_ground_dist: f32,
    pub max_slope_climb_deg: f32,
    pub min_slope_slide_deg: f32,
}

impl Default for CharacterControllerConfig {
    fn default() -> Self {
        Self {
            half_width: 0.3,
            half_height: 0.5,
            half_length: 0.3,
            step_height: 0.2,
            snap_to_ground_dist: 0.5,
            max_slope_climb_deg: 50.0,
            min_slope_slide_deg: 30.0,
        }
    }
}

/// Coarse movement tuning the character controller multiplies input by.
/// Not part of the wire spec's data model, but every implementation needs
/// these constants somewhere — kept as one small, overridable struct rather
/// than scattered literals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementTuning {
    pub move_speed: f32,
    pub sprint_multiplier: f32,
    pub turn_speed: f32,
    pub gravity: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            move_speed: 4.0,
            sprint_multiplier: 1.8,
            turn_speed: std::f32::consts::PI,
            gravity: -20.0,
        }
    }
}

pub(crate) fn forward_vector(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_vector_is_unit_length() {
        for degrees in [0.0, 33.0, 180.0, -90.0] {
            let v = forward_vector(degrees.to_radians());
            assert!((v.length() - 1.0).abs() < 1e-5);
        }
    }
}
