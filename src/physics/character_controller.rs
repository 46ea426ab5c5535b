//! The player's kinematic character controller.
//!
//! Grounded on the `step_character_controller` pattern used in
//! rapier3d-based player movement: build a desired displacement from input,
//! run it through `KinematicCharacterController::move_shape` for
//! collide-and-slide, then apply the corrected translation as the body's
//! next kinematic position. Yaw is tracked separately from the rapier body's
//! rotation and written back as a whole quaternion each step, since this
//! controller only ever steers around the vertical axis.

use rapier3d::control::{CharacterLength, KinematicCharacterController};
use rapier3d::prelude::*;

use crate::math::{quat_to_yaw, yaw_to_quat, Quat, Vec3};
use crate::physics::types::{forward_vector, CharacterControllerConfig, MovementInput, MovementTuning};
use crate::physics::world::PhysicsWorld;
use crate::shared::GROUNDED_BIT;

fn to_na_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn from_na_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

/// Per-player state not owned by rapier: the current yaw and the last
/// reported grounded status. Everything else about the character is read
/// fresh from the rigid body each frame.
///
/// spec.md §9's open question notes two in-tree variants: one that
/// integrates vertical velocity and a jump impulse, and one that doesn't.
/// This implements the pared-down variant — no vertical-speed state, no
/// jump impulse on `input.jump` (see `DESIGN.md`) — so there is no velocity
/// field here, only yaw and grounded.
#[derive(Debug, Clone, Copy)]
pub struct CharacterState {
    pub yaw: f32,
    pub grounded: bool,
}

impl CharacterState {
    pub fn new(initial_yaw: f32) -> Self {
        Self {
            yaw: initial_yaw,
            grounded: false,
        }
    }
}

fn make_controller(config: &CharacterControllerConfig) -> KinematicCharacterController {
    let mut controller = KinematicCharacterController::default();
    controller.up = Vector::y_axis();
    controller.offset = CharacterLength::Absolute(0.01);
    controller.autostep = Some(rapier3d::control::CharacterAutostep {
        max_height: CharacterLength::Absolute(config.step_height),
        min_width: CharacterLength::Absolute(0.1),
        include_dynamic_bodies: true,
    });
    controller.snap_to_ground = Some(CharacterLength::Absolute(config.snap_to_ground_dist));
    controller.max_slope_climb_angle = config.max_slope_climb_deg.to_radians();
    controller.min_slope_slide_angle = config.min_slope_slide_deg.to_radians();
    controller
}

/// Advances one player's kinematic body by `dt` seconds given this frame's
/// [`MovementInput`]. Returns the grounded bit to fold into the shared flags
/// word.
pub fn step_character(
    world: &mut PhysicsWorld,
    handle: RigidBodyHandle,
    state: &mut CharacterState,
    input: &MovementInput,
    config: &CharacterControllerConfig,
    tuning: &MovementTuning,
    dt: f32,
) -> u32 {
    if input.left {
        state.yaw += tuning.turn_speed * dt;
    }
    if input.right {
        state.yaw -= tuning.turn_speed * dt;
    }

    // spec.md §4.4: "Planar displacement: forward vector scaled by
    // speed·dt ... with sign from forward/backward." `left`/`right` only
    // steer yaw (above) — no strafe component.
    let forward = forward_vector(state.yaw);

    let mut planar = Vec3::ZERO;
    if input.forward {
        planar += forward;
    }
    if input.backward {
        planar -= forward;
    }

    let speed = if input.sprint {
        tuning.move_speed * tuning.sprint_multiplier
    } else {
        tuning.move_speed
    };
    planar *= speed;

    // spec.md §4.4: "Vertical displacement: gravity·dt (constant negative y
    // acceleration applied as velocity-times-dt for simplicity; no
    // integration of vertical velocity is required by this spec)." `config`
    // and `input.jump` are accepted but unused here by design — see the
    // pared-down-variant decision in `DESIGN.md`.
    let _ = (config, input.jump);
    let vertical = tuning.gravity * dt;

    let desired = Vec3::new(planar.x * dt, vertical, planar.z * dt);

    let controller = make_controller(config);
    let collider_handle = world
        .rigid_bodies
        .get(handle)
        .and_then(|body| body.colliders().first().copied());

    let corrected = if let Some(collider_handle) = collider_handle {
        let (shape, position) = {
            let collider = world.colliders.get(collider_handle).expect("collider exists");
            (collider.shape(), *collider.position())
        };
        let mut collisions = Vec::new();
        let movement = controller.move_shape(
            dt,
            &world.rigid_bodies,
            &world.colliders,
            &world.query_pipeline,
            shape,
            &position,
            to_na_vector(desired),
            QueryFilter::default().exclude_rigid_body(handle),
            |c| collisions.push(c),
        );
        state.grounded = movement.grounded;
        from_na_vector(&movement.translation)
    } else {
        state.grounded = false;
        desired
    };

    world.set_next_kinematic_translation(handle, corrected);
    world.set_next_kinematic_rotation(handle, yaw_to_quat(state.yaw));

    if state.grounded {
        GROUNDED_BIT
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turning_left_increases_yaw() {
        let mut state = CharacterState::new(0.0);
        let tuning = MovementTuning::default();
        let input = MovementInput {
            left: true,
            ..Default::default()
        };
        state.yaw += tuning.turn_speed * (1.0 / 60.0) * if input.left { 1.0 } else { 0.0 };
        assert!(state.yaw > 0.0);
    }

    #[test]
    fn no_input_keeps_yaw_stable_and_the_body_falls_while_airborne() {
        let config = CharacterControllerConfig::default();
        let tuning = MovementTuning::default();
        let mut world = PhysicsWorld::new(Vec3::new(0.0, tuning.gravity, 0.0));
        let handle = world
            .spawn_character_body(
                std::num::NonZeroU32::new(1).unwrap(),
                Vec3::new(0.0, 5.0, 0.0),
                Quat::IDENTITY,
                config.half_width,
                config.half_height,
                config.half_length,
            )
            .unwrap();
        let mut state = CharacterState::new(0.0);
        let input = MovementInput::default();

        let y_before = world.body_transform(handle).unwrap().0.y;
        step_character(&mut world, handle, &mut state, &input, &config, &tuning, 1.0 / 60.0);
        world.step(1.0 / 60.0);
        let y_after = world.body_transform(handle).unwrap().0.y;

        assert!(y_after < y_before, "airborne body should have been displaced downward");
        assert!((quat_to_yaw(yaw_to_quat(state.yaw)) - state.yaw).abs() < 1e-5);
    }
}
