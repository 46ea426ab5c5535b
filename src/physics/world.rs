//! The rigid-body world: a thin, entity-aware wrapper around rapier3d's
//! pipeline plumbing.
//!
//! Grounded on the `PhysicsContext` pattern (own every rapier set, step the
//! pipeline in one call) and the collider/body spawn-and-track bookkeeping
//! used by rapier3d-backed ECS integrations — generalized here to track
//! bodies by this crate's [`EntityId`] instead of an ECS component.

use std::collections::HashMap;

use rapier3d::prelude::*;

use crate::error::{Error, Result};
use crate::math::{Quat, Vec3};
use crate::physics::types::{BodyKind, ColliderShape, PhysicsBodyConfig};
use crate::EntityId;

fn to_na_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

fn from_na_vector(v: &Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_na_rotation(q: Quat) -> UnitQuaternion<Real> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

fn from_na_rotation(r: &UnitQuaternion<Real>) -> Quat {
    let q = r.into_inner();
    Quat::from_xyzw(q.i, q.j, q.k, q.w)
}

fn build_shape(shape: &ColliderShape) -> SharedShape {
    match *shape {
        ColliderShape::Cuboid {
            half_x,
            half_y,
            half_z,
        } => SharedShape::cuboid(half_x, half_y, half_z),
        ColliderShape::Ball { radius } => SharedShape::ball(radius),
        ColliderShape::Capsule {
            half_height,
            radius,
        } => SharedShape::capsule_y(half_height, radius),
        ColliderShape::HeightField {
            rows,
            cols,
            ref heights,
            scale,
        } => {
            let data = nalgebra::DMatrix::from_row_slice(rows as usize, cols as usize, heights);
            SharedShape::heightfield(data, to_na_vector(scale))
        }
    }
}

/// Owns the full rapier3d pipeline plus an `EntityId → RigidBodyHandle`
/// index. Everything the physics stepper needs to advance the simulation
/// and read bodies back out lives here.
pub struct PhysicsWorld {
    pub(crate) integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    physics_pipeline: PhysicsPipeline,
    pub(crate) rigid_bodies: RigidBodySet,
    pub(crate) colliders: ColliderSet,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    pub(crate) query_pipeline: QueryPipeline,
    gravity: Vector<Real>,
    bodies_by_entity: HashMap<EntityId, RigidBodyHandle>,
}

impl PhysicsWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            integration_parameters: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            physics_pipeline: PhysicsPipeline::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            gravity: to_na_vector(gravity),
            bodies_by_entity: HashMap::new(),
        }
    }

    pub fn handle_of(&self, entity_id: EntityId) -> Option<RigidBodyHandle> {
        self.bodies_by_entity.get(&entity_id).copied()
    }

    pub fn spawn_body(
        &mut self,
        entity_id: EntityId,
        position: Vec3,
        rotation: Quat,
        config: &PhysicsBodyConfig,
    ) -> Result<RigidBodyHandle> {
        if self.bodies_by_entity.contains_key(&entity_id) {
            return Err(Error::InvalidArgument(format!(
                "entity {entity_id:?} already has a physics body"
            )));
        }

        let body = match config.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::KinematicPositionBased => RigidBodyBuilder::kinematic_position_based(),
        }
        .position(Isometry::from_parts(to_na_vector(position).into(), to_na_rotation(rotation)))
        .build();

        let handle = self.rigid_bodies.insert(body);

        let mut collider = ColliderBuilder::new(build_shape(&config.shape));
        if let Some(friction) = config.friction {
            collider = collider.friction(friction);
        }
        if let Some(restitution) = config.restitution {
            collider = collider.restitution(restitution);
        }
        if let Some(density) = config.density {
            collider = collider.density(density);
        }
        if config.emits_collision_events {
            collider = collider.active_events(ActiveEvents::COLLISION_EVENTS);
        }
        self.colliders
            .insert_with_parent(collider.build(), handle, &mut self.rigid_bodies);

        self.bodies_by_entity.insert(entity_id, handle);
        Ok(handle)
    }

    /// Spawns a kinematic body for the character controller. The collider is
    /// offset upward by `half_height` so the body's own translation
    /// represents the feet, per the cuboid-at-feet convention (rather than a
    /// capsule centered on the body).
    pub fn spawn_character_body(
        &mut self,
        entity_id: EntityId,
        position: Vec3,
        rotation: Quat,
        half_width: f32,
        half_height: f32,
        half_length: f32,
    ) -> Result<RigidBodyHandle> {
        if self.bodies_by_entity.contains_key(&entity_id) {
            return Err(Error::InvalidArgument(format!(
                "entity {entity_id:?} already has a physics body"
            )));
        }

        let body = RigidBodyBuilder::kinematic_position_based()
            .position(Isometry::from_parts(to_na_vector(position).into(), to_na_rotation(rotation)))
            .build();
        let handle = self.rigid_bodies.insert(body);

        let collider = ColliderBuilder::cuboid(half_width, half_height, half_length)
            .translation(vector![0.0, half_height, 0.0])
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.rigid_bodies);

        self.bodies_by_entity.insert(entity_id, handle);
        Ok(handle)
    }

    pub fn remove_entity(&mut self, entity_id: EntityId) -> bool {
        let Some(handle) = self.bodies_by_entity.remove(&entity_id) else {
            return false;
        };
        self.rigid_bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        true
    }

    pub fn body_transform(&self, handle: RigidBodyHandle) -> Option<(Vec3, Quat)> {
        let body = self.rigid_bodies.get(handle)?;
        Some((
            from_na_vector(&body.position().translation.vector),
            from_na_rotation(&body.rotation().into_inner().into()),
        ))
    }

    pub fn set_next_kinematic_translation(&mut self, handle: RigidBodyHandle, translation: Vec3) {
        if let Some(body) = self.rigid_bodies.get_mut(handle) {
            body.set_next_kinematic_translation(to_na_vector(translation));
        }
    }

    pub fn set_next_kinematic_rotation(&mut self, handle: RigidBodyHandle, rotation: Quat) {
        if let Some(body) = self.rigid_bodies.get_mut(handle) {
            body.set_next_kinematic_rotation(to_na_rotation(rotation));
        }
    }

    pub fn collider_of(&self, handle: RigidBodyHandle) -> Option<&Collider> {
        let body = self.rigid_bodies.get(handle)?;
        body.colliders().first().and_then(|c| self.colliders.get(*c))
    }

    /// Advances the simulation by `dt` seconds. Caller is responsible for the
    /// 100-ms clamp on `dt` (see `PhysicsStepper::step`).
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }

    pub fn body_count(&self) -> usize {
        self.bodies_by_entity.len()
    }
}
