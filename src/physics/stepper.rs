//! The fixed-interval physics orchestrator: the state machine and step
//! algorithm from spec.md §4.3, wired to the [`PhysicsWorld`], the player's
//! [`character_controller`], the [`EntityIndex`], and the
//! [`SharedTransformBuffer`].
//!
//! The worker thread that owns one of these (see [`crate::host`]) is a
//! plain `loop { stepper.step(now_ms); sleep_until(next) }` — this type
//! itself has no scheduling logic, just the per-step algorithm and the
//! lifecycle state machine, so it can be driven directly from tests without
//! spinning up a thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::entity_index::EntityIndex;
use crate::error::{Error, Result};
use crate::math::{quat_to_yaw, Quat, Vec3};
use crate::physics::character_controller::{step_character, CharacterState};
use crate::physics::types::{CharacterControllerConfig, MovementInput, MovementTuning, PhysicsBodyConfig};
use crate::physics::world::PhysicsWorld;
use crate::shared::SharedTransformBuffer;
use crate::EntityId;

/// `Uninit → Initialized → Running ⇄ Paused → Disposed`, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepperState {
    Uninit,
    Initialized,
    Running,
    Paused,
    Disposed,
}

/// The upper bound on one step's `delta_seconds`, per spec.md §4.3 step 1 —
/// prevents the "spiral of death" after the worker thread is starved for a
/// long pause (a debugger breakpoint, a slow host call).
pub const MAX_DELTA_SECONDS: f32 = 0.1;

/// Default fixed step interval: 60 Hz.
pub const DEFAULT_INTERVAL_MS: f64 = 1000.0 / 60.0;

struct PlayerEntry {
    id: EntityId,
    handle: rapier3d::prelude::RigidBodyHandle,
    state: CharacterState,
    config: CharacterControllerConfig,
    tuning: MovementTuning,
}

/// A snapshot of the stepper's internal counters, mirroring the teacher's
/// `#[cfg(feature = "diagnostics")]` per-frame `World` counters
/// (spawned/despawned-this-frame) — generalized here to the physics
/// worker's step loop so a host can drive a debug overlay without reaching
/// into stepper internals.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhysicsDiagnostics {
    pub step_count: u64,
    pub last_delta_seconds: f32,
    pub last_step_duration: Duration,
    pub registered_body_count: u32,
}

/// Owns the rigid-body world, the player's character controller state, and
/// drives the shared-buffer publish protocol.
pub struct PhysicsStepper {
    state: StepperState,
    world: Option<PhysicsWorld>,
    buffer: Option<Arc<SharedTransformBuffer>>,
    index: EntityIndex,
    player: Option<PlayerEntry>,
    input: MovementInput,
    last_time_ms: f64,
    interval_ms: f64,
    diagnostics: PhysicsDiagnostics,
}

impl Default for PhysicsStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsStepper {
    pub fn new() -> Self {
        Self {
            state: StepperState::Uninit,
            world: None,
            buffer: None,
            index: EntityIndex::with_capacity(0),
            player: None,
            input: MovementInput::default(),
            last_time_ms: 0.0,
            interval_ms: DEFAULT_INTERVAL_MS,
            diagnostics: PhysicsDiagnostics::default(),
        }
    }

    pub fn state(&self) -> StepperState {
        self.state
    }

    pub fn diagnostics(&self) -> PhysicsDiagnostics {
        self.diagnostics
    }

    /// The shared-buffer slot assigned to `id`, if it's currently registered.
    pub fn get_slot(&self, id: EntityId) -> Option<u32> {
        self.index.get_slot(id)
    }

    /// Constructs the solver and binds the shared buffer. Idempotent:
    /// re-init while already initialized disposes the previous state first,
    /// per spec.md §4.3.
    pub fn init(&mut self, gravity: Vec3, buffer: Arc<SharedTransformBuffer>, interval_ms: f64) -> Result<()> {
        if self.state != StepperState::Uninit {
            log::info!("physics stepper re-initializing, disposing previous state");
            self.dispose();
        }
        let capacity = buffer.capacity();
        self.world = Some(PhysicsWorld::new(gravity));
        self.index = EntityIndex::with_capacity(capacity);
        self.buffer = Some(buffer);
        self.interval_ms = interval_ms;
        self.state = StepperState::Initialized;
        log::info!("physics stepper initialized (gravity={gravity:?}, capacity={capacity})");
        Ok(())
    }

    fn check_live(&self) -> Result<()> {
        if self.state == StepperState::Uninit || self.state == StepperState::Disposed {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    pub fn spawn_entity(&mut self, id: EntityId, position: Vec3, rotation: Quat, config: &PhysicsBodyConfig) -> Result<u32> {
        self.check_live()?;
        let world = self.world.as_mut().ok_or(Error::NotInitialized)?;
        world.spawn_body(id, position, rotation, config)?;
        let slot = match self.index.insert(id) {
            Ok(slot) => slot,
            Err(e) => {
                self.world.as_mut().unwrap().remove_entity(id);
                return Err(e);
            }
        };
        let buffer = self.buffer.as_ref().ok_or(Error::NotInitialized)?;
        buffer.register();
        buffer.publish_initial(slot, position, rotation);
        log::info!("physics: spawned entity {id} at slot {slot}");
        Ok(slot)
    }

    pub fn spawn_player(
        &mut self,
        id: EntityId,
        position: Vec3,
        rotation: Quat,
        controller_config: CharacterControllerConfig,
    ) -> Result<u32> {
        self.check_live()?;
        let world = self.world.as_mut().ok_or(Error::NotInitialized)?;
        let handle = world.spawn_character_body(
            id,
            position,
            rotation,
            controller_config.half_width,
            controller_config.half_height,
            controller_config.half_length,
        )?;
        let slot = match self.index.insert(id) {
            Ok(slot) => slot,
            Err(e) => {
                self.world.as_mut().unwrap().remove_entity(id);
                return Err(e);
            }
        };
        let buffer = self.buffer.as_ref().ok_or(Error::NotInitialized)?;
        buffer.register();
        buffer.publish_initial(slot, position, rotation);
        self.player = Some(PlayerEntry {
            id,
            handle,
            state: CharacterState::new(quat_to_yaw(rotation)),
            config: controller_config,
            tuning: MovementTuning::default(),
        });
        log::info!("physics: spawned player {id} at slot {slot}");
        Ok(slot)
    }

    pub fn remove_entity(&mut self, id: EntityId) -> Result<()> {
        self.check_live()?;
        if self.index.get_slot(id).is_none() {
            return Err(Error::InvalidArgument(format!("entity {id} not registered")));
        }
        let world = self.world.as_mut().ok_or(Error::NotInitialized)?;
        world.remove_entity(id);
        let buffer = self.buffer.as_ref().ok_or(Error::NotInitialized)?;
        if let Some(mv) = self.index.remove(id).flatten() {
            buffer.move_slot(mv.old_slot, mv.new_slot);
        }
        buffer.unregister();
        if self.player.as_ref().is_some_and(|p| p.id == id) {
            self.player = None;
        }
        log::info!("physics: removed entity {id}");
        Ok(())
    }

    /// Replaces the current player input snapshot (spec.md §4.3
    /// `set_player_input`). A no-op if no player has been spawned yet — the
    /// RPC still succeeds, the input is just unused.
    pub fn set_player_input(&mut self, input: MovementInput) {
        self.input = input;
    }

    pub fn start(&mut self, now_ms: f64) -> Result<()> {
        match self.state {
            StepperState::Initialized | StepperState::Paused => {
                self.last_time_ms = now_ms;
                self.state = StepperState::Running;
                log::info!("physics stepper started");
                Ok(())
            }
            StepperState::Running => Ok(()),
            StepperState::Uninit | StepperState::Disposed => Err(Error::NotInitialized),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            StepperState::Running => {
                self.state = StepperState::Paused;
                log::info!("physics stepper paused");
                Ok(())
            }
            StepperState::Paused => Ok(()),
            _ => Err(Error::NotInitialized),
        }
    }

    pub fn resume(&mut self, now_ms: f64) -> Result<()> {
        match self.state {
            StepperState::Paused => {
                self.last_time_ms = now_ms;
                self.state = StepperState::Running;
                log::info!("physics stepper resumed");
                Ok(())
            }
            StepperState::Running => Ok(()),
            _ => Err(Error::NotInitialized),
        }
    }

    pub fn dispose(&mut self) {
        self.world = None;
        self.buffer = None;
        self.index = EntityIndex::with_capacity(0);
        self.player = None;
        self.state = StepperState::Disposed;
        log::info!("physics stepper disposed");
    }

    pub fn is_running(&self) -> bool {
        self.state == StepperState::Running
    }

    /// One fixed step, per spec.md §4.3. A no-op unless [`StepperState::Running`]
    /// (the worker's self-scheduling loop only calls this while running, but
    /// the guard keeps direct callers — e.g. tests — honest).
    pub fn step(&mut self, now_ms: f64) -> Result<()> {
        if self.state != StepperState::Running {
            return Ok(());
        }
        let started = Instant::now();

        let delta_seconds = (((now_ms - self.last_time_ms) / 1000.0) as f32).min(MAX_DELTA_SECONDS).max(0.0);
        self.last_time_ms = now_ms;

        let world = self.world.as_mut().ok_or(Error::NotInitialized)?;
        let buffer = self.buffer.as_ref().ok_or(Error::NotInitialized)?;

        let mut player_flags: Option<(EntityId, u32)> = None;
        if let Some(player) = &mut self.player {
            let flags = step_character(
                world,
                player.handle,
                &mut player.state,
                &self.input,
                &player.config,
                &player.tuning,
                delta_seconds,
            );
            player_flags = Some((player.id, flags));
        }

        world.step(delta_seconds);

        for id in self.index.ids() {
            let Some(slot) = self.index.get_slot(id) else { continue };
            let Some(handle) = world.handle_of(id) else { continue };
            let Some((position, rotation)) = world.body_transform(handle) else { continue };
            buffer.write_transform(slot, position, rotation);
            let flags = match player_flags {
                Some((pid, flags)) if pid == id => flags,
                _ => 0,
            };
            buffer.write_flags(slot, flags);
        }

        buffer.publish_frame(now_ms, self.interval_ms);

        self.diagnostics.step_count += 1;
        self.diagnostics.last_delta_seconds = delta_seconds;
        self.diagnostics.last_step_duration = started.elapsed();
        self.diagnostics.registered_body_count = self.index.active_count();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::types::ColliderShape;
    use std::num::NonZeroU32;

    fn id(n: u32) -> EntityId {
        NonZeroU32::new(n).unwrap()
    }

    fn new_stepper(capacity: u32) -> (PhysicsStepper, Arc<SharedTransformBuffer>) {
        let mut stepper = PhysicsStepper::new();
        let buffer = Arc::new(SharedTransformBuffer::with_capacity(capacity));
        stepper.init(Vec3::new(0.0, -20.0, 0.0), buffer.clone(), DEFAULT_INTERVAL_MS).unwrap();
        (stepper, buffer)
    }

    #[test]
    fn step_before_start_is_a_no_op() {
        let (mut stepper, buffer) = new_stepper(8);
        stepper.step(16.0).unwrap();
        assert_eq!(buffer.observe_frame(), 0);
    }

    #[test]
    fn delta_is_clamped_to_100ms() {
        let (mut stepper, _buffer) = new_stepper(8);
        stepper.start(0.0).unwrap();
        stepper.step(10_000.0).unwrap();
        assert_eq!(stepper.diagnostics().last_delta_seconds, MAX_DELTA_SECONDS);
    }

    #[test]
    fn spawned_entity_publishes_initial_transform_to_both_snapshots() {
        let (mut stepper, buffer) = new_stepper(8);
        let config = PhysicsBodyConfig::dynamic_body(ColliderShape::Ball { radius: 0.5 });
        let slot = stepper
            .spawn_entity(id(1), Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, &config)
            .unwrap();
        let (prev, cur) = buffer.read_transform(slot);
        assert_eq!(prev, cur);
        assert_eq!(cur.position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn player_grounded_flag_propagates_to_shared_flags() {
        let (mut stepper, buffer) = new_stepper(8);
        let slot = stepper
            .spawn_player(id(1), Vec3::new(0.0, 0.0, 0.0), Quat::IDENTITY, CharacterControllerConfig::default())
            .unwrap();
        stepper.start(0.0).unwrap();
        for i in 1..=5 {
            stepper.step(i as f64 * DEFAULT_INTERVAL_MS).unwrap();
        }
        // Player starts resting at y=0 with no ground collider beneath it —
        // it should still be airborne (not grounded) with nothing to stand on.
        let flags = buffer.read_flags(slot);
        assert_eq!(flags & crate::shared::GROUNDED_BIT, 0);
    }

    #[test]
    fn remove_entity_compacts_and_unregisters() {
        let (mut stepper, buffer) = new_stepper(8);
        let config = PhysicsBodyConfig::dynamic_body(ColliderShape::Ball { radius: 0.5 });
        stepper.spawn_entity(id(1), Vec3::ZERO, Quat::IDENTITY, &config).unwrap();
        stepper.spawn_entity(id(2), Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY, &config).unwrap();
        assert_eq!(buffer.registered_count(), 2);

        stepper.remove_entity(id(1)).unwrap();
        assert_eq!(buffer.registered_count(), 1);

        // entity 2 was swapped into slot 0
        stepper.start(0.0).unwrap();
        stepper.step(DEFAULT_INTERVAL_MS).unwrap();
        let (_, cur) = buffer.read_transform(0);
        assert!((cur.position.x - 5.0).abs() < 1.0);
    }

    #[test]
    fn pause_halts_stepping_and_resume_continues() {
        let (mut stepper, buffer) = new_stepper(8);
        let config = PhysicsBodyConfig::dynamic_body(ColliderShape::Ball { radius: 0.5 });
        stepper.spawn_entity(id(1), Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY, &config).unwrap();
        stepper.start(0.0).unwrap();
        stepper.step(16.0).unwrap();
        let after_one = buffer.observe_frame();

        stepper.pause().unwrap();
        stepper.step(1000.0).unwrap();
        assert_eq!(buffer.observe_frame(), after_one, "paused stepper must not publish");

        stepper.resume(1000.0).unwrap();
        stepper.step(1016.0).unwrap();
        assert_eq!(buffer.observe_frame(), after_one + 1);
    }

    #[test]
    fn dispose_then_reinit_resets_state() {
        let (mut stepper, _buffer) = new_stepper(8);
        stepper.dispose();
        assert_eq!(stepper.state(), StepperState::Disposed);
        assert!(matches!(stepper.start(0.0), Err(Error::NotInitialized)));

        let buffer2 = Arc::new(SharedTransformBuffer::with_capacity(4));
        stepper.init(Vec3::ZERO, buffer2, DEFAULT_INTERVAL_MS).unwrap();
        assert_eq!(stepper.state(), StepperState::Initialized);
    }
}
