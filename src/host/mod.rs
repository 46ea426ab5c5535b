//! The host: owns the shared transform buffer and both worker threads,
//! dispatches the Host → Physics and Host → Render RPCs (spec.md §6), and
//! mediates spawn/remove ordering so the two sides' entity indices stay in
//! lockstep (spec.md §4.2, §5 "the host mediates spawn ordering").
//!
//! Each worker is a real OS thread (`std::thread::spawn`), not a cooperative
//! task — spec.md §5's "single-threaded cooperative... self-scheduling
//! loop" maps directly onto one dedicated thread per worker running
//! `loop { step(); sleep_until(next) }`. A panicking worker thread doesn't
//! take the host process down with it (`std::thread::spawn` isolates
//! panics); [`Host::physics_alive`]/[`Host::render_alive`] let a caller
//! detect a dead worker via `JoinHandle::is_finished`, after which further
//! RPCs naturally fail with [`crate::Error::NotInitialized`] once
//! `dispose()` is called to reap it.

pub mod rpc;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::input::InputEvent;
use crate::math::{Quat, Vec3};
use crate::physics::{CharacterControllerConfig, MovementInput, PhysicsBodyConfig, PhysicsDiagnostics, PhysicsStepper};
use crate::render::{AudioSink, GroundRayHit, RenderWorker, SceneBackend, SpawnData, Viewport};
use crate::shared::SharedTransformBuffer;
use crate::time::Clock;
use crate::EntityId;

const DEFAULT_PHYSICS_INTERVAL_MS: f64 = 1000.0 / 60.0;
const DEFAULT_RENDER_INTERVAL_MS: f64 = 1000.0 / 60.0;

fn run_worker_loop(running: Arc<AtomicBool>, interval_ms: f64, clock: Clock, mut tick: impl FnMut(f64)) {
    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        tick(clock.now_ms());
        let elapsed = started.elapsed();
        let budget = Duration::from_secs_f64(interval_ms / 1000.0);
        if elapsed < budget {
            thread::sleep(budget - elapsed);
        }
    }
}

/// Owns the shared buffer, the physics/render state machines, and the two
/// worker threads. Constructed with concrete [`SceneBackend`]/[`AudioSink`]
/// implementations — the `Null*` ones for headless tests, or a real
/// graphics/audio integration layered on top of this crate.
pub struct Host {
    clock: Clock,
    buffer: Arc<SharedTransformBuffer>,
    physics: Arc<Mutex<PhysicsStepper>>,
    render: Arc<Mutex<RenderWorker>>,
    backend: Arc<Mutex<Box<dyn SceneBackend>>>,
    audio: Arc<Mutex<Box<dyn AudioSink>>>,
    physics_running: Arc<AtomicBool>,
    render_running: Arc<AtomicBool>,
    physics_thread: Option<JoinHandle<()>>,
    render_thread: Option<JoinHandle<()>>,
}

impl Host {
    pub fn new(capacity: u32, backend: Box<dyn SceneBackend>, audio: Box<dyn AudioSink>) -> Self {
        Self {
            clock: Clock::new(),
            buffer: Arc::new(SharedTransformBuffer::with_capacity(capacity)),
            physics: Arc::new(Mutex::new(PhysicsStepper::new())),
            render: Arc::new(Mutex::new(RenderWorker::new())),
            backend: Arc::new(Mutex::new(backend)),
            audio: Arc::new(Mutex::new(audio)),
            physics_running: Arc::new(AtomicBool::new(false)),
            render_running: Arc::new(AtomicBool::new(false)),
            physics_thread: None,
            render_thread: None,
        }
    }

    fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    // ---- Host → Physics -------------------------------------------------

    pub fn physics_init(&self, gravity: Vec3) -> Result<()> {
        self.physics.lock().unwrap().init(gravity, self.buffer.clone(), DEFAULT_PHYSICS_INTERVAL_MS)
    }

    pub fn physics_spawn_entity(&self, id: EntityId, position: Vec3, rotation: Quat, body_config: &PhysicsBodyConfig) -> Result<u32> {
        rpc::validate_entity_id(id.get() as i64)?;
        self.physics.lock().unwrap().spawn_entity(id, position, rotation, body_config)
    }

    pub fn physics_spawn_player(&self, id: EntityId, position: Vec3, rotation: Quat, controller_config: CharacterControllerConfig) -> Result<u32> {
        rpc::validate_entity_id(id.get() as i64)?;
        self.physics.lock().unwrap().spawn_player(id, position, rotation, controller_config)
    }

    pub fn physics_remove_entity(&self, id: EntityId) -> Result<()> {
        self.physics.lock().unwrap().remove_entity(id)
    }

    pub fn physics_set_player_input(&self, input: MovementInput) {
        self.physics.lock().unwrap().set_player_input(input);
    }

    pub fn physics_diagnostics(&self) -> PhysicsDiagnostics {
        self.physics.lock().unwrap().diagnostics()
    }

    pub fn physics_pause(&self) -> Result<()> {
        self.physics.lock().unwrap().pause()
    }

    pub fn physics_resume(&self) -> Result<()> {
        self.physics.lock().unwrap().resume(self.now_ms())
    }

    // ---- Host → Render ----------------------------------------------------

    pub fn render_init(&self, viewport: Viewport, debug: bool) -> Result<()> {
        self.render.lock().unwrap().init(viewport, debug, self.buffer.clone())
    }

    pub fn render_resize(&self, viewport: Viewport) {
        self.render.lock().unwrap().resize(viewport);
    }

    pub fn render_handle_input(&self, event: InputEvent) {
        self.render.lock().unwrap().handle_input(event);
    }

    pub fn render_spawn_entity(&self, id: EntityId, type_tag: &str, data: SpawnData) -> Result<()> {
        rpc::validate_entity_id(id.get() as i64)?;
        rpc::validate_type_tag(type_tag)?;
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.spawn_entity(id, type_tag, data, &mut **backend)
    }

    pub fn render_remove_entity(&self, id: EntityId) -> Result<()> {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.remove_entity(id, &mut **backend)
    }

    pub fn add_box(&self, id: EntityId, scale: f32) -> bool {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.add_box(&mut **backend, id, scale)
    }

    pub fn add_boxes(&self, ids: &[EntityId], scales: &[f32]) -> Vec<bool> {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.add_boxes(&mut **backend, ids, scales)
    }

    pub fn remove_boxes(&self, ids: &[EntityId]) -> u32 {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.remove_boxes(&mut **backend, ids)
    }

    pub fn clear_boxes(&self) {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.clear_boxes(&mut **backend);
    }

    pub fn get_box_count(&self) -> u32 {
        self.render.lock().unwrap().get_box_count()
    }

    pub fn add_sphere(&self, id: EntityId, scale: f32) -> bool {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.add_sphere(&mut **backend, id, scale)
    }

    pub fn add_spheres(&self, ids: &[EntityId], scales: &[f32]) -> Vec<bool> {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.add_spheres(&mut **backend, ids, scales)
    }

    pub fn remove_spheres(&self, ids: &[EntityId]) -> u32 {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.remove_spheres(&mut **backend, ids)
    }

    pub fn clear_spheres(&self) {
        let mut render = self.render.lock().unwrap();
        let mut backend = self.backend.lock().unwrap();
        render.clear_spheres(&mut **backend);
    }

    pub fn get_sphere_count(&self) -> u32 {
        self.render.lock().unwrap().get_sphere_count()
    }

    pub fn get_player_entity_id(&self) -> Option<EntityId> {
        self.render.lock().unwrap().get_player_entity_id()
    }

    pub fn raycast_ground(&self, nx: f32, ny: f32) -> Option<GroundRayHit> {
        self.render.lock().unwrap().raycast_ground(nx, ny)
    }

    pub fn camera_position(&self) -> Vec3 {
        self.render.lock().unwrap().camera_position()
    }

    pub fn camera_lookat(&self) -> Vec3 {
        self.render.lock().unwrap().camera_lookat()
    }

    /// The physics-side entity's current (non-interpolated) transform, read
    /// straight off the shared buffer via this side's own slot lookup. Not
    /// part of spec.md §6's RPC surface — a test/debug convenience, since
    /// every end-to-end scenario in spec.md §8 needs to observe where an
    /// entity actually is.
    pub fn entity_transform(&self, id: EntityId) -> Option<(Vec3, Quat)> {
        let slot = self.physics.lock().unwrap().get_slot(id)?;
        let (_, current) = self.buffer.read_transform(slot);
        Some((current.position, current.rotation))
    }

    /// The per-entity flag word (spec.md §3 Flags region; bit 0 = grounded).
    pub fn entity_flags(&self, id: EntityId) -> Option<u32> {
        let slot = self.physics.lock().unwrap().get_slot(id)?;
        Some(self.buffer.read_flags(slot))
    }

    // ---- Lifecycle --------------------------------------------------------

    /// Starts both worker threads (spec.md §6 physics `start()`; the render
    /// side has no separate start RPC — it runs for as long as its thread
    /// is alive). Idempotent.
    pub fn start(&mut self) -> Result<()> {
        self.physics.lock().unwrap().start(self.now_ms())?;

        if self.physics_thread.is_none() {
            self.physics_running.store(true, Ordering::Release);
            let physics = self.physics.clone();
            let running = self.physics_running.clone();
            let clock = self.clock.clone();
            self.physics_thread = Some(thread::spawn(move || {
                run_worker_loop(running, DEFAULT_PHYSICS_INTERVAL_MS, clock, |now_ms| {
                    if let Err(err) = physics.lock().unwrap().step(now_ms) {
                        log::error!("physics worker step failed: {err}");
                    }
                });
            }));
            log::info!("physics worker thread started");
        }

        if self.render_thread.is_none() {
            self.render_running.store(true, Ordering::Release);
            let render = self.render.clone();
            let backend = self.backend.clone();
            let audio = self.audio.clone();
            let running = self.render_running.clone();
            let clock = self.clock.clone();
            let mut last_ms = clock.now_ms();
            self.render_thread = Some(thread::spawn(move || {
                run_worker_loop(running, DEFAULT_RENDER_INTERVAL_MS, clock, move |now_ms| {
                    let delta_ms = now_ms - last_ms;
                    last_ms = now_ms;
                    let mut render = render.lock().unwrap();
                    let mut backend = backend.lock().unwrap();
                    let mut audio = audio.lock().unwrap();
                    if let Err(err) = render.render_frame(&mut **backend, &mut **audio, now_ms, delta_ms) {
                        log::error!("render worker frame failed: {err}");
                    }
                });
            }));
            log::info!("render worker thread started");
        }

        Ok(())
    }

    pub fn physics_alive(&self) -> bool {
        self.physics_thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn render_alive(&self) -> bool {
        self.render_thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops both worker threads and disposes both state machines (spec.md
    /// §5 "Cancellation": the running flag is observed before the next
    /// scheduling step, not preemptively). Joining a panicked thread returns
    /// `Err`; logged and otherwise ignored, since dispose must still leave
    /// the host in a clean, reusable state.
    pub fn dispose(&mut self) {
        self.physics_running.store(false, Ordering::Release);
        self.render_running.store(false, Ordering::Release);
        if let Some(handle) = self.physics_thread.take() {
            if handle.join().is_err() {
                log::error!("physics worker thread panicked");
            }
        }
        if let Some(handle) = self.render_thread.take() {
            if handle.join().is_err() {
                log::error!("render worker thread panicked");
            }
        }
        self.physics.lock().unwrap().dispose();
        self.render.lock().unwrap().dispose();
        log::info!("host disposed");
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.physics_running.store(false, Ordering::Release);
        self.render_running.store(false, Ordering::Release);
        if let Some(handle) = self.physics_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.render_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::ColliderShape;
    use crate::render::{NullAudioSink, NullSceneBackend};
    use std::num::NonZeroU32;

    fn id(n: u32) -> EntityId {
        NonZeroU32::new(n).unwrap()
    }

    fn new_host(capacity: u32) -> Host {
        let mut host = Host::new(capacity, Box::new(NullSceneBackend::default()), Box::new(NullAudioSink));
        host.physics_init(Vec3::new(0.0, -20.0, 0.0)).unwrap();
        host.render_init(Viewport::default(), false).unwrap();
        host
    }

    #[test]
    fn boot_and_idle_runs_both_workers_without_entities() {
        let mut host = new_host(8);
        host.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        assert!(host.physics_alive());
        assert!(host.render_alive());
        host.dispose();
        assert!(!host.physics_alive());
    }

    #[test]
    fn spawned_dynamic_box_eventually_falls() {
        let mut host = new_host(8);
        let config = PhysicsBodyConfig::dynamic_body(ColliderShape::Ball { radius: 0.5 });
        host.physics_spawn_entity(id(1), Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY, &config).unwrap();
        host.render_spawn_entity(id(1), "dynamic_box", SpawnData::None).unwrap();
        host.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(host.physics_diagnostics().step_count > 0);
        host.dispose();
    }

    #[test]
    fn rpc_rejects_zero_and_negative_entity_ids() {
        assert!(rpc::validate_entity_id(0).is_err());
        assert!(rpc::validate_entity_id(-5).is_err());
    }

    #[test]
    fn render_spawn_rejects_empty_type_tag() {
        let host = new_host(8);
        let err = host.render_spawn_entity(id(1), "", SpawnData::None).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidArgument(_)));
    }
}
