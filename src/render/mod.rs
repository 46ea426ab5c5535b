//! The render worker: per-frame orchestrator tying [`TransformSync`],
//! [`ComponentRegistry`]-spawned [`RenderComponent`]s, the instanced batches
//! ([`BoxBatch`]/[`SphereBatch`]), and the [`FollowCamera`] to the injected
//! [`SceneBackend`]/[`AudioSink`]/[`DebugSink`] collaborators (spec.md §2,
//! §4.5–§4.8, §6).
//!
//! Mirrors [`crate::physics::PhysicsStepper`]'s shape: a lifecycle state
//! machine plus a single per-frame entry point, with no scheduling logic of
//! its own — the worker thread that owns one of these (see
//! [`crate::host`]) drives it from its own render loop.

pub mod backend;
pub mod components;
pub mod follow_camera;
pub mod instanced;
pub mod transform_sync;

pub use backend::{
    AudioSink, BatchKind, DebugControlKind, DebugDescriptor, DebugEvent, DebugSink, InputSource, NodeHandle, NullAudioSink, NullDebugSink, NullInputSource, NullSceneBackend, SceneBackend,
};
pub use components::{ComponentRegistry, RenderComponent, SpawnData};
pub use follow_camera::{FollowCamera, FollowCameraConfig};
pub use instanced::{BoxBatch, InstancedBatch, SphereBatch};
pub use transform_sync::{FrameSync, TransformSync};

use std::collections::HashMap;
use std::sync::Arc;

use crate::entity_index::EntityIndex;
use crate::error::{Error, Result};
use crate::input::{InputEvent, InputState};
use crate::math::Vec3;
use crate::shared::{SharedTransformBuffer, GROUNDED_BIT};
use crate::EntityId;

/// `Uninit → Initialized → Disposed` — simpler than the physics stepper's
/// machine, since the render worker has no pause/resume of its own (the
/// host just stops calling `render_frame`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderWorkerState {
    Uninit,
    Initialized,
    Disposed,
}

/// spec.md §6 `init`'s `viewport: {w,h,pixel_ratio}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
        }
    }
}

/// Result of [`RenderWorker::raycast_ground`] — spec.md §6 "`Option<{point,
/// origin, direction}>`".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundRayHit {
    pub origin: Vec3,
    pub direction: Vec3,
    pub point: Vec3,
}

const DEFAULT_VERTICAL_FOV_DEGREES: f32 = 60.0;

/// Owns everything downstream of the shared transform buffer on the render
/// side: its own [`EntityIndex`] mirror (kept in lockstep with the physics
/// side purely by the host issuing `spawn`/`remove` calls to both in the
/// same order, per spec.md §4.2), the spawned [`RenderComponent`]s, the two
/// instanced batches, and the follow camera.
pub struct RenderWorker {
    state: RenderWorkerState,
    buffer: Option<Arc<SharedTransformBuffer>>,
    index: EntityIndex,
    sync: TransformSync,
    registry: ComponentRegistry,
    components: HashMap<EntityId, Box<dyn RenderComponent>>,
    boxes: BoxBatch,
    spheres: SphereBatch,
    camera: FollowCamera,
    player_id: Option<EntityId>,
    input: InputState,
    viewport: Viewport,
    debug: bool,
    elapsed_ms: f64,
}

impl Default for RenderWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderWorker {
    pub fn new() -> Self {
        Self {
            state: RenderWorkerState::Uninit,
            buffer: None,
            index: EntityIndex::with_capacity(0),
            sync: TransformSync::new(),
            registry: ComponentRegistry::new(),
            components: HashMap::new(),
            boxes: BoxBatch::with_capacity(0),
            spheres: SphereBatch::with_capacity(0),
            camera: FollowCamera::new(FollowCameraConfig::default()),
            player_id: None,
            input: InputState::new(),
            viewport: Viewport::default(),
            debug: false,
            elapsed_ms: 0.0,
        }
    }

    pub fn state(&self) -> RenderWorkerState {
        self.state
    }

    /// Binds the shared buffer and sizes this side's entity index and
    /// instanced batches to its capacity (spec.md §6 `init`). Idempotent:
    /// re-init while already initialized disposes the previous state first.
    pub fn init(&mut self, viewport: Viewport, debug: bool, buffer: Arc<SharedTransformBuffer>) -> Result<()> {
        if self.state != RenderWorkerState::Uninit {
            log::info!("render worker re-initializing, disposing previous state");
            self.dispose();
        }
        let capacity = buffer.capacity();
        self.index = EntityIndex::with_capacity(capacity);
        self.boxes = BoxBatch::with_capacity(capacity);
        self.spheres = SphereBatch::with_capacity(capacity);
        self.camera = FollowCamera::new(FollowCameraConfig::default());
        self.viewport = viewport;
        self.debug = debug;
        self.buffer = Some(buffer);
        self.state = RenderWorkerState::Initialized;
        log::info!("render worker initialized (capacity={capacity}, viewport={viewport:?}, debug={debug})");
        Ok(())
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        self.input.apply(event);
    }

    fn check_live(&self) -> Result<()> {
        if self.state == RenderWorkerState::Uninit || self.state == RenderWorkerState::Disposed {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    /// Registers a render-side component for `id` (spec.md §6
    /// `spawn_entity`). Mirrors the slot the physics side allocated for the
    /// same `id` by construction — the host calls both sides in the same
    /// order — so this never needs to look at the physics index directly.
    pub fn spawn_entity(&mut self, id: EntityId, type_tag: &str, data: SpawnData, backend: &mut dyn SceneBackend) -> Result<()> {
        self.check_live()?;
        if type_tag.is_empty() {
            return Err(Error::InvalidArgument("render spawn_entity: type tag must not be empty".to_string()));
        }
        self.index.insert(id)?;
        let component = self.registry.spawn(type_tag, id, backend, data.clone());
        if matches!(data, SpawnData::Player { .. }) {
            self.player_id = Some(id);
        }
        self.components.insert(id, component);
        log::info!("render: spawned entity {id} (`{type_tag}`)");
        Ok(())
    }

    pub fn remove_entity(&mut self, id: EntityId, backend: &mut dyn SceneBackend) -> Result<()> {
        self.check_live()?;
        if self.index.get_slot(id).is_none() {
            return Err(Error::InvalidArgument(format!("entity {id} not registered")));
        }
        if let Some(mut component) = self.components.remove(&id) {
            component.dispose(backend);
        }
        self.index.remove(id);
        if self.player_id == Some(id) {
            self.player_id = None;
        }
        log::info!("render: removed entity {id}");
        Ok(())
    }

    /// Registers `id` in this side's entity index if it isn't there already,
    /// so `render_frame`'s per-frame loop (spec.md §4.5 step 4: "for every
    /// entity including each instance in the GPU-instanced batches") walks
    /// it and keeps its instance matrix interpolated. A no-op if `id` was
    /// already registered by `spawn_entity` (or an earlier `add_box`/
    /// `add_sphere` for the same id) — capacity failures here are logged and
    /// otherwise swallowed, since the batch's own capacity (checked by
    /// `BoxBatch`/`SphereBatch`) is the contract callers observe.
    fn register_instance_entity(&mut self, id: EntityId) {
        if self.index.get_slot(id).is_none() {
            if let Err(err) = self.index.insert(id) {
                log::warn!("instanced entity {id} could not be registered in the transform index: {err}");
            }
        }
    }

    /// Unregisters `id` from this side's entity index, mirroring the
    /// swap-compaction `remove_entity` performs, but only if no
    /// [`RenderComponent`] still claims the id — a `dynamic_box` spawned via
    /// `spawn_entity` and later added to the instanced batch must keep its
    /// slot until `remove_entity` itself lets it go.
    fn unregister_instance_entity(&mut self, id: EntityId) {
        if !self.components.contains_key(&id) {
            self.index.remove(id);
        }
    }

    pub fn add_box(&mut self, backend: &mut dyn SceneBackend, id: EntityId, scale: f32) -> bool {
        let added = self.boxes.add(backend, id, scale);
        if added {
            self.register_instance_entity(id);
        }
        added
    }

    pub fn add_boxes(&mut self, backend: &mut dyn SceneBackend, ids: &[EntityId], scales: &[f32]) -> Vec<bool> {
        ids.iter()
            .enumerate()
            .map(|(i, &id)| self.add_box(backend, id, scales.get(i).copied().unwrap_or(1.0)))
            .collect()
    }

    pub fn remove_boxes(&mut self, backend: &mut dyn SceneBackend, ids: &[EntityId]) -> u32 {
        ids.iter()
            .filter(|&&id| {
                let removed = self.boxes.remove(backend, id);
                if removed {
                    self.unregister_instance_entity(id);
                }
                removed
            })
            .count() as u32
    }

    pub fn clear_boxes(&mut self, backend: &mut dyn SceneBackend) {
        let mut ids = Vec::new();
        self.boxes.for_each(&mut |id| ids.push(id));
        self.boxes.clear(backend);
        for id in ids {
            self.unregister_instance_entity(id);
        }
    }

    pub fn get_box_count(&self) -> u32 {
        self.boxes.len()
    }

    pub fn add_sphere(&mut self, backend: &mut dyn SceneBackend, id: EntityId, scale: f32) -> bool {
        let added = self.spheres.add(backend, id, scale);
        if added {
            self.register_instance_entity(id);
        }
        added
    }

    pub fn add_spheres(&mut self, backend: &mut dyn SceneBackend, ids: &[EntityId], scales: &[f32]) -> Vec<bool> {
        ids.iter()
            .enumerate()
            .map(|(i, &id)| self.add_sphere(backend, id, scales.get(i).copied().unwrap_or(1.0)))
            .collect()
    }

    pub fn remove_spheres(&mut self, backend: &mut dyn SceneBackend, ids: &[EntityId]) -> u32 {
        ids.iter()
            .filter(|&&id| {
                let removed = self.spheres.remove(backend, id);
                if removed {
                    self.unregister_instance_entity(id);
                }
                removed
            })
            .count() as u32
    }

    pub fn clear_spheres(&mut self, backend: &mut dyn SceneBackend) {
        let mut ids = Vec::new();
        self.spheres.for_each(&mut |id| ids.push(id));
        self.spheres.clear(backend);
        for id in ids {
            self.unregister_instance_entity(id);
        }
    }

    pub fn get_sphere_count(&self) -> u32 {
        self.spheres.len()
    }

    pub fn get_player_entity_id(&self) -> Option<EntityId> {
        self.player_id
    }

    /// The follow camera's current damped eye position (spec.md §4.8). Not
    /// part of spec.md §6's RPC surface, but every end-to-end scenario in
    /// spec.md §8 that describes camera behavior needs to observe it.
    pub fn camera_position(&self) -> Vec3 {
        self.camera.position()
    }

    /// The follow camera's current damped look-at target (spec.md §4.8).
    pub fn camera_lookat(&self) -> Vec3 {
        self.camera.lookat()
    }

    /// One render frame (spec.md §4.5): compute the interpolation alpha,
    /// apply it to every registered entity's node and to both instanced
    /// batches, fan out the physics-frame hook exactly once per newly
    /// observed physics frame, and update the follow camera from the
    /// player's interpolated transform.
    pub fn render_frame(&mut self, backend: &mut dyn SceneBackend, audio: &mut dyn AudioSink, now_ms: f64, delta_ms: f64) -> Result<()> {
        self.check_live()?;
        let buffer = self.buffer.as_ref().ok_or(Error::NotInitialized)?.clone();
        self.elapsed_ms += delta_ms;
        let frame = self.sync.begin_frame(&buffer, now_ms);

        let mut player_transform = None;
        for id in self.index.ids() {
            let Some(slot) = self.index.get_slot(id) else { continue };
            let (position, rotation) = TransformSync::interpolate(&buffer, slot, frame.alpha);

            if let Some(component) = self.components.get_mut(&id) {
                component.on_transform_update(backend, position, rotation);
                component.on_render_frame(backend, delta_ms, self.elapsed_ms);
                if frame.new_frame {
                    let grounded = buffer.read_flags(slot) & GROUNDED_BIT != 0;
                    let movement = self.input.movement_input();
                    component.on_physics_frame(backend, audio, &movement, grounded);
                }
            }

            self.boxes.update_instance(backend, id, position, rotation);
            self.spheres.update_instance(backend, id, position, rotation);

            if self.player_id == Some(id) {
                player_transform = Some((position, rotation));
            }
        }

        self.boxes.commit(backend);
        self.spheres.commit(backend);

        if let Some((position, rotation)) = player_transform {
            self.camera.update(backend, position, rotation);
        }

        Ok(())
    }

    /// spec.md §6 `raycast_ground`: `nx`/`ny` are normalized screen
    /// coordinates in `(0, 1)` with `y` growing downward; converted here to
    /// NDC (`y` flipped) and cast against the `y = 0` ground plane from the
    /// follow camera's current eye, using a fixed vertical field of view —
    /// there is no real camera-intrinsics collaborator behind
    /// [`SceneBackend`], so this is the closest headless-testable
    /// approximation of "where does the cursor ray meet the ground."
    pub fn raycast_ground(&self, nx: f32, ny: f32) -> Option<GroundRayHit> {
        let ndc_x = nx * 2.0 - 1.0;
        let ndc_y = 1.0 - ny * 2.0;

        let origin = self.camera.position();
        let forward = (self.camera.lookat() - origin).normalize_or_zero();
        if forward == Vec3::ZERO {
            return None;
        }
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);

        let aspect = self.viewport.width as f32 / self.viewport.height.max(1) as f32;
        let half_height = (DEFAULT_VERTICAL_FOV_DEGREES.to_radians() / 2.0).tan();
        let half_width = half_height * aspect;
        let direction = (forward + right * (ndc_x * half_width) + up * (ndc_y * half_height)).normalize_or_zero();
        if direction == Vec3::ZERO || direction.y >= 0.0 {
            return None;
        }

        let t = -origin.y / direction.y;
        if t <= 0.0 {
            return None;
        }
        Some(GroundRayHit {
            origin,
            direction,
            point: origin + direction * t,
        })
    }

    pub fn dispose(&mut self) {
        self.buffer = None;
        self.index = EntityIndex::with_capacity(0);
        self.components.clear();
        self.boxes = BoxBatch::with_capacity(0);
        self.spheres = SphereBatch::with_capacity(0);
        self.player_id = None;
        self.state = RenderWorkerState::Disposed;
        log::info!("render worker disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};
    use std::num::NonZeroU32;

    fn id(n: u32) -> EntityId {
        NonZeroU32::new(n).unwrap()
    }

    fn new_worker(capacity: u32) -> (RenderWorker, Arc<SharedTransformBuffer>) {
        let mut worker = RenderWorker::new();
        let buffer = Arc::new(SharedTransformBuffer::with_capacity(capacity));
        worker.init(Viewport::default(), false, buffer.clone()).unwrap();
        (worker, buffer)
    }

    #[test]
    fn spawn_before_init_is_rejected() {
        let mut worker = RenderWorker::new();
        let mut backend = NullSceneBackend::default();
        let err = worker.spawn_entity(id(1), "static_mesh", SpawnData::None, &mut backend).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn spawn_player_tracks_player_entity_id() {
        let (mut worker, _buffer) = new_worker(8);
        let mut backend = NullSceneBackend::default();
        worker
            .spawn_entity(
                id(1),
                "player",
                SpawnData::Player {
                    controller_config: Default::default(),
                },
                &mut backend,
            )
            .unwrap();
        assert_eq!(worker.get_player_entity_id(), Some(id(1)));

        worker.remove_entity(id(1), &mut backend).unwrap();
        assert_eq!(worker.get_player_entity_id(), None);
    }

    #[test]
    fn render_frame_interpolates_registered_entities() {
        let (mut worker, buffer) = new_worker(8);
        let mut backend = NullSceneBackend::default();
        let mut audio = NullAudioSink;
        worker.spawn_entity(id(1), "static_mesh", SpawnData::None, &mut backend).unwrap();

        buffer.write_transform(0, Vec3::ZERO, Quat::IDENTITY);
        buffer.write_transform(0, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY);
        buffer.publish_frame(0.0, 16.0);

        worker.render_frame(&mut backend, &mut audio, 8.0, 8.0).unwrap();
    }

    #[test]
    fn box_capacity_is_enforced() {
        let (mut worker, _buffer) = new_worker(1);
        let mut backend = NullSceneBackend::default();
        assert!(worker.add_box(&mut backend, id(1), 1.0));
        assert!(!worker.add_box(&mut backend, id(2), 1.0));
        assert_eq!(worker.get_box_count(), 1);
    }

    /// A box added through `add_box` alone (no `spawn_entity` call) must
    /// still be registered in this worker's own entity index, so
    /// `render_frame`'s per-frame loop reaches it and drives
    /// `update_instance` from the shared buffer's transform (spec.md §4.5
    /// step 4).
    #[test]
    fn add_box_registers_entity_so_render_frame_interpolates_it() {
        let (mut worker, buffer) = new_worker(8);
        let mut backend = NullSceneBackend::default();
        let mut audio = NullAudioSink;

        assert!(worker.add_box(&mut backend, id(1), 1.0));
        assert_eq!(worker.index.get_slot(id(1)), Some(0));

        buffer.write_transform(0, Vec3::ZERO, Quat::IDENTITY);
        buffer.write_transform(0, Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY);
        buffer.publish_frame(0.0, 16.0);

        worker.render_frame(&mut backend, &mut audio, 16.0, 16.0).unwrap();

        worker.remove_boxes(&mut backend, &[id(1)]);
        assert!(worker.index.get_slot(id(1)).is_none(), "removing the box should free its index slot too");
    }

    fn worker_with_player(capacity: u32) -> (RenderWorker, Arc<SharedTransformBuffer>) {
        let (mut worker, buffer) = new_worker(capacity);
        let mut backend = NullSceneBackend::default();
        worker
            .spawn_entity(
                id(1),
                "player",
                SpawnData::Player {
                    controller_config: Default::default(),
                },
                &mut backend,
            )
            .unwrap();
        buffer.publish_initial(0, Vec3::ZERO, Quat::IDENTITY);
        buffer.publish_frame(0.0, 16.0);
        worker.render_frame(&mut backend, &mut NullAudioSink, 0.0, 0.0).unwrap();
        (worker, buffer)
    }

    #[test]
    fn raycast_ground_hits_plane_below_camera() {
        let (worker, _buffer) = worker_with_player(8);
        // camera snapped above+behind the player, looking roughly at it —
        // the screen-center ray should point down and hit y = 0 somewhere.
        let hit = worker.raycast_ground(0.5, 0.6);
        assert!(hit.is_some());
    }

    #[test]
    fn raycast_ground_misses_when_looking_above_horizon() {
        let (worker, _buffer) = worker_with_player(8);
        // Top of the screen looks further upward, away from the ground.
        assert!(worker.raycast_ground(0.5, 0.0).is_none());
    }

    #[test]
    fn dispose_clears_components_and_rejects_further_calls() {
        let (mut worker, _buffer) = new_worker(8);
        let mut backend = NullSceneBackend::default();
        worker.spawn_entity(id(1), "static_mesh", SpawnData::None, &mut backend).unwrap();
        worker.dispose();
        let err = worker.spawn_entity(id(2), "static_mesh", SpawnData::None, &mut backend).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }
}
