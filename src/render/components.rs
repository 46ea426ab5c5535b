//! Render Components and Factory (spec.md §4.6).
//!
//! spec.md §9 redesigns the teacher's ambient-singleton factory map into an
//! explicit [`ComponentRegistry`] value the render worker owns and passes
//! through, and the untyped spawn-data bag into [`SpawnData`], a typed
//! payload enum the factory dispatches on by variant rather than by
//! reflecting over an any-map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::math::{Quat, Vec3};
use crate::physics::{CharacterControllerConfig, MovementInput};
use crate::render::backend::{AudioSink, NodeHandle, SceneBackend};
use crate::EntityId;

/// Typed per-entity spawn payload, forwarded over the Host → Render
/// `spawn_entity` RPC (spec.md §6). Replaces the original "sidecar
/// untyped data bag" (spec.md §9 REDESIGN FLAGS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnData {
    None,
    Player { controller_config: CharacterControllerConfig },
    StaticMesh { color: [f32; 3] },
}

/// The animation states spec.md §4.6 names for the Player variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Walking,
    Running,
    Jumping,
}

impl AnimationState {
    fn clip_name(self) -> &'static str {
        match self {
            AnimationState::Idle => "idle",
            AnimationState::Walking => "walking",
            AnimationState::Running => "running",
            AnimationState::Jumping => "jumping",
        }
    }
}

const CROSS_FADE_SECONDS: f32 = 0.2;
const WALK_FOOTSTEP_INTERVAL_MS: f64 = 430.0;
const RUN_FOOTSTEP_INTERVAL_MS: f64 = 260.0;
const FOOTSTEP_CLIP: &str = "footstep";

/// The polymorphic capability set spec.md §4.6 describes: an `id`,
/// `type_tag`, a scene-graph root (via [`NodeHandle`], owned by the
/// component but only ever mutated through the injected [`SceneBackend`]),
/// and the optional per-frame hooks.
pub trait RenderComponent: Send {
    fn id(&self) -> EntityId;
    fn type_tag(&self) -> &'static str;
    fn node(&self) -> NodeHandle;

    /// Called every render frame after the interpolated transform has been
    /// applied to `node()`.
    fn on_transform_update(&mut self, _backend: &mut dyn SceneBackend, _position: Vec3, _rotation: Quat) {}

    /// Called exactly once per new physics frame observed (spec.md §4.5
    /// step 7), with the current input snapshot and this entity's grounded
    /// flag (meaningful only for [`PlayerComponent`]).
    fn on_physics_frame(&mut self, _backend: &mut dyn SceneBackend, _audio: &mut dyn AudioSink, _input: &MovementInput, _grounded: bool) {}

    /// Called every render frame regardless of physics-frame cadence.
    fn on_render_frame(&mut self, _backend: &mut dyn SceneBackend, _delta_ms: f64, _elapsed_ms: f64) {}

    fn dispose(&mut self, backend: &mut dyn SceneBackend) {
        backend.despawn_node(self.node());
    }
}

/// spec.md §4.6: "owns a rigged animated character... selects among
/// animation states {idle, walking, running, jumping} with cross-fade
/// between adjacent states. Emits footstep events at intervals that depend
/// on running vs walking."
pub struct PlayerComponent {
    id: EntityId,
    node: NodeHandle,
    state: AnimationState,
    since_last_footstep_ms: f64,
}

impl PlayerComponent {
    pub fn new(id: EntityId, node: NodeHandle) -> Self {
        Self {
            id,
            node,
            state: AnimationState::Idle,
            since_last_footstep_ms: 0.0,
        }
    }

    pub fn animation_state(&self) -> AnimationState {
        self.state
    }

    fn next_state(input: &MovementInput, grounded: bool) -> AnimationState {
        if !grounded {
            AnimationState::Jumping
        } else if input.forward || input.backward || input.left || input.right {
            if input.sprint {
                AnimationState::Running
            } else {
                AnimationState::Walking
            }
        } else {
            AnimationState::Idle
        }
    }
}

impl RenderComponent for PlayerComponent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn type_tag(&self) -> &'static str {
        "player"
    }

    fn node(&self) -> NodeHandle {
        self.node
    }

    fn on_physics_frame(&mut self, backend: &mut dyn SceneBackend, audio: &mut dyn AudioSink, input: &MovementInput, grounded: bool) {
        let next = Self::next_state(input, grounded);
        if next != self.state {
            backend.play_animation(self.node, next.clip_name(), CROSS_FADE_SECONDS);
            self.state = next;
            self.since_last_footstep_ms = 0.0;
        }

        let footstep_interval = match self.state {
            AnimationState::Running => Some(RUN_FOOTSTEP_INTERVAL_MS),
            AnimationState::Walking => Some(WALK_FOOTSTEP_INTERVAL_MS),
            _ => None,
        };
        if let Some(interval) = footstep_interval {
            // Driven once per physics frame (≈16.667 ms), not per render
            // frame — matches spec.md §4.5 step 7's "invoke... exactly once"
            // per observed physics frame.
            self.since_last_footstep_ms += 1000.0 / 60.0;
            if self.since_last_footstep_ms >= interval {
                self.since_last_footstep_ms -= interval;
                audio.play_one_shot(FOOTSTEP_CLIP, Vec3::ZERO);
            }
        } else {
            self.since_last_footstep_ms = 0.0;
        }
    }
}

/// spec.md §4.6: "an invisible proxy; no mesh contribution."
pub struct GroundComponent {
    id: EntityId,
    node: NodeHandle,
}

impl GroundComponent {
    pub fn new(id: EntityId, node: NodeHandle, backend: &mut dyn SceneBackend) -> Self {
        backend.set_visible(node, false);
        Self { id, node }
    }
}

impl RenderComponent for GroundComponent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn type_tag(&self) -> &'static str {
        "ground"
    }
    fn node(&self) -> NodeHandle {
        self.node
    }
}

/// spec.md §4.6: "a shaped primitive for arbitrary world objects." Also the
/// red fallback for an unknown `type_tag`.
pub struct StaticMeshComponent {
    id: EntityId,
    node: NodeHandle,
}

impl StaticMeshComponent {
    pub fn new(id: EntityId, node: NodeHandle) -> Self {
        Self { id, node }
    }
}

impl RenderComponent for StaticMeshComponent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn type_tag(&self) -> &'static str {
        "static_mesh"
    }
    fn node(&self) -> NodeHandle {
        self.node
    }
}

/// spec.md §4.6: "individual physics-linked box (largely superseded by the
/// instanced batch)." Kept for single, individually-addressable boxes —
/// bulk boxes go through [`crate::render::instanced::BoxBatch`] instead.
pub struct DynamicBoxComponent {
    id: EntityId,
    node: NodeHandle,
}

impl DynamicBoxComponent {
    pub fn new(id: EntityId, node: NodeHandle) -> Self {
        Self { id, node }
    }
}

impl RenderComponent for DynamicBoxComponent {
    fn id(&self) -> EntityId {
        self.id
    }
    fn type_tag(&self) -> &'static str {
        "dynamic_box"
    }
    fn node(&self) -> NodeHandle {
        self.node
    }
}

type Factory = Box<dyn Fn(EntityId, &mut dyn SceneBackend, SpawnData) -> Box<dyn RenderComponent> + Send + Sync>;

/// Explicit `type_tag → factory` registry (spec.md §4.6), constructed by
/// the render worker's orchestrator and passed through rather than looked
/// up via a global/`static` (spec.md §9 REDESIGN FLAGS).
pub struct ComponentRegistry {
    factories: HashMap<&'static str, Factory>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// Registers the four built-in variants from spec.md §4.6.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("player", |id, backend, _data| {
            let node = backend.spawn_node("player");
            Box::new(PlayerComponent::new(id, node))
        });
        registry.register("ground", |id, backend, _data| {
            let node = backend.spawn_node("ground");
            Box::new(GroundComponent::new(id, node, backend))
        });
        registry.register("static_mesh", |id, backend, _data| {
            let node = backend.spawn_node("static_mesh");
            Box::new(StaticMeshComponent::new(id, node))
        });
        registry.register("dynamic_box", |id, backend, _data| {
            let node = backend.spawn_node("dynamic_box");
            Box::new(DynamicBoxComponent::new(id, node))
        });
        registry
    }

    pub fn register<F>(&mut self, type_tag: &'static str, factory: F)
    where
        F: Fn(EntityId, &mut dyn SceneBackend, SpawnData) -> Box<dyn RenderComponent> + Send + Sync + 'static,
    {
        self.factories.insert(type_tag, Box::new(factory));
    }

    /// Dispatches to the factory registered for `type_tag`. An unrecognized
    /// tag resolves to a red fallback `StaticMesh` and logs a warning, per
    /// spec.md §4.6.
    pub fn spawn(&self, type_tag: &str, id: EntityId, backend: &mut dyn SceneBackend, data: SpawnData) -> Box<dyn RenderComponent> {
        match self.factories.get(type_tag) {
            Some(factory) => factory(id, backend, data),
            None => {
                log::warn!("unknown render component type `{type_tag}`, falling back to a red static mesh");
                let node = backend.spawn_node("static_mesh");
                Box::new(StaticMeshComponent::new(id, node))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::{NullAudioSink, NullSceneBackend};
    use std::num::NonZeroU32;

    fn id(n: u32) -> EntityId {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn unknown_type_tag_falls_back_to_static_mesh() {
        let registry = ComponentRegistry::new();
        let mut backend = NullSceneBackend::default();
        let component = registry.spawn("glowing_orb", id(1), &mut backend, SpawnData::None);
        assert_eq!(component.type_tag(), "static_mesh");
    }

    #[test]
    fn idle_player_transitions_to_walking_then_running() {
        let mut backend = NullSceneBackend::default();
        let node = backend.spawn_node("player");
        let mut player = PlayerComponent::new(id(1), node);
        let mut audio = NullAudioSink;

        assert_eq!(player.animation_state(), AnimationState::Idle);

        let walking_input = MovementInput {
            forward: true,
            ..Default::default()
        };
        player.on_physics_frame(&mut backend, &mut audio, &walking_input, true);
        assert_eq!(player.animation_state(), AnimationState::Walking);

        let running_input = MovementInput {
            forward: true,
            sprint: true,
            ..Default::default()
        };
        player.on_physics_frame(&mut backend, &mut audio, &running_input, true);
        assert_eq!(player.animation_state(), AnimationState::Running);
    }

    #[test]
    fn airborne_player_is_jumping_regardless_of_input() {
        let mut backend = NullSceneBackend::default();
        let node = backend.spawn_node("player");
        let mut player = PlayerComponent::new(id(1), node);
        let mut audio = NullAudioSink;
        player.on_physics_frame(&mut backend, &mut audio, &MovementInput::default(), false);
        assert_eq!(player.animation_state(), AnimationState::Jumping);
    }

    #[test]
    fn running_emits_footsteps_more_often_than_walking() {
        struct CountingSink {
            count: u32,
        }
        impl AudioSink for CountingSink {
            fn play_one_shot(&mut self, _clip: &str, _position: Vec3) {
                self.count += 1;
            }
        }

        let mut backend = NullSceneBackend::default();
        let node = backend.spawn_node("player");
        let mut player = PlayerComponent::new(id(1), node);
        let mut sink = CountingSink { count: 0 };
        let running = MovementInput {
            forward: true,
            sprint: true,
            ..Default::default()
        };
        for _ in 0..120 {
            player.on_physics_frame(&mut backend, &mut sink, &running, true);
        }
        let running_steps = sink.count;
        assert!(running_steps > 0);

        let mut player2 = PlayerComponent::new(id(2), node);
        let mut sink2 = CountingSink { count: 0 };
        let walking = MovementInput {
            forward: true,
            ..Default::default()
        };
        for _ in 0..120 {
            player2.on_physics_frame(&mut backend, &mut sink2, &walking, true);
        }
        assert!(running_steps >= sink2.count);
    }
}
