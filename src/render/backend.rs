//! Trait seams for the collaborators spec.md §1 places explicitly out of
//! scope: the 3D graphics library, spatial audio, raw input capture, and
//! debug UI widgetry. This crate's render-side logic (components, the
//! instanced-mesh manager, the follow camera) only ever talks to these
//! traits, never to a concrete graphics API — the `Null*` implementations
//! below are what headless tests and the integration suite drive against.

use crate::math::{Quat, Vec3};
use crate::physics::MovementInput;

/// An opaque handle to one node the scene graph backend is tracking.
/// Stands in for whatever a concrete graphics library's scene-node type
/// looks like (`Object3D`, `Entity`, ...) — this crate only ever moves the
/// handle around, never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Which GPU-instanced batch an instance write targets (spec.md §4.7 "box
/// or sphere").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Box,
    Sphere,
}

/// The 3D graphics library collaborator (spec.md §1: "mesh/material/
/// scene-graph machinery... substitutable"). Render components and the
/// instanced-mesh manager drive a scene exclusively through this trait.
pub trait SceneBackend: Send {
    fn spawn_node(&mut self, type_tag: &str) -> NodeHandle;
    fn despawn_node(&mut self, handle: NodeHandle);
    fn set_transform(&mut self, handle: NodeHandle, position: Vec3, rotation: Quat, scale: Vec3);
    fn set_visible(&mut self, handle: NodeHandle, visible: bool);

    /// Starts (or cross-fades to) an animation clip on a node that was
    /// spawned with a rigged mesh (spec.md §4.6 Player variant).
    fn play_animation(&mut self, handle: NodeHandle, clip: &str, cross_fade_seconds: f32);

    /// Positions the active camera (spec.md §4.8).
    fn set_camera(&mut self, position: Vec3, lookat: Vec3);

    /// Writes one instance's model matrix into an instanced batch's GPU
    /// buffer. Not expected to upload — see [`Self::flush_instances`].
    fn write_instance(&mut self, batch: BatchKind, index: u32, matrix: glam::Mat4);

    /// Marks an instanced batch's GPU buffer dirty for upload. Called once
    /// per frame after every dirty instance has been written (spec.md §4.7
    /// `commit`), never per-instance.
    fn flush_instances(&mut self, batch: BatchKind);
}

/// Headless stand-in for [`SceneBackend`] — every call is a no-op. Used by
/// the integration tests and by any host that runs the simulation core
/// without a graphics surface (e.g. a dedicated server-side replay, outside
/// this spec's scope but harmless to support structurally).
#[derive(Debug, Default)]
pub struct NullSceneBackend {
    next_handle: u64,
}

impl SceneBackend for NullSceneBackend {
    fn spawn_node(&mut self, _type_tag: &str) -> NodeHandle {
        let handle = NodeHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }
    fn despawn_node(&mut self, _handle: NodeHandle) {}
    fn set_transform(&mut self, _handle: NodeHandle, _position: Vec3, _rotation: Quat, _scale: Vec3) {}
    fn set_visible(&mut self, _handle: NodeHandle, _visible: bool) {}
    fn play_animation(&mut self, _handle: NodeHandle, _clip: &str, _cross_fade_seconds: f32) {}
    fn set_camera(&mut self, _position: Vec3, _lookat: Vec3) {}
    fn write_instance(&mut self, _batch: BatchKind, _index: u32, _matrix: glam::Mat4) {}
    fn flush_instances(&mut self, _batch: BatchKind) {}
}

/// The spatial-audio collaborator (spec.md §1 "spatial-audio emission").
/// Driven by [`crate::render::components::PlayerComponent`]'s footstep
/// events.
pub trait AudioSink: Send {
    fn play_one_shot(&mut self, clip: &str, position: Vec3);
}

#[derive(Debug, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play_one_shot(&mut self, _clip: &str, _position: Vec3) {}
}

/// A typed debug-UI control descriptor — spec.md §9 redesigns the
/// "duck-typed debug UI binding" into this plus tagged update events routed
/// by the host, rather than a runtime-reflective binding.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugDescriptor {
    pub id: String,
    pub label: String,
    pub kind: DebugControlKind,
    pub range: Option<(f32, f32)>,
    pub step: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugControlKind {
    Number,
    Bool,
    Color,
    Button,
}

/// An update arriving for a previously-pushed [`DebugDescriptor`], tagged by
/// `id` so the render worker can route it to the control that owns it.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    Number(f32),
    Bool(bool),
    Color([f32; 3]),
    Pressed,
}

/// The debug-UI-widgetry collaborator (spec.md §1 "debug UI widgetry").
pub trait DebugSink: Send {
    fn push(&mut self, descriptor: DebugDescriptor);
    fn poll_event(&mut self) -> Option<(String, DebugEvent)>;
}

#[derive(Debug, Default)]
pub struct NullDebugSink;

impl DebugSink for NullDebugSink {
    fn push(&mut self, _descriptor: DebugDescriptor) {}
    fn poll_event(&mut self) -> Option<(String, DebugEvent)> {
        None
    }
}

/// The input-capture collaborator (spec.md §1 "input capture"). The host
/// owns translating a captured event stream into both the serialized
/// [`crate::input::InputEvent`]s forwarded to `handle_input` and the
/// [`MovementInput`] snapshot forwarded to both workers — this trait is
/// only the render side's read access to cursor state for
/// [`crate::render::RenderWorker::raycast_ground`].
pub trait InputSource: Send {
    fn cursor_position(&self) -> crate::input::CursorPosition;
    fn latest_movement(&self) -> MovementInput;
}

#[derive(Debug, Default)]
pub struct NullInputSource;

impl InputSource for NullInputSource {
    fn cursor_position(&self) -> crate::input::CursorPosition {
        crate::input::CursorPosition::default()
    }
    fn latest_movement(&self) -> MovementInput {
        MovementInput::default()
    }
}
