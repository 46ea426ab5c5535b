//! Physics worker internals: the rapier3d-backed world, the kinematic
//! character controller, and the fixed-step orchestrator ([`stepper`]) that
//! ties them to the shared transform buffer.

pub mod character_controller;
pub mod stepper;
pub mod types;
pub mod world;

pub use stepper::{PhysicsDiagnostics, PhysicsStepper, StepperState};
pub use types::{BodyKind, CharacterControllerConfig, ColliderShape, MovementInput, MovementTuning, PhysicsBodyConfig};
pub use world::PhysicsWorld;
