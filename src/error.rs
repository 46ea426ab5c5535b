//! Error taxonomy shared by the host, physics, and render sides of the
//! pipeline.
//!
//! These variants are deliberately coarse — callers across the RPC boundary
//! care about *which of six things went wrong*, not a stack trace, since the
//! failure is reported back over a channel to a different thread.

use std::fmt;

/// Identifies a resource (texture, mesh, shader) that failed or timed out
/// loading, for logging and for [`Error::ResourceLoadFailure`] /
/// [`Error::ResourceLoadTimeout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKey(pub String);

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An RPC arrived before the addressed worker finished (or after it
    /// disposed) its initialization.
    #[error("worker not initialized")]
    NotInitialized,

    /// A validated RPC parameter failed validation (entity id ≤ 0, empty
    /// type tag, out-of-range config value).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity index registry or an instanced-mesh batch has no free
    /// slots at its configured capacity.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A resource failed to load. Logged as a warning; the caller falls back
    /// to a substitute rather than failing the spawn.
    #[error("failed to load resource `{key}`: {reason}")]
    ResourceLoadFailure { key: ResourceKey, reason: String },

    /// A resource load didn't finish within its caller-supplied (or default)
    /// timeout.
    #[error("timed out loading resource `{key}`")]
    ResourceLoadTimeout { key: ResourceKey },

    /// The rapier3d pipeline or character controller failed to construct —
    /// treated as fatal for the physics worker, since nothing else in this
    /// crate can recover from a missing solver.
    #[error("physics solver failed to initialize: {0}")]
    SolverInitFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
