//! Centralized RPC-boundary validation (spec.md §6: "every entity-id
//! parameter is rejected if ≤ 0; type strings rejected if empty"). Shared by
//! both the physics and render command dispatchers on [`crate::host::Host`]
//! so the rule is enforced once, not duplicated per call site.

use std::num::NonZeroU32;

use crate::error::{Error, Result};
use crate::EntityId;

/// Validates a raw, wire-boundary entity id — e.g. one arriving as a plain
/// integer over an RPC codec — into the in-process [`EntityId`] type.
/// In-process Rust callers that already hold an `EntityId` never need this:
/// its non-zero invariant is enforced by the type itself.
pub fn validate_entity_id(raw: i64) -> Result<EntityId> {
    if raw <= 0 || raw > u32::MAX as i64 {
        return Err(Error::InvalidArgument(format!("entity id {raw} is not a valid positive id")));
    }
    NonZeroU32::new(raw as u32).ok_or_else(|| Error::InvalidArgument(format!("entity id {raw} is not a valid positive id")))
}

/// Rejects an empty `type_tag` (spec.md §6 `spawn_entity(id, type, ...)`).
pub fn validate_type_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::InvalidArgument("type tag must not be empty".to_string()));
    }
    Ok(())
}
