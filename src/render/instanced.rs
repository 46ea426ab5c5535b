//! Instanced-Mesh Manager (spec.md §4.7): a single-draw-call batch of up to
//! `N` uniform-geometry instances, each with its own transform and scale.
//!
//! spec.md §9 REDESIGN FLAGS calls out the teacher's box/sphere subclass
//! pattern ("class inheritance... base + subclasses") for replacement with
//! a polymorphic interface plus a shared composed helper: [`InstancedBatch`]
//! is that interface, [`BatchStorage`] is the shared helper the two
//! concrete batches ([`BoxBatch`], [`SphereBatch`]) each hold one of rather
//! than inherit from.

use glam::Mat4;
use std::collections::HashMap;

use crate::math::{Quat, Vec3};
use crate::render::backend::{BatchKind, SceneBackend};
use crate::EntityId;

/// Dense, swap-remove-compacted per-instance storage shared by every
/// [`InstancedBatch`] implementor. Generic over the one piece of data each
/// instance carries beyond its transform — here always `f32` (uniform
/// scale), per spec.md §4.7.
struct BatchStorage<T> {
    capacity: u32,
    entity_ids: Vec<EntityId>,
    data: Vec<T>,
    /// Last matrix written to each slot's backend instance, kept in
    /// lockstep with `entity_ids`/`data` through the same swap-remove calls
    /// so `remove` can re-write a moved instance's real matrix into the
    /// slot it vacates rather than leaving that slot stale.
    matrices: Vec<Mat4>,
    slot_of: HashMap<EntityId, u32>,
}

impl<T: Copy> BatchStorage<T> {
    fn with_capacity(capacity: u32) -> Self {
        Self {
            capacity,
            entity_ids: Vec::new(),
            data: Vec::new(),
            matrices: Vec::new(),
            slot_of: HashMap::new(),
        }
    }

    fn len(&self) -> u32 {
        self.entity_ids.len() as u32
    }

    fn slot_of(&self, id: EntityId) -> Option<u32> {
        self.slot_of.get(&id).copied()
    }

    /// Returns the new slot, or `None` if the batch is already at capacity
    /// (spec.md §4.7 `add`: "if full, warn and no-op").
    fn add(&mut self, id: EntityId, value: T, matrix: Mat4) -> Option<u32> {
        if self.slot_of.contains_key(&id) {
            return self.slot_of(id);
        }
        if self.len() >= self.capacity {
            return None;
        }
        let slot = self.entity_ids.len() as u32;
        self.entity_ids.push(id);
        self.data.push(value);
        self.matrices.push(matrix);
        self.slot_of.insert(id, slot);
        Some(slot)
    }

    /// Swap-with-last removal, per spec.md §4.7. Returns `(removed_slot,
    /// last_slot_before_removal, moved_matrix)`: `moved_matrix` is the
    /// matrix that now sits at `removed_slot` after the swap (the instance
    /// previously at `last_slot_before_removal`), or `None` if the removed
    /// instance was already last and nothing moved.
    fn remove(&mut self, id: EntityId) -> Option<(u32, u32, Option<Mat4>)> {
        let slot = self.slot_of.remove(&id)?;
        let last = self.entity_ids.len() as u32 - 1;
        self.entity_ids.swap_remove(slot as usize);
        self.data.swap_remove(slot as usize);
        self.matrices.swap_remove(slot as usize);
        let moved_matrix = if slot != last {
            let moved_id = self.entity_ids[slot as usize];
            self.slot_of.insert(moved_id, slot);
            Some(self.matrices[slot as usize])
        } else {
            None
        };
        Some((slot, last, moved_matrix))
    }

    fn get(&self, id: EntityId) -> Option<T> {
        self.slot_of(id).map(|slot| self.data[slot as usize])
    }
}

/// Polymorphic interface every instanced batch implements (spec.md §4.7),
/// independent of the concrete geometry (box or sphere).
pub trait InstancedBatch: Send {
    fn capacity(&self) -> u32;
    fn len(&self) -> u32;
    fn kind(&self) -> BatchKind;

    /// Returns `false` (and logs a warning, spec.md §7 `CapacityExceeded`)
    /// if the batch is already full.
    fn add(&mut self, backend: &mut dyn SceneBackend, id: EntityId, scale: f32) -> bool;
    fn remove(&mut self, backend: &mut dyn SceneBackend, id: EntityId) -> bool;
    fn update_instance(&mut self, backend: &mut dyn SceneBackend, id: EntityId, position: Vec3, rotation: Quat);
    fn commit(&mut self, backend: &mut dyn SceneBackend);
    fn for_each(&self, f: &mut dyn FnMut(EntityId));
    fn clear(&mut self, backend: &mut dyn SceneBackend);
}

fn compose(position: Vec3, rotation: Quat, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, position)
}

macro_rules! instanced_batch_impl {
    ($name:ident, $kind:expr) => {
        pub struct $name {
            storage: BatchStorage<f32>,
        }

        impl $name {
            pub fn with_capacity(capacity: u32) -> Self {
                Self {
                    storage: BatchStorage::with_capacity(capacity),
                }
            }
        }

        impl InstancedBatch for $name {
            fn capacity(&self) -> u32 {
                self.storage.capacity
            }

            fn len(&self) -> u32 {
                self.storage.len()
            }

            fn kind(&self) -> BatchKind {
                $kind
            }

            fn add(&mut self, backend: &mut dyn SceneBackend, id: EntityId, scale: f32) -> bool {
                let matrix = compose(Vec3::ZERO, Quat::IDENTITY, scale);
                match self.storage.add(id, scale, matrix) {
                    Some(slot) => {
                        backend.write_instance($kind, slot, matrix);
                        true
                    }
                    None => {
                        log::warn!("{} at capacity ({}), rejecting add({id})", stringify!($name), self.storage.capacity);
                        false
                    }
                }
            }

            fn remove(&mut self, backend: &mut dyn SceneBackend, id: EntityId) -> bool {
                // Swap-with-last in the matrix buffer: whatever instance
                // moved into `freed_slot` gets its real matrix re-written
                // there immediately, and `last_slot` (now vacated) is zeroed.
                let Some((freed_slot, last_slot, moved_matrix)) = self.storage.remove(id) else {
                    return false;
                };
                if let Some(matrix) = moved_matrix {
                    backend.write_instance($kind, freed_slot, matrix);
                }
                backend.write_instance($kind, last_slot, Mat4::ZERO);
                true
            }

            fn update_instance(&mut self, backend: &mut dyn SceneBackend, id: EntityId, position: Vec3, rotation: Quat) {
                let Some(scale) = self.storage.get(id) else { return };
                if let Some(slot) = self.storage.slot_of(id) {
                    let matrix = compose(position, rotation, scale);
                    self.storage.matrices[slot as usize] = matrix;
                    backend.write_instance($kind, slot, matrix);
                }
            }

            fn commit(&mut self, backend: &mut dyn SceneBackend) {
                backend.flush_instances($kind);
            }

            fn for_each(&self, f: &mut dyn FnMut(EntityId)) {
                for &id in &self.storage.entity_ids {
                    f(id);
                }
            }

            fn clear(&mut self, backend: &mut dyn SceneBackend) {
                for slot in 0..self.storage.len() {
                    backend.write_instance($kind, slot, Mat4::ZERO);
                }
                self.storage = BatchStorage::with_capacity(self.storage.capacity);
            }
        }
    };
}

instanced_batch_impl!(BoxBatch, BatchKind::Box);
instanced_batch_impl!(SphereBatch, BatchKind::Sphere);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::NullSceneBackend;
    use std::num::NonZeroU32;

    fn id(n: u32) -> EntityId {
        NonZeroU32::new(n).unwrap()
    }

    /// Records the last matrix written to each slot, so tests can check
    /// what a removal actually left behind instead of only checking ids.
    #[derive(Default)]
    struct RecordingBackend {
        slots: HashMap<u32, Mat4>,
    }

    impl SceneBackend for RecordingBackend {
        fn spawn_node(&mut self, _type_tag: &str) -> crate::render::backend::NodeHandle {
            crate::render::backend::NodeHandle(0)
        }
        fn despawn_node(&mut self, _handle: crate::render::backend::NodeHandle) {}
        fn set_transform(&mut self, _handle: crate::render::backend::NodeHandle, _position: Vec3, _rotation: Quat, _scale: Vec3) {}
        fn set_visible(&mut self, _handle: crate::render::backend::NodeHandle, _visible: bool) {}
        fn play_animation(&mut self, _handle: crate::render::backend::NodeHandle, _clip: &str, _cross_fade_seconds: f32) {}
        fn set_camera(&mut self, _position: Vec3, _lookat: Vec3) {}
        fn write_instance(&mut self, _batch: BatchKind, index: u32, matrix: Mat4) {
            self.slots.insert(index, matrix);
        }
        fn flush_instances(&mut self, _batch: BatchKind) {}
    }

    #[test]
    fn add_until_capacity_then_rejects() {
        let mut backend = NullSceneBackend::default();
        let mut batch = BoxBatch::with_capacity(2);
        assert!(batch.add(&mut backend, id(1), 1.0));
        assert!(batch.add(&mut backend, id(2), 1.0));
        assert!(!batch.add(&mut backend, id(3), 1.0));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn remove_then_add_succeeds_after_capacity_hit() {
        let mut backend = NullSceneBackend::default();
        let mut batch = BoxBatch::with_capacity(1);
        assert!(batch.add(&mut backend, id(1), 1.0));
        assert!(!batch.add(&mut backend, id(2), 1.0));
        assert!(batch.remove(&mut backend, id(1)));
        assert!(batch.add(&mut backend, id(2), 1.0));
    }

    #[test]
    fn remove_middle_keeps_remaining_ids_dense() {
        let mut backend = NullSceneBackend::default();
        let mut batch = BoxBatch::with_capacity(4);
        for n in 1..=4u32 {
            batch.add(&mut backend, id(n), 1.0);
        }
        batch.remove(&mut backend, id(2));
        assert_eq!(batch.len(), 3);
        let mut seen = Vec::new();
        batch.for_each(&mut |eid| seen.push(eid));
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains(&id(2)));
    }

    #[test]
    fn readd_after_remove_does_not_leak_stale_transform() {
        let mut backend = NullSceneBackend::default();
        let mut batch = SphereBatch::with_capacity(2);
        batch.add(&mut backend, id(1), 1.0);
        batch.update_instance(&mut backend, id(1), Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY);
        batch.remove(&mut backend, id(1));
        batch.add(&mut backend, id(1), 2.0);
        // Freshly re-added instance starts at the origin with its new scale,
        // not the pre-removal position — no leaked transform.
        assert_eq!(batch.storage.get(id(1)), Some(2.0));
    }

    #[test]
    fn remove_middle_writes_moved_instances_real_matrix_into_freed_slot() {
        let mut backend = RecordingBackend::default();
        let mut batch = BoxBatch::with_capacity(3);
        batch.add(&mut backend, id(1), 1.0); // slot 0
        batch.add(&mut backend, id(2), 1.0); // slot 1
        batch.add(&mut backend, id(3), 1.0); // slot 2 — last, moves into slot 0 on removal

        let moved_position = Vec3::new(7.0, 0.0, -3.0);
        batch.update_instance(&mut backend, id(3), moved_position, Quat::IDENTITY);

        // Removing id(1) (slot 0) swaps id(3) (last, slot 2) into slot 0.
        batch.remove(&mut backend, id(1));

        assert_eq!(batch.storage.slot_of(id(3)), Some(0));
        let matrix_at_freed_slot = backend.slots.get(&0).copied().expect("freed slot should have been rewritten");
        assert_eq!(matrix_at_freed_slot, compose(moved_position, Quat::IDENTITY, 1.0));
        // The vacated last slot (2) is zeroed, not left with id(3)'s old matrix.
        assert_eq!(backend.slots.get(&2).copied(), Some(Mat4::ZERO));
    }
}
