//! Shared Transform Buffer — the lock-free channel between the physics and
//! render workers.
//!
//! Backed by plain `AtomicU32`/`AtomicU64` cells rather than a byte-addressed
//! memory region: this is a single process with two threads, not two
//! separate runtimes across a `SharedArrayBuffer`, so there's no
//! serialization boundary to cross — only the atomic-ordering discipline
//! below, which is the part that actually matters.
//!
//! ## Layout
//!
//! Four logical regions, matching the wire layout a cross-process version of
//! this buffer would use:
//!
//! 1. **Control** — frame counter, entity-map version, registered count.
//! 2. **Transform** — `capacity` slots, each holding a `previous` and a
//!    `current` [`Snapshot`] (position + quaternion, 7 floats).
//! 3. **Timing** — `current_time_ms`, `interval_ms`.
//! 4. **Flags** — one `u32` per slot, bit 0 = [`GROUNDED_BIT`].
//!
//! The entity → slot mapping itself is *not* kept here — see
//! [`crate::entity_index::EntityIndex`]. This buffer only knows about slots.
//!
//! ## Ordering contract
//!
//! The physics side stores `transforms → flags → timing → counter++`, with
//! the counter increment using `Release`. The render side loads
//! `counter` (`Acquire`) `→ timing → transforms → flags`. Every other access
//! here is `Relaxed` — the release/acquire pair on the frame counter is what
//! makes the preceding relaxed stores visible to a reader that observes the
//! new counter value, per the standard release-sequence idiom (the same
//! technique a triple-buffered renderer uses to publish a finished frame
//! without a lock).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::math::{Quat, Vec3};

/// Bit 0 of the per-slot flags word: the character controller's last
/// collide-and-slide detected a ground contact.
pub const GROUNDED_BIT: u32 = 1 << 0;

const FLOATS_PER_SNAPSHOT: usize = 7;
const SNAPSHOTS_PER_SLOT: usize = 2;

/// One of the two per-slot transform records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Snapshot {
    fn to_floats(self) -> [f32; FLOATS_PER_SNAPSHOT] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
            self.rotation.w,
        ]
    }

    fn from_floats(f: [f32; FLOATS_PER_SNAPSHOT]) -> Self {
        Self {
            position: Vec3::new(f[0], f[1], f[2]),
            rotation: Quat::from_xyzw(f[3], f[4], f[5], f[6]),
        }
    }
}

pub struct SharedTransformBuffer {
    capacity: u32,
    frame_counter: AtomicU32,
    entity_map_version: AtomicU32,
    registered_count: AtomicU32,
    transforms: Box<[AtomicU32]>,
    current_time_ms: AtomicU64,
    interval_ms: AtomicU64,
    flags: Box<[AtomicU32]>,
}

impl SharedTransformBuffer {
    /// Default capacity used when a host doesn't configure one explicitly.
    pub const DEFAULT_CAPACITY: u32 = 4096;

    pub fn with_capacity(capacity: u32) -> Self {
        let transform_words = capacity as usize * SNAPSHOTS_PER_SLOT * FLOATS_PER_SNAPSHOT;
        Self {
            capacity,
            frame_counter: AtomicU32::new(0),
            entity_map_version: AtomicU32::new(0),
            registered_count: AtomicU32::new(0),
            transforms: (0..transform_words)
                .map(|_| AtomicU32::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            current_time_ms: AtomicU64::new(0),
            interval_ms: AtomicU64::new(0),
            flags: (0..capacity)
                .map(|_| AtomicU32::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    // ── Control region ───────────────────────────────────────────────

    /// Bumps the registered-entity count and the entity-map version. The
    /// slot itself is assigned by the caller's
    /// [`EntityIndex`](crate::entity_index::EntityIndex) — this just keeps
    /// the control region's counters in step with it.
    pub fn register(&self) {
        self.registered_count.fetch_add(1, Ordering::Relaxed);
        self.entity_map_version.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror of [`register`](Self::register). Compaction of the transform
    /// slab itself is the caller's job — see [`move_slot`](Self::move_slot).
    pub fn unregister(&self) {
        self.registered_count.fetch_sub(1, Ordering::Relaxed);
        self.entity_map_version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn registered_count(&self) -> u32 {
        self.registered_count.load(Ordering::Relaxed)
    }

    pub fn entity_map_version(&self) -> u32 {
        self.entity_map_version.load(Ordering::Relaxed)
    }

    // ── Transform region ─────────────────────────────────────────────

    fn snapshot_offset(&self, slot: u32, which: usize) -> usize {
        debug_assert!(slot < self.capacity);
        slot as usize * SNAPSHOTS_PER_SLOT * FLOATS_PER_SNAPSHOT + which * FLOATS_PER_SNAPSHOT
    }

    fn load_snapshot(&self, offset: usize) -> Snapshot {
        let mut floats = [0f32; FLOATS_PER_SNAPSHOT];
        for (i, f) in floats.iter_mut().enumerate() {
            *f = f32::from_bits(self.transforms[offset + i].load(Ordering::Relaxed));
        }
        Snapshot::from_floats(floats)
    }

    fn store_snapshot(&self, offset: usize, snapshot: Snapshot) {
        for (i, f) in snapshot.to_floats().into_iter().enumerate() {
            self.transforms[offset + i].store(f.to_bits(), Ordering::Relaxed);
        }
    }

    /// Swaps `current` into `previous`, then writes the new `current`. The
    /// swap-then-overwrite order means a reader sampling mid-write sees a
    /// `previous` equal to the latest already-published state — a valid
    /// interpolation source even if it catches this write in progress.
    pub fn write_transform(&self, slot: u32, position: Vec3, rotation: Quat) {
        let prev_off = self.snapshot_offset(slot, 0);
        let cur_off = self.snapshot_offset(slot, 1);
        let current = self.load_snapshot(cur_off);
        self.store_snapshot(prev_off, current);
        self.store_snapshot(
            cur_off,
            Snapshot {
                position,
                rotation,
            },
        );
    }

    /// Writes `position`/`rotation` into *both* snapshots of `slot`,
    /// bypassing the usual swap. Used exactly once per entity, at spawn
    /// time: spec.md §3's lifecycle says a newly registered entity is
    /// "published" by the next physics step with "first transform written
    /// to both `previous` and `current`" — writing eagerly here means a
    /// freshly spawned entity already has a consistent (non-zero, non-torn)
    /// pair of snapshots before its first `write_transform` ever runs, so a
    /// renderer that reads in the gap between registration and the first
    /// step never interpolates from the origin.
    pub fn publish_initial(&self, slot: u32, position: Vec3, rotation: Quat) {
        let snapshot = Snapshot { position, rotation };
        self.store_snapshot(self.snapshot_offset(slot, 0), snapshot);
        self.store_snapshot(self.snapshot_offset(slot, 1), snapshot);
    }

    pub fn read_transform(&self, slot: u32) -> (Snapshot, Snapshot) {
        let prev = self.load_snapshot(self.snapshot_offset(slot, 0));
        let cur = self.load_snapshot(self.snapshot_offset(slot, 1));
        (prev, cur)
    }

    /// Copies both snapshots and the flag word from `src` to `dst`, then
    /// zeroes `src`. Used when the entity index compacts a removed slot by
    /// swapping the last slot into the hole.
    pub fn move_slot(&self, src: u32, dst: u32) {
        if src == dst {
            return;
        }
        for which in 0..SNAPSHOTS_PER_SLOT {
            let src_off = self.snapshot_offset(src, which);
            let dst_off = self.snapshot_offset(dst, which);
            let snapshot = self.load_snapshot(src_off);
            self.store_snapshot(dst_off, snapshot);
            self.store_snapshot(src_off, Snapshot::from_floats([0.0; FLOATS_PER_SNAPSHOT]));
        }
        let flags = self.flags[src as usize].swap(0, Ordering::Relaxed);
        self.flags[dst as usize].store(flags, Ordering::Relaxed);
    }

    // ── Flags region ─────────────────────────────────────────────────

    pub fn write_flags(&self, slot: u32, flags: u32) {
        self.flags[slot as usize].store(flags, Ordering::Relaxed);
    }

    pub fn read_flags(&self, slot: u32) -> u32 {
        self.flags[slot as usize].load(Ordering::Relaxed)
    }

    // ── Timing + frame counter ───────────────────────────────────────

    /// Writes timing, then atomically increments the frame counter with
    /// release semantics. Must be called after every slot's transform and
    /// flags for this frame have already been written.
    pub fn publish_frame(&self, now_ms: f64, interval_ms: f64) {
        self.current_time_ms.store(now_ms.to_bits(), Ordering::Relaxed);
        self.interval_ms.store(interval_ms.to_bits(), Ordering::Relaxed);
        self.frame_counter.fetch_add(1, Ordering::Release);
    }

    /// Acquire-load of the frame counter. Must be the first thing a reader
    /// does each frame, before reading timing or transforms.
    pub fn observe_frame(&self) -> u32 {
        self.frame_counter.load(Ordering::Acquire)
    }

    /// `(current_time_ms, interval_ms)`.
    pub fn read_timing(&self) -> (f64, f64) {
        (
            f64::from_bits(self.current_time_ms.load(Ordering::Relaxed)),
            f64::from_bits(self.interval_ms.load(Ordering::Relaxed)),
        )
    }
}
