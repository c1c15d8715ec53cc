//! Per-session object arenas and the recycler that reuses them.
//!
//! An arena is a block of pre-allocated slots handed out front to back. Once
//! the block is exhausted the arena falls back to standalone allocations, which
//! are never recorded in the block and never returned to it.

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::logger::Telemetry;
use crate::object::ObjectRef;

/// A block of `T` slots with a cursor pointing at the next free slot.
///
/// Not synchronized: the owning manager serializes `take` calls.
#[derive(Debug)]
pub(crate) struct RecyclableArena<T> {
    /// Backing slots. May be longer than `capacity` after a shrinking reuse.
    slots: Vec<ObjectRef<T>>,

    /// Index of the next slot to hand out. Never exceeds `capacity`.
    cursor: usize,

    /// Number of slots exposed to the current owner.
    capacity: usize,

    telemetry: Option<Telemetry>,
}

impl<T: Default> RecyclableArena<T> {
    pub(crate) fn new(capacity: usize, telemetry: Option<Telemetry>) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, ObjectRef::default);

        Self {
            slots,
            cursor: 0,
            capacity,
            telemetry,
        }
    }

    /// Hand out the next slot, or a standalone object once the block is exhausted.
    ///
    /// The flag is true when a slot was handed out. Reporting it is left to the
    /// caller, so no logger runs while the arena is locked.
    pub(crate) fn take(&mut self) -> (ObjectRef<T>, bool) {
        if self.cursor < self.capacity {
            let obj = self.slots[self.cursor].clone();
            self.cursor += 1;
            return (obj, true);
        }

        trace!(
            name = ?self.telemetry.as_ref().map(Telemetry::name),
            capacity = self.capacity,
            "Arena exhausted, allocating standalone object"
        );
        (ObjectRef::default(), false)
    }

    /// Number of slots handed out since the last reset.
    pub(crate) fn taken(&self) -> usize {
        self.cursor
    }

    /// Prepare a previously used arena for a new owner.
    ///
    /// Slots whose handle is still held by someone else are replaced rather
    /// than cleared, so a new session never sees an object from an old one.
    fn reset(&mut self, capacity: usize, telemetry: Option<Telemetry>) {
        let reused = self.slots.len().min(capacity);
        for slot in &mut self.slots[..reused] {
            if !slot.reset_unique(T::default()) {
                *slot = ObjectRef::default();
            }
        }
        if self.slots.len() < capacity {
            self.slots.resize_with(capacity, ObjectRef::default);
        }

        self.cursor = 0;
        self.capacity = capacity;
        self.telemetry = telemetry;
    }
}

/// Free list of arenas returned by ended sessions.
#[derive(Debug)]
pub(crate) struct ArenaRecycler<T> {
    idle: Mutex<Vec<RecyclableArena<T>>>,
    max_idle: usize,
}

impl<T: Default> ArenaRecycler<T> {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Get a reset arena exposing `capacity` slots, reusing an idle one if possible.
    pub(crate) fn acquire(
        &self,
        capacity: usize,
        telemetry: Option<Telemetry>,
    ) -> RecyclableArena<T> {
        let reused = self.idle.lock().pop();
        match reused {
            Some(mut arena) => {
                arena.reset(capacity, telemetry);
                trace!(capacity, "Reusing recycled arena");
                arena
            }
            None => RecyclableArena::new(capacity, telemetry),
        }
    }

    /// Return an arena to the free list. Its slots are cleared on the next acquire.
    pub(crate) fn release(&self, mut arena: RecyclableArena<T>) {
        arena.telemetry = None;

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(arena);
        } else {
            debug!(max_idle = self.max_idle, "Arena recycler full, dropping arena");
        }
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
