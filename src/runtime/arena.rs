//! Per-query value arena and the scoped bind token guarding it.
//!
//! Every arena-resident value is reached through a [`ValueRef`] handle, and a
//! handle can only be dereferenced through an [`ArenaGuard`]. Holding the guard
//! is the bind: one thread at a time, released when the guard drops. The guard
//! is not `Send`, so a bind never migrates between threads.

use crate::runtime::{
    error::{ParamError, ParamResult},
    internal::InternalValueCache,
    types::TypeEnv,
    value::Value,
};
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{trace, warn};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a value slot. Carries no ownership of its own; it is only
/// meaningful while the arena that produced it is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueRef {
    arena: u64,
    generation: u32,
    slot: u32,
    version: u32,
}

struct Entry {
    value: Value,
    bytes: usize,
    refs: u32,
}

/// A slot's version changes every time it is reused, so handles to an
/// earlier occupant stay invalid.
struct Slot {
    version: u32,
    entry: Option<Entry>,
}

struct ArenaState {
    generation: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    used_bytes: usize,
    limit: Option<usize>,
    types: TypeEnv,
    internals: InternalValueCache,
}

type Deferred = Arc<Mutex<Vec<ValueRef>>>;

pub struct Arena {
    id: u64,
    state: Arc<Mutex<ArenaState>>,
    owner: Arc<Mutex<Option<ThreadId>>>,
    deferred: Deferred,
}

impl Arena {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            state: Arc::new(Mutex::new(ArenaState {
                generation: 0,
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
                used_bytes: 0,
                limit,
                types: TypeEnv::new(),
                internals: InternalValueCache::default(),
            })),
            owner: Arc::new(Mutex::new(None)),
            deferred: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Binds the arena to the calling thread, waiting for any other thread
    /// that currently holds it. Binding twice on the same thread is misuse:
    /// nested operations must reuse the guard they already hold.
    pub fn bind(&self) -> ParamResult<ArenaGuard> {
        let current = thread::current().id();
        if *self.owner.lock() == Some(current) {
            return Err(ParamError::misuse(format!(
                "arena {} is already bound on this thread",
                self.id
            )));
        }
        let state = self.state.lock_arc();
        *self.owner.lock() = Some(current);
        trace!(arena = self.id, "arena bound");
        let mut guard = ArenaGuard {
            arena: self.id,
            owner: self.owner.clone(),
            deferred: self.deferred.clone(),
            state,
        };
        guard.release_deferred();
        Ok(guard)
    }

    pub fn is_bound(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Queues one reference of each handle for release by whoever holds or
    /// next takes the bind. Used where binding is impossible, such as a drop
    /// running while the current thread still holds the guard.
    pub fn defer_release(&self, handles: impl IntoIterator<Item = ValueRef>) {
        self.deferred.lock().extend(handles);
    }
}

/// Scope token for an arena bind.
pub struct ArenaGuard {
    arena: u64,
    owner: Arc<Mutex<Option<ThreadId>>>,
    deferred: Deferred,
    state: ArcMutexGuard<RawMutex, ArenaState>,
}

impl ArenaGuard {
    pub fn arena_id(&self) -> u64 {
        self.arena
    }

    pub fn alloc(&mut self, value: Value) -> ParamResult<ValueRef> {
        let bytes = value.footprint();
        let state = &mut *self.state;
        if let Some(limit) = state.limit {
            if state.used_bytes + bytes > limit {
                return Err(ParamError::ArenaExhausted {
                    requested: bytes,
                    limit,
                });
            }
        }
        let entry = Entry {
            value,
            bytes,
            refs: 1,
        };
        let slot = match state.free.pop() {
            Some(slot) => {
                let reused = &mut state.slots[slot as usize];
                reused.version = reused.version.wrapping_add(1);
                reused.entry = Some(entry);
                slot
            }
            None => {
                let slot = u32::try_from(state.slots.len())
                    .map_err(|_| ParamError::misuse("arena slot table overflow"))?;
                state.slots.push(Slot {
                    version: 0,
                    entry: Some(entry),
                });
                slot
            }
        };
        state.live += 1;
        state.used_bytes += bytes;
        Ok(ValueRef {
            arena: self.arena,
            generation: state.generation,
            slot,
            version: state.slots[slot as usize].version,
        })
    }

    pub fn value(&self, handle: ValueRef) -> ParamResult<&Value> {
        let index = self.locate(handle)?;
        self.state.slots[index]
            .entry
            .as_ref()
            .map(|entry| &entry.value)
            .ok_or_else(|| released(handle))
    }

    /// Verifies that `handle` is live in this arena.
    pub fn check(&self, handle: ValueRef) -> ParamResult<()> {
        self.value(handle).map(|_| ())
    }

    /// Adds a reference to a live slot.
    pub fn retain(&mut self, handle: ValueRef) -> ParamResult<()> {
        let index = self.locate(handle)?;
        let entry = self.state.slots[index]
            .entry
            .as_mut()
            .ok_or_else(|| released(handle))?;
        entry.refs += 1;
        Ok(())
    }

    /// Drops one reference; the value is destroyed with the last one.
    /// Returns whether the slot was freed.
    pub fn release(&mut self, handle: ValueRef) -> ParamResult<bool> {
        let index = self.locate(handle)?;
        let state = &mut *self.state;
        let slot = &mut state.slots[index];
        let entry = slot.entry.as_mut().ok_or_else(|| released(handle))?;
        entry.refs -= 1;
        if entry.refs > 0 {
            return Ok(false);
        }
        let bytes = entry.bytes;
        slot.entry = None;
        state.free.push(handle.slot);
        state.live -= 1;
        state.used_bytes -= bytes;
        Ok(true)
    }

    /// Starts a new generation when nothing is live any more, invalidating
    /// every handle issued before. Returns false if values are still live.
    pub fn recycle(&mut self) -> bool {
        if self.state.live > 0 {
            return false;
        }
        self.state.slots.clear();
        self.state.free.clear();
        self.state.used_bytes = 0;
        self.state.generation = self.state.generation.wrapping_add(1);
        true
    }

    pub fn types(&mut self) -> &mut TypeEnv {
        &mut self.state.types
    }

    pub fn internals(&mut self) -> &mut InternalValueCache {
        &mut self.state.internals
    }

    pub fn live_values(&self) -> usize {
        self.state.live
    }

    pub fn used_bytes(&self) -> usize {
        self.state.used_bytes
    }

    fn release_deferred(&mut self) {
        let handles = std::mem::take(&mut *self.deferred.lock());
        for handle in handles {
            if let Err(err) = self.release(handle) {
                warn!(arena = self.arena, %err, "dropping deferred release");
            }
        }
    }

    fn locate(&self, handle: ValueRef) -> ParamResult<usize> {
        if handle.arena != self.arena {
            return Err(ParamError::misuse(format!(
                "value from arena {} used while arena {} is bound",
                handle.arena, self.arena
            )));
        }
        if handle.generation != self.state.generation {
            return Err(ParamError::misuse(format!(
                "stale value handle from generation {} (arena is at {})",
                handle.generation, self.state.generation
            )));
        }
        let index = handle.slot as usize;
        match self.state.slots.get(index) {
            Some(slot) if slot.version == handle.version => Ok(index),
            _ => Err(released(handle)),
        }
    }
}

impl Drop for ArenaGuard {
    fn drop(&mut self) {
        self.release_deferred();
        *self.owner.lock() = None;
        trace!(arena = self.arena, "arena released");
    }
}

fn released(handle: ValueRef) -> ParamError {
    ParamError::misuse(format!("value slot {} was already released", handle.slot))
}
