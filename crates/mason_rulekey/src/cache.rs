//! Memoization of default rule keys for one build invocation.

use crate::error::RuleKeyError;
use crate::key::RuleKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mason_common::RuleId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tracing::debug;

enum SlotState {
    /// The leader is still computing.
    Pending,
    /// The computed key, visible to every waiter.
    Ready(RuleKey),
    /// The leader's failure, propagated to waiters of this slot only.
    Failed(RuleKeyError),
}

/// A single-assignment result slot shared between the computing caller and
/// any concurrent waiters for the same rule.
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }
}

/// Publishes an abandonment failure if the leader unwinds mid-computation,
/// so waiters are never stranded on a pending slot.
struct AbandonGuard<'a> {
    cache: &'a KeyCache,
    id: &'a RuleId,
    slot: &'a Arc<Slot>,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.cache
            .slots
            .remove_if(self.id, |_, entry| Arc::ptr_eq(entry, self.slot));
        let mut state = match self.slot.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        *state = SlotState::Failed(RuleKeyError::Abandoned {
            id: self.id.clone(),
        });
        drop(state);
        self.slot.ready.notify_all();
    }
}

/// Memoizes default-key computation per rule identity for the lifetime of
/// one build invocation.
///
/// Guarantees at-most-one underlying computation per rule under arbitrary
/// concurrent callers: the first caller for a rule computes, and everyone
/// else blocks on the in-flight slot and receives the identical key. A
/// failed computation is propagated to the waiters that were already
/// blocked on it but is never cached, so the next request retries.
///
/// A cache is only valid for one seed and configuration; the engine builds
/// a fresh one per invocation. Input-based and dependency-file keys are
/// intentionally never cached here.
pub struct KeyCache {
    slots: DashMap<RuleId, Arc<Slot>>,
    computations: AtomicU64,
}

impl KeyCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            computations: AtomicU64::new(0),
        }
    }

    /// Returns the memoized key for `id`, or runs `compute` to produce it.
    ///
    /// A successful key is published atomically: no caller can observe a
    /// partially-computed key. If `compute` fails, every caller currently
    /// waiting on this rule receives a clone of the error and the slot is
    /// discarded. A `compute` that unwinds is treated the same way, with
    /// [`RuleKeyError::Abandoned`] standing in for the error.
    pub fn get_or_compute<F>(&self, id: &RuleId, compute: F) -> Result<RuleKey, RuleKeyError>
    where
        F: FnOnce() -> Result<RuleKey, RuleKeyError>,
    {
        let (slot, leader) = match self.slots.entry(id.clone()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let slot = Arc::new(Slot::new());
                vacant.insert(Arc::clone(&slot));
                (slot, true)
            }
        };

        if leader {
            self.computations.fetch_add(1, Ordering::Relaxed);
            debug!(rule = %id, "rule key cache miss, computing");
            let mut guard = AbandonGuard {
                cache: self,
                id,
                slot: &slot,
                armed: true,
            };
            let result = compute();
            guard.armed = false;
            drop(guard);
            if result.is_err() {
                // Drop the entry first so new callers retry instead of
                // observing the failed slot.
                self.slots
                    .remove_if(id, |_, entry| Arc::ptr_eq(entry, &slot));
            }
            let mut state = slot.state.lock().expect("rule key slot poisoned");
            *state = match &result {
                Ok(key) => SlotState::Ready(*key),
                Err(err) => SlotState::Failed(err.clone()),
            };
            drop(state);
            slot.ready.notify_all();
            result
        } else {
            let mut state = slot.state.lock().expect("rule key slot poisoned");
            while matches!(*state, SlotState::Pending) {
                state = slot.ready.wait(state).expect("rule key slot poisoned");
            }
            match &*state {
                SlotState::Ready(key) => Ok(*key),
                SlotState::Failed(err) => Err(err.clone()),
                SlotState::Pending => unreachable!("woken while still pending"),
            }
        }
    }

    /// Returns the key for `id` if one has been published.
    pub fn get(&self, id: &RuleId) -> Option<RuleKey> {
        let slot = Arc::clone(self.slots.get(id)?.value());
        let state = slot.state.lock().expect("rule key slot poisoned");
        match &*state {
            SlotState::Ready(key) => Some(*key),
            _ => None,
        }
    }

    /// Number of rules with a published or in-flight key.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no keys have been computed or requested.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of underlying computations started. Observable proof of
    /// the at-most-once property.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}
