//! Wrapper identity cache.
//!
//! Maps a record's address to its one live wrapper. Entries hold a weak
//! reference, so the cache never keeps a wrapper alive by itself. The slot
//! additionally carries the registry-membership owner: a pinned strong
//! reference set while the wrapper's record is linked into the registry,
//! making "the list holds a reference to the wrapper" an explicit named
//! owner instead of a hidden refcount adjustment.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::param::Param;
use crate::record::RecordKey;

struct CacheSlot {
    wrapper: Weak<Param>,
    /// Strong reference owned by registry membership; set on a successful
    /// list add, cleared when the record actually leaves the list.
    pinned: Option<Arc<Param>>,
}

#[derive(Default)]
pub(crate) struct IdentityCache {
    slots: Mutex<HashMap<RecordKey, CacheSlot>>,
}

impl IdentityCache {
    pub fn lookup(&self, key: RecordKey) -> Option<Arc<Param>> {
        self.slots
            .lock()
            .get(&key)
            .and_then(|slot| slot.wrapper.upgrade())
    }

    /// Return the live wrapper for `key`, or construct one with `make` and
    /// register it. The boolean reports whether a wrapper was created.
    ///
    /// `make` runs under the cache lock so two callers cannot construct
    /// competing wrappers for the same record; it must not re-enter the
    /// cache.
    pub fn get_or_create(
        &self,
        key: RecordKey,
        make: impl FnOnce() -> Arc<Param>,
    ) -> (Arc<Param>, bool) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(&key) {
            if let Some(existing) = slot.wrapper.upgrade() {
                trace!("[CACHE] Hit for record {key:#x}");
                return (existing, false);
            }
        }
        let wrapper = make();
        slots.insert(
            key,
            CacheSlot {
                wrapper: Arc::downgrade(&wrapper),
                pinned: None,
            },
        );
        trace!("[CACHE] Registered wrapper for record {key:#x}");
        (wrapper, true)
    }

    /// Register `wrapper` under `key` if no live wrapper holds that slot.
    /// Used when a wrapper is repointed onto another record.
    pub fn adopt_if_vacant(&self, key: RecordKey, wrapper: &Arc<Param>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&key) {
            Some(slot) if slot.wrapper.upgrade().is_some() => false,
            _ => {
                slots.insert(
                    key,
                    CacheSlot {
                        wrapper: Arc::downgrade(wrapper),
                        pinned: None,
                    },
                );
                true
            }
        }
    }

    /// Drop the slot for `key` if it belongs to `wrapper` (or is dead).
    /// Used when a live wrapper leaves its record behind (repointing).
    ///
    /// Returns any pinned reference so the caller can release it outside
    /// the cache lock.
    pub fn evict(&self, key: RecordKey, wrapper: &Arc<Param>) -> Option<Arc<Param>> {
        let mut slots = self.slots.lock();
        let owned = match slots.get(&key) {
            Some(slot) => match slot.wrapper.upgrade() {
                Some(live) => Arc::ptr_eq(&live, wrapper),
                None => true,
            },
            None => return None,
        };
        if !owned {
            return None;
        }
        slots.remove(&key).and_then(|slot| slot.pinned)
    }

    /// Drop the slot for `key` if its wrapper is gone. Idempotent; a slot
    /// held by a live wrapper (someone else's) is left alone.
    ///
    /// Returns any pinned reference so the caller can release it outside
    /// the cache lock.
    pub fn remove_dead(&self, key: RecordKey) -> Option<Arc<Param>> {
        let mut slots = self.slots.lock();
        match slots.get(&key) {
            Some(slot) if slot.wrapper.upgrade().is_none() => {
                trace!("[CACHE] Dropping slot for record {key:#x}");
                slots.remove(&key).and_then(|slot| slot.pinned)
            }
            _ => None,
        }
    }

    /// Install the registry-membership reference. The previous pin, if
    /// any, is returned for release outside the lock.
    pub fn pin(&self, key: RecordKey, wrapper: Arc<Param>) -> Option<Arc<Param>> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&key) {
            Some(slot) => slot.pinned.replace(wrapper),
            None => None,
        }
    }

    /// Release the registry-membership reference. The caller must drop the
    /// returned strong reference after the cache lock is gone: the drop may
    /// be the wrapper's last and re-enters the cache.
    pub fn unpin(&self, key: RecordKey) -> Option<Arc<Param>> {
        self.slots
            .lock()
            .get_mut(&key)
            .and_then(|slot| slot.pinned.take())
    }

    /// Number of live slots. Diagnostics only.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}
