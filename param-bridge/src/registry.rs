//! The native parameter registry, seen through the interface the bridge
//! consumes.
//!
//! The authoritative list lives in a native runtime outside this crate;
//! embedders bridge it by implementing [`ParamRegistry`]. [`ListRegistry`]
//! is a plain in-process implementation used as the default and by tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::record::ParamRecord;

/// What `add` did with the offered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The record itself is now the live entry for its `(node, id)`.
    NewEntry,
    /// A different record already held that `(node, id)`; its contents were
    /// overwritten from the offered record, which stays orphaned.
    UpdatedExisting,
}

pub trait ParamRegistry: Send + Sync {
    fn find(&self, node: u16, id: u16) -> Option<Arc<ParamRecord>>;

    fn find_name(&self, node: u16, name: &str) -> Option<Arc<ParamRecord>>;

    /// Link the record, or fold its contents into the existing entry for
    /// the same `(node, id)`.
    fn add(&self, record: &Arc<ParamRecord>) -> AddOutcome;

    /// Unlink the record without touching others under the same `(node,
    /// id)`. Releases the record's memory too when `destroy` is set.
    /// Returns whether the record was actually present.
    fn remove(&self, record: &Arc<ParamRecord>, destroy: bool) -> bool;

    /// Unlink the record if present and release its memory.
    fn destroy(&self, record: &Arc<ParamRecord>);

    fn visit(&self, f: &mut dyn FnMut(&Arc<ParamRecord>));
}

/// In-process registry: a linked list of records guarded by one lock.
#[derive(Default)]
pub struct ListRegistry {
    records: Mutex<Vec<Arc<ParamRecord>>>,
}

impl ListRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn unlink(&self, record: &Arc<ParamRecord>) -> bool {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| !Arc::ptr_eq(r, record));
        records.len() != before
    }
}

impl ParamRegistry for ListRegistry {
    fn find(&self, node: u16, id: u16) -> Option<Arc<ParamRecord>> {
        self.records
            .lock()
            .iter()
            .find(|r| r.node() == node && r.id() == id)
            .cloned()
    }

    fn find_name(&self, node: u16, name: &str) -> Option<Arc<ParamRecord>> {
        self.records
            .lock()
            .iter()
            .find(|r| r.node() == node && r.name() == name)
            .cloned()
    }

    fn add(&self, record: &Arc<ParamRecord>) -> AddOutcome {
        let existing = self.find(record.node(), record.id());
        match existing {
            Some(existing) if !Arc::ptr_eq(&existing, record) => {
                existing.write_all(&record.read_all());
                existing.notify_change(-1);
                debug!(
                    "[LIST] Updated existing entry for '{}'@{}",
                    record.name(),
                    record.node()
                );
                AddOutcome::UpdatedExisting
            }
            Some(_) => AddOutcome::UpdatedExisting,
            None => {
                self.records.lock().push(record.clone());
                debug!("[LIST] Added '{}'@{}", record.name(), record.node());
                AddOutcome::NewEntry
            }
        }
    }

    fn remove(&self, record: &Arc<ParamRecord>, destroy: bool) -> bool {
        let removed = self.unlink(record);
        if removed {
            debug!("[LIST] Removed '{}'@{}", record.name(), record.node());
        }
        if removed && destroy {
            record.mark_released();
        }
        removed
    }

    fn destroy(&self, record: &Arc<ParamRecord>) {
        self.unlink(record);
        record.mark_released();
        debug!("[LIST] Destroyed '{}'@{}", record.name(), record.node());
    }

    fn visit(&self, f: &mut dyn FnMut(&Arc<ParamRecord>)) {
        let snapshot: Vec<_> = self.records.lock().clone();
        for record in &snapshot {
            f(record);
        }
    }
}
