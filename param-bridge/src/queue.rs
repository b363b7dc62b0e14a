//! Batched write sets.
//!
//! Every write, local or remote, goes through a [`ParamQueue`]: remote
//! writes hand the queue to the transport as one push transaction, local
//! writes apply it directly against record storage. The queue is bounded by
//! a wire budget, mirroring the native side's single-packet payload limit.

use std::sync::Arc;

use crate::error::{ParamError, Result};
use crate::record::ParamRecord;

/// Default wire budget of one push transaction, in bytes.
pub const QUEUE_BUDGET: usize = 512;

/// Per-entry framing overhead counted against the budget.
const ENTRY_OVERHEAD: usize = 6;

/// What one queue entry writes.
#[derive(Debug, Clone)]
pub enum QueueSlot {
    /// One element at a fixed offset.
    Elem { offset: usize, bytes: Vec<u8> },
    /// One element value fanned out to every offset.
    Broadcast { bytes: Vec<u8> },
    /// The whole storage buffer (string/data records).
    Whole { bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub record: Arc<ParamRecord>,
    pub slot: QueueSlot,
}

/// An outgoing set-queue.
#[derive(Debug)]
pub struct ParamQueue {
    entries: Vec<QueueEntry>,
    used: usize,
    budget: usize,
    version: u8,
}

impl ParamQueue {
    pub fn new(version: u8) -> Self {
        Self::with_budget(version, QUEUE_BUDGET)
    }

    pub fn with_budget(version: u8, budget: usize) -> Self {
        Self {
            entries: Vec::new(),
            used: 0,
            budget,
            version,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, record: Arc<ParamRecord>, slot: QueueSlot) -> Result<()> {
        let payload = match &slot {
            QueueSlot::Elem { bytes, .. } => bytes.len(),
            QueueSlot::Broadcast { bytes } => bytes.len(),
            QueueSlot::Whole { bytes } => bytes.len(),
        };
        if self.used + payload + ENTRY_OVERHEAD > self.budget {
            return Err(ParamError::QueueFull {
                capacity: self.budget,
            });
        }
        self.used += payload + ENTRY_OVERHEAD;
        self.entries.push(QueueEntry { record, slot });
        Ok(())
    }

    /// Apply the queue against local record storage.
    ///
    /// `on_change` is invoked synchronously for every applied entry (offset
    /// -1 for whole-array changes); its error aborts the apply and
    /// propagates to the writer.
    pub fn apply(
        &self,
        on_change: &mut dyn FnMut(&Arc<ParamRecord>, i32) -> Result<()>,
    ) -> Result<()> {
        for QueueEntry { record, slot } in &self.entries {
            let offset = match slot {
                QueueSlot::Elem { offset, bytes } => {
                    record.write_elem(*offset, bytes);
                    *offset as i32
                }
                QueueSlot::Broadcast { bytes } => {
                    for i in 0..record.array_size() {
                        record.write_elem(i, bytes);
                    }
                    -1
                }
                QueueSlot::Whole { bytes } => {
                    record.write_all(bytes);
                    -1
                }
            };
            record.touch();
            on_change(record, offset)?;
        }
        Ok(())
    }
}
