#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use param_bridge::queue::{ParamQueue, QueueSlot};
use param_bridge::{
    AddOutcome, BridgeConfig, BridgeContext, Builder, ListRegistry, NoReply, ParamRecord,
    ParamRegistry, ParamType, Transport, transport::AckMode,
};

/// Registry that counts destroy calls, for phantom-ownership checks.
pub struct CountingRegistry {
    inner: ListRegistry,
    destroys: AtomicUsize,
}

impl CountingRegistry {
    pub fn new() -> Self {
        Self {
            inner: ListRegistry::new(),
            destroys: AtomicUsize::new(0),
        }
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::Acquire)
    }
}

impl ParamRegistry for CountingRegistry {
    fn find(&self, node: u16, id: u16) -> Option<Arc<ParamRecord>> {
        self.inner.find(node, id)
    }

    fn find_name(&self, node: u16, name: &str) -> Option<Arc<ParamRecord>> {
        self.inner.find_name(node, name)
    }

    fn add(&self, record: &Arc<ParamRecord>) -> AddOutcome {
        self.inner.add(record)
    }

    fn remove(&self, record: &Arc<ParamRecord>, destroy: bool) -> bool {
        if destroy {
            self.destroys.fetch_add(1, Ordering::AcqRel);
        }
        self.inner.remove(record, destroy)
    }

    fn destroy(&self, record: &Arc<ParamRecord>) {
        self.destroys.fetch_add(1, Ordering::AcqRel);
        self.inner.destroy(record)
    }

    fn visit(&self, f: &mut dyn FnMut(&Arc<ParamRecord>)) {
        self.inner.visit(f)
    }
}

/// Transport that never answers, counting attempts.
#[derive(Default)]
pub struct SilentTransport {
    pulls: AtomicUsize,
    pushes: AtomicUsize,
}

impl SilentTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::Acquire)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::Acquire)
    }
}

impl Transport for SilentTransport {
    fn pull(
        &self,
        _record: &Arc<ParamRecord>,
        _offset: Option<usize>,
        _host: u16,
        _timeout: Duration,
    ) -> Result<(), NoReply> {
        self.pulls.fetch_add(1, Ordering::AcqRel);
        Err(NoReply)
    }

    fn push(
        &self,
        _queue: &ParamQueue,
        _host: u16,
        _timeout: Duration,
        _ack: AckMode,
    ) -> Result<(), NoReply> {
        self.pushes.fetch_add(1, Ordering::AcqRel);
        Err(NoReply)
    }
}

/// Transport whose pull replies with a scripted whole-buffer value, and
/// whose push applies the queue to record storage like a remote would.
#[derive(Default)]
pub struct ReplyTransport {
    reply: Mutex<Vec<u8>>,
    pulls: AtomicUsize,
}

impl ReplyTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doubles(values: &[f64]) -> Self {
        let t = Self::new();
        t.set_doubles(values);
        t
    }

    pub fn set_reply(&self, bytes: Vec<u8>) {
        *self.reply.lock() = bytes;
    }

    pub fn set_doubles(&self, values: &[f64]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.set_reply(bytes);
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::Acquire)
    }
}

impl Transport for ReplyTransport {
    fn pull(
        &self,
        record: &Arc<ParamRecord>,
        _offset: Option<usize>,
        _host: u16,
        _timeout: Duration,
    ) -> Result<(), NoReply> {
        self.pulls.fetch_add(1, Ordering::AcqRel);
        record.write_all(&self.reply.lock());
        record.notify_change(-1);
        Ok(())
    }

    fn push(
        &self,
        queue: &ParamQueue,
        _host: u16,
        _timeout: Duration,
        _ack: AckMode,
    ) -> Result<(), NoReply> {
        for entry in queue.entries() {
            match &entry.slot {
                QueueSlot::Elem { offset, bytes } => entry.record.write_elem(*offset, bytes),
                QueueSlot::Broadcast { bytes } => {
                    for i in 0..entry.record.array_size() {
                        entry.record.write_elem(i, bytes);
                    }
                }
                QueueSlot::Whole { bytes } => entry.record.write_all(bytes),
            }
        }
        Ok(())
    }
}

pub fn record(node: u16, id: u16, name: &str, ty: ParamType, size: usize) -> Arc<ParamRecord> {
    Arc::new(ParamRecord::new(node, id, name, ty, size, 0, None, None, None))
}

pub fn context_with(
    registry: Arc<dyn ParamRegistry>,
    transport: Arc<dyn Transport>,
) -> BridgeContext {
    BridgeContext::builder()
        .with_registry(registry)
        .with_transport(transport)
        .with_config(BridgeConfig::default())
        .build()
        .expect("context")
}
