//! Change-event routing between the native side and user callbacks.
//!
//! Native threads never touch host objects: the hook installed on a record
//! sends `(record key, offset)` into a channel, and a single host-owned
//! worker drains it and dispatches under its own locking. Host-side local
//! writes dispatch synchronously instead, so a failing callback surfaces to
//! the writer. Each event is fully dispatched and reported before the next
//! one is taken.

use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::context::ContextState;
use crate::error::{ParamError, Result};
use crate::record::RecordKey;

pub(crate) enum RouterEvent {
    Change { key: RecordKey, offset: i32 },
    Stop,
}

pub(crate) struct ChangeRouter {
    tx: flume::Sender<RouterEvent>,
    failures: AtomicUsize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChangeRouter {
    /// Spawn the dispatch worker. `ctx` is weak: the router lives inside
    /// the context state it needs to read.
    pub fn spawn(ctx: Weak<ContextState>) -> Self {
        let (tx, rx) = flume::unbounded::<RouterEvent>();
        let worker_ctx = ctx;
        let worker = std::thread::Builder::new()
            .name("param-bridge-router".into())
            .spawn(move || {
                for event in rx.iter() {
                    let RouterEvent::Change { key, offset } = event else {
                        break;
                    };
                    let Some(ctx) = worker_ctx.upgrade() else {
                        break;
                    };
                    match dispatch(&ctx, key, offset, true) {
                        Ok(()) => {}
                        Err(err @ ParamError::Inconsistent { .. }) => {
                            // A routed change for a record without a wrapper
                            // means the identity invariant is already broken.
                            error!("[ROUTER] {err}");
                            panic!("{err}");
                        }
                        Err(err) => {
                            error!("[ROUTER] {err}");
                            ctx.router().failures.fetch_add(1, Ordering::AcqRel);
                        }
                    }
                }
            })
            .expect("failed to spawn router worker");
        Self {
            tx,
            failures: AtomicUsize::new(0),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn sender(&self) -> flume::Sender<RouterEvent> {
        self.tx.clone()
    }

    /// Callback failures seen on the routed (native) path.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it.
    pub fn shutdown(&self) {
        let _ = self.tx.send(RouterEvent::Stop);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

/// Resolve a change event to its wrapper and run the registered callback.
///
/// `routed` selects the contract for an unresolved record: the native path
/// installed the hook itself, so a miss there is an invariant violation;
/// the local-write path tolerates records whose wrapper is already gone.
pub(crate) fn dispatch(
    ctx: &ContextState,
    key: RecordKey,
    offset: i32,
    routed: bool,
) -> Result<()> {
    let Some(wrapper) = ctx.cache.lookup(key) else {
        if routed {
            return Err(ParamError::inconsistent(format!(
                "change event routed for record {key:#x} without a live wrapper"
            )));
        }
        return Ok(());
    };
    trace!(
        "[ROUTER] Change on '{}'@{} offset {offset}",
        wrapper.name(),
        wrapper.node()
    );
    if routed {
        // The native boundary cannot unwind; turn panics into reported
        // callback failures.
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            wrapper.invoke_change(offset)
        }));
        match caught {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "callback panicked".into());
                Err(ParamError::Callback {
                    param: wrapper.name(),
                    node: wrapper.node(),
                    offset,
                    source: detail.into(),
                })
            }
        }
    } else {
        wrapper.invoke_change(offset)
    }
}
