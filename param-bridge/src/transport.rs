//! The network transport, seen through the interface the bridge consumes.
//!
//! Pull/push transactions block the calling thread for up to their timeout;
//! the bridge never holds a shared lock across them. Retries are sequential
//! and each attempt is independently bounded, so the worst case is
//! `timeout * max(retries, 1)`.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ParamError, Result};
use crate::queue::ParamQueue;
use crate::record::ParamRecord;

/// A transaction ran to its timeout without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoReply;

impl Display for NoReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no reply within timeout")
    }
}

impl std::error::Error for NoReply {}

/// How a push transaction is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Plain acknowledgement; nothing is applied locally.
    Plain,
    /// The remote acknowledges with a pull reply, which the transport
    /// applies to the record's local storage.
    #[default]
    WithPull,
}

pub trait Transport: Send + Sync {
    /// Request the remote value of `record` at `offset` (`None` = whole
    /// array) from `host`. On success the reply has been applied to the
    /// record's local storage.
    fn pull(
        &self,
        record: &Arc<ParamRecord>,
        offset: Option<usize>,
        host: u16,
        timeout: Duration,
    ) -> std::result::Result<(), NoReply>;

    /// Send the queue to `host` as one push transaction.
    fn push(
        &self,
        queue: &ParamQueue,
        host: u16,
        timeout: Duration,
        ack: AckMode,
    ) -> std::result::Result<(), NoReply>;
}

/// Default transport for hosts without a network runtime: every
/// transaction goes unanswered.
#[derive(Debug, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn pull(
        &self,
        _record: &Arc<ParamRecord>,
        _offset: Option<usize>,
        _host: u16,
        _timeout: Duration,
    ) -> std::result::Result<(), NoReply> {
        Err(NoReply)
    }

    fn push(
        &self,
        _queue: &ParamQueue,
        _host: u16,
        _timeout: Duration,
        _ack: AckMode,
    ) -> std::result::Result<(), NoReply> {
        Err(NoReply)
    }
}

/// Run a transaction up to `max(retries, 1)` times, stopping at the first
/// answered attempt.
pub(crate) fn with_retries(
    what: &str,
    node: u16,
    retries: u32,
    mut attempt: impl FnMut() -> std::result::Result<(), NoReply>,
) -> Result<()> {
    let attempts = retries.max(1);
    for i in 0..attempts {
        trace!("[NET] {what} attempt {}/{} to node {node}", i + 1, attempts);
        if attempt().is_ok() {
            return Ok(());
        }
        debug!("[NET] {what} attempt {}/{} to node {node} unanswered", i + 1, attempts);
    }
    Err(ParamError::NoReply { node, attempts })
}
