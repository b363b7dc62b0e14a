//! Lazy per-access value evaluation.
//!
//! A [`ValueProxy`] is created fresh for every value access and discarded
//! afterwards. Reads resolve at most once per proxy instance: the first
//! evaluation is cached and later reads return it unchanged, whatever
//! selector they pass. Writes always take effect immediately and are
//! batched through one [`ParamQueue`] whether they stay local or go out as
//! a push transaction.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::context::ContextState;
use crate::error::{ParamError, Result};
use crate::queue::{ParamQueue, QueueSlot};
use crate::record::{ParamRecord, ParamType};
use crate::router;
use crate::selector::{Selector, normalize_index};
use crate::transport::{AckMode, with_retries};
use crate::value::{Value, WriteValue, decode_elem, encode_elem};

pub struct ValueProxy {
    ctx: Arc<ContextState>,
    record: Arc<ParamRecord>,
    host: Option<u16>,
    timeout: Duration,
    retries: u32,
    paramver: u8,
    /// Read/write through the network when the record's node is non-local.
    remote: bool,
    ack: AckMode,
    cached: Mutex<Option<Value>>,
}

impl ValueProxy {
    pub(crate) fn new(
        ctx: Arc<ContextState>,
        record: Arc<ParamRecord>,
        host: Option<u16>,
        timeout: Duration,
        retries: u32,
        paramver: u8,
    ) -> Self {
        Self {
            ctx,
            record,
            host,
            timeout,
            retries,
            paramver,
            remote: true,
            ack: AckMode::default(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_host(mut self, host: u16) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_version(mut self, paramver: u8) -> Self {
        self.paramver = paramver;
        self
    }

    /// Force local-only access regardless of the record's node.
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    /// Array size of the underlying record.
    pub fn len(&self) -> usize {
        self.record.array_size()
    }

    pub fn is_empty(&self) -> bool {
        self.record.array_size() == 0
    }

    /// Read through the selector.
    ///
    /// The first read resolves (pulling from the remote node when enabled)
    /// and caches; any later read on the same proxy instance returns the
    /// cached value unchanged, regardless of its selector.
    pub fn get(&self, selector: impl Into<Selector>) -> Result<Value> {
        let selector = selector.into();
        if let Some(cached) = self.cached.lock().clone() {
            trace!("[PROXY] '{}' cached read", self.record.name());
            return Ok(cached);
        }
        let value = self.eval(&selector)?;
        *self.cached.lock() = Some(value.clone());
        Ok(value)
    }

    /// Evaluate the whole value and iterate its elements.
    pub fn iter(&self) -> Result<std::vec::IntoIter<Value>> {
        let items = match self.get(Selector::All)? {
            Value::Array(items) => items,
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            single => vec![single],
        };
        Ok(items.into_iter())
    }

    fn pull(&self, offset: Option<usize>) -> Result<()> {
        if !self.remote || self.record.node() == 0 {
            return Ok(());
        }
        let dest = self.host.unwrap_or(self.record.node());
        with_retries("pull", dest, self.retries, || {
            self.ctx
                .transport
                .pull(&self.record, offset, dest, self.timeout)
        })
    }

    fn eval(&self, selector: &Selector) -> Result<Value> {
        let record = &self.record;
        let name = record.name().to_string();
        let node = record.node();
        let ty = record.param_type();
        trace!("[PROXY] '{name}'@{node} read {selector:?}");

        match ty {
            ParamType::Data => {
                // Opaque bytes have no partial selection.
                self.pull(None)?;
                Ok(Value::Data(record.read_all()))
            }
            ParamType::String => {
                self.pull(None)?;
                let s = record.string_value();
                match selector {
                    Selector::All => Ok(Value::Str(s)),
                    _ => {
                        // Characters up to the first NUL, not buffer bytes.
                        let chars: Vec<char> = s.chars().collect();
                        let resolved = selector.resolve(chars.len(), &name, node)?;
                        Ok(Value::Str(
                            resolved.indexes.iter().map(|&i| chars[i]).collect(),
                        ))
                    }
                }
            }
            _ => {
                let len = record.array_size();
                let resolved = selector.resolve(len, &name, node)?;
                if len <= 1 {
                    self.pull(None)?;
                    return Ok(decode_elem(ty, &record.read_elem(0)));
                }
                if let Selector::Index(_) = selector {
                    let offset = resolved.indexes[0];
                    self.pull(Some(offset))?;
                    return Ok(decode_elem(ty, &record.read_elem(offset)));
                }
                // Whole or multi-index: one whole-array pull, then select.
                self.pull(None)?;
                Ok(Value::Array(
                    resolved
                        .indexes
                        .iter()
                        .map(|&i| decode_elem(ty, &record.read_elem(i)))
                        .collect(),
                ))
            }
        }
    }

    /// Write through the selector. Always effective immediately, never
    /// cached.
    ///
    /// A scalar value with [`Selector::All`] is the single-value
    /// broadcast shorthand: it writes every index. Sequences are zipped
    /// against the selected indexes and must match their length.
    pub fn set(&self, selector: impl Into<Selector>, value: impl Into<WriteValue>) -> Result<()> {
        let selector = selector.into();
        let value = value.into();
        let record = &self.record;
        let name = record.name().to_string();
        let node = record.node();
        let ty = record.param_type();
        trace!("[PROXY] '{name}'@{node} write {selector:?}");

        let mut queue = ParamQueue::new(self.paramver);
        match ty {
            ParamType::String => {
                if selector != Selector::All {
                    return Err(ParamError::type_mismatch(
                        "cannot set string parameters by index",
                        &name,
                    ));
                }
                let WriteValue::Single(Value::Str(s)) = value else {
                    return Err(ParamError::type_mismatch(
                        "string parameters take one string value",
                        &name,
                    ));
                };
                queue.add(
                    record.clone(),
                    QueueSlot::Whole {
                        bytes: s.into_bytes(),
                    },
                )?;
            }
            ParamType::Data => {
                if selector != Selector::All {
                    return Err(ParamError::type_mismatch(
                        "cannot set data parameters by index",
                        &name,
                    ));
                }
                let WriteValue::Single(Value::Data(bytes)) = value else {
                    return Err(ParamError::type_mismatch(
                        "data parameters take one byte-sequence value",
                        &name,
                    ));
                };
                queue.add(record.clone(), QueueSlot::Whole { bytes })?;
            }
            _ => {
                let len = record.array_size();
                let resolved = selector.resolve(len, &name, node)?;
                match value {
                    WriteValue::Single(v) if resolved.whole => {
                        // Single value fanned out to the whole array.
                        let bytes = encode_elem(ty, &v, &name)?;
                        queue.add(record.clone(), QueueSlot::Broadcast { bytes })?;
                    }
                    WriteValue::Single(v) if selector.is_single() => {
                        let bytes = encode_elem(ty, &v, &name)?;
                        queue.add(
                            record.clone(),
                            QueueSlot::Elem {
                                offset: resolved.indexes[0],
                                bytes,
                            },
                        )?;
                    }
                    WriteValue::Single(_) => {
                        return Err(ParamError::type_mismatch(
                            "a single value only broadcasts to the whole array; \
                             explicit index selections take a value sequence",
                            &name,
                        ));
                    }
                    WriteValue::Many(values) => {
                        if values.len() != resolved.indexes.len() {
                            return Err(ParamError::LengthMismatch {
                                values: values.len(),
                                indexes: resolved.indexes.len(),
                                param: name,
                            });
                        }
                        for (value, &offset) in values.iter().zip(&resolved.indexes) {
                            let bytes = encode_elem(ty, value, &name)?;
                            queue.add(record.clone(), QueueSlot::Elem { offset, bytes })?;
                        }
                    }
                }
            }
        }

        self.send(&queue)
    }

    fn send(&self, queue: &ParamQueue) -> Result<()> {
        let record = &self.record;
        if self.remote && record.node() != 0 {
            let dest = self.host.unwrap_or(record.node());
            // The remote stays the source of truth: nothing is applied
            // locally on success unless the transport's ack-with-pull
            // reply did it.
            with_retries("push", dest, self.retries, || {
                self.ctx.transport.push(queue, dest, self.timeout, self.ack)
            })
        } else {
            // Local apply dispatches change callbacks synchronously;
            // their errors belong to the writer.
            queue.apply(&mut |rec, offset| router::dispatch(&self.ctx, rec.key(), offset, false))
        }
    }

    /// Normalize one index the way reads do. Exposed for callers that
    /// validate before writing.
    pub fn check_index(&self, index: i64) -> Result<usize> {
        normalize_index(
            index,
            self.record.array_size(),
            self.record.name(),
            self.record.node(),
        )
    }
}
