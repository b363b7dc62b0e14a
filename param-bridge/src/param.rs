use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::Builder;
use crate::context::ContextState;
use crate::error::{BoxError, ParamError, Result};
use crate::proxy::ValueProxy;
use crate::record::{ParamRecord, ParamType, StoreDescriptor, StoreKind};
use crate::registry::AddOutcome;
use crate::router::RouterEvent;

/// Who releases the native record when its wrapper is destroyed and the
/// record is not registry-linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipMode {
    /// Borrowed record; destruction never frees it.
    Unmanaged,
    /// Destruction runs the registry's destroy-and-unlink routine.
    #[default]
    OwnedByRegistry,
    /// Destruction frees only the record's own allocation, not nested
    /// buffers. Manual mode.
    OwnedRaw,
}

/// What `list_add` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListAddOutcome {
    /// The wrapper's record became the live registry entry.
    Added,
    /// The registry already held a different record for the same
    /// `(node, id)` and folded this wrapper's contents into it; the wrapper
    /// now references that record and its original record is gone.
    Updated,
    /// The wrapper's record already was the live registry entry.
    NoOp,
}

/// How a parameter is named when looking it up.
#[derive(Debug)]
pub enum ParamIdent {
    Name(String),
    Id(u16),
    Wrapped(Arc<ParamRecord>),
}

impl std::fmt::Display for ParamIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Id(id) => write!(f, "id {id}"),
            Self::Wrapped(record) => write!(f, "'{}'", record.name()),
        }
    }
}

impl From<&str> for ParamIdent {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ParamIdent {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u16> for ParamIdent {
    fn from(id: u16) -> Self {
        Self::Id(id)
    }
}

impl From<&Arc<Param>> for ParamIdent {
    fn from(param: &Arc<Param>) -> Self {
        Self::Wrapped(param.record())
    }
}

/// Fallible user callback invoked on value changes, with the wrapper and
/// the changed offset (-1 for whole-array changes).
pub type ChangeCallback =
    Box<dyn Fn(&Param, i32) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Host-side wrapper around one native parameter record.
///
/// At most one live `Param` exists per record; construction goes through
/// the context's identity cache, never directly. Request-scoped defaults
/// (host, timeout, retries, protocol version) ride along and seed every
/// [`ValueProxy`] produced from this wrapper.
pub struct Param {
    pub(crate) ctx: Arc<ContextState>,
    record: Mutex<Arc<ParamRecord>>,
    /// Destination override; negative = unset.
    host: AtomicI32,
    timeout_ms: AtomicU64,
    retries: AtomicU32,
    paramver: AtomicU8,
    ownership: OwnershipMode,
    callback: RwLock<Option<ChangeCallback>>,
    /// Whether this wrapper installed the record's change hook (and must
    /// clear it again).
    hook_owner: AtomicBool,
}

pub(crate) struct WrapSettings {
    pub host: Option<u16>,
    pub timeout: Duration,
    pub retries: u32,
    pub paramver: u8,
}

fn install_hook(ctx: &Arc<ContextState>, record: &Arc<ParamRecord>) {
    let tx = ctx.router().sender();
    let key = record.key();
    record.set_hook(Arc::new(move |offset| {
        let _ = tx.send(RouterEvent::Change { key, offset });
    }));
}

impl Param {
    /// Find-or-wrap through the identity cache.
    pub(crate) fn wrap(
        ctx: &Arc<ContextState>,
        record: Arc<ParamRecord>,
        settings: WrapSettings,
        ownership: OwnershipMode,
    ) -> Arc<Param> {
        let key = record.key();
        let (wrapper, created) = ctx.cache.get_or_create(key, || {
            install_hook(ctx, &record);
            Arc::new(Param {
                ctx: ctx.clone(),
                host: AtomicI32::new(settings.host.map_or(-1, |h| h as i32)),
                timeout_ms: AtomicU64::new(settings.timeout.as_millis() as u64),
                retries: AtomicU32::new(settings.retries),
                paramver: AtomicU8::new(settings.paramver),
                ownership,
                callback: RwLock::new(None),
                hook_owner: AtomicBool::new(true),
                record: Mutex::new(record.clone()),
            })
        });
        if !created {
            // The existing wrapper's settings win; new ones are dropped.
            debug!(
                "[CACHE] Reusing wrapper for '{}'@{}, requested settings ignored",
                wrapper.name(),
                wrapper.node()
            );
        }
        wrapper
    }

    /// The wrapped record.
    pub fn record(&self) -> Arc<ParamRecord> {
        self.record.lock().clone()
    }

    pub fn name(&self) -> String {
        self.record.lock().name().to_string()
    }

    pub fn id(&self) -> u16 {
        self.record.lock().id()
    }

    pub fn node(&self) -> u16 {
        self.record.lock().node()
    }

    pub fn param_type(&self) -> ParamType {
        self.record.lock().param_type()
    }

    pub fn array_size(&self) -> usize {
        self.record.lock().array_size()
    }

    pub fn mask(&self) -> u32 {
        self.record.lock().mask()
    }

    pub fn unit(&self) -> Option<String> {
        self.record.lock().unit().map(str::to_string)
    }

    pub fn docstr(&self) -> Option<String> {
        self.record.lock().docstr().map(str::to_string)
    }

    pub fn timestamp(&self) -> Option<std::time::SystemTime> {
        self.record.lock().timestamp()
    }

    pub fn storage_type(&self) -> Option<StoreKind> {
        self.record.lock().store().map(|s| s.kind)
    }

    /// Whether the record's storage survives a reboot of its node.
    pub fn is_persisted(&self) -> bool {
        matches!(self.storage_type(), Some(kind) if kind != StoreKind::Ram)
    }

    pub fn host(&self) -> Option<u16> {
        let raw = self.host.load(Ordering::Acquire);
        (raw >= 0).then_some(raw as u16)
    }

    /// `None` clears the override back to the record's own node.
    pub fn set_host(&self, host: Option<u16>) {
        self.host
            .store(host.map_or(-1, |h| h as i32), Ordering::Release);
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Acquire))
    }

    /// `None` resets to the context default.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        let ms = timeout
            .unwrap_or(self.ctx.config.default_timeout())
            .as_millis() as u64;
        self.timeout_ms.store(ms, Ordering::Release);
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Acquire)
    }

    /// `None` resets to a single attempt.
    pub fn set_retries(&self, retries: Option<u32>) {
        self.retries.store(retries.unwrap_or(1), Ordering::Release);
    }

    pub fn paramver(&self) -> u8 {
        self.paramver.load(Ordering::Acquire)
    }

    pub fn set_paramver(&self, version: u8) {
        self.paramver.store(version, Ordering::Release);
    }

    pub fn ownership(&self) -> OwnershipMode {
        self.ownership
    }

    /// A fresh lazy value proxy seeded with this wrapper's defaults.
    pub fn value(&self) -> ValueProxy {
        ValueProxy::new(
            self.ctx.clone(),
            self.record(),
            self.host(),
            self.timeout(),
            self.retries(),
            self.paramver(),
        )
    }

    /// Register the value-change callback, replacing any previous one.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&Param, i32) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Box::new(callback));
    }

    pub fn clear_on_change(&self) {
        *self.callback.write() = None;
    }

    pub fn has_on_change(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Run the registered callback for a change at `offset`. No callback is
    /// a legitimate no-op.
    pub(crate) fn invoke_change(&self, offset: i32) -> Result<()> {
        let guard = self.callback.read();
        let Some(callback) = guard.as_ref() else {
            return Ok(());
        };
        callback(self, offset).map_err(|source| ParamError::Callback {
            param: self.name(),
            node: self.node(),
            offset,
            source,
        })
    }

    /// Insert this wrapper's record into the registry, exposing it to the
    /// network.
    ///
    /// On [`ListAddOutcome::Updated`] the wrapper's record identity has
    /// changed: the registry already held a different record for the same
    /// `(node, id)`, took this record's contents, and the superseded record
    /// was destroyed.
    pub fn list_add(self: &Arc<Self>) -> Result<ListAddOutcome> {
        let record = self.record();
        let registry = &self.ctx.registry;

        if let Some(existing) = registry.find(record.node(), record.id())
            && Arc::ptr_eq(&existing, &record)
        {
            // Already the live entry; nothing to assign.
            return Ok(ListAddOutcome::NoOp);
        }

        match registry.add(&record) {
            AddOutcome::NewEntry => {
                // The registry now references this wrapper's record; pin a
                // strong reference so the wrapper outlives the membership.
                let prev = self.ctx.cache.pin(record.key(), self.clone());
                drop(prev);
                trace!("[LIST] '{}'@{} added", record.name(), record.node());
                Ok(ListAddOutcome::Added)
            }
            AddOutcome::UpdatedExisting => {
                // Re-find: the add and our earlier check are not atomic
                // against native-thread list mutation.
                let existing = registry.find(record.node(), record.id()).ok_or_else(|| {
                    ParamError::inconsistent(format!(
                        "registry updated '{}'@{} but no longer lists it",
                        record.name(),
                        record.node()
                    ))
                })?;
                if Arc::ptr_eq(&existing, &record) {
                    return Ok(ListAddOutcome::NoOp);
                }

                // Our record was superseded: drop it and repoint at the
                // registry's.
                let old_key = record.key();
                if self.hook_owner.load(Ordering::Acquire) {
                    record.clear_hook();
                }
                let old_pin = self.ctx.cache.evict(old_key, self);
                registry.destroy(&record);
                *self.record.lock() = existing.clone();

                let adopted = self.ctx.cache.adopt_if_vacant(existing.key(), self);
                if adopted {
                    install_hook(&self.ctx, &existing);
                }
                self.hook_owner.store(adopted, Ordering::Release);
                drop(old_pin);

                debug!(
                    "[LIST] '{}'@{} updated existing entry, wrapper repointed",
                    existing.name(),
                    existing.node()
                );
                Ok(ListAddOutcome::Updated)
            }
        }
    }

    /// Remove this wrapper's record from the registry without destroying
    /// it; destruction stays with the wrapper's end of life. Returns
    /// whether the record was actually present.
    pub fn list_forget(&self) -> bool {
        let record = self.record();
        let removed = self.ctx.registry.remove(&record, false);
        if removed {
            // Mirror of the pin taken at add time. Released outside the
            // cache lock; it may be the wrapper's last reference.
            let pin = self.ctx.cache.unpin(record.key());
            trace!("[LIST] '{}'@{} forgotten", record.name(), record.node());
            drop(pin);
        }
        removed
    }

    /// Repoint this wrapper at the record with the same id on another
    /// node. Fails if that node lists no such record.
    pub fn set_node(self: &Arc<Self>, node: u16) -> Result<()> {
        let record = self.record();
        let target =
            self.ctx
                .registry
                .find(node, record.id())
                .ok_or_else(|| ParamError::NotFound {
                    ident: ParamIdent::Id(record.id()),
                    node,
                })?;
        if Arc::ptr_eq(&target, &record) {
            return Ok(());
        }

        let old_key = record.key();
        if self.hook_owner.load(Ordering::Acquire) {
            record.clear_hook();
        }
        let old_pin = self.ctx.cache.evict(old_key, self);
        *self.record.lock() = target.clone();
        let adopted = self.ctx.cache.adopt_if_vacant(target.key(), self);
        if adopted {
            install_hook(&self.ctx, &target);
        }
        self.hook_owner.store(adopted, Ordering::Release);
        drop(old_pin);
        Ok(())
    }
}

impl Drop for Param {
    fn drop(&mut self) {
        let record = self.record.get_mut().clone();
        let key = record.key();

        // Cache entry goes first so no lookup can see a half-destroyed
        // wrapper. Removal is idempotent and leaves live foreign slots
        // alone.
        let stale_pin = self.ctx.cache.remove_dead(key);
        debug_assert!(stale_pin.is_none(), "pinned wrapper reached refcount zero");
        if self.hook_owner.load(Ordering::Acquire) {
            record.clear_hook();
        }
        if self.ctx.cache.lookup(key).is_some() {
            // A repointed wrapper still shares this record (list-add
            // collision); destruction is the slot owner's.
            return;
        }

        let linked = self
            .ctx
            .registry
            .find(record.node(), record.id())
            .is_some_and(|listed| Arc::ptr_eq(&listed, &record));
        if linked {
            // Ownership passed to the registry.
            return;
        }
        match self.ownership {
            OwnershipMode::Unmanaged => {}
            OwnershipMode::OwnedByRegistry => self.ctx.registry.destroy(&record),
            OwnershipMode::OwnedRaw => record.mark_released(),
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record.lock();
        write!(
            f,
            "[id:{}|node:{}] {} | {}",
            record.id(),
            record.node(),
            record.name(),
            record.param_type()
        )
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Param({self})")
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Self) -> bool {
        let a = self.record();
        let b = other.record();
        Arc::ptr_eq(&a, &b)
            || (a.node() == b.node()
                && a.id() == b.id()
                && a.param_type() == b.param_type()
                && a.array_size() == b.array_size()
                && a.name() == b.name())
    }
}

impl Eq for Param {}

impl std::hash::Hash for Param {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // The id is assumed unique enough, as on the native side.
        self.id().hash(state);
    }
}

/// Find-or-wrap builder returned by [`BridgeContext::param`].
///
/// [`BridgeContext::param`]: crate::context::BridgeContext::param
pub struct ParamBuilder {
    pub(crate) ctx: Arc<ContextState>,
    pub(crate) ident: ParamIdent,
    pub(crate) node: Option<u16>,
    pub(crate) host: Option<u16>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retries: Option<u32>,
    pub(crate) paramver: Option<u8>,
    pub(crate) ownership: OwnershipMode,
}

impl ParamBuilder {
    pub fn with_node(mut self, node: u16) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_host(mut self, host: u16) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_version(mut self, paramver: u8) -> Self {
        self.paramver = Some(paramver);
        self
    }

    pub fn with_ownership(mut self, ownership: OwnershipMode) -> Self {
        self.ownership = ownership;
        self
    }
}

impl Builder for ParamBuilder {
    type Output = Arc<Param>;

    fn build(self) -> Result<Arc<Param>> {
        let config = &self.ctx.config;
        let node = self.node.unwrap_or(config.default_node);
        let record = match &self.ident {
            ParamIdent::Name(name) => self.ctx.registry.find_name(node, name),
            ParamIdent::Id(id) => self.ctx.registry.find(node, *id),
            ParamIdent::Wrapped(record) => Some(record.clone()),
        };
        let record = record.ok_or(ParamError::NotFound {
            ident: self.ident,
            node,
        })?;
        let settings = WrapSettings {
            host: self.host,
            timeout: self.timeout.unwrap_or(config.default_timeout()),
            retries: self.retries.unwrap_or(config.default_retries),
            paramver: self.paramver.unwrap_or(config.default_paramver),
        };
        Ok(Param::wrap(&self.ctx, record, settings, self.ownership))
    }
}

/// Builder for a brand-new host-owned record, returned by
/// [`BridgeContext::new_param`]. The record starts orphaned; `list_add`
/// exposes it to the network.
///
/// [`BridgeContext::new_param`]: crate::context::BridgeContext::new_param
pub struct ParamSpec {
    pub(crate) ctx: Arc<ContextState>,
    pub(crate) name: String,
    pub(crate) id: u16,
    pub(crate) param_type: ParamType,
    pub(crate) node: u16,
    pub(crate) array_size: usize,
    pub(crate) mask: u32,
    pub(crate) unit: Option<String>,
    pub(crate) docstr: Option<String>,
    pub(crate) store: Option<StoreDescriptor>,
    pub(crate) host: Option<u16>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retries: Option<u32>,
    pub(crate) paramver: Option<u8>,
}

impl ParamSpec {
    pub fn with_node(mut self, node: u16) -> Self {
        self.node = node;
        self
    }

    pub fn with_array_size(mut self, array_size: usize) -> Self {
        self.array_size = array_size;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_docstr(mut self, docstr: impl Into<String>) -> Self {
        self.docstr = Some(docstr.into());
        self
    }

    pub fn with_store(mut self, store: StoreDescriptor) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_host(mut self, host: u16) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_version(mut self, paramver: u8) -> Self {
        self.paramver = Some(paramver);
        self
    }
}

impl Builder for ParamSpec {
    type Output = Arc<Param>;

    fn build(self) -> Result<Arc<Param>> {
        let config = &self.ctx.config;
        let record = Arc::new(ParamRecord::new(
            self.node,
            self.id,
            self.name,
            self.param_type,
            self.array_size,
            self.mask,
            self.unit,
            self.docstr,
            self.store,
        ));
        let settings = WrapSettings {
            host: self.host,
            timeout: self.timeout.unwrap_or(config.default_timeout()),
            retries: self.retries.unwrap_or(config.default_retries),
            paramver: self.paramver.unwrap_or(config.default_paramver),
        };
        Ok(Param::wrap(
            &self.ctx,
            record,
            settings,
            OwnershipMode::OwnedByRegistry,
        ))
    }
}
