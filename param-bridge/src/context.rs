use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::Builder;
use crate::cache::IdentityCache;
use crate::config::{BridgeConfig, CONFIG_FILE_ENV};
use crate::error::Result;
use crate::param::{OwnershipMode, Param, ParamBuilder, ParamIdent, ParamSpec};
use crate::record::ParamType;
use crate::registry::{ListRegistry, ParamRegistry};
use crate::router::ChangeRouter;
use crate::transport::{OfflineTransport, Transport};
use crate::utils::name_matches;

/// Shared state behind a context: the registry and transport singletons,
/// the wrapper identity cache, the change router, and request defaults.
pub(crate) struct ContextState {
    pub(crate) registry: Arc<dyn ParamRegistry>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: IdentityCache,
    pub(crate) config: BridgeConfig,
    router: ChangeRouter,
}

impl ContextState {
    pub(crate) fn router(&self) -> &ChangeRouter {
        &self.router
    }
}

pub struct BridgeContextBuilder {
    registry: Option<Arc<dyn ParamRegistry>>,
    transport: Option<Arc<dyn Transport>>,
    config: Option<BridgeConfig>,
    config_file: Option<PathBuf>,
}

impl Default for BridgeContextBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            transport: None,
            config: None,
            config_file: None,
        }
    }
}

impl BridgeContextBuilder {
    /// Bridge a registry implementation (the native runtime's list, or a
    /// fake in tests). Defaults to an in-process [`ListRegistry`].
    pub fn with_registry(mut self, registry: Arc<dyn ParamRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Bridge a transport implementation. Defaults to
    /// [`OfflineTransport`], which answers nothing.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load defaults from a JSON file.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }
}

impl Builder for BridgeContextBuilder {
    type Output = BridgeContext;

    fn build(self) -> Result<BridgeContext> {
        // Priority: explicit config, then explicit file, then the
        // environment's file, then defaults. Env overrides apply on top.
        let config = match (self.config, self.config_file) {
            (Some(config), _) => config,
            (None, Some(path)) => BridgeConfig::from_file(path)?,
            (None, None) => match std::env::var(CONFIG_FILE_ENV) {
                Ok(path) => BridgeConfig::from_file(path)?,
                Err(_) => BridgeConfig::default(),
            },
        };
        let config = config.apply_env_overrides()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ListRegistry::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(OfflineTransport));

        let state = Arc::new_cyclic(|weak| ContextState {
            registry,
            transport,
            cache: IdentityCache::default(),
            config,
            router: ChangeRouter::spawn(weak.clone()),
        });
        Ok(BridgeContext { state })
    }
}

/// Entry point to the bridge: owns the process-wide collaborators and
/// hands out parameter wrappers.
pub struct BridgeContext {
    state: Arc<ContextState>,
}

impl BridgeContext {
    pub fn builder() -> BridgeContextBuilder {
        BridgeContextBuilder::default()
    }

    /// The process-wide default context: in-process registry, offline
    /// transport, environment-driven configuration.
    pub fn global() -> &'static BridgeContext {
        static GLOBAL: OnceLock<BridgeContext> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Self::builder().build().unwrap_or_else(|err| {
                error!("[CTX] Falling back to default config: {err}");
                Self::builder()
                    .with_config(BridgeConfig::default())
                    .build()
                    .expect("default context construction cannot fail")
            })
        })
    }

    /// Find-or-wrap a parameter by name, id, or existing wrapper.
    pub fn param(&self, ident: impl Into<ParamIdent>) -> ParamBuilder {
        ParamBuilder {
            ctx: self.state.clone(),
            ident: ident.into(),
            node: None,
            host: None,
            timeout: None,
            retries: None,
            paramver: None,
            ownership: OwnershipMode::default(),
        }
    }

    /// Spec out a brand-new host-owned parameter record.
    pub fn new_param(
        &self,
        name: impl Into<String>,
        id: u16,
        param_type: ParamType,
    ) -> ParamSpec {
        ParamSpec {
            ctx: self.state.clone(),
            name: name.into(),
            id,
            param_type,
            node: 0,
            array_size: 1,
            mask: 0,
            unit: None,
            docstr: None,
            store: None,
            host: None,
            timeout: None,
            retries: None,
            paramver: None,
        }
    }

    /// Wrap every registry record matching the mask, node, and name glob.
    /// `node: None` spans all nodes; `mask` is AND-matched (`u32::MAX` for
    /// everything).
    pub fn params(&self, mask: u32, node: Option<u16>, glob: Option<&str>) -> Vec<Arc<Param>> {
        let mut records = Vec::new();
        self.state.registry.visit(&mut |record| {
            if let Some(node) = node
                && record.node() != node
            {
                return;
            }
            if mask != u32::MAX && (record.mask() & mask) == 0 {
                return;
            }
            if let Some(glob) = glob
                && !name_matches(glob, record.name())
            {
                return;
            }
            records.push(record.clone());
        });

        records
            .into_iter()
            .map(|record| {
                self.param(ParamIdent::Wrapped(record))
                    .build()
                    .expect("wrapped idents always resolve")
            })
            .collect()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    pub fn registry(&self) -> &Arc<dyn ParamRegistry> {
        &self.state.registry
    }

    /// Callback failures seen on the routed (native) dispatch path.
    pub fn callback_failures(&self) -> usize {
        self.state.router().failures()
    }

    /// Live wrapper count in the identity cache. Diagnostics.
    pub fn wrapper_count(&self) -> usize {
        self.state.cache.len()
    }

    /// Stop the change-router worker and wait for it.
    pub fn shutdown(&self) {
        self.state.router().shutdown();
    }
}
