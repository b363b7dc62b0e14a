use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ParamError, Result};

/// Environment variable naming a JSON config file.
pub const CONFIG_FILE_ENV: &str = "PARAM_BRIDGE_CONFIG_FILE";

/// Environment variable holding `key=value;key=value` overrides.
///
/// ```text
/// export PARAM_BRIDGE_OVERRIDE='default_node=3;default_timeout_ms=500'
/// ```
pub const OVERRIDE_ENV: &str = "PARAM_BRIDGE_OVERRIDE";

/// Process-wide request defaults, seeded into every wrapper that does not
/// override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Node looked up when none is given. 0 is the local node.
    pub default_node: u16,
    pub default_timeout_ms: u64,
    pub default_retries: u32,
    /// Protocol version spoken on pushes/pulls.
    pub default_paramver: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_node: 0,
            default_timeout_ms: 1000,
            default_retries: 1,
            default_paramver: 2,
        }
    }
}

impl BridgeConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ParamError::Config {
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| ParamError::Config {
            detail: format!("cannot parse {}: {e}", path.display()),
        })
    }

    /// Fold `PARAM_BRIDGE_OVERRIDE` pairs into this config.
    pub fn apply_env_overrides(self) -> Result<Self> {
        let Ok(overrides) = std::env::var(OVERRIDE_ENV) else {
            return Ok(self);
        };
        debug!("[CONF] Applying overrides from {OVERRIDE_ENV}: {overrides}");

        let mut doc = serde_json::to_value(&self).map_err(|e| ParamError::Config {
            detail: e.to_string(),
        })?;
        for pair in overrides.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ParamError::Config {
                    detail: format!("invalid {OVERRIDE_ENV} entry '{pair}', expected key=value"),
                });
            };
            let (key, value) = (key.trim(), value.trim());
            let parsed: serde_json::Value =
                serde_json::from_str(value).unwrap_or_else(|_| value.into());
            debug!("[CONF] Override: {key} = {parsed}");
            doc[key] = parsed;
        }
        serde_json::from_value(doc).map_err(|e| ParamError::Config {
            detail: format!("invalid {OVERRIDE_ENV} value: {e}"),
        })
    }
}
