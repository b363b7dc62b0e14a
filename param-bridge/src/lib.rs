//! # param-bridge — host-side bridge to a native parameter registry
//!
//! `param-bridge` exposes a natively-owned registry of networked
//! parameters (telemetry and configuration values) to safe Rust. The
//! native list and the network transport stay outside this crate, behind
//! the [`registry::ParamRegistry`] and [`transport::Transport`] traits;
//! what lives here is the bridge itself:
//!
//! - one live wrapper per native record, enforced by a weak identity cache
//! - explicit ownership of who releases a record when its wrapper goes
//! - registry membership modeled as a named strong reference on the wrapper
//! - lazy, cached value access with retried remote round-trips
//! - value-change callbacks routed from native threads through a
//!   message-passing worker, never by re-entering host state directly
//!
//! ## Getting started
//!
//! ```rust,ignore
//! use param_bridge::{Builder, BridgeContext, Selector};
//!
//! let ctx = BridgeContext::global();
//! let param = ctx.param("temp_sensor").with_node(5).with_retries(2).build()?;
//! let values = param.value().get(Selector::All)?;
//! param.value().set(0, 21.5)?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod param;
pub mod proxy;
pub mod queue;
pub mod record;
pub mod registry;
pub mod selector;
pub mod transport;
pub mod value;

mod cache;
mod router;
mod utils;

pub use config::BridgeConfig;
pub use context::BridgeContext;
pub use error::{BoxError, ParamError, Result};
pub use param::{ListAddOutcome, OwnershipMode, Param, ParamIdent};
pub use proxy::ValueProxy;
pub use record::{ParamRecord, ParamType, StoreDescriptor, StoreKind};
pub use registry::{AddOutcome, ListRegistry, ParamRegistry};
pub use selector::{Selector, SliceSpec};
pub use transport::{AckMode, NoReply, OfflineTransport, Transport};
pub use value::{Value, WriteValue};

/// Builds a configured object, consuming the builder.
///
/// All param-bridge builders implement this trait; bring it into scope to
/// call `.build()`.
pub trait Builder {
    /// The type produced by this builder.
    type Output;
    /// Consume the builder and construct the configured object.
    fn build(self) -> Result<Self::Output>;
}
