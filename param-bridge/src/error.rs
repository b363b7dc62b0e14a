use std::fmt::Display;

use crate::param::ParamIdent;

pub type Result<T> = std::result::Result<T, ParamError>;

/// Boxed cause carried by callback failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure classes surfaced by the bridge.
///
/// Every recoverable variant carries enough context (identifier, node,
/// offset, attempted host) to reproduce the failing call without native
/// tracing enabled.
#[derive(Debug)]
pub enum ParamError {
    /// The identifier did not resolve to any native record.
    NotFound { ident: ParamIdent, node: u16 },
    /// A selector resolved outside `[0, len)` after negative-index
    /// normalization.
    IndexOutOfRange {
        index: i64,
        len: usize,
        param: String,
        node: u16,
    },
    /// Selector or value has an incompatible shape for the record.
    TypeMismatch { reason: String, param: String },
    /// A value sequence and an index sequence of different lengths were
    /// zipped together.
    LengthMismatch {
        values: usize,
        indexes: usize,
        param: String,
    },
    /// Every retry of a remote pull/push went unanswered.
    NoReply { node: u16, attempts: u32 },
    /// A user change-callback failed; chains the cause.
    Callback {
        param: String,
        node: u16,
        offset: i32,
        source: BoxError,
    },
    /// An internal invariant is broken. Not recoverable.
    Inconsistent { detail: String },
    /// A batched write overflowed the outgoing queue's wire budget.
    QueueFull { capacity: usize },
    /// Configuration could not be loaded or parsed.
    Config { detail: String },
}

impl ParamError {
    pub(crate) fn inconsistent(detail: impl Into<String>) -> Self {
        Self::Inconsistent {
            detail: detail.into(),
        }
    }

    pub(crate) fn type_mismatch(reason: impl Into<String>, param: impl Into<String>) -> Self {
        Self::TypeMismatch {
            reason: reason.into(),
            param: param.into(),
        }
    }
}

impl Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { ident, node } => {
                write!(f, "no parameter matching {ident} on node {node}")
            }
            Self::IndexOutOfRange {
                index,
                len,
                param,
                node,
            } => write!(
                f,
                "index {index} out of range of '{param}'@{node} (array size {len})"
            ),
            Self::TypeMismatch { reason, param } => write!(f, "'{param}': {reason}"),
            Self::LengthMismatch {
                values,
                indexes,
                param,
            } => write!(
                f,
                "'{param}': {values} value(s) zipped against {indexes} index(es)"
            ),
            Self::NoReply { node, attempts } => {
                write!(f, "no response from node {node} after {attempts} attempt(s)")
            }
            Self::Callback {
                param,
                node,
                offset,
                source,
            } => write!(
                f,
                "change callback of '{param}'@{node} failed at offset {offset}: {source}"
            ),
            Self::Inconsistent { detail } => write!(f, "bridge state inconsistent: {detail}"),
            Self::QueueFull { capacity } => {
                write!(f, "outgoing queue full ({capacity} byte budget)")
            }
            Self::Config { detail } => write!(f, "configuration error: {detail}"),
        }
    }
}

impl std::error::Error for ParamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Callback { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
