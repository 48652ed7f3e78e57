use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed failure taxonomy surfaced to callers through an `Outcome`.
///
/// Every failure inside an agent phase is collapsed onto one of these tags;
/// no error type crosses the lifecycle boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Transport unreachable or broken mid-exchange.
    Connection,
    /// Any other failure during the side-effecting phase.
    Unknown,
    /// Empty or malformed trigger input, rejected before any side effect.
    Validation,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Unknown => "unknown",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error hierarchy for chat transport operations.
/// Classified onto [`FaultKind`] before reaching a caller.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request rejected ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("no fragment within {0:?}")]
    IdleTimeout(Duration),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Collapse onto the caller-facing taxonomy.
    ///
    /// Connectivity failures (unreachable host, broken pipe, silence past the
    /// idle deadline) map to `Connection`; everything else is `Unknown`.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            Self::Connection(_) | Self::IdleTimeout(_) => FaultKind::Connection,
            Self::Status { .. } | Self::Stream(_) | Self::Malformed(_) => FaultKind::Unknown,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Status { .. } => "status",
            Self::Stream(_) => "stream",
            Self::IdleTimeout(_) => "idle_timeout",
            Self::Malformed(_) => "malformed",
        }
    }
}
