use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for the broker and everything beneath it.
///
/// Low-level transport failures are normalized into these variants at the
/// driver boundary; nothing below the broker surfaces as an unhandled fault.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The remote backend refused or dropped the connection attempt.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// An open/probe/action did not complete within its bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The backend accepted the request but reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Reconnect attempts are exhausted; the driver cannot be brought up.
    #[error("driver unavailable: {0}")]
    Unavailable(String),

    /// Another workflow currently owns the driver. Callers retry later;
    /// requests are never queued.
    #[error("another workflow is already running")]
    Busy,

    /// The requested amount is not in the supported denomination set.
    /// Rejected before any remote interaction.
    #[error("unsupported coupon amount: {0}")]
    InvalidAmount(u32),

    /// Malformed or missing workflow parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

impl AutomationError {
    /// Stable machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationError::ConnectionRefused(_) => "connection_error",
            AutomationError::Timeout(_) => "timeout",
            AutomationError::Backend(_) => "backend_error",
            AutomationError::Unavailable(_) => "unavailable",
            AutomationError::Busy => "busy",
            AutomationError::InvalidAmount(_) => "invalid_amount",
            AutomationError::InvalidParams(_) => "invalid_params",
        }
    }
}

impl From<reqwest::Error> for AutomationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            AutomationError::ConnectionRefused(err.to_string())
        } else if err.is_timeout() {
            AutomationError::Backend(format!("request timed out: {err}"))
        } else {
            AutomationError::Backend(err.to_string())
        }
    }
}
