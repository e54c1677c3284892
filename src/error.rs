/// Error types for the fleetwatch engine
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the remote compute API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials are missing or rejected. Fatal for the session:
    /// the scheduler halts until credentials are fixed externally.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure. Retryable by the next scheduled tick.
    #[error("network error: {0}")]
    Network(String),

    /// The per-call deadline elapsed before the remote answered.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered with something we could not interpret.
    #[error("unexpected API response: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Whether this failure should halt the refresh scheduler rather than
    /// being retried on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }
}

/// Bulkhead error: one region's fetch failed. Isolated to that region;
/// never aborts the remaining regions of a scan.
#[derive(Debug, Error)]
#[error("region {region} unavailable: {source}")]
pub struct RegionUnavailable {
    pub region: String,
    #[source]
    pub source: ApiError,
}

/// Errors from dispatching a start/stop/reboot command.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The remote API refused the command (permission denial or an illegal
    /// transition the local cache did not know about).
    #[error("action denied by the API: {0}")]
    Denied(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}
