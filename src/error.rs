//! # Error Taxonomy
//!
//! Structured error types for the caching and resilience facade. The taxonomy
//! encodes the propagation policy directly: [`CacheError`] values are always
//! recovered inside the cache layer and never reach callers, while
//! [`RemoteError`] values surface after the circuit breaker and retry policy
//! have had their say.

use std::time::Duration;

/// Errors raised at the key-value cache boundary.
///
/// Every variant is recovered locally by [`crate::cache::CacheClient`]: a
/// failed read becomes a miss, a failed write becomes a no-op. The variants
/// exist so the connection-health side channel can log them at the right
/// severity, not so callers can match on them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache backend could not be reached or returned a protocol error.
    #[error("cache backend unavailable: {0}")]
    Backend(String),

    /// A cache operation exceeded the client's own deadline.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    /// Cluster topology redirect ("moved" response). Expected to self-heal
    /// while the cluster rebalances, so logged at a lower severity than a
    /// true connectivity failure.
    #[error("cache cluster slot moved: {0}")]
    Moved(String),

    /// A stored value could not be serialized or deserialized for a key.
    #[error("cache serialization failed for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    /// Whether this error is a cluster redirect rather than a connectivity
    /// failure. Redirects do not count against connection health.
    pub fn is_moved(&self) -> bool {
        matches!(self, CacheError::Moved(_))
    }
}

/// Errors raised by the remote analytics service or its transport.
///
/// The transient variants (timeout, connection refused/reset, declared
/// external-API failures) are eligible for retry; the permanent variants
/// propagate immediately.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The remote call exceeded its deadline.
    #[error("remote call '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// The transport could not establish a connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The connection dropped mid-call.
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// A failure the external API itself declared transient.
    #[error("external API error: {0}")]
    ExternalApi(String),

    /// An application-level response (4xx/5xx) from the remote service.
    /// Retrying will not change the outcome.
    #[error("remote service returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// The remote service answered, but the payload did not parse.
    #[error("invalid response from remote service: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether retrying this error could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Timeout { .. }
                | RemoteError::ConnectionRefused(_)
                | RemoteError::ConnectionReset(_)
                | RemoteError::ExternalApi(_)
        )
    }
}

/// Errors surfaced through the facade to dashboard callers.
///
/// Callers are expected to substitute a neutral default (zeroed quote,
/// hold-rated analysis, empty list) on `CircuitOpen` or `Remote` rather than
/// fail the end-user request; only when no default exists does the failure
/// reach the edge as service-unavailable.
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    /// The guarding circuit breaker is open; the operation was not invoked.
    #[error("dependency '{0}' is temporarily unavailable (circuit open)")]
    CircuitOpen(String),

    /// The remote operation failed after retries were exhausted.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
pub type FacadeResult<T> = std::result::Result<T, FacadeError>;
