use std::time::Duration;

use thiserror::Error;

/// Application-wide error types for Mercure.
///
/// Upstream failures are classified once, here, into a closed set of
/// variants. Nothing outside the HTTP client layer ever inspects a
/// transport-specific error shape.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid connector configuration (missing credentials, bad values).
    /// Raised synchronously at construction, never mid-run.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token exchange failed, or the upstream rejected a freshly
    /// re-exchanged credential.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The upstream answered 401 on a regular call. Handled by a one-shot
    /// credential refresh before it hardens into [`AppError::Auth`].
    #[error("credential rejected by upstream (HTTP 401)")]
    CredentialRejected,

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429. Carries the parsed `Retry-After` hint when the upstream
    /// sent one.
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx.
    #[error("upstream server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Non-429, non-401 HTTP 4xx. The request itself is wrong; retrying
    /// cannot help.
    #[error("upstream rejected request (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// The run's cancellation token fired.
    #[error("ingestion run cancelled")]
    Cancelled,

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// 401 is deliberately absent: it is handled by the paginator's
    /// one-shot credential refresh, not by general backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_)
                | AppError::Network(_)
                | AppError::RateLimited { .. }
                | AppError::Server { .. }
        )
    }

    /// Returns true if this error should trip the circuit breaker.
    ///
    /// Client-side mistakes (4xx) and credential problems say nothing
    /// about upstream health and must not open the circuit.
    pub fn should_trip_circuit(&self) -> bool {
        matches!(
            self,
            AppError::Timeout(_)
                | AppError::Network(_)
                | AppError::RateLimited { .. }
                | AppError::Server { .. }
        )
    }
}
