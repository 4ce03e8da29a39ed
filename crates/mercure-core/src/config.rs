use std::time::Duration;

/// Hard upper bound on records per page, imposed by the upstream API.
pub const MAX_PAGE_SIZE: usize = 150;

/// Tuning knobs for one connector instance.
///
/// Every field has a documented default; callers override the few they
/// care about through the `with_*` builders.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Maximum attempts per page fetch (first try included).
    pub max_retry_attempts: u32,

    /// Base delay for exponential backoff (`base × 2^attempt`).
    pub retry_base_delay: Duration,

    /// Ceiling on a single computed backoff delay.
    pub retry_max_delay: Duration,

    /// Consecutive tripping failures before the circuit opens.
    pub circuit_breaker_threshold: u32,

    /// Time the circuit stays open before allowing a half-open trial.
    pub circuit_breaker_reset: Duration,

    /// When false, no circuit breaker is installed at all: calls are never
    /// rejected and the circuit never opens.
    pub enable_circuit_breaker: bool,

    /// Result cap applied when [`FetchOptions`] does not specify one.
    pub default_max_results: usize,

    /// Records requested per page, clamped to [`MAX_PAGE_SIZE`].
    pub page_size: usize,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            circuit_breaker_threshold: 5,
            circuit_breaker_reset: Duration::from_secs(30),
            enable_circuit_breaker: true,
            default_max_results: 150,
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectorConfig {
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold;
        self
    }

    pub fn with_circuit_breaker_reset(mut self, reset: Duration) -> Self {
        self.circuit_breaker_reset = reset;
        self
    }

    pub fn with_circuit_breaker_enabled(mut self, enabled: bool) -> Self {
        self.enable_circuit_breaker = enabled;
        self
    }

    pub fn with_default_max_results(mut self, max: usize) -> Self {
        self.default_max_results = max;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.min(MAX_PAGE_SIZE);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Per-call options for one ingestion run. Immutable once passed in;
/// unset fields fall back to the connector configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub max_results: Option<usize>,
    pub page_size: Option<usize>,
}

impl FetchOptions {
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sensible() {
        let config = ConnectorConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert!(config.enable_circuit_breaker);
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_page_size_clamped_to_upstream_cap() {
        let config = ConnectorConfig::default().with_page_size(10_000);
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_fetch_options_builder() {
        let options = FetchOptions::default()
            .with_max_results(42)
            .with_page_size(50);
        assert_eq!(options.max_results, Some(42));
        assert_eq!(options.page_size, Some(50));
    }
}
