//! Sequential pagination over the upstream listing endpoint.
//!
//! Pages are fetched strictly one after another, never concurrently, to
//! stay under the upstream rate ceiling. Each page fetch passes through
//! the circuit breaker and the retry/backoff loop independently; a page
//! that fails terminally stops pagination without discarding the records
//! already collected.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::error::AppError;
use crate::report::{IngestEvent, IngestReporter};
use crate::traits::{CredentialSource, PageFetch};

/// What one pagination pass produced.
pub struct PaginationOutcome {
    /// Raw records in upstream order, possibly partial.
    pub records: Vec<Value>,
    /// The terminal failure that stopped pagination early, if any.
    pub failure: Option<CircuitBreakerError>,
}

#[derive(Debug)]
pub struct Paginator<P, C>
where
    P: PageFetch,
    C: CredentialSource,
{
    fetcher: P,
    credentials: C,
    /// `None` when the breaker is disabled by configuration: calls are
    /// then never rejected and the circuit never opens.
    breaker: Option<CircuitBreaker>,
    backoff: BackoffPolicy,
    max_attempts: u32,
}

impl<P, C> Paginator<P, C>
where
    P: PageFetch,
    C: CredentialSource,
{
    pub fn new(
        fetcher: P,
        credentials: C,
        breaker: Option<CircuitBreaker>,
        backoff: BackoffPolicy,
        max_attempts: u32,
    ) -> Self {
        Self {
            fetcher,
            credentials,
            breaker,
            backoff,
            max_attempts,
        }
    }

    /// Accumulate up to `max_results` raw records in pages of at most
    /// `page_size`, stopping at the cap, on the first empty page, on a
    /// terminal failure, or on cancellation, whichever comes first.
    pub async fn fetch_all<R: IngestReporter>(
        &self,
        max_results: usize,
        page_size: usize,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> PaginationOutcome {
        let mut records: Vec<Value> = Vec::new();

        while records.len() < max_results {
            if cancel.is_cancelled() {
                return PaginationOutcome {
                    records,
                    failure: Some(CircuitBreakerError::Inner(AppError::Cancelled)),
                };
            }

            let offset = records.len();
            let limit = page_size.min(max_results - offset);

            match self.fetch_page(offset, limit, cancel, reporter).await {
                Ok(page) => {
                    if page.is_empty() {
                        // Upstream is out of data.
                        break;
                    }
                    reporter.report(IngestEvent::PageFetched {
                        offset,
                        count: page.len(),
                    });
                    records.extend(page);
                }
                Err(failure) => {
                    return PaginationOutcome {
                        records,
                        failure: Some(failure),
                    };
                }
            }
        }

        PaginationOutcome {
            records,
            failure: None,
        }
    }

    /// One page, with circuit breaking, the one-shot 401 credential
    /// refresh, and bounded retries with backoff.
    async fn fetch_page<R: IngestReporter>(
        &self,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Vec<Value>, CircuitBreakerError> {
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let result = match &self.breaker {
                Some(breaker) => {
                    breaker
                        .call(|| self.fetcher.fetch_page(offset, limit))
                        .await
                }
                None => self
                    .fetcher
                    .fetch_page(offset, limit)
                    .await
                    .map_err(CircuitBreakerError::Inner),
            };

            let error = match result {
                Ok(page) => return Ok(page),
                Err(e) => e,
            };

            match error {
                CircuitBreakerError::Open { name, retry_after } => {
                    reporter.report(IngestEvent::CircuitRejected { retry_after });
                    return Err(CircuitBreakerError::Open { name, retry_after });
                }
                CircuitBreakerError::Inner(AppError::CredentialRejected) => {
                    if refreshed {
                        // A freshly re-exchanged credential was rejected
                        // too; no point asking again.
                        return Err(CircuitBreakerError::Inner(AppError::Auth(
                            "upstream rejected a freshly refreshed credential".into(),
                        )));
                    }
                    refreshed = true;
                    self.credentials.invalidate();
                    // Immediate same-page retry; the forced re-exchange
                    // happens inside the next fetch. Does not consume a
                    // backoff attempt.
                }
                CircuitBreakerError::Inner(inner) => {
                    if !inner.is_retryable() || attempt + 1 >= self.max_attempts {
                        return Err(CircuitBreakerError::Inner(inner));
                    }
                    let delay = self.backoff.next_delay(attempt, &inner);
                    let message = inner.to_string();
                    reporter.report(IngestEvent::RetryScheduled {
                        offset,
                        attempt,
                        delay,
                        error: &message,
                    });
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            return Err(CircuitBreakerError::Inner(AppError::Cancelled));
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }
}
