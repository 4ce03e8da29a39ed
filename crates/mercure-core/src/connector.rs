//! Public facade of the ingestion pipeline.
//!
//! One `fetch_jobs` call is one ingestion run: ensure credential →
//! paginate → normalize → report. Failures of any kind are absorbed
//! here; callers only ever see a (possibly empty or partial) list of
//! normalized offers plus reporter events.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::{ConnectorConfig, FetchOptions, MAX_PAGE_SIZE};
use crate::error::AppError;
use crate::normalize::FieldNormalizer;
use crate::offer::JobOffer;
use crate::paginator::Paginator;
use crate::region::RegionResolver;
use crate::report::{IngestEvent, IngestReporter, TracingReporter};
use crate::traits::{CredentialSource, PageFetch, RegionLookup};

/// Resilient connector for one upstream job-offer source.
///
/// Generic over its collaborators via traits, enabling dependency
/// injection and testability without real HTTP calls. Holds the only
/// mutable state of a run (breaker, credential cache, region memo); a
/// single instance must not be invoked concurrently without external
/// synchronization.
#[derive(Debug)]
pub struct IngestionConnector<P, C, L>
where
    P: PageFetch,
    C: CredentialSource,
    L: RegionLookup,
{
    source_name: String,
    credentials: C,
    paginator: Paginator<P, C>,
    regions: RegionResolver<L>,
    normalizer: FieldNormalizer,
    config: ConnectorConfig,
}

impl<P, C, L> IngestionConnector<P, C, L>
where
    P: PageFetch,
    C: CredentialSource,
    L: RegionLookup,
{
    pub fn new(
        source_name: impl Into<String>,
        fetcher: P,
        credentials: C,
        regions: L,
        config: ConnectorConfig,
    ) -> Result<Self, AppError> {
        let source_name = source_name.into();

        let breaker = config.enable_circuit_breaker.then(|| {
            CircuitBreaker::new(
                source_name.clone(),
                CircuitBreakerConfig {
                    failure_threshold: config.circuit_breaker_threshold,
                    reset_timeout: config.circuit_breaker_reset,
                },
            )
        });
        let backoff = BackoffPolicy::new(config.retry_base_delay, config.retry_max_delay);
        let paginator = Paginator::new(
            fetcher,
            credentials.clone(),
            breaker,
            backoff,
            config.max_retry_attempts,
        );

        Ok(Self {
            source_name,
            credentials,
            paginator,
            regions: RegionResolver::new(regions),
            normalizer: FieldNormalizer::new()?,
            config,
        })
    }

    /// Constant identifier of the connector's upstream.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Run one ingestion pass. Never fails outward: unrecoverable
    /// failure yields an empty (or partial) list, reported out-of-band.
    pub async fn fetch_jobs(&self, options: FetchOptions) -> Vec<JobOffer> {
        self.fetch_jobs_with(options, &CancellationToken::new(), &TracingReporter)
            .await
    }

    /// Like [`fetch_jobs`](Self::fetch_jobs), with cooperative
    /// cancellation and an injected reporter.
    pub async fn fetch_jobs_with<R: IngestReporter>(
        &self,
        options: FetchOptions,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Vec<JobOffer> {
        let run_id = Uuid::new_v4();
        let max_results = options
            .max_results
            .unwrap_or(self.config.default_max_results);
        let page_size = options
            .page_size
            .unwrap_or(self.config.page_size)
            .clamp(1, MAX_PAGE_SIZE);

        reporter.report(IngestEvent::RunStarted {
            run_id,
            source: &self.source_name,
            max_results,
        });

        if max_results == 0 {
            reporter.report(IngestEvent::RunCompleted {
                run_id,
                fetched: 0,
                kept: 0,
                rejected: 0,
            });
            return Vec::new();
        }

        // Acquire the credential up front so a broken token endpoint
        // aborts the run before any listing call.
        if let Err(error) = self.credentials.ensure_token().await {
            let message = error.to_string();
            reporter.report(IngestEvent::RunAborted {
                run_id,
                error: &message,
                kept: 0,
            });
            return Vec::new();
        }

        let outcome = self
            .paginator
            .fetch_all(max_results, page_size, cancel, reporter)
            .await;

        let now = Utc::now();
        let mut offers = Vec::with_capacity(outcome.records.len());
        let mut rejected = 0usize;
        for raw in &outcome.records {
            match self.normalizer.normalize(raw, &self.regions, now).await {
                Ok(offer) => offers.push(offer),
                Err(reason) => {
                    rejected += 1;
                    reporter.report(IngestEvent::RecordRejected {
                        reason: reason.as_str(),
                    });
                }
            }
        }

        match outcome.failure {
            None => reporter.report(IngestEvent::RunCompleted {
                run_id,
                fetched: outcome.records.len(),
                kept: offers.len(),
                rejected,
            }),
            Some(failure) => {
                let message = failure.to_string();
                reporter.report(IngestEvent::RunAborted {
                    run_id,
                    error: &message,
                    kept: offers.len(),
                });
            }
        }

        offers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        MockCredentialSource, MockPageFetcher, MockReporter, make_raw_offer, make_raw_offers,
    };
    use crate::region::StaticRegionLookup;

    fn connector(
        fetcher: MockPageFetcher,
        credentials: MockCredentialSource,
        config: ConnectorConfig,
    ) -> IngestionConnector<MockPageFetcher, MockCredentialSource, StaticRegionLookup> {
        IngestionConnector::new("france-travail", fetcher, credentials, StaticRegionLookup, config)
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_returns_normalized_offers_in_order() {
        let fetcher = MockPageFetcher::with_records(make_raw_offers(5), 3);
        let reporter = MockReporter::new();
        let c = connector(
            fetcher,
            MockCredentialSource::with_token("t"),
            ConnectorConfig::default(),
        );

        let offers = c
            .fetch_jobs_with(
                FetchOptions::default().with_max_results(5).with_page_size(3),
                &CancellationToken::new(),
                &reporter,
            )
            .await;

        assert_eq!(offers.len(), 5);
        let ids: Vec<_> = offers.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["OFF0000", "OFF0001", "OFF0002", "OFF0003", "OFF0004"]);
        assert_eq!(reporter.count("RunCompleted"), 1);
        assert_eq!(reporter.count("RunAborted"), 0);
    }

    #[tokio::test]
    async fn test_invalid_records_are_dropped_and_counted() {
        let page = vec![
            make_raw_offer("A1", "Dev Rust", "Rust"),
            // Missing id.
            serde_json::json!({"intitule": "Dev Java", "description": "Java"}),
            // No detectable technology.
            make_raw_offer("A3", "Boulanger", "Pain artisanal"),
            make_raw_offer("A4", "Dev Python", "Python"),
        ];
        let fetcher = MockPageFetcher::with_responses(vec![Ok(page)]);
        let reporter = MockReporter::new();
        let c = connector(
            fetcher,
            MockCredentialSource::with_token("t"),
            ConnectorConfig::default(),
        );

        let offers = c
            .fetch_jobs_with(
                FetchOptions::default().with_max_results(10),
                &CancellationToken::new(),
                &reporter,
            )
            .await;

        let ids: Vec<_> = offers.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "A4"]);
        assert_eq!(reporter.count("RecordRejected"), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_to_empty_list_without_listing_calls() {
        let fetcher = MockPageFetcher::with_records(make_raw_offers(3), 3);
        let reporter = MockReporter::new();
        let c = connector(
            fetcher.clone(),
            MockCredentialSource::failing("token endpoint unreachable"),
            ConnectorConfig::default(),
        );

        let offers = c
            .fetch_jobs_with(
                FetchOptions::default().with_max_results(3),
                &CancellationToken::new(),
                &reporter,
            )
            .await;

        assert!(offers.is_empty());
        assert!(fetcher.calls().is_empty());
        assert_eq!(reporter.count("RunAborted"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_run_failure_returns_partial_list() {
        let fetcher = MockPageFetcher::with_responses(vec![
            Ok(make_raw_offers(2)),
            Err(AppError::Server {
                status: 503,
                message: "unavailable".into(),
            }),
            Err(AppError::Server {
                status: 503,
                message: "unavailable".into(),
            }),
            Err(AppError::Server {
                status: 503,
                message: "unavailable".into(),
            }),
        ]);
        let reporter = MockReporter::new();
        let c = connector(
            fetcher,
            MockCredentialSource::with_token("t"),
            ConnectorConfig::default().with_retry_base_delay(std::time::Duration::from_millis(1)),
        );

        let offers = c
            .fetch_jobs_with(
                FetchOptions::default().with_max_results(10).with_page_size(2),
                &CancellationToken::new(),
                &reporter,
            )
            .await;

        assert_eq!(offers.len(), 2);
        assert_eq!(reporter.count("RunAborted"), 1);
        assert_eq!(reporter.count("RunCompleted"), 0);
    }

    #[tokio::test]
    async fn test_zero_max_results_short_circuits() {
        let fetcher = MockPageFetcher::with_records(make_raw_offers(3), 3);
        let credentials = MockCredentialSource::with_token("t");
        let c = connector(fetcher.clone(), credentials.clone(), ConnectorConfig::default());

        let offers = c
            .fetch_jobs(FetchOptions::default().with_max_results(0))
            .await;

        assert!(offers.is_empty());
        assert!(fetcher.calls().is_empty());
        assert_eq!(credentials.ensure_count(), 0);
    }

    #[tokio::test]
    async fn test_source_name_is_constant() {
        let c = connector(
            MockPageFetcher::with_responses(Vec::new()),
            MockCredentialSource::with_token("t"),
            ConnectorConfig::default(),
        );
        assert_eq!(c.source_name(), "france-travail");
    }
}
