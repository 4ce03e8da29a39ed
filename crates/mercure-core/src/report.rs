use std::time::Duration;

use uuid::Uuid;

/// Events emitted during an ingestion run for monitoring/logging.
#[derive(Debug, Clone)]
pub enum IngestEvent<'a> {
    RunStarted {
        run_id: Uuid,
        source: &'a str,
        max_results: usize,
    },
    PageFetched {
        offset: usize,
        count: usize,
    },
    RetryScheduled {
        offset: usize,
        attempt: u32,
        delay: Duration,
        error: &'a str,
    },
    /// The circuit breaker rejected a call without touching the network.
    CircuitRejected {
        retry_after: Duration,
    },
    /// A raw record was dropped during normalization.
    RecordRejected {
        reason: &'a str,
    },
    RunCompleted {
        run_id: Uuid,
        fetched: usize,
        kept: usize,
        rejected: usize,
    },
    /// The run stopped early; `kept` offers were still produced.
    RunAborted {
        run_id: Uuid,
        error: &'a str,
        kept: usize,
    },
}

/// Trait for receiving ingestion events (decoupled logging).
pub trait IngestReporter: Send + Sync {
    fn report(&self, event: IngestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl IngestReporter for TracingReporter {
    fn report(&self, event: IngestEvent<'_>) {
        match event {
            IngestEvent::RunStarted {
                run_id,
                source,
                max_results,
            } => {
                tracing::info!(%run_id, %source, %max_results, "Ingestion run started");
            }
            IngestEvent::PageFetched { offset, count } => {
                tracing::debug!(%offset, %count, "Page fetched");
            }
            IngestEvent::RetryScheduled {
                offset,
                attempt,
                delay,
                error,
            } => {
                tracing::warn!(
                    %offset,
                    %attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Transient failure, retry scheduled"
                );
            }
            IngestEvent::CircuitRejected { retry_after } => {
                tracing::warn!(
                    retry_after_secs = retry_after.as_secs(),
                    "Call rejected by open circuit"
                );
            }
            IngestEvent::RecordRejected { reason } => {
                tracing::debug!(%reason, "Raw record rejected");
            }
            IngestEvent::RunCompleted {
                run_id,
                fetched,
                kept,
                rejected,
            } => {
                tracing::info!(%run_id, %fetched, %kept, %rejected, "Ingestion run completed");
            }
            IngestEvent::RunAborted {
                run_id,
                error,
                kept,
            } => {
                tracing::warn!(%run_id, %error, %kept, "Ingestion run aborted");
            }
        }
    }
}
