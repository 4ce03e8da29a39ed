use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use mercure_core::backoff::parse_retry_after;
use mercure_core::error::AppError;
use mercure_core::traits::{CredentialSource, PageFetch};

/// Constant identifier of this connector's upstream.
pub const SOURCE_NAME: &str = "france-travail";

pub const DEFAULT_SEARCH_URL: &str =
    "https://api.francetravail.io/partenaire/offresdemploi/v2/offres/search";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One page of the listing endpoint. Records stay opaque JSON; only the
/// normalizer knows which fields matter.
#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resultats: Vec<Value>,
}

/// HTTP page fetcher for the France Travail listing endpoint.
///
/// Performs exactly one bounded attempt per call and classifies the
/// outcome into the closed [`AppError`] taxonomy; retries, credential
/// refresh, and circuit breaking are the paginator's concern.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher<C: CredentialSource> {
    client: Client,
    search_url: String,
    credentials: C,
    timeout_secs: u64,
}

impl<C: CredentialSource> HttpPageFetcher<C> {
    pub fn new(credentials: C) -> Result<Self, AppError> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: C, timeout: Duration) -> Result<Self, AppError> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .user_agent("Mercure/0.2 (job ingester)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            client,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            credentials,
            timeout_secs,
        })
    }

    /// Point the fetcher at a different listing endpoint (e.g. a sandbox).
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }
}

impl<C: CredentialSource> PageFetch for HttpPageFetcher<C> {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Value>, AppError> {
        let token = self.credentials.ensure_token().await?;
        let range = range_param(offset, limit);

        let response = self
            .client
            .get(&self.search_url)
            .bearer_auth(&token)
            .query(&[("range", range.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::Network(format!("Connection failed: {e}"))
                } else {
                    AppError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        match status.as_u16() {
            // 206 Partial Content is the nominal answer for a ranged query.
            200 | 206 => {
                let parsed: SearchResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::Network(format!("unreadable listing response: {e}")))?;
                Ok(parsed.resultats)
            }
            // No offers in the requested window.
            204 => Ok(Vec::new()),
            401 => Err(AppError::CredentialRejected),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now()));
                Err(AppError::RateLimited { retry_after })
            }
            code if status.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Server {
                    status: code,
                    message: body_snippet(&body),
                })
            }
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Client {
                    status: code,
                    message: body_snippet(&body),
                })
            }
        }
    }
}

/// Inclusive offset range, e.g. offset 0 / limit 150 → `"0-149"`.
fn range_param(offset: usize, limit: usize) -> String {
    format!("{}-{}", offset, offset + limit.max(1) - 1)
}

fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
