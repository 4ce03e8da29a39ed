use std::future::Future;

use crate::error::AppError;

/// Fetches one page of raw offer records from the upstream listing
/// endpoint: at most `limit` records starting at `offset`, in upstream
/// order. A single bounded attempt: retries, credential refresh, and
/// circuit breaking happen in the layer above.
pub trait PageFetch: Send + Sync + Clone {
    fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, AppError>> + Send;
}

/// Provides the short-lived bearer credential for upstream calls.
///
/// `ensure_token` returns the cached token while it is still valid and
/// performs a client-credentials exchange otherwise. `invalidate` drops
/// the cached credential so the next `ensure_token` is forced to
/// re-exchange, used when the upstream answers 401 despite a token that
/// looked unexpired.
pub trait CredentialSource: Send + Sync + Clone {
    fn ensure_token(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    fn invalidate(&self);
}

/// Maps a department code to an internal region id.
///
/// `None` means the code is unknown: a normal outcome for partial
/// upstream data, not an error.
pub trait RegionLookup: Send + Sync + Clone {
    fn find_by_code(&self, code: &str) -> impl Future<Output = Option<i32>> + Send;
}
