use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use mercure_core::error::AppError;
use mercure_core::traits::CredentialSource;

pub const DEFAULT_TOKEN_URL: &str =
    "https://entreprise.francetravail.fr/connexion/oauth2/access_token?realm=%2Fpartenaire";

const TOKEN_SCOPE: &str = "api_offresdemploiv2 o2dsoffre";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh this long before the recorded expiry so a token is never
/// presented in its final moments.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A short-lived bearer credential. Replaced wholesale on refresh,
/// never mutated in place.
#[derive(Debug, Clone)]
struct Credential {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials lease for the France Travail API.
///
/// Caches the exchanged token until shortly before its recorded expiry.
/// A downstream 401 is handled by [`invalidate`](CredentialSource::invalidate),
/// which forces the next [`ensure_token`](CredentialSource::ensure_token)
/// to re-exchange regardless of the recorded expiry.
#[derive(Debug, Clone)]
pub struct OAuthCredentialLease {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Arc<Mutex<Option<Credential>>>,
}

impl OAuthCredentialLease {
    /// Fails fast with [`AppError::Config`] on an empty identifier or
    /// secret: a precondition check, not a runtime error path.
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, AppError> {
        if client_id.trim().is_empty() {
            return Err(AppError::Config("client id must not be empty".into()));
        }
        if client_secret.trim().is_empty() {
            return Err(AppError::Config("client secret must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            client,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Arc::new(Mutex::new(None)),
        })
    }

    /// Point the lease at a different token endpoint (e.g. a sandbox).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn lock_cached(&self) -> MutexGuard<'_, Option<Credential>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached_token(&self) -> Option<String> {
        self.lock_cached()
            .as_ref()
            .filter(|c| Instant::now() < c.expires_at)
            .map(|c| c.token.clone())
    }

    async fn exchange(&self) -> Result<Credential, AppError> {
        tracing::debug!(endpoint = %self.token_url, "Exchanging client credentials");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", TOKEN_SCOPE),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "token exchange failed (HTTP {}): {body}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("unreadable token response: {e}")))?;

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Auth("token response lacks a usable access_token".into()))?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(0));
        Ok(Credential {
            token,
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

impl CredentialSource for OAuthCredentialLease {
    async fn ensure_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let credential = self.exchange().await?;
        let token = credential.token.clone();
        *self.lock_cached() = Some(credential);
        Ok(token)
    }

    fn invalidate(&self) {
        self.lock_cached().take();
    }
}
