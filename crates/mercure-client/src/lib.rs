pub mod auth;
pub mod page_fetcher;

pub use auth::{DEFAULT_TOKEN_URL, OAuthCredentialLease};
pub use page_fetcher::{DEFAULT_SEARCH_URL, HttpPageFetcher, SOURCE_NAME};

use mercure_core::config::ConnectorConfig;
use mercure_core::connector::IngestionConnector;
use mercure_core::error::AppError;
use mercure_core::region::StaticRegionLookup;
use mercure_core::traits::RegionLookup;

/// The fully wired connector for the France Travail offers API.
pub type FranceTravailConnector =
    IngestionConnector<HttpPageFetcher<OAuthCredentialLease>, OAuthCredentialLease, StaticRegionLookup>;

/// Wire up a connector with the built-in static region table.
///
/// Fails fast on empty credentials or invalid configuration.
pub fn france_travail_connector(
    client_id: &str,
    client_secret: &str,
    config: ConnectorConfig,
) -> Result<FranceTravailConnector, AppError> {
    france_travail_connector_with_regions(client_id, client_secret, StaticRegionLookup, config)
}

/// Wire up a connector with an injected region-lookup collaborator
/// (e.g. a database-backed repository).
pub fn france_travail_connector_with_regions<L: RegionLookup>(
    client_id: &str,
    client_secret: &str,
    regions: L,
    config: ConnectorConfig,
) -> Result<IngestionConnector<HttpPageFetcher<OAuthCredentialLease>, OAuthCredentialLease, L>, AppError>
{
    let lease = OAuthCredentialLease::new(client_id, client_secret)?;
    let fetcher = HttpPageFetcher::with_timeout(lease.clone(), config.request_timeout)?;
    IngestionConnector::new(SOURCE_NAME, fetcher, lease, regions, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_construction_validates_credentials() {
        let err = france_travail_connector("", "secret", ConnectorConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = france_travail_connector("id", "", ConnectorConfig::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_connector_reports_its_source() {
        let connector =
            france_travail_connector("id", "secret", ConnectorConfig::default()).unwrap();
        assert_eq!(connector.source_name(), SOURCE_NAME);
    }
}
