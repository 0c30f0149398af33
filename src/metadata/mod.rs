//! Read-only access to series, season and search metadata.
//!
//! - [`MetadataProvider`] is the seam the discovery engine and the catalog
//!   depend on
//! - [`TmdbClient`] implements it against the TMDB v3 REST API
//! - [`types`] holds the response snapshots and the small amount of logic
//!   attached to them (air-date parsing, status, completeness)

mod tmdb;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use tmdb::{TmdbClient, DEFAULT_BASE_URL, DEFAULT_LANGUAGE};
pub use types::{
    image_url, parse_air_date, EpisodeDetails, Network, SearchResult, SearchResults,
    SeasonDetails, SeriesDetails, SeriesStatus,
};

/// Errors returned by a metadata provider.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not the JSON shape we expected
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Base URL rejected at construction
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Source of series metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn series_details(&self, series_id: i64) -> Result<SeriesDetails, MetadataError>;

    async fn season_details(
        &self,
        series_id: i64,
        season_number: i64,
    ) -> Result<SeasonDetails, MetadataError>;

    async fn search_series(&self, query: &str) -> Result<SearchResults, MetadataError>;
}
