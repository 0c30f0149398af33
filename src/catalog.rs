//! Cached series lookups for interactive commands.
//!
//! Point lookups read through a [`TtlCache`]; the discovery pass writes fresh
//! details into the same cache so a watchlist command run shortly after a
//! pass does not hit the provider again.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::metadata::{MetadataError, MetadataProvider, SeriesDetails};

/// One selectable search hit, e.g. `"The Wire (2002)"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchChoice {
    pub label: String,
    pub id: i64,
}

pub struct SeriesCatalog {
    provider: Arc<dyn MetadataProvider>,
    details: TtlCache<i64, SeriesDetails>,
    searches: TtlCache<String, Vec<SearchChoice>>,
}

impl SeriesCatalog {
    pub fn new(provider: Arc<dyn MetadataProvider>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            provider,
            details: TtlCache::new(capacity, ttl),
            searches: TtlCache::new(capacity, ttl),
        }
    }

    /// Details for `series_id`, from the cache when fresh.
    pub async fn series_details(&self, series_id: i64) -> Result<SeriesDetails, MetadataError> {
        if let Some(details) = self.details.get(&series_id) {
            tracing::debug!(series_id, "Series details cache hit");
            return Ok(details);
        }
        self.refresh_series_details(series_id).await
    }

    /// Fetches details from the provider and replaces the cached copy.
    pub async fn refresh_series_details(
        &self,
        series_id: i64,
    ) -> Result<SeriesDetails, MetadataError> {
        let details = self.provider.series_details(series_id).await?;
        self.details.add(series_id, details.clone());
        Ok(details)
    }

    /// Search choices for `query`, keyed by the raw query string.
    ///
    /// Hits without a parseable first air date are dropped. An empty result
    /// is cached like any other.
    pub async fn search_series(&self, query: &str) -> Result<Vec<SearchChoice>, MetadataError> {
        if let Some(choices) = self.searches.get(&query.to_string()) {
            return Ok(choices);
        }

        let results = self.provider.search_series(query).await?;
        let choices: Vec<SearchChoice> = results
            .results
            .iter()
            .filter_map(|hit| {
                let year = hit.first_air_year()?;
                Some(SearchChoice {
                    label: format!("{} ({})", hit.name, year),
                    id: hit.id,
                })
            })
            .collect();

        tracing::debug!(query, hits = results.results.len(), choices = choices.len(), "Series search");
        self.searches.add(query.to_string(), choices.clone());
        Ok(choices)
    }
}
