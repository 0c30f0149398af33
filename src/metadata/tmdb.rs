use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::types::{SeasonDetails, SearchResults, SeriesDetails};
use super::{MetadataError, MetadataProvider};
use crate::util::validate_api_base;

/// Public TMDB v3 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Locale sent with every request.
pub const DEFAULT_LANGUAGE: &str = "en-US";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// TMDB REST client authenticated with a v4 read access token.
///
/// Requests are spaced at least `1 / requests_per_second` apart across all
/// tasks sharing this client. Waiting for a slot only adds latency; it never
/// fails a request.
pub struct TmdbClient {
    http: reqwest::Client,
    base: Url,
    token: SecretString,
    language: String,
    min_interval_ms: u64,
    started: Instant,
    last_request_ms: AtomicU64,
}

impl TmdbClient {
    /// Creates a client for `base_url`.
    ///
    /// `requests_per_second == 0` disables spacing entirely.
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        token: SecretString,
        language: impl Into<String>,
        requests_per_second: u32,
    ) -> Result<Self, MetadataError> {
        let base = validate_api_base(base_url)
            .map_err(|e| MetadataError::InvalidBaseUrl(e.to_string()))?;
        let min_interval_ms = if requests_per_second == 0 {
            0
        } else {
            1000 / u64::from(requests_per_second)
        };

        Ok(Self {
            http,
            base,
            token,
            language: language.into(),
            min_interval_ms,
            started: Instant::now(),
            last_request_ms: AtomicU64::new(0),
        })
    }

    /// Milliseconds since the client was created, never going backward.
    fn monotonic_ms(&self) -> u64 {
        // Offset by one so that 0 keeps meaning "no request yet"
        self.started.elapsed().as_millis() as u64 + 1
    }

    /// Waits until this request may be sent.
    ///
    /// A slot is claimed with compare-exchange so concurrent callers cannot
    /// both take the same one.
    async fn throttle(&self) {
        if self.min_interval_ms == 0 {
            return;
        }

        loop {
            let now = self.monotonic_ms();
            let last = self.last_request_ms.load(Ordering::Acquire);
            let next_allowed = if last == 0 {
                0
            } else {
                last.saturating_add(self.min_interval_ms)
            };

            if now >= next_allowed {
                match self.last_request_ms.compare_exchange(
                    last,
                    now,
                    Ordering::Release,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    // Another caller won the slot, recompute
                    Err(_) => continue,
                }
            }

            let wait_ms = next_allowed.saturating_sub(now).max(1);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, MetadataError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| MetadataError::InvalidBaseUrl(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("language", &self.language);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, MetadataError> {
        self.throttle().await;
        tracing::debug!(url = %url, "Hitting TMDB endpoint");

        let request = self
            .http
            .get(url.clone())
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/json");

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| MetadataError::Timeout)?
            .map_err(MetadataError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "TMDB returned non-2xx status");
            return Err(MetadataError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| MetadataError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn series_details(&self, series_id: i64) -> Result<SeriesDetails, MetadataError> {
        let url = self.endpoint(&format!("tv/{series_id}"), &[])?;
        self.get_json(url).await
    }

    async fn season_details(
        &self,
        series_id: i64,
        season_number: i64,
    ) -> Result<SeasonDetails, MetadataError> {
        let url = self.endpoint(&format!("tv/{series_id}/season/{season_number}"), &[])?;
        self.get_json(url).await
    }

    async fn search_series(&self, query: &str) -> Result<SearchResults, MetadataError> {
        let url = self.endpoint("search/tv", &[("query", query), ("include_adult", "false")])?;
        self.get_json(url).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, MetadataError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(MetadataError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(MetadataError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(MetadataError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, rps: u32) -> TmdbClient {
        TmdbClient::new(
            reqwest::Client::new(),
            &server.uri(),
            SecretString::from("test-token".to_string()),
            DEFAULT_LANGUAGE,
            rps,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_series_details_sends_auth_and_language() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tv/1396"))
            .and(query_param("language", "en-US"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": 1396, "name": "Breaking Bad", "status": "Ended", "number_of_seasons": 5}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let details = client(&server, 0).series_details(1396).await.unwrap();
        assert_eq!(details.name, "Breaking Bad");
        assert_eq!(details.number_of_seasons, 5);
        assert!(details.status().is_finished());
    }

    #[tokio::test]
    async fn test_season_details_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tv/1396/season/5"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id": 1, "season_number": 5, "episodes": [
                    {"episode_number": 1, "season_number": 5, "name": "Live Free or Die", "air_date": "2012-07-15", "runtime": 43},
                    {"episode_number": 2, "season_number": 5, "name": "Madrigal", "air_date": null}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let season = client(&server, 0).season_details(1396, 5).await.unwrap();
        assert_eq!(season.season_number, 5);
        assert_eq!(season.episodes.len(), 2);
        assert_eq!(season.episodes[0].runtime_minutes(), Some(43));
        assert_eq!(season.episodes[1].air_date(), None);
    }

    #[tokio::test]
    async fn test_search_sends_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("query", "the wire"))
            .and(query_param("include_adult", "false"))
            .and(query_param("language", "en-US"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"page": 1, "total_pages": 1, "total_results": 1,
                    "results": [{"id": 1438, "name": "The Wire", "first_air_date": "2002-06-02"}]}"#,
            ))
            .mount(&server)
            .await;

        let results = client(&server, 0).search_series("the wire").await.unwrap();
        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].first_air_year(), Some(2002));
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(&server, 0).series_details(1).await;
        match result {
            Err(MetadataError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client(&server, 0).series_details(1).await;
        assert!(matches!(result, Err(MetadataError::Decode(_))));
    }

    #[tokio::test]
    async fn test_requests_are_spaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": 1}"#))
            .expect(3)
            .mount(&server)
            .await;

        // 10 rps -> at least 100ms between requests
        let c = client(&server, 10);
        let start = std::time::Instant::now();
        for _ in 0..3 {
            c.series_details(1).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_insecure_base_url_rejected() {
        let result = TmdbClient::new(
            reqwest::Client::new(),
            "http://api.themoviedb.org/3",
            SecretString::from("t".to_string()),
            DEFAULT_LANGUAGE,
            2,
        );
        assert!(matches!(result, Err(MetadataError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let c = TmdbClient::new(
            reqwest::Client::new(),
            DEFAULT_BASE_URL,
            SecretString::from("t".to_string()),
            "de-DE",
            0,
        )
        .unwrap();
        let url = c.endpoint("tv/42/season/3", &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.themoviedb.org/3/tv/42/season/3?language=de-DE"
        );
    }
}
