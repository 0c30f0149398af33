use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar-date format the provider uses for air dates.
pub const AIR_DATE_FORMAT: &str = "%Y-%m-%d";

/// Host serving posters, stills and logos.
pub const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";

/// Absolute URL of an image `path` (as returned by the API, with a leading
/// slash) rendered at `size`, e.g. `w300`.
pub fn image_url(size: &str, path: &str) -> String {
    format!("{IMAGE_BASE_URL}/{size}/{}", path.trim_start_matches('/'))
}

/// Parses a provider air date (`YYYY-MM-DD`).
///
/// Missing, empty and malformed values all yield `None`; callers treat them
/// as "not aired yet" rather than as errors.
pub fn parse_air_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, AIR_DATE_FORMAT).ok()
}

/// Production status as reported by TMDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesStatus {
    ReturningSeries,
    InProduction,
    Planned,
    Pilot,
    Ended,
    Canceled,
    Unknown(String),
}

impl SeriesStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Returning Series" => SeriesStatus::ReturningSeries,
            "In Production" => SeriesStatus::InProduction,
            "Planned" => SeriesStatus::Planned,
            "Pilot" => SeriesStatus::Pilot,
            "Ended" => SeriesStatus::Ended,
            // TMDB has used both spellings
            "Canceled" | "Cancelled" => SeriesStatus::Canceled,
            other => SeriesStatus::Unknown(other.to_string()),
        }
    }

    /// True for statuses after which no new episodes are expected.
    pub fn is_finished(&self) -> bool {
        matches!(self, SeriesStatus::Ended | SeriesStatus::Canceled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub id: i64,
    pub name: String,
    pub logo_path: Option<String>,
    pub origin_country: Option<String>,
}

/// Summary of a season as embedded in the series details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonSummary {
    pub id: i64,
    pub name: String,
    pub season_number: i64,
    pub episode_count: i64,
    pub air_date: Option<String>,
}

/// `GET /tv/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesDetails {
    pub id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub homepage: Option<String>,
    pub poster_path: Option<String>,
    pub status: Option<String>,
    pub first_air_date: Option<String>,
    pub last_air_date: Option<String>,
    pub in_production: bool,
    pub number_of_seasons: i64,
    pub number_of_episodes: i64,
    pub networks: Vec<Network>,
    pub seasons: Vec<SeasonSummary>,
}

impl SeriesDetails {
    pub fn status(&self) -> SeriesStatus {
        SeriesStatus::parse(self.status.as_deref().unwrap_or_default())
    }

    /// Poster path when present and non-empty.
    pub fn poster(&self) -> Option<&str> {
        non_empty(self.poster_path.as_deref())
    }

    pub fn homepage(&self) -> Option<&str> {
        non_empty(self.homepage.as_deref())
    }
}

/// One episode inside `GET /tv/{id}/season/{n}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeDetails {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub episode_number: i64,
    pub episode_type: Option<String>,
    pub season_number: i64,
    pub runtime: Option<u32>,
    pub still_path: Option<String>,
}

impl EpisodeDetails {
    pub fn air_date(&self) -> Option<NaiveDate> {
        parse_air_date(self.air_date.as_deref())
    }

    pub fn overview(&self) -> Option<&str> {
        non_empty(self.overview.as_deref())
    }

    pub fn still(&self) -> Option<&str> {
        non_empty(self.still_path.as_deref())
    }

    /// Runtime in minutes when known and non-zero.
    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime.filter(|m| *m > 0)
    }

    /// True when overview, still image and runtime are all filled in.
    ///
    /// The provider usually fills these in some hours after an episode airs.
    pub fn has_complete_metadata(&self) -> bool {
        self.overview().is_some() && self.still().is_some() && self.runtime_minutes().is_some()
    }
}

/// `GET /tv/{id}/season/{n}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonDetails {
    pub id: i64,
    pub name: String,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub poster_path: Option<String>,
    pub season_number: i64,
    pub episodes: Vec<EpisodeDetails>,
}

/// One hit of `GET /search/tv`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResult {
    pub id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
    pub popularity: f64,
}

impl SearchResult {
    pub fn first_air_year(&self) -> Option<i32> {
        parse_air_date(self.first_air_date.as_deref()).map(|d| d.year())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub page: i64,
    pub total_pages: i64,
    pub total_results: i64,
    pub results: Vec<SearchResult>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}
