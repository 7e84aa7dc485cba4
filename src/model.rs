//! Decoded catalog records.
//!
//! Upstream payloads are not guaranteed to be complete, so every record field
//! is optional and decodes leniently: a missing, `null`, or mistyped field
//! becomes `None` instead of failing the whole record.  Only a body that is
//! not structured data at all is a decode error (see [`crate::fetch::decode`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Image CDN prefix for poster paths (`w500` rendition).
pub const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Watch page prefix for YouTube video keys.
pub const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// A `{"results": [...]}` envelope.
///
/// A missing or non-array `results` decodes as empty; array entries that are
/// not records are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Page<T> {
    #[serde(default, deserialize_with = "lenient_list")]
    pub results: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
        }
    }
}

pub type MovieResponse = Page<Movie>;
pub type VideoResponse = Page<Video>;

/// A movie (or show) listing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Movie {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,

    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    /// CDN-relative poster path, e.g. `/abc.jpg`.
    #[serde(default, rename = "poster_path", deserialize_with = "lenient")]
    pub poster: Option<String>,
}

impl Movie {
    /// Full poster image address, if the record has a poster path.
    pub fn poster_url(&self) -> Option<String> {
        self.poster
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("{POSTER_BASE_URL}/{}", p.trim_start_matches('/')))
    }

    /// Title for display; `(untitled)` when absent.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// A video attached to a movie; candidates for the trailer lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Video {
    #[serde(default, deserialize_with = "lenient")]
    pub key: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub site: Option<String>,

    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub kind: Option<String>,
}

impl Video {
    pub fn is_youtube_trailer(&self) -> bool {
        self.kind.as_deref() == Some("Trailer") && self.site.as_deref() == Some("YouTube")
    }
}

/// Watch page for a YouTube video key.
pub fn trailer_watch_url(key: &str) -> String {
    format!("{YOUTUBE_WATCH_URL}{key}")
}

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(entries) => entries
            .into_iter()
            .filter(serde_json::Value::is_object)
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect(),
        _ => Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
