//! The movie catalog: three independent feeds plus the trailer lookup.
//!
//! Every request is built from the configured API root and key.  A missing
//! key is an expected condition, not a startup error: requests that need it
//! resolve to [`FetchError::InvalidAddress`] without any network I/O.

use std::fmt;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::feed::Feed;
use crate::fetch::{FetchError, FetchExecutor, Outcome, RequestDescriptor};
use crate::model::{Movie, MovieResponse, Video, VideoResponse};

/// Endpoint behind [`FeedKind::Upcoming`].
///
/// Unconfirmed: an earlier client queried `tv/popular` for this section,
/// which returns TV shows rather than upcoming movies.  Change this constant
/// to switch the feed; nothing else depends on the value.
pub const UPCOMING_PATH: &str = "movie/upcoming";

/// The named feeds shown by the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Popular,
    TopRated,
    Upcoming,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [FeedKind::Popular, FeedKind::TopRated, FeedKind::Upcoming];

    /// Endpoint path relative to the API root.  Also the feed's log name.
    pub fn path(self) -> &'static str {
        match self {
            FeedKind::Popular => "movie/popular",
            FeedKind::TopRated => "movie/top_rated",
            FeedKind::Upcoming => UPCOMING_PATH,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FeedKind::Popular => "Popular Now",
            FeedKind::TopRated => "Top Rated",
            FeedKind::Upcoming => "Coming Soon",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Builds request descriptors from the API root and key.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    api_key: Option<String>,
}

impl Endpoints {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// `{base}/{path}?api_key={key}`.
    pub fn descriptor<T>(&self, path: &str) -> Result<RequestDescriptor<T>, FetchError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::InvalidAddress("API key is not configured".into()))?;

        let mut url = Url::parse(&format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .map_err(|e| FetchError::InvalidAddress(e.to_string()))?;
        url.query_pairs_mut().append_pair("api_key", key);
        RequestDescriptor::from_url(url)
    }
}

/// Owns the feeds for one session.
///
/// Clones share the same feeds.  Dropping every clone discards the feeds and,
/// with them, all subscriptions.
#[derive(Clone)]
pub struct Catalog {
    executor: FetchExecutor,
    endpoints: Arc<Endpoints>,
    popular: Feed<MovieResponse>,
    top_rated: Feed<MovieResponse>,
    upcoming: Feed<MovieResponse>,
}

impl Catalog {
    /// Build the feeds without fetching anything.
    pub fn new(config: &Config, executor: FetchExecutor) -> Self {
        let endpoints = Arc::new(Endpoints::new(config));
        let feed = |kind: FeedKind| -> Feed<MovieResponse> {
            let endpoints = Arc::clone(&endpoints);
            Feed::new(kind.to_string(), executor.clone(), move || {
                endpoints.descriptor(kind.path())
            })
        };

        Self {
            popular: feed(FeedKind::Popular),
            top_rated: feed(FeedKind::TopRated),
            upcoming: feed(FeedKind::Upcoming),
            executor,
            endpoints,
        }
    }

    /// Build the feeds and spawn each one's first refresh.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &Config, executor: FetchExecutor) -> Self {
        let catalog = Self::new(config, executor);
        catalog.refresh_all();
        catalog
    }

    pub fn feed(&self, kind: FeedKind) -> &Feed<MovieResponse> {
        match kind {
            FeedKind::Popular => &self.popular,
            FeedKind::TopRated => &self.top_rated,
            FeedKind::Upcoming => &self.upcoming,
        }
    }

    /// Spawn a refresh of every feed.
    pub fn refresh_all(&self) {
        for kind in FeedKind::ALL {
            self.feed(kind).spawn_refresh();
        }
    }

    /// Look up the YouTube trailer key for `movie`.
    ///
    /// Resolves once; the result is not stored anywhere.
    pub async fn trailer_key(&self, movie: &Movie) -> Outcome<String> {
        let id = movie
            .id
            .ok_or_else(|| FetchError::InvalidAddress("movie has no identifier".into()))?;
        let descriptor: RequestDescriptor<VideoResponse> =
            self.endpoints.descriptor(&format!("movie/{id}/videos"))?;

        let videos = self.executor.execute(&descriptor).await?;
        debug!(movie = id, candidates = videos.results.len(), "selecting trailer");
        select_trailer_key(&videos.results)
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("endpoints", &self.endpoints.base_url)
            .finish_non_exhaustive()
    }
}

/// Key of the first YouTube trailer, in server order.
pub fn select_trailer_key(videos: &[Video]) -> Outcome<String> {
    let trailer = videos
        .iter()
        .find(|v| v.is_youtube_trailer())
        .ok_or_else(|| FetchError::DataUnavailable("no YouTube trailer".into()))?;
    trailer
        .key
        .clone()
        .ok_or_else(|| FetchError::DataUnavailable("trailer has no key".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
