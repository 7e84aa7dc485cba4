//! One-shot HTTP fetching.
//!
//! This module defines the [`FetchExecutor`], which turns a
//! [`RequestDescriptor`] into exactly one [`Outcome`]: either the decoded
//! payload or a classified [`FetchError`].  The network itself sits behind
//! the [`Transport`] trait so that tests (and alternative HTTP stacks) can be
//! plugged in without touching the executor.
//!
//! ## For contributors
//!
//! * Every failure travels through the returned `Outcome`, never through a
//!   panic or a second code path.
//! * The executor holds no mutable state.  Cloning it is cheap and calls may
//!   run concurrently.
//! * The default transport ([`HttpTransport`]) lives in [`transport`].

mod transport;

pub use transport::HttpTransport;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Result of every asynchronous operation in the data layer.
pub type Outcome<T> = Result<T, FetchError>;

/// Classified failure of a fetch.
///
/// `Clone` so that a feed can replay the same failure to many subscribers.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The request could not be built: malformed address or missing
    /// configuration (e.g. no API key).
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Connection-level failure.  The cause is carried opaquely.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    /// The server answered outside `200..300`.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// The body was not structured data of the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The response was well formed but lacked the requested element.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
}

// ---------------------------------------------------------------------------
// Request descriptor
// ---------------------------------------------------------------------------

/// An absolute `http(s)` address plus the shape `T` its body decodes into.
///
/// A descriptor can only be obtained through [`parse`](Self::parse) or
/// [`from_url`](Self::from_url), so holding one proves the address is valid.
pub struct RequestDescriptor<T> {
    url: Url,
    shape: PhantomData<fn() -> T>,
}

impl<T> RequestDescriptor<T> {
    /// Parse `address` into a descriptor.
    ///
    /// Relative addresses, garbage, and non-HTTP schemes are rejected with
    /// [`FetchError::InvalidAddress`].
    pub fn parse(address: &str) -> Result<Self, FetchError> {
        let url = Url::parse(address).map_err(|e| FetchError::InvalidAddress(e.to_string()))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, FetchError> {
        match url.scheme() {
            "http" | "https" => Ok(Self {
                url,
                shape: PhantomData,
            }),
            other => Err(FetchError::InvalidAddress(format!(
                "unsupported scheme `{other}`"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl<T> Clone for RequestDescriptor<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            shape: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RequestDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("endpoint", &Redacted(&self.url))
            .field("shape", &std::any::type_name::<T>())
            .finish()
    }
}

/// Displays a URL without its query string, which carries the API key.
struct Redacted<'a>(&'a Url);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.0.scheme(),
            self.0.host_str().unwrap_or_default(),
            self.0.path()
        )
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Opaque connection-level failure reported by a [`Transport`].
pub type TransportFailure = Box<dyn std::error::Error + Send + Sync>;

/// Performs a single GET round trip.
///
/// Implementations must not retry and must report any received response,
/// whatever its status, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportFailure>;
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Stateless one-shot fetcher.
///
/// Constructed explicitly and passed to whoever needs it; there is no
/// process-wide instance.
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
}

impl FetchExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Executor backed by the default reqwest transport.
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// Validate `address`, then [`execute`](Self::execute) it.
    ///
    /// An invalid address resolves to [`FetchError::InvalidAddress`] without
    /// touching the transport.
    pub async fn fetch<T: DeserializeOwned>(&self, address: &str) -> Outcome<T> {
        let descriptor = RequestDescriptor::<T>::parse(address)?;
        self.execute(&descriptor).await
    }

    /// Perform exactly one round trip for `descriptor` and decode the body.
    pub async fn execute<T: DeserializeOwned>(&self, descriptor: &RequestDescriptor<T>) -> Outcome<T> {
        let endpoint = Redacted(descriptor.url());
        debug!(%endpoint, "fetching");

        let response = self.transport.get(descriptor.url()).await.map_err(|e| {
            warn!(%endpoint, error = %e, "transport failure");
            FetchError::Transport(Arc::from(e))
        })?;

        if !(200..300).contains(&response.status) {
            warn!(%endpoint, status = response.status, "unexpected status");
            return Err(FetchError::UnexpectedStatus(response.status));
        }

        decode(&response.body).inspect_err(|e| warn!(%endpoint, error = %e, "undecodable body"))
    }
}

impl fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchExecutor").finish_non_exhaustive()
    }
}

/// Decode a response body into `T`.
///
/// The body must be a JSON object; field-level leniency is the job of `T`'s
/// `Deserialize` impl (see [`crate::model`]).
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Outcome<T> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    if !value.is_object() {
        return Err(FetchError::Decode("expected a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
