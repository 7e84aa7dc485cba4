//! reqwest-backed [`Transport`].

use async_trait::async_trait;
use url::Url;

use super::{RawResponse, Transport, TransportFailure};

/// The default transport: a shared [`reqwest::Client`] with stock settings.
///
/// No custom timeout, retry, or redirect policy is applied.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportFailure> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}
