//! HTTP fetch collaborator

use crate::{error::FetchError, Result, SimulationConfig};
use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::{debug, instrument};
use url::Url;

/// A successful GET response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// `Content-Length` header, when the server sent one
    pub content_length: Option<u64>,
    pub body: String,
}

impl FetchResponse {
    /// Creates a 200 response whose length header matches the body
    pub fn ok(body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
        }
    }

    /// Response size as reported to the event sink: the length header or 0
    pub fn response_bytes(&self) -> u64 {
        self.content_length.unwrap_or(0)
    }
}

/// Issues GET requests on behalf of a session
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`; any non-success status is an error
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchResponse, FetchError>;

    /// Download a media fragment. Only the status and length header matter,
    /// so implementations may discard the body.
    async fn fetch_segment(&self, url: &Url) -> std::result::Result<FetchResponse, FetchError> {
        self.fetch(url).await
    }
}

/// reqwest-backed fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| crate::Error::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &Url) -> std::result::Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "Fetched");

        Ok(FetchResponse {
            status,
            content_length,
            body,
        })
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_segment(&self, url: &Url) -> std::result::Result<FetchResponse, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let mut received = 0usize;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len();
        }

        debug!(status, bytes = received, "Fetched segment");

        Ok(FetchResponse {
            status,
            content_length,
            body: String::new(),
        })
    }
}
