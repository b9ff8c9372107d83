//! Third-party catalog API proxy
//!
//! Forwards allow-listed GET requests to the catalog API. Concurrent
//! identical requests are collapsed into one upstream call, and successful
//! responses are marked cacheable for the edge with a fixed revalidation
//! window.

pub mod coalesce;
pub mod target;

pub use coalesce::{FetchError, RequestCoalescer};
pub use target::{cache_key, TargetError, UpstreamPolicy};

use axum::body::Bytes;
use bib_common::config::CatalogConfig;
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("bib-server/", env!("CARGO_PKG_VERSION"));

/// Upstream reply as relayed to clients
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct CatalogProxy {
    policy: UpstreamPolicy,
    client: Client,
    api_key: Option<String>,
    bearer_token: Option<String>,
    cache_control: String,
    coalescer: RequestCoalescer<UpstreamResponse>,
}

impl CatalogProxy {
    pub fn new(config: &CatalogConfig) -> bib_common::Result<Self> {
        let policy = UpstreamPolicy::new(config)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| bib_common::Error::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            policy,
            client,
            api_key: config.api_key.clone(),
            bearer_token: config.bearer_token.clone(),
            cache_control: format!(
                "public, max-age=0, s-maxage={}, stale-while-revalidate={}",
                config.revalidate_secs, config.stale_while_revalidate_secs
            ),
            coalescer: RequestCoalescer::new(),
        })
    }

    /// Decode and allow-list a `u` parameter into its canonical URL
    pub fn resolve(&self, encoded: &str) -> Result<Url, TargetError> {
        self.policy.resolve(encoded)
    }

    /// `Cache-Control` value for successful responses
    pub fn cache_control(&self) -> &str {
        &self.cache_control
    }

    pub async fn in_flight(&self) -> usize {
        self.coalescer.in_flight().await
    }

    /// Fetch a canonical URL, sharing any identical call already in flight
    pub async fn fetch(&self, canonical: &Url) -> Result<Arc<UpstreamResponse>, FetchError> {
        let key = canonical.as_str().to_string();
        let request = self.build_request(canonical);

        self.coalescer
            .run(&key, move || async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

                debug!(status, bytes = body.len(), "Catalog upstream responded");
                Ok(UpstreamResponse {
                    status,
                    content_type,
                    body,
                })
            })
            .await
    }

    /// Upstream request with credentials added; credentials never reach the
    /// coalescing key or the edge cache key
    fn build_request(&self, canonical: &Url) -> reqwest::RequestBuilder {
        let mut url = canonical.clone();
        if let Some(api_key) = &self.api_key {
            url.query_pairs_mut().append_pair("api_key", api_key);
        }

        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        request
    }
}
