//! HTTP Providers
//!
//! JSON-over-HTTP adapters for the companion service.
//!
//! # Endpoints
//!
//! - `POST {base}/v1/turns` - body [`TurnRequest`], answer [`TurnResponse`]
//! - `GET {base}/v1/users/{id}/quota` - answer [`RemoteQuota`]
//!
//! Any non-2xx status is a failed call.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{QuotaProvider, RemoteQuota, TurnProvider, TurnRequest, TurnResponse};
use crate::messages::UserId;

/// Default request timeout for the HTTP client
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn check_status(response: reqwest::Response, what: &str) -> anyhow::Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("{what} returned {status}: {body}");
}

/// Turn provider backed by the companion HTTP service
#[derive(Clone)]
pub struct HttpTurnProvider {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpTurnProvider {
    /// Create a provider for `base_url` (no trailing slash needed)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http_client: build_client(timeout)?,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn turns_url(&self) -> String {
        format!("{}/v1/turns", self.base_url)
    }
}

#[async_trait]
impl TurnProvider for HttpTurnProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send_turn(&self, request: &TurnRequest) -> anyhow::Result<TurnResponse> {
        let mut builder = self.http_client.post(self.turns_url()).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = check_status(builder.send().await?, "Turn service").await?;
        Ok(response.json::<TurnResponse>().await?)
    }
}

/// Quota provider backed by the companion HTTP service
#[derive(Clone)]
pub struct HttpQuotaProvider {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpQuotaProvider {
    /// Create a provider for `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http_client: build_client(timeout)?,
        })
    }

    /// Send `Authorization: Bearer <key>` with every request
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// The user id is one percent-encoded path segment
    fn quota_url(&self, user_id: &UserId) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("Base URL cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(["v1", "users", user_id.as_str(), "quota"]);
        Ok(url)
    }
}

#[async_trait]
impl QuotaProvider for HttpQuotaProvider {
    async fn fetch_quota(&self, user_id: &UserId) -> anyhow::Result<RemoteQuota> {
        let mut builder = self.http_client.get(self.quota_url(user_id)?);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = check_status(builder.send().await?, "Quota service").await?;
        Ok(response.json::<RemoteQuota>().await?)
    }
}
