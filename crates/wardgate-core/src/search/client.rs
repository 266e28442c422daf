//! HTTP client for the search index

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{CandidateRecord, ResourceType, Suggestion};

use super::{SearchBackend, SearchRequest, SearchResponse};

/// Default per-request timeout for index calls
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Search index client over HTTP
#[derive(Clone)]
pub struct HttpSearchBackend {
    /// HTTP client for making requests
    http_client: HttpClient,
    /// Base URL of the index service
    base_url: String,
    /// Optional bearer token for service-to-service auth
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSearchBackend")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.is_some())
            .finish()
    }
}

/// Builder for creating an HttpSearchBackend
pub struct HttpSearchBackendBuilder {
    base_url: Option<String>,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for HttpSearchBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSearchBackendBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth_token: None,
            timeout_secs: None,
        }
    }

    /// Set the service base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the bearer token
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the HttpSearchBackend
    pub fn build(self) -> Result<HttpSearchBackend> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("search backend URL is required".to_string()))?;

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        Ok(HttpSearchBackend {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: self.auth_token,
        })
    }
}

impl HttpSearchBackend {
    /// Create a client for the given service base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        HttpSearchBackendBuilder::new().base_url(base_url).build()
    }

    /// Create a new builder for HttpSearchBackend
    pub fn builder() -> HttpSearchBackendBuilder {
        HttpSearchBackendBuilder::new()
    }

    /// Get the service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call the index health endpoint
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1/health", self.base_url);

        let response = self
            .request(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unavailable(status, response).await);
        }
        Ok(())
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn unavailable(status: StatusCode, response: reqwest::Response) -> Error {
        let body = response.text().await.unwrap_or_default();
        Error::SearchUnavailable(format!(
            "index returned {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        ))
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = format!("{}/v1/search", self.base_url);

        debug!(query = %request.query, page = request.page, "Sending index query");

        let response = self
            .request(self.http_client.post(&url).json(request))
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unavailable(status, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| Error::SearchUnavailable(format!("unrecognized response body: {}", e)))
    }

    async fn get_record(&self, id: &str) -> Result<Option<CandidateRecord>> {
        let url = format!("{}/v1/records/{}", self.base_url, id);

        debug!(record = %id, "Fetching record from index");

        let response = self
            .request(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::unavailable(status, response).await);
        }

        let record = response
            .json()
            .await
            .map_err(|e| Error::SearchUnavailable(format!("unrecognized response body: {}", e)))?;

        Ok(Some(record))
    }

    async fn suggest(
        &self,
        prefix: &str,
        resource_type: Option<ResourceType>,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let url = format!("{}/v1/suggest", self.base_url);

        let mut params: Vec<(&str, String)> = vec![
            ("q", prefix.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(rt) = resource_type {
            params.push(("type", rt.as_str().to_string()));
        }

        debug!(prefix = %prefix, limit = limit, "Fetching suggestions from index");

        let response = self
            .request(self.http_client.get(&url).query(&params))
            .send()
            .await
            .map_err(|e| Error::SearchUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unavailable(status, response).await);
        }

        let body: SuggestResponseBody = response
            .json()
            .await
            .map_err(|e| Error::SearchUnavailable(format!("unrecognized response body: {}", e)))?;

        Ok(body.suggestions)
    }
}

/// Wire shape of the suggest endpoint response
#[derive(Debug, Deserialize)]
struct SuggestResponseBody {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}
