//! HTTP client for the policy decision point
//!
//! Speaks a small JSON contract: one POST per check, one decision back.
//! Deployed policy services disagree about the response shape (a bare
//! boolean, an `allow` flag, or a `decision` string), so the client
//! normalizes all three and treats anything else as unavailability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

use super::{PolicyCheckRequest, PolicyClient, PolicyOutcome};

/// Path of the check endpoint under the service base URL
const CHECK_PATH: &str = "/v1/check";

/// Path of the health endpoint under the service base URL
const HEALTH_PATH: &str = "/v1/health";

/// Default per-request timeout; policy checks sit on the hot path
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Policy decision point client over HTTP
///
/// Thread-safe and cheap to clone; the underlying connection pool is
/// shared between clones.
#[derive(Clone)]
pub struct HttpPolicyClient {
    /// HTTP client for making requests
    http_client: HttpClient,
    /// Base URL of the policy service
    base_url: String,
    /// Optional bearer token for service-to-service auth
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpPolicyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPolicyClient")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.is_some())
            .finish()
    }
}

/// Builder for creating an HttpPolicyClient
pub struct HttpPolicyClientBuilder {
    base_url: Option<String>,
    auth_token: Option<String>,
    timeout_secs: Option<u64>,
}

impl Default for HttpPolicyClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPolicyClientBuilder {
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

    /// Build the HttpPolicyClient
    pub fn build(self) -> Result<HttpPolicyClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("policy service URL is required".to_string()))?;

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::PolicyUnavailable(e.to_string()))?;

        Ok(HttpPolicyClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: self.auth_token,
        })
    }
}

impl HttpPolicyClient {
    /// Create a client for the given service base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        HttpPolicyClientBuilder::new().base_url(base_url).build()
    }

    /// Create a new builder for HttpPolicyClient
    pub fn builder() -> HttpPolicyClientBuilder {
        HttpPolicyClientBuilder::new()
    }

    /// Get the service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Call the policy service health endpoint
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);

        let mut builder = self.http_client.get(&url);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::PolicyUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PolicyUnavailable(format!(
                "health endpoint returned {}",
                status
            )));
        }
        Ok(())
    }

    async fn send_check(&self, request: &PolicyCheckRequest) -> Result<PolicyOutcome> {
        let url = format!("{}{}", self.base_url, CHECK_PATH);

        debug!(
            subject = %request.subject.id,
            action = %request.action,
            resource = %request.resource.id,
            "Sending policy check"
        );

        let mut builder = self.http_client.post(&url).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::PolicyUnavailable(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::PolicyUnavailable(format!(
                "check endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body: PolicyResponseBody = response
            .json()
            .await
            .map_err(|e| Error::PolicyUnavailable(format!("unrecognized response body: {}", e)))?;

        Ok(body.normalize())
    }
}

#[async_trait]
impl PolicyClient for HttpPolicyClient {
    async fn check(&self, request: &PolicyCheckRequest) -> Result<PolicyOutcome> {
        self.send_check(request).await
    }
}

/// Response shapes policy services answer with
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolicyResponseBody {
    /// `{"allow": true}`
    Allow { allow: bool },
    /// `{"decision": "allow"}` or `{"decision": "deny"}`
    Decision { decision: String },
    /// A bare `true` or `false`
    Bare(bool),
}

impl PolicyResponseBody {
    /// Collapse every shape to allow or deny; only an explicit allow in a
    /// recognized field counts
    fn normalize(&self) -> PolicyOutcome {
        let allowed = match self {
            Self::Bare(value) => *value,
            Self::Allow { allow } => *allow,
            Self::Decision { decision } => decision.eq_ignore_ascii_case("allow"),
        };

        if allowed {
            PolicyOutcome::Allow
        } else {
            PolicyOutcome::Deny
        }
    }
}
