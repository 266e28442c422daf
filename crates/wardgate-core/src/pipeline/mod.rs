//! Secure search pipeline
//!
//! The top-level orchestrator: fetch candidates from the index, clear
//! each one through the remote policy service under a bounded
//! concurrency window, narrow further with local security rules,
//! sanitize what survives, and emit one audit event per invocation.
//! Nothing leaves this module still carrying internal security labels.
//!
//! Each invocation is a pure request/response pass; the pipeline keeps
//! no state between calls.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AccessOutcome, AuditEvent, AuditSink, TracingAuditSink};
use crate::authz::{AuthorizationGateway, BatchAuthorizer};
use crate::config::{Config, PipelineConfig};
use crate::error::{Error, Result};
use crate::identity::{Requester, RoleMatrix, StaffRole};
use crate::policy::{AccessAction, HttpPolicyClient, PolicyClient};
use crate::record::{CandidateRecord, ResourceType, Suggestion};
use crate::rules::SecurityRuleSet;
use crate::search::{HttpSearchBackend, SearchBackend, SearchRequest};

/// Denial cause recorded when the remote policy service rejects
const CAUSE_POLICY_DENIED: &str = "policy_denied";

/// What one search invocation removed and why, in aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySummary {
    /// Role the search ran under
    pub requester_role: StaffRole,
    /// Department the search ran under
    pub department: String,
    /// Candidates fetched minus candidates returned
    pub filtered_count: usize,
}

/// Sanitized results of one search invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureSearchResults {
    /// Authorized, sanitized hits in index order
    pub results: Vec<CandidateRecord>,
    /// Total matches reported by the index, before authorization
    pub total_hits: u64,
    /// Index-side query time in milliseconds
    pub took_ms: u64,
    /// Aggregate filtering info for this invocation
    pub security: SecuritySummary,
}

/// Builder for creating a SecureSearchPipeline
pub struct SecureSearchPipelineBuilder {
    backend: Option<Arc<dyn SearchBackend>>,
    policy: Option<Arc<dyn PolicyClient>>,
    audit: Option<Arc<dyn AuditSink>>,
    matrix: RoleMatrix,
    settings: PipelineConfig,
}

impl Default for SecureSearchPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureSearchPipelineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            backend: None,
            policy: None,
            audit: None,
            matrix: RoleMatrix::default(),
            settings: Config::default().pipeline,
        }
    }

    /// Set the search backend
    pub fn backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the policy client
    pub fn policy(mut self, policy: Arc<dyn PolicyClient>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the audit sink (defaults to the tracing sink)
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the role matrix
    pub fn matrix(mut self, matrix: RoleMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    /// Set the pipeline tunables
    pub fn settings(mut self, settings: PipelineConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Build the SecureSearchPipeline
    pub fn build(self) -> Result<SecureSearchPipeline> {
        let backend = self
            .backend
            .ok_or_else(|| Error::Config("search backend is required".to_string()))?;
        let policy = self
            .policy
            .ok_or_else(|| Error::Config("policy client is required".to_string()))?;
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink::new()));

        let gateway = AuthorizationGateway::new(policy);
        let authorizer = BatchAuthorizer::new(gateway, self.settings.authorization_window);
        let rules = SecurityRuleSet::new(self.matrix);

        Ok(SecureSearchPipeline {
            backend,
            authorizer,
            rules,
            audit,
            settings: self.settings,
        })
    }
}

/// Authorization-filtered search over sensitive records
pub struct SecureSearchPipeline {
    backend: Arc<dyn SearchBackend>,
    authorizer: BatchAuthorizer,
    rules: SecurityRuleSet,
    audit: Arc<dyn AuditSink>,
    settings: PipelineConfig,
}

impl std::fmt::Debug for SecureSearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSearchPipeline")
            .field("authorization_window", &self.authorizer.window())
            .field("max_page_size", &self.settings.max_page_size)
            .finish()
    }
}

impl SecureSearchPipeline {
    /// Create a new builder for SecureSearchPipeline
    pub fn builder() -> SecureSearchPipelineBuilder {
        SecureSearchPipelineBuilder::new()
    }

    /// Build a pipeline wired to the HTTP collaborators in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder_from_config(config)?.build()
    }

    /// Builder pre-wired to the HTTP collaborators in `config`
    ///
    /// Lets callers swap the audit sink or role matrix before building.
    pub fn builder_from_config(config: &Config) -> Result<SecureSearchPipelineBuilder> {
        let mut backend = HttpSearchBackend::builder()
            .base_url(&config.search.base_url)
            .timeout_secs(config.search.timeout_secs);
        if let Some(token) = config
            .search
            .resolved_auth_token()
            .map_err(|e| Error::Config(e.to_string()))?
        {
            backend = backend.auth_token(token);
        }

        let mut policy = HttpPolicyClient::builder()
            .base_url(&config.policy.base_url)
            .timeout_secs(config.policy.timeout_secs);
        if let Some(token) = config
            .policy
            .resolved_auth_token()
            .map_err(|e| Error::Config(e.to_string()))?
        {
            policy = policy.auth_token(token);
        }

        Ok(Self::builder()
            .backend(Arc::new(backend.build()?))
            .policy(Arc::new(policy.build()?))
            .settings(config.pipeline.clone()))
    }

    /// Search the index and return only what the requester may see
    ///
    /// The department filter is forced to the requester's own department
    /// for roles without cross-department scope, regardless of what the
    /// caller asked for. A search that ends with zero authorized results
    /// is a success with an empty result set, not an error.
    pub async fn secure_search(
        &self,
        requester: &Requester,
        request: SearchRequest,
    ) -> Result<SecureSearchResults> {
        let mut request = request;
        request.query = request.query.trim().to_string();
        if request.query.is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        request.page_size = request.page_size.min(self.settings.max_page_size);

        if !self.rules.matrix().is_department_unrestricted(requester.role) {
            request.filters.department = Some(requester.department.clone());
        }

        let response = self.backend.search(&request).await?;
        let raw_count = response.hits.len();

        let now = Utc::now();
        let authorized = self
            .authorizer
            .filter_authorized(requester, response.hits, AccessAction::Search, now)
            .await;
        let cleared = self.rules.filter(requester, authorized, now);
        let results: Vec<CandidateRecord> = cleared.iter().map(|r| r.sanitized()).collect();

        let filtered_count = raw_count - results.len();

        info!(
            requester = %requester.id,
            query = %request.query,
            fetched = raw_count,
            returned = results.len(),
            filtered = filtered_count,
            "Search complete"
        );

        self.emit_audit(AuditEvent::search(
            requester,
            &request.query,
            results.len(),
            filtered_count,
        ))
        .await;

        Ok(SecureSearchResults {
            results,
            total_hits: response.total_hits,
            took_ms: response.took_ms,
            security: SecuritySummary {
                requester_role: requester.role,
                department: requester.department.clone(),
                filtered_count,
            },
        })
    }

    /// Fetch one record if the requester is entitled to see it
    ///
    /// A missing record and a denied record are distinct conditions, but
    /// a denial never says which gate rejected it.
    pub async fn get_authorized_record(
        &self,
        requester: &Requester,
        record_id: &str,
    ) -> Result<CandidateRecord> {
        let record_id = record_id.trim();
        if record_id.is_empty() {
            return Err(Error::InvalidInput("record id must not be empty".to_string()));
        }

        let Some(candidate) = self.backend.get_record(record_id).await? else {
            self.emit_audit(AuditEvent::record_access(
                requester,
                record_id,
                AccessOutcome::NotFound,
                None,
            ))
            .await;
            return Err(Error::RecordNotFound(record_id.to_string()));
        };

        let now = Utc::now();
        let decision = self
            .authorizer
            .gateway()
            .authorize(requester, AccessAction::Read, &candidate, now)
            .await;
        if !decision.is_allowed() {
            self.emit_audit(AuditEvent::record_access(
                requester,
                record_id,
                AccessOutcome::Denied,
                Some(CAUSE_POLICY_DENIED.to_string()),
            ))
            .await;
            return Err(Error::AccessDenied);
        }

        if let Err(violation) = self.rules.evaluate(requester, &candidate, now) {
            self.emit_audit(AuditEvent::record_access(
                requester,
                record_id,
                AccessOutcome::Denied,
                Some(violation.as_str().to_string()),
            ))
            .await;
            return Err(Error::AccessDenied);
        }

        info!(requester = %requester.id, record = %record_id, "Record access granted");

        self.emit_audit(AuditEvent::record_access(
            requester,
            record_id,
            AccessOutcome::Granted,
            None,
        ))
        .await;

        Ok(candidate.sanitized())
    }

    /// Fetch typeahead suggestions scoped to the requester's department
    ///
    /// Suggestions skip per-item policy checks; non-privileged roles get
    /// a local department-equality filter instead, and department-less
    /// suggestions survive it only for department-agnostic resource
    /// types.
    pub async fn get_authorized_suggestions(
        &self,
        requester: &Requester,
        prefix: &str,
        resource_type: Option<ResourceType>,
    ) -> Result<Vec<Suggestion>> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::InvalidInput("prefix must not be empty".to_string()));
        }

        let raw = self
            .backend
            .suggest(prefix, resource_type, self.settings.suggestion_limit)
            .await?;
        let raw_count = raw.len();

        let unrestricted = self.rules.matrix().is_department_unrestricted(requester.role);
        let suggestions: Vec<Suggestion> = raw
            .into_iter()
            .filter(|suggestion| {
                if unrestricted {
                    return true;
                }
                match &suggestion.department {
                    Some(department) => *department == requester.department,
                    None => suggestion.resource_type.is_department_agnostic(),
                }
            })
            .map(|suggestion| suggestion.sanitized())
            .collect();

        self.emit_audit(AuditEvent::suggest(
            requester,
            prefix,
            suggestions.len(),
            raw_count - suggestions.len(),
        ))
        .await;

        Ok(suggestions)
    }

    /// Hand an event to the audit sink, swallowing any failure
    async fn emit_audit(&self, event: AuditEvent) {
        // Don't fail the request if audit emission fails
        if let Err(e) = self.audit.emit(&event).await {
            warn!(error = %e, action = %event.action, "Audit emission failed");
        }
    }
}
