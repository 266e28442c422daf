//! Search backend contract
//!
//! The index provider owns ranking, tokenization, faceting, and
//! pagination. This module defines the query and result shapes exchanged
//! with it and the [`SearchBackend`] trait the HTTP implementation and
//! test doubles plug into. Hits arrive here still carrying internal
//! security labels; nothing in this module filters or strips them.

mod client;

pub use client::HttpSearchBackend;

use crate::record::{CandidateRecord, ResourceType, Suggestion};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default page size when the caller does not pick one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Named filters forwarded to the index
///
/// The index owns the vocabulary for priority tiers and date buckets;
/// they pass through as opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict hits to one department
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Restrict hits to one resource type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,

    /// Priority tier, e.g. "stat" or "routine"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    /// Relative date bucket, e.g. "last_7_days"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_bucket: Option<String>,
}

/// One query against the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query string
    pub query: String,

    /// Named filters
    #[serde(default)]
    pub filters: SearchFilters,

    /// 1-based page number
    pub page: u32,

    /// Hits per page
    pub page_size: u32,
}

impl SearchRequest {
    /// Create a request for the given query with default pagination
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the department filter
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.filters.department = Some(department.into());
        self
    }

    /// Set the resource type filter
    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.filters.resource_type = Some(resource_type);
        self
    }

    /// Set the priority tier filter
    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.filters.priority = Some(priority.into());
        self
    }

    /// Set the date bucket filter
    pub fn with_date_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.filters.date_bucket = Some(bucket.into());
        self
    }

    /// Set the page number
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// One page of hits from the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Hits in index ranking order, labels included
    pub hits: Vec<CandidateRecord>,

    /// Total matching records across all pages
    pub total_hits: u64,

    /// Facet counts, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<serde_json::Value>,

    /// Index-side query time in milliseconds
    #[serde(default)]
    pub took_ms: u64,
}

/// External search index collaborator
///
/// A failed `search` or `get_record` call is fatal to the invocation
/// that issued it; there is nothing to filter without candidates.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a full-text query and return one page of candidate hits
    async fn search(&self, request: &SearchRequest) -> crate::error::Result<SearchResponse>;

    /// Fetch a single candidate by identifier
    ///
    /// `Ok(None)` means the index has no such record; errors mean the
    /// index could not answer.
    async fn get_record(&self, id: &str) -> crate::error::Result<Option<CandidateRecord>>;

    /// Fetch typeahead suggestions for a partial query
    async fn suggest(
        &self,
        prefix: &str,
        resource_type: Option<ResourceType>,
        limit: usize,
    ) -> crate::error::Result<Vec<Suggestion>>;
}
