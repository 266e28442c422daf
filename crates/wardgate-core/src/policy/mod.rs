//! Remote policy service contract
//!
//! Every candidate a requester may see is cleared by an external policy
//! decision point. This module defines the check request the pipeline
//! sends, the normalized outcome it gets back, and the [`PolicyClient`]
//! trait the HTTP implementation and test doubles plug into.

mod client;

pub use client::HttpPolicyClient;

use crate::identity::Requester;
use crate::record::{CandidateRecord, ResourceType, SensitivityTier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action the requester is attempting against a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    /// Open a single record
    Read,
    /// See a record inside a result list
    Search,
    /// Export record content out of the system
    Export,
}

impl AccessAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Search => "search",
            Self::Export => "export",
        }
    }

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" => Some(Self::Read),
            "search" => Some(Self::Search),
            "export" => Some(Self::Export),
            _ => None,
        }
    }

    /// Get all actions
    pub fn all() -> Vec<Self> {
        vec![Self::Read, Self::Search, Self::Export]
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requester attributes forwarded to the policy service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySubject {
    /// Staff identifier
    pub id: String,
    /// Role name, snake_case
    pub role: String,
    /// Home department
    pub department: String,
    /// Whether the requester is inside their shift window right now
    pub on_shift: bool,
    /// Hard access expiry, absent for unbounded access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Patient identifiers the requester is assigned to
    #[serde(default)]
    pub assigned_patients: Vec<String>,
    /// Whether emergency access is asserted
    pub emergency_access: bool,
}

/// Record attributes forwarded to the policy service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyResource {
    /// Record identifier
    pub id: String,
    /// Kind of clinical resource
    pub resource_type: ResourceType,
    /// Owning department, absent for department-agnostic types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Subject patient, absent for patient-agnostic records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    /// Sensitivity tier
    pub sensitivity: SensitivityTier,
}

impl PolicyResource {
    /// Build the resource attributes from a candidate record
    pub fn from_record(record: &CandidateRecord) -> Self {
        Self {
            id: record.id.clone(),
            resource_type: record.resource_type,
            department: record.department.clone(),
            patient_id: record.patient_id.clone(),
            sensitivity: record.sensitivity,
        }
    }
}

/// One authorization question for the policy service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCheckRequest {
    /// Who is asking
    pub subject: PolicySubject,
    /// What they want to do
    pub action: AccessAction,
    /// What they want to do it to
    pub resource: PolicyResource,
}

impl PolicyCheckRequest {
    /// Assemble a check for one requester/record pair
    ///
    /// `on_shift` is computed by the caller because shift evaluation needs
    /// the current clock, which the policy layer does not own.
    pub fn new(
        requester: &Requester,
        action: AccessAction,
        record: &CandidateRecord,
        on_shift: bool,
    ) -> Self {
        Self {
            subject: PolicySubject {
                id: requester.id.clone(),
                role: requester.role.as_str().to_string(),
                department: requester.department.clone(),
                on_shift,
                access_expires_at: requester.access_expires_at,
                assigned_patients: requester.assigned_patients.clone(),
                emergency_access: requester.emergency_access,
            },
            action,
            resource: PolicyResource::from_record(record),
        }
    }
}

/// Normalized decision from a well-formed policy response
///
/// Transport failures and malformed bodies never reach this type; they
/// surface as errors from [`PolicyClient::check`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The service explicitly allowed the access
    Allow,
    /// Anything the service said that was not an explicit allow
    Deny,
}

impl PolicyOutcome {
    /// True only for an explicit allow
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Client for the external policy decision point
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Ask the service whether the described access is permitted
    ///
    /// Returns `Ok` only when the service produced a recognizable decision.
    /// Network failures, non-success statuses, and unrecognizable bodies
    /// are errors; callers treat them as unavailability, never as allow.
    async fn check(&self, request: &PolicyCheckRequest) -> crate::error::Result<PolicyOutcome>;
}
