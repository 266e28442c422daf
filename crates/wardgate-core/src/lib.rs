//! Wardgate Core Library
//!
//! This crate provides the authorization-filtered search pipeline for
//! Wardgate, including:
//! - Requester identities and the role matrix
//! - Candidate records, sensitivity tiers, and the result sanitizer
//! - Search index and policy decision point clients
//! - Windowed batch authorization with fail-closed semantics
//! - Local security rules (shift, expiry, assignment, sensitivity)
//! - Audit events and sinks
//! - The secure search pipeline composing all of the above

pub mod identity;
pub mod record;
pub mod search;
pub mod policy;
pub mod authz;
pub mod rules;
pub mod audit;
pub mod pipeline;
pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditSink};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::identity::{Requester, StaffRole};
    pub use crate::pipeline::{SecureSearchPipeline, SecureSearchResults};
    pub use crate::policy::AccessAction;
    pub use crate::record::CandidateRecord;
    pub use crate::search::SearchRequest;
}
