//! Audit events and sinks
//!
//! Every pipeline invocation produces exactly one [`AuditEvent`]: who
//! asked, what they asked for, and how many results they were shown.
//! Events are immutable once created and handed to an [`AuditSink`].
//! Emission is fire-and-forget at the call site; a sink failure must
//! never fail the request that triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::identity::{Requester, StaffRole};

/// Kind of pipeline invocation being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A bulk search
    Search,
    /// A typeahead suggestion request
    Suggest,
    /// A single-record access
    RecordAccess,
}

impl AuditAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Suggest => "suggest",
            Self::RecordAccess => "record_access",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a single-record access ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// The record was shown
    Granted,
    /// A policy or local rule rejected the access
    Denied,
    /// The index has no such record
    NotFound,
}

impl AccessOutcome {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for AccessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable audit record
///
/// Bulk search and suggestion events record counts only; single-record
/// events additionally record the target, the outcome, and the internal
/// denial cause when a local rule rejected the access. The cause never
/// leaves the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: Uuid,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Acting staff identifier
    pub requester_id: String,
    /// Acting staff role
    pub requester_role: StaffRole,
    /// Acting staff home department
    pub department: String,
    /// Kind of invocation
    pub action: AuditAction,
    /// Query text, for search and suggest events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Target record, for record access events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Results shown to the requester
    pub result_count: usize,
    /// Candidates removed between fetch and response
    pub filtered_count: usize,
    /// How the invocation ended
    pub outcome: AccessOutcome,
    /// Internal denial cause, for record access events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_cause: Option<String>,
}

impl AuditEvent {
    fn base(requester: &Requester, action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            requester_id: requester.id.clone(),
            requester_role: requester.role,
            department: requester.department.clone(),
            action,
            query: None,
            record_id: None,
            result_count: 0,
            filtered_count: 0,
            outcome: AccessOutcome::Granted,
            denial_cause: None,
        }
    }

    /// Event for one bulk search invocation
    pub fn search(
        requester: &Requester,
        query: impl Into<String>,
        result_count: usize,
        filtered_count: usize,
    ) -> Self {
        Self {
            query: Some(query.into()),
            result_count,
            filtered_count,
            ..Self::base(requester, AuditAction::Search)
        }
    }

    /// Event for one suggestion invocation
    pub fn suggest(
        requester: &Requester,
        query: impl Into<String>,
        result_count: usize,
        filtered_count: usize,
    ) -> Self {
        Self {
            query: Some(query.into()),
            result_count,
            filtered_count,
            ..Self::base(requester, AuditAction::Suggest)
        }
    }

    /// Event for one single-record access
    pub fn record_access(
        requester: &Requester,
        record_id: impl Into<String>,
        outcome: AccessOutcome,
        denial_cause: Option<String>,
    ) -> Self {
        Self {
            record_id: Some(record_id.into()),
            result_count: usize::from(outcome == AccessOutcome::Granted),
            outcome,
            denial_cause,
            ..Self::base(requester, AuditAction::RecordAccess)
        }
    }
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one event
    async fn emit(&self, event: &AuditEvent) -> Result<()>;
}

/// Sink that writes events to the tracing subscriber
///
/// The event target is `wardgate::audit`, so deployments can route the
/// audit stream independently of ordinary logs.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Create a tracing-backed sink
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: &AuditEvent) -> Result<()> {
        info!(
            target: "wardgate::audit",
            event_id = %event.id,
            requester = %event.requester_id,
            role = %event.requester_role,
            department = %event.department,
            action = %event.action,
            query = event.query.as_deref().unwrap_or(""),
            record = event.record_id.as_deref().unwrap_or(""),
            results = event.result_count,
            filtered = event.filtered_count,
            outcome = %event.outcome,
            "audit"
        );
        Ok(())
    }
}

/// Sink that appends events to a JSONL file, one event per line
///
/// The compliance-friendly format: append-only, one self-describing JSON
/// object per line, safe to ship to log collectors.
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    path: std::path::PathBuf,
}

impl FileAuditSink {
    /// Create a sink appending to the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path events are appended to
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn emit(&self, event: &AuditEvent) -> Result<()> {
        use std::io::Write;

        let line = serde_json::to_string(event)
            .map_err(|e| crate::error::Error::Audit(e.to_string()))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| crate::error::Error::Audit(e.to_string()))?;

        writeln!(file, "{}", line).map_err(|e| crate::error::Error::Audit(e.to_string()))?;
        Ok(())
    }
}

/// In-memory sink for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: std::sync::RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty in-memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }

    /// Get events for one action kind
    pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.events.read().unwrap().is_empty()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.write().unwrap().clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn emit(&self, event: &AuditEvent) -> Result<()> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaffRole;

    fn _assert_object_safe(_: &dyn AuditSink) {}

    fn requester() -> Requester {
        Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
    }

    #[test]
    fn test_search_event_shape() {
        let event = AuditEvent::search(&requester(), "chest pain", 3, 2);

        assert_eq!(event.action, AuditAction::Search);
        assert_eq!(event.query.as_deref(), Some("chest pain"));
        assert_eq!(event.result_count, 3);
        assert_eq!(event.filtered_count, 2);
        assert_eq!(event.outcome, AccessOutcome::Granted);
        assert!(event.record_id.is_none());
    }

    #[test]
    fn test_record_access_event_counts_grants() {
        let granted = AuditEvent::record_access(&requester(), "r-1", AccessOutcome::Granted, None);
        assert_eq!(granted.result_count, 1);

        let denied = AuditEvent::record_access(
            &requester(),
            "r-1",
            AccessOutcome::Denied,
            Some("not_assigned".to_string()),
        );
        assert_eq!(denied.result_count, 0);
        assert_eq!(denied.denial_cause.as_deref(), Some("not_assigned"));
    }

    #[test]
    fn test_event_serialization_omits_empty_fields() {
        let event = AuditEvent::search(&requester(), "q", 0, 0);
        let json = serde_json::to_value(&event).unwrap();
        let object = json.as_object().unwrap();

        assert!(!object.contains_key("record_id"));
        assert!(!object.contains_key("denial_cause"));
        assert_eq!(json["requester_role"], "registered_nurse");
        assert_eq!(json["action"], "search");
    }

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();

        sink.emit(&AuditEvent::search(&requester(), "first", 1, 0))
            .await
            .unwrap();
        sink.emit(&AuditEvent::suggest(&requester(), "sec", 5, 1))
            .await
            .unwrap();

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert_eq!(events[0].query.as_deref(), Some("first"));
        assert_eq!(events[1].action, AuditAction::Suggest);

        assert_eq!(sink.events_for(AuditAction::Search).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_file_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path);

        sink.emit(&AuditEvent::search(&requester(), "first", 2, 1))
            .await
            .unwrap();
        sink.emit(&AuditEvent::record_access(
            &requester(),
            "r-1",
            AccessOutcome::Granted,
            None,
        ))
        .await
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.query.as_deref(), Some("first"));
        let second: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, AuditAction::RecordAccess);
    }

    #[tokio::test]
    async fn test_file_sink_reports_unwritable_path() {
        let sink = FileAuditSink::new("/nonexistent-dir/audit.jsonl");
        let result = sink
            .emit(&AuditEvent::search(&requester(), "q", 0, 0))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let sink = TracingAuditSink::new();
        let result = sink
            .emit(&AuditEvent::record_access(
                &requester(),
                "r-9",
                AccessOutcome::NotFound,
                None,
            ))
            .await;
        assert!(result.is_ok());
    }
}
