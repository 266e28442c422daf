//! Candidate records and the result sanitizer
//!
//! A [`CandidateRecord`] is one hit from the search backend, still carrying
//! the internal security labels (department, patient id, sensitivity tier)
//! the pipeline filters on. Those labels must never cross the trust
//! boundary: [`CandidateRecord::sanitized`] produces the outward-facing copy
//! with every label removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse sensitivity classification of a record
///
/// Hits from the index that carry no tier default to `Normal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityTier {
    /// Ordinary clinical data
    #[default]
    Normal,
    /// Elevated tier, visible to privileged roles only
    High,
}

impl SensitivityTier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// True for the default tier; used to drop the field from serialized
    /// output, where absence means normal
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }
}

impl fmt::Display for SensitivityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of clinical resources the index serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Free-text clinical notes
    ClinicalNote,
    /// Laboratory results
    LabResult,
    /// Imaging reports
    ImagingReport,
    /// Medication orders
    MedicationOrder,
    /// Cross-department care plans
    CarePlan,
}

impl ResourceType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicalNote => "clinical_note",
            Self::LabResult => "lab_result",
            Self::ImagingReport => "imaging_report",
            Self::MedicationOrder => "medication_order",
            Self::CarePlan => "care_plan",
        }
    }

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clinical_note" => Some(Self::ClinicalNote),
            "lab_result" => Some(Self::LabResult),
            "imaging_report" => Some(Self::ImagingReport),
            "medication_order" => Some(Self::MedicationOrder),
            "care_plan" => Some(Self::CarePlan),
            _ => None,
        }
    }

    /// Get all resource types
    pub fn all() -> Vec<Self> {
        vec![
            Self::ClinicalNote,
            Self::LabResult,
            Self::ImagingReport,
            Self::MedicationOrder,
            Self::CarePlan,
        ]
    }

    /// Whether records of this type legitimately carry no department label
    ///
    /// Care plans span departments; everything else is routed to exactly
    /// one department, and a missing label on those types is malformed.
    pub fn is_department_agnostic(&self) -> bool {
        matches!(self, Self::CarePlan)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single search hit prior to authorization filtering
///
/// The `department`, `patient_id`, and `sensitivity` fields are internal
/// security labels. They are `skip_serializing_if`-suppressed so a
/// sanitized record serializes without them, and absence on the way in
/// deserializes to the tolerant defaults the index contract allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Stable record identifier
    pub id: String,

    /// Kind of clinical resource
    pub resource_type: ResourceType,

    /// Display title
    pub title: String,

    /// Snippet of matching content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Relevance score assigned by the index
    #[serde(default)]
    pub score: f64,

    /// Last-updated timestamp, when the index reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Owning department. Internal label, stripped before release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Subject (patient) identifier. Internal label, stripped before release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    /// Sensitivity tier. Internal label, stripped before release.
    #[serde(default, skip_serializing_if = "SensitivityTier::is_normal")]
    pub sensitivity: SensitivityTier,

    /// Additional display payload from the index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl CandidateRecord {
    /// Create a candidate with the required fields
    pub fn new(
        id: impl Into<String>,
        resource_type: ResourceType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            resource_type,
            title: title.into(),
            snippet: None,
            score: 0.0,
            updated_at: None,
            department: None,
            patient_id: None,
            sensitivity: SensitivityTier::default(),
            metadata: None,
        }
    }

    /// Set the relevance score
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Set the snippet
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Set the owning department label
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Set the subject patient label
    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Set the sensitivity tier
    pub fn with_sensitivity(mut self, tier: SensitivityTier) -> Self {
        self.sensitivity = tier;
        self
    }

    /// The result sanitizer: a copy of this record with every internal
    /// security label removed
    ///
    /// Idempotent, and never mutates the record it is called on. This is
    /// the only constructor of records that may leave the pipeline.
    pub fn sanitized(&self) -> CandidateRecord {
        CandidateRecord {
            department: None,
            patient_id: None,
            sensitivity: SensitivityTier::Normal,
            ..self.clone()
        }
    }

    /// Whether all internal security labels are absent
    pub fn is_sanitized(&self) -> bool {
        self.department.is_none()
            && self.patient_id.is_none()
            && self.sensitivity == SensitivityTier::Normal
    }
}

/// A lightweight typeahead suggestion
///
/// Suggestions skip per-item policy checks; the only label they carry is
/// the department used for the local equality filter, and that label is
/// stripped before suggestions leave the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Suggested completion text
    pub text: String,

    /// Kind of resource the suggestion points at
    pub resource_type: ResourceType,

    /// Owning department. Internal label, stripped before release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Suggestion {
    /// Create a suggestion
    pub fn new(text: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            text: text.into(),
            resource_type,
            department: None,
        }
    }

    /// Set the owning department label
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Copy with the internal department label removed
    pub fn sanitized(&self) -> Suggestion {
        Suggestion {
            department: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_record() -> CandidateRecord {
        CandidateRecord::new("r-1", ResourceType::ClinicalNote, "Admission note")
            .with_score(2.5)
            .with_snippet("…chest pain on exertion…")
            .with_department("cardiology")
            .with_patient("P1")
            .with_sensitivity(SensitivityTier::High)
    }

    #[test]
    fn test_sensitivity_defaults_to_normal_when_absent() {
        let json = r#"{"id":"r-9","resource_type":"lab_result","title":"CBC panel"}"#;
        let record: CandidateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.sensitivity, SensitivityTier::Normal);
        assert!(record.department.is_none());
        assert!(record.patient_id.is_none());
    }

    #[test]
    fn test_sanitize_strips_every_label() {
        let record = labeled_record();
        let clean = record.sanitized();

        assert!(clean.is_sanitized());
        assert_eq!(clean.id, record.id);
        assert_eq!(clean.title, record.title);
        assert_eq!(clean.score, record.score);
    }

    #[test]
    fn test_sanitize_is_idempotent_and_non_mutating() {
        let record = labeled_record();
        let before = record.clone();

        let once = record.sanitized();
        let twice = once.sanitized();

        assert_eq!(once, twice);
        assert_eq!(record, before);
    }

    #[test]
    fn test_sanitized_json_has_no_label_keys() {
        let clean = labeled_record().sanitized();
        let json = serde_json::to_value(&clean).unwrap();
        let object = json.as_object().unwrap();

        assert!(!object.contains_key("department"));
        assert!(!object.contains_key("patient_id"));
        assert!(!object.contains_key("sensitivity"));
    }

    #[test]
    fn test_unsanitized_high_tier_serializes_its_tier() {
        // Internal serialization (e.g. toward the policy service) keeps the
        // label; only the sanitizer removes it.
        let json = serde_json::to_value(labeled_record()).unwrap();
        assert_eq!(json["sensitivity"], "high");
        assert_eq!(json["department"], "cardiology");
    }

    #[test]
    fn test_resource_type_department_agnosticism() {
        assert!(ResourceType::CarePlan.is_department_agnostic());
        assert!(!ResourceType::LabResult.is_department_agnostic());
    }

    #[test]
    fn test_suggestion_sanitize() {
        let suggestion = Suggestion::new("troponin", ResourceType::LabResult)
            .with_department("cardiology");
        let clean = suggestion.sanitized();

        assert!(clean.department.is_none());
        assert_eq!(clean.text, "troponin");

        let json = serde_json::to_value(&clean).unwrap();
        assert!(!json.as_object().unwrap().contains_key("department"));
    }
}
