//! Local security rules
//!
//! Rules the remote policy service does not express: shift windows,
//! access expiry, patient assignment, and sensitivity tiers. They run
//! after remote authorization and only narrow it; both gates must pass.
//! Everything here is pure and synchronous, no external calls.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::identity::{Requester, RoleMatrix};
use crate::record::{CandidateRecord, SensitivityTier};

/// Why a candidate was rejected by the rule set
///
/// Never shown to callers; retained internally for single-record audit
/// events and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleViolation {
    /// The requester's access grant has expired
    AccessExpired,
    /// The requester is outside their shift window
    OutsideShift,
    /// The record's patient is not on the requester's assignment list
    NotAssigned,
    /// The record's sensitivity tier requires a privileged role
    SensitivityRestricted,
}

impl RuleViolation {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessExpired => "access_expired",
            Self::OutsideShift => "outside_shift",
            Self::NotAssigned => "not_assigned",
            Self::SensitivityRestricted => "sensitivity_restricted",
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered local rule evaluation over a role matrix
#[derive(Debug, Clone, Default)]
pub struct SecurityRuleSet {
    matrix: RoleMatrix,
}

impl SecurityRuleSet {
    /// Create a rule set over the given role matrix
    pub fn new(matrix: RoleMatrix) -> Self {
        Self { matrix }
    }

    /// Get the role matrix the rules consult
    pub fn matrix(&self) -> &RoleMatrix {
        &self.matrix
    }

    /// Evaluate every rule against one candidate
    ///
    /// Rules run in a fixed order and the first violation wins:
    /// emergency override, access expiry, shift window, assignment,
    /// sensitivity tier. The emergency flag accepts immediately and
    /// skips everything after it. Shift and assignment rules apply only
    /// to roles the matrix marks as restricted; other roles pass them
    /// vacuously.
    pub fn evaluate(
        &self,
        requester: &Requester,
        candidate: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RuleViolation> {
        if requester.emergency_access {
            return Ok(());
        }

        if let Some(expiry) = requester.access_expires_at
            && expiry < now
        {
            return Err(RuleViolation::AccessExpired);
        }

        if self.matrix.is_shift_restricted(requester.role) && !requester.is_on_shift(now.time()) {
            return Err(RuleViolation::OutsideShift);
        }

        if self.matrix.is_assignment_restricted(requester.role)
            && let Some(patient_id) = &candidate.patient_id
            && !requester.is_assigned_to(patient_id)
        {
            return Err(RuleViolation::NotAssigned);
        }

        if candidate.sensitivity == SensitivityTier::High
            && !self.matrix.is_privileged(requester.role)
        {
            return Err(RuleViolation::SensitivityRestricted);
        }

        Ok(())
    }

    /// Keep only the candidates that clear every rule, preserving order
    pub fn filter(
        &self,
        requester: &Requester,
        candidates: Vec<CandidateRecord>,
        now: DateTime<Utc>,
    ) -> Vec<CandidateRecord> {
        candidates
            .into_iter()
            .filter(|candidate| self.evaluate(requester, candidate, now).is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaffRole;
    use crate::record::ResourceType;
    use chrono::{Duration, NaiveTime};

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn rules() -> SecurityRuleSet {
        SecurityRuleSet::default()
    }

    fn note(patient: &str) -> CandidateRecord {
        CandidateRecord::new("r-1", ResourceType::ClinicalNote, "Admission note")
            .with_patient(patient)
    }

    fn day_shift() -> (NaiveTime, NaiveTime) {
        (
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_emergency_override_skips_every_other_rule() {
        let (start, end) = day_shift();
        // Expired, off shift, unassigned, and the record is high tier
        let requester = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_access_expiry(now() - Duration::days(1))
            .with_shift(start, end)
            .with_assigned_patients(["P1"])
            .with_emergency_access();
        let candidate = note("P2").with_sensitivity(SensitivityTier::High);

        let at_night = "2026-03-01T03:00:00Z".parse().unwrap();
        assert_eq!(rules().evaluate(&requester, &candidate, at_night), Ok(()));
    }

    #[test]
    fn test_expired_access_rejects_before_other_rules() {
        let (start, end) = day_shift();
        let requester = Requester::new("t-1", StaffRole::TempStaff, "cardiology")
            .with_access_expiry(now() - Duration::days(1))
            .with_shift(start, end);

        // Off shift too, but expiry is checked first
        let at_night = "2026-03-01T03:00:00Z".parse().unwrap();
        assert_eq!(
            rules().evaluate(&requester, &note("P1"), at_night),
            Err(RuleViolation::AccessExpired)
        );
    }

    #[test]
    fn test_expiry_exactly_now_still_passes() {
        let requester = Requester::new("t-1", StaffRole::TempStaff, "cardiology")
            .with_access_expiry(now());
        assert_eq!(rules().evaluate(&requester, &note("P1"), now()), Ok(()));
    }

    #[test]
    fn test_shift_rule_applies_only_to_restricted_roles() {
        let (start, end) = day_shift();
        let at_night = "2026-03-01T03:00:00Z".parse().unwrap();
        let candidate = note("P1");

        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_shift(start, end)
            .with_assigned_patients(["P1"]);
        assert_eq!(
            rules().evaluate(&nurse, &candidate, at_night),
            Err(RuleViolation::OutsideShift)
        );

        let attending = Requester::new("a-1", StaffRole::AttendingPhysician, "cardiology")
            .with_shift(start, end);
        assert_eq!(rules().evaluate(&attending, &candidate, at_night), Ok(()));
    }

    #[test]
    fn test_absent_shift_bounds_do_not_restrict() {
        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_assigned_patients(["P1"]);
        let at_night = "2026-03-01T03:00:00Z".parse().unwrap();
        assert_eq!(rules().evaluate(&nurse, &note("P1"), at_night), Ok(()));
    }

    #[test]
    fn test_assignment_rule_rejects_unassigned_patient() {
        let (start, end) = day_shift();
        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_shift(start, end)
            .with_assigned_patients(["P1"]);

        assert_eq!(
            rules().evaluate(&nurse, &note("P2"), now()),
            Err(RuleViolation::NotAssigned)
        );
        assert_eq!(rules().evaluate(&nurse, &note("P1"), now()), Ok(()));
    }

    #[test]
    fn test_assignment_rule_is_role_gated() {
        // Temp staff are shift restricted but not assignment restricted
        let (start, end) = day_shift();
        let temp = Requester::new("t-1", StaffRole::TempStaff, "cardiology")
            .with_shift(start, end);
        assert_eq!(rules().evaluate(&temp, &note("P9"), now()), Ok(()));
    }

    #[test]
    fn test_patient_agnostic_candidate_passes_assignment() {
        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_assigned_patients(["P1"]);
        let plan = CandidateRecord::new("r-2", ResourceType::CarePlan, "Ward protocol");
        assert_eq!(rules().evaluate(&nurse, &plan, now()), Ok(()));
    }

    #[test]
    fn test_high_sensitivity_requires_privileged_role() {
        let high = note("P1").with_sensitivity(SensitivityTier::High);

        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_assigned_patients(["P1"]);
        assert_eq!(
            rules().evaluate(&nurse, &high, now()),
            Err(RuleViolation::SensitivityRestricted)
        );

        let attending = Requester::new("a-1", StaffRole::AttendingPhysician, "cardiology");
        assert_eq!(rules().evaluate(&attending, &high, now()), Ok(()));

        let auditor = Requester::new("aud-1", StaffRole::RecordsAuditor, "compliance");
        assert_eq!(rules().evaluate(&auditor, &high, now()), Ok(()));
    }

    #[test]
    fn test_normal_tier_passes_for_any_role() {
        let temp = Requester::new("t-1", StaffRole::TempStaff, "cardiology");
        assert_eq!(rules().evaluate(&temp, &note("P1"), now()), Ok(()));
    }

    #[test]
    fn test_custom_matrix_changes_the_privileged_set() {
        let matrix = RoleMatrix::default().with_privileged(StaffRole::all());
        let rules = SecurityRuleSet::new(matrix);

        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_assigned_patients(["P1"]);
        let high = note("P1").with_sensitivity(SensitivityTier::High);
        assert_eq!(rules.evaluate(&nurse, &high, now()), Ok(()));
    }

    #[test]
    fn test_filter_preserves_order_of_survivors() {
        let nurse = Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
            .with_assigned_patients(["P1", "P3"]);

        let candidate = |id: &str, patient: &str| {
            CandidateRecord::new(id, ResourceType::ClinicalNote, "Note").with_patient(patient)
        };
        let candidates = vec![
            candidate("r-1", "P1"),
            candidate("r-2", "P2"),
            candidate("r-3", "P3"),
            candidate("r-4", "P1").with_sensitivity(SensitivityTier::High),
        ];

        let kept = rules().filter(&nurse, candidates, now());
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r-1", "r-3"]);
    }
}
