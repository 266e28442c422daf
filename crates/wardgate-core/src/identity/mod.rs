//! Requester identity and role model
//!
//! A [`Requester`] is the acting identity for one pipeline invocation. It is
//! built once from verified credential claims, stays immutable for the life
//! of the invocation, and is never persisted by this crate. Which rules
//! apply to which role lives in the injectable [`RoleMatrix`] rather than in
//! process-wide tables.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Clinical staff roles recognized by the pipeline
///
/// This is a closed enumeration: credential claims carrying any other role
/// string fail to deserialize, which is the desired fail-closed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Attending physician with full department scope
    AttendingPhysician,
    /// Resident physician
    ResidentPhysician,
    /// Registered nurse, restricted to assigned patients and shift hours
    RegisteredNurse,
    /// Temporary staff with a bounded access window
    TempStaff,
    /// Compliance auditor with read scope across departments
    RecordsAuditor,
}

impl StaffRole {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttendingPhysician => "attending_physician",
            Self::ResidentPhysician => "resident_physician",
            Self::RegisteredNurse => "registered_nurse",
            Self::TempStaff => "temp_staff",
            Self::RecordsAuditor => "records_auditor",
        }
    }

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "attending_physician" => Some(Self::AttendingPhysician),
            "resident_physician" => Some(Self::ResidentPhysician),
            "registered_nurse" => Some(Self::RegisteredNurse),
            "temp_staff" => Some(Self::TempStaff),
            "records_auditor" => Some(Self::RecordsAuditor),
            _ => None,
        }
    }

    /// Get all roles
    pub fn all() -> Vec<Self> {
        vec![
            Self::AttendingPhysician,
            Self::ResidentPhysician,
            Self::RegisteredNurse,
            Self::TempStaff,
            Self::RecordsAuditor,
        ]
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The acting identity for one pipeline invocation
///
/// Constructed from verified credential claims; credential verification
/// itself happens upstream of this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    /// Stable staff identifier
    pub id: String,

    /// Clinical role
    pub role: StaffRole,

    /// Home department (e.g. "cardiology")
    pub department: String,

    /// Shift window start, time-of-day only
    #[serde(default)]
    pub shift_start: Option<NaiveTime>,

    /// Shift window end, time-of-day only
    #[serde(default)]
    pub shift_end: Option<NaiveTime>,

    /// Hard expiry for the requester's access, if any
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,

    /// Patient identifiers this requester is assigned to
    #[serde(default)]
    pub assigned_patients: Vec<String>,

    /// Emergency override flag ("break-glass" access)
    #[serde(default)]
    pub emergency_access: bool,
}

impl Requester {
    /// Create a new requester with the required fields
    pub fn new(id: impl Into<String>, role: StaffRole, department: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            department: department.into(),
            shift_start: None,
            shift_end: None,
            access_expires_at: None,
            assigned_patients: Vec::new(),
            emergency_access: false,
        }
    }

    /// Set the shift window
    pub fn with_shift(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.shift_start = Some(start);
        self.shift_end = Some(end);
        self
    }

    /// Set the access expiry timestamp
    pub fn with_access_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.access_expires_at = Some(expires_at);
        self
    }

    /// Set the assigned patient list
    pub fn with_assigned_patients<I, S>(mut self, patients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assigned_patients = patients.into_iter().map(Into::into).collect();
        self
    }

    /// Grant the emergency override flag
    pub fn with_emergency_access(mut self) -> Self {
        self.emergency_access = true;
        self
    }

    /// Whether the given time-of-day falls inside the requester's shift
    ///
    /// An incomplete window (either bound missing) means no shift
    /// restriction and always reports on-shift. A window whose start is
    /// later than its end wraps midnight, which is how overnight ward
    /// shifts are rostered.
    pub fn is_on_shift(&self, time_of_day: NaiveTime) -> bool {
        match (self.shift_start, self.shift_end) {
            (Some(start), Some(end)) => {
                if start <= end {
                    start <= time_of_day && time_of_day <= end
                } else {
                    time_of_day >= start || time_of_day <= end
                }
            }
            _ => true,
        }
    }

    /// Whether the requester is assigned to the given patient
    pub fn is_assigned_to(&self, patient_id: &str) -> bool {
        self.assigned_patients.iter().any(|p| p == patient_id)
    }
}

/// Injectable role capability table
///
/// Replaces what would otherwise be process-wide role maps: every component
/// that needs to know what a role may do receives a `RoleMatrix`, so tests
/// and multi-tenant deployments can swap the mapping per invocation.
#[derive(Debug, Clone)]
pub struct RoleMatrix {
    privileged: HashSet<StaffRole>,
    department_unrestricted: HashSet<StaffRole>,
    shift_restricted: HashSet<StaffRole>,
    assignment_restricted: HashSet<StaffRole>,
}

impl Default for RoleMatrix {
    fn default() -> Self {
        Self {
            privileged: HashSet::from([StaffRole::AttendingPhysician, StaffRole::RecordsAuditor]),
            department_unrestricted: HashSet::from([
                StaffRole::AttendingPhysician,
                StaffRole::RecordsAuditor,
            ]),
            shift_restricted: HashSet::from([StaffRole::RegisteredNurse, StaffRole::TempStaff]),
            assignment_restricted: HashSet::from([StaffRole::RegisteredNurse]),
        }
    }
}

impl RoleMatrix {
    /// Replace the set of roles allowed to view elevated-sensitivity records
    pub fn with_privileged(mut self, roles: impl IntoIterator<Item = StaffRole>) -> Self {
        self.privileged = roles.into_iter().collect();
        self
    }

    /// Replace the set of roles that search without a department filter
    pub fn with_department_unrestricted(
        mut self,
        roles: impl IntoIterator<Item = StaffRole>,
    ) -> Self {
        self.department_unrestricted = roles.into_iter().collect();
        self
    }

    /// Replace the set of roles bound to their rostered shift window
    pub fn with_shift_restricted(mut self, roles: impl IntoIterator<Item = StaffRole>) -> Self {
        self.shift_restricted = roles.into_iter().collect();
        self
    }

    /// Replace the set of roles bound to their assigned-patient list
    pub fn with_assignment_restricted(
        mut self,
        roles: impl IntoIterator<Item = StaffRole>,
    ) -> Self {
        self.assignment_restricted = roles.into_iter().collect();
        self
    }

    /// May this role view elevated-sensitivity records?
    pub fn is_privileged(&self, role: StaffRole) -> bool {
        self.privileged.contains(&role)
    }

    /// Does this role search across departments without an injected filter?
    pub fn is_department_unrestricted(&self, role: StaffRole) -> bool {
        self.department_unrestricted.contains(&role)
    }

    /// Is this role bound to its rostered shift window?
    pub fn is_shift_restricted(&self, role: StaffRole) -> bool {
        self.shift_restricted.contains(&role)
    }

    /// Is this role bound to its assigned-patient list?
    pub fn is_assignment_restricted(&self, role: StaffRole) -> bool {
        self.assignment_restricted.contains(&role)
    }
}
