//! Authorization gateway
//!
//! Adapts a requester/candidate pair into a policy check, invokes the
//! remote decision point, and normalizes whatever comes back into a
//! [`PolicyDecision`]. The gateway is where fail-closed is enforced: a
//! transport error, timeout, or malformed response becomes
//! [`PolicyDecision::Unavailable`], which no caller treats as an allow.

mod batch;

pub use batch::BatchAuthorizer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::identity::Requester;
use crate::policy::{AccessAction, PolicyCheckRequest, PolicyClient, PolicyOutcome};
use crate::record::CandidateRecord;

/// Normalized outcome of one authorization check
///
/// `Deny` and `Unavailable` behave identically for filtering purposes;
/// the distinction exists for logging and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The policy service explicitly allowed the access
    Allow,
    /// The policy service answered and did not allow
    Deny,
    /// The policy service could not answer; treated as a deny
    Unavailable,
}

impl PolicyDecision {
    /// True only for an explicit allow
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Gateway to the remote policy decision point
#[derive(Clone)]
pub struct AuthorizationGateway {
    policy: Arc<dyn PolicyClient>,
}

impl AuthorizationGateway {
    /// Create a gateway over the given policy client
    pub fn new(policy: Arc<dyn PolicyClient>) -> Self {
        Self { policy }
    }

    /// Check one requester/action/candidate triple
    ///
    /// `now` is the invocation timestamp; the requester's on-shift state
    /// is derived from its time-of-day so every candidate in one
    /// invocation sees the same clock. Never returns an error: any
    /// failure talking to the service collapses to
    /// [`PolicyDecision::Unavailable`].
    pub async fn authorize(
        &self,
        requester: &Requester,
        action: AccessAction,
        candidate: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> PolicyDecision {
        let on_shift = requester.is_on_shift(now.time());
        let request = PolicyCheckRequest::new(requester, action, candidate, on_shift);

        match self.policy.check(&request).await {
            Ok(PolicyOutcome::Allow) => PolicyDecision::Allow,
            Ok(PolicyOutcome::Deny) => {
                debug!(
                    requester = %requester.id,
                    record = %candidate.id,
                    action = %action,
                    "Policy denied access"
                );
                PolicyDecision::Deny
            }
            Err(e) => {
                warn!(
                    requester = %requester.id,
                    record = %candidate.id,
                    action = %action,
                    error = %e,
                    "Policy check failed, treating as deny"
                );
                PolicyDecision::Unavailable
            }
        }
    }
}

impl std::fmt::Debug for AuthorizationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGateway").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::identity::StaffRole;
    use crate::record::ResourceType;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::Mutex;

    /// Policy double returning a fixed outcome, capturing the last request
    struct FixedPolicy {
        outcome: crate::error::Result<PolicyOutcome>,
        last_request: Mutex<Option<PolicyCheckRequest>>,
    }

    impl FixedPolicy {
        fn allow() -> Self {
            Self {
                outcome: Ok(PolicyOutcome::Allow),
                last_request: Mutex::new(None),
            }
        }

        fn deny() -> Self {
            Self {
                outcome: Ok(PolicyOutcome::Deny),
                last_request: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                outcome: Err(Error::PolicyUnavailable("connection refused".to_string())),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PolicyClient for FixedPolicy {
        async fn check(
            &self,
            request: &PolicyCheckRequest,
        ) -> crate::error::Result<PolicyOutcome> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.outcome {
                Ok(outcome) => Ok(*outcome),
                Err(e) => Err(Error::PolicyUnavailable(e.to_string())),
            }
        }
    }

    fn requester() -> Requester {
        Requester::new("n-1", StaffRole::RegisteredNurse, "cardiology")
    }

    fn candidate() -> CandidateRecord {
        CandidateRecord::new("r-1", ResourceType::ClinicalNote, "Admission note")
    }

    #[tokio::test]
    async fn test_allow_passes_through() {
        let gateway = AuthorizationGateway::new(Arc::new(FixedPolicy::allow()));
        let decision = gateway
            .authorize(&requester(), AccessAction::Search, &candidate(), Utc::now())
            .await;
        assert_eq!(decision, PolicyDecision::Allow);
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_deny_passes_through() {
        let gateway = AuthorizationGateway::new(Arc::new(FixedPolicy::deny()));
        let decision = gateway
            .authorize(&requester(), AccessAction::Search, &candidate(), Utc::now())
            .await;
        assert_eq!(decision, PolicyDecision::Deny);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_client_error_becomes_unavailable_not_allow() {
        let gateway = AuthorizationGateway::new(Arc::new(FixedPolicy::failing()));
        let decision = gateway
            .authorize(&requester(), AccessAction::Read, &candidate(), Utc::now())
            .await;
        assert_eq!(decision, PolicyDecision::Unavailable);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_on_shift_state_is_derived_from_the_given_clock() {
        let policy = Arc::new(FixedPolicy::allow());
        let gateway = AuthorizationGateway::new(policy.clone());

        let on_shift_requester = requester().with_shift(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        );
        let noon = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let midnight = "2026-03-01T00:30:00Z".parse::<DateTime<Utc>>().unwrap();

        gateway
            .authorize(&on_shift_requester, AccessAction::Search, &candidate(), noon)
            .await;
        let sent = policy.last_request.lock().unwrap().clone().unwrap();
        assert!(sent.subject.on_shift);

        gateway
            .authorize(&on_shift_requester, AccessAction::Search, &candidate(), midnight)
            .await;
        let sent = policy.last_request.lock().unwrap().clone().unwrap();
        assert!(!sent.subject.on_shift);
    }
}
