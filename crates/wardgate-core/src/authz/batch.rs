//! Windowed batch authorization
//!
//! The policy service has unknown capacity, so one invocation never holds
//! more than a fixed window of checks in flight. Candidates are processed
//! window by window; within a window all checks run concurrently and the
//! next window starts only once the whole window has settled. Output
//! order always matches input order, minus the candidates that did not
//! clear the check.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::debug;

use crate::identity::Requester;
use crate::policy::AccessAction;
use crate::record::CandidateRecord;

use super::AuthorizationGateway;

/// Default number of in-flight policy checks per invocation
pub const DEFAULT_AUTHORIZATION_WINDOW: usize = 10;

/// Order-preserving, window-bounded authorization filter
#[derive(Debug, Clone)]
pub struct BatchAuthorizer {
    gateway: AuthorizationGateway,
    window: usize,
}

impl BatchAuthorizer {
    /// Create an authorizer with the given concurrency window
    ///
    /// A window of zero is treated as one.
    pub fn new(gateway: AuthorizationGateway, window: usize) -> Self {
        Self {
            gateway,
            window: window.max(1),
        }
    }

    /// Get the configured window size
    pub fn window(&self) -> usize {
        self.window
    }

    /// Get the underlying gateway, for single-candidate checks
    pub fn gateway(&self) -> &AuthorizationGateway {
        &self.gateway
    }

    /// Keep only the candidates the policy service allows
    ///
    /// A failed check denies that candidate alone; siblings in the same
    /// window and later windows are unaffected. Survivors still carry
    /// their internal labels, which downstream local rules consume.
    pub async fn filter_authorized(
        &self,
        requester: &Requester,
        candidates: Vec<CandidateRecord>,
        action: AccessAction,
        now: DateTime<Utc>,
    ) -> Vec<CandidateRecord> {
        let total = candidates.len();
        let mut allowed = Vec::with_capacity(total);

        for window in candidates.chunks(self.window) {
            let checks = window
                .iter()
                .map(|candidate| self.gateway.authorize(requester, action, candidate, now));
            let decisions = join_all(checks).await;

            for (candidate, decision) in window.iter().zip(decisions) {
                if decision.is_allowed() {
                    allowed.push(candidate.clone());
                }
            }
        }

        debug!(
            requester = %requester.id,
            action = %action,
            total = total,
            allowed = allowed.len(),
            "Batch authorization complete"
        );

        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::identity::StaffRole;
    use crate::policy::{PolicyCheckRequest, PolicyClient, PolicyOutcome};
    use crate::record::ResourceType;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn requester() -> Requester {
        Requester::new("a-1", StaffRole::AttendingPhysician, "cardiology")
    }

    fn candidates(n: usize) -> Vec<CandidateRecord> {
        (0..n)
            .map(|i| {
                CandidateRecord::new(
                    format!("r-{}", i),
                    ResourceType::ClinicalNote,
                    format!("Note {}", i),
                )
            })
            .collect()
    }

    fn authorizer(policy: Arc<dyn PolicyClient>, window: usize) -> BatchAuthorizer {
        BatchAuthorizer::new(AuthorizationGateway::new(policy), window)
    }

    /// Tracks how many checks are in flight at once, answering after a
    /// delay so concurrency within a window is observable
    struct CountingPolicy {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingPolicy {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PolicyClient for CountingPolicy {
        async fn check(
            &self,
            _request: &PolicyCheckRequest,
        ) -> crate::error::Result<PolicyOutcome> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(PolicyOutcome::Allow)
        }
    }

    /// Denies specific record ids, allows everything else
    struct DenyList {
        denied: Vec<String>,
    }

    #[async_trait]
    impl PolicyClient for DenyList {
        async fn check(
            &self,
            request: &PolicyCheckRequest,
        ) -> crate::error::Result<PolicyOutcome> {
            if self.denied.contains(&request.resource.id) {
                Ok(PolicyOutcome::Deny)
            } else {
                Ok(PolicyOutcome::Allow)
            }
        }
    }

    /// Errors on one record id, allows everything else
    struct FailOne {
        failing: String,
    }

    #[async_trait]
    impl PolicyClient for FailOne {
        async fn check(
            &self,
            request: &PolicyCheckRequest,
        ) -> crate::error::Result<PolicyOutcome> {
            if request.resource.id == self.failing {
                return Err(Error::PolicyUnavailable("boom".to_string()));
            }
            Ok(PolicyOutcome::Allow)
        }
    }

    /// Allows everything, sleeping longer for earlier candidates so
    /// completion order inverts input order
    struct InvertedDelays;

    #[async_trait]
    impl PolicyClient for InvertedDelays {
        async fn check(
            &self,
            request: &PolicyCheckRequest,
        ) -> crate::error::Result<PolicyOutcome> {
            let index: u64 = request
                .resource
                .id
                .trim_start_matches("r-")
                .parse()
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100u64.saturating_sub(index * 10))).await;
            Ok(PolicyOutcome::Allow)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_checks_never_exceed_the_window() {
        let policy = Arc::new(CountingPolicy::new());
        let authorizer = authorizer(policy.clone(), 10);

        let result = authorizer
            .filter_authorized(&requester(), candidates(25), AccessAction::Search, Utc::now())
            .await;

        assert_eq!(result.len(), 25);
        assert_eq!(policy.max_in_flight.load(Ordering::SeqCst), 10);
        assert_eq!(policy.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_partial_window_is_smaller() {
        let policy = Arc::new(CountingPolicy::new());
        let authorizer = authorizer(policy.clone(), 10);

        authorizer
            .filter_authorized(&requester(), candidates(7), AccessAction::Search, Utc::now())
            .await;

        assert_eq!(policy.max_in_flight.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_preserves_input_order_despite_completion_order() {
        let authorizer = authorizer(Arc::new(InvertedDelays), 10);

        let result = authorizer
            .filter_authorized(&requester(), candidates(8), AccessAction::Search, Utc::now())
            .await;

        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r-0", "r-1", "r-2", "r-3", "r-4", "r-5", "r-6", "r-7"]);
    }

    #[tokio::test]
    async fn test_denied_candidates_are_removed_in_place() {
        let policy = Arc::new(DenyList {
            denied: vec!["r-1".to_string(), "r-3".to_string()],
        });
        let authorizer = authorizer(policy, 2);

        let result = authorizer
            .filter_authorized(&requester(), candidates(5), AccessAction::Search, Utc::now())
            .await;

        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r-0", "r-2", "r-4"]);
    }

    #[tokio::test]
    async fn test_one_failing_check_does_not_affect_siblings() {
        let policy = Arc::new(FailOne {
            failing: "r-2".to_string(),
        });
        let authorizer = authorizer(policy, 10);

        let result = authorizer
            .filter_authorized(&requester(), candidates(5), AccessAction::Search, Utc::now())
            .await;

        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r-0", "r-1", "r-3", "r-4"]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let authorizer = authorizer(Arc::new(DenyList { denied: vec![] }), 10);

        let result = authorizer
            .filter_authorized(&requester(), Vec::new(), AccessAction::Search, Utc::now())
            .await;

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_zero_window_behaves_as_one() {
        let authorizer = authorizer(Arc::new(DenyList { denied: vec![] }), 0);
        assert_eq!(authorizer.window(), 1);

        let result = authorizer
            .filter_authorized(&requester(), candidates(3), AccessAction::Search, Utc::now())
            .await;

        assert_eq!(result.len(), 3);
    }
}
