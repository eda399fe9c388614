//! Status polling for in-flight push logins.
//!
//! The browser polls while the user answers on their phone. Polls arrive
//! before the login completes, so the caller is anonymous; instead of a
//! session, each poll presents the flow token issued when the login began
//! together with the request identifier. A poll naming a request that the
//! flow did not create is refused.
//!
//! ## Limitations
//!
//! - In-memory store, lost on process restart
//! - Single-server only

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::approval::{AuthRequest, AuthRequestLifecycle, AuthState};
use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::error::TwoFactorError;
use crate::security::{constant_time_eq, generate_flow_token, is_valid_flow_token};

/// How long a resolved or abandoned login stays answerable after its TTL.
const DEFAULT_PURGE_GRACE_SECS: i64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    /// The flow token and request identifier do not name a login we started.
    #[error("Unknown authentication request")]
    UnknownRequest,
}

/// Returned to the host when a push login begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginTicket {
    /// Opaque token the browser presents on every poll.
    pub flow_token: String,
    /// Remote request identifier; absent if the request could not be created.
    pub request_id: Option<String>,
    pub state: AuthState,
}

/// Body of a status poll response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub status: AuthState,
}

/// One stored login flow. The request identifier and purge deadline are
/// copied out of the request so lookups and purges never wait on a poll.
struct PendingLogin {
    request_id: Option<String>,
    purge_after: Option<DateTime<Utc>>,
    request: Mutex<AuthRequest>,
}

/// Answers status polls for logins started through it.
pub struct StatusEndpoint {
    lifecycle: Arc<AuthRequestLifecycle>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    pending: RwLock<HashMap<String, Arc<PendingLogin>>>,
    purge_grace: Duration,
}

impl StatusEndpoint {
    pub fn new(
        lifecycle: Arc<AuthRequestLifecycle>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            lifecycle,
            clock,
            audit,
            pending: RwLock::new(HashMap::new()),
            purge_grace: Duration::seconds(DEFAULT_PURGE_GRACE_SECS),
        }
    }

    /// Keep finished logins for `grace` past their TTL before purging.
    pub fn with_purge_grace(mut self, grace: Duration) -> Self {
        self.purge_grace = grace;
        self
    }

    /// Start a push login for `subject` and remember it under a new flow token.
    pub fn begin(&self, subject: &str) -> Result<LoginTicket, TwoFactorError> {
        let flow_token = generate_flow_token()?;
        let request = self.lifecycle.start(subject);

        let ticket = LoginTicket {
            flow_token: flow_token.clone(),
            request_id: request.id().map(str::to_string),
            state: request.state(),
        };
        let entry = PendingLogin {
            request_id: ticket.request_id.clone(),
            purge_after: request
                .expires_at()
                .and_then(|at| at.checked_add_signed(self.purge_grace)),
            request: Mutex::new(request),
        };

        self.purge_stale();
        self.pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(flow_token, Arc::new(entry));

        Ok(ticket)
    }

    /// Answer one browser poll with a single non-blocking status read.
    ///
    /// A flow whose request could not be created has no identifier to
    /// present; its own polls get the stored `Error` state.
    pub fn check_auth_status(
        &self,
        flow_token: &str,
        request_id: &str,
    ) -> Result<StatusPayload, StatusError> {
        let entry = self.lookup(flow_token)?;

        if let Some(id) = entry.request_id.as_deref() {
            if !constant_time_eq(id, request_id) {
                return Err(self.reject("request does not belong to login flow"));
            }
        }

        let mut request = entry.request.lock().unwrap_or_else(PoisonError::into_inner);
        let status = self.lifecycle.poll(&mut request);
        Ok(StatusPayload { status })
    }

    /// Resolve the login continuation for a flow.
    ///
    /// Terminal outcomes are returned and forgotten; a still pending request
    /// stays stored and its state is returned so the host can keep waiting.
    pub fn finish(&self, flow_token: &str) -> Option<AuthState> {
        let entry = self
            .pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(flow_token)
            .cloned()?;

        let state = {
            let mut request = entry.request.lock().unwrap_or_else(PoisonError::into_inner);
            self.lifecycle.poll(&mut request)
        };

        if state.is_terminal() {
            self.pending
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(flow_token);
        }

        Some(state)
    }

    /// Drop logins past their TTL plus the grace period. Returns how many
    /// were removed.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now();
        let mut pending = self.pending.write().unwrap_or_else(PoisonError::into_inner);
        let before = pending.len();

        pending.retain(|_, entry| entry.purge_after.map_or(true, |limit| now <= limit));

        let removed = before - pending.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = pending.len(), "Purged stale pending logins");
        }
        removed
    }

    /// Number of logins currently tracked.
    pub fn len(&self) -> usize {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, flow_token: &str) -> Result<Arc<PendingLogin>, StatusError> {
        if !is_valid_flow_token(flow_token) {
            return Err(self.reject("malformed flow token"));
        }

        let entry = self
            .pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(flow_token)
            .cloned();

        entry.ok_or_else(|| self.reject("unknown login flow"))
    }

    fn reject(&self, reason: &str) -> StatusError {
        tracing::warn!(reason, "Rejected status poll");
        self.audit.record(AuditEvent::status_poll_rejected(reason));
        StatusError::UnknownRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::RequestTemplate;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::remote::{RemoteService, RemoteStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration as StdDuration, Instant};

    /// Issues sequential request ids and answers every poll with a fixed status.
    struct FixedRemote {
        next_id: AtomicUsize,
        status: RemoteStatus,
        polls: AtomicUsize,
    }

    impl FixedRemote {
        fn new(status: RemoteStatus) -> Self {
            Self {
                next_id: AtomicUsize::new(1),
                status,
                polls: AtomicUsize::new(0),
            }
        }
    }

    impl RemoteService for FixedRemote {
        fn create_request(&self, _: &str, _: &str, _: &str, _: u64) -> Result<String, TwoFactorError> {
            Ok(format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn get_status(&self, _: &str) -> Result<RemoteStatus, TwoFactorError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status.clone())
        }

        fn delete_user(&self, _: &str) -> Result<(), TwoFactorError> {
            Ok(())
        }

        fn description(&self) -> &str {
            "fixed"
        }
    }

    struct Harness {
        remote: Arc<FixedRemote>,
        clock: Arc<ManualClock>,
        audit: Arc<MemoryAuditSink>,
        endpoint: StatusEndpoint,
    }

    fn harness(status: RemoteStatus) -> Harness {
        let remote = Arc::new(FixedRemote::new(status));
        let clock = Arc::new(ManualClock::default());
        let audit = Arc::new(MemoryAuditSink::new());
        let lifecycle = Arc::new(AuthRequestLifecycle::new(
            remote.clone(),
            RequestTemplate {
                title: "Login".into(),
                message: "Proceed as %user%?".into(),
                ttl_seconds: 30,
            },
            clock.clone(),
            audit.clone(),
        ));
        let endpoint = StatusEndpoint::new(lifecycle, clock.clone(), audit.clone());
        Harness {
            remote,
            clock,
            audit,
            endpoint,
        }
    }

    #[test]
    fn test_poll_with_matching_flow() {
        let h = harness(RemoteStatus::Approved);
        let ticket = h.endpoint.begin("bob").unwrap();
        assert_eq!(ticket.state, AuthState::Pending);

        let id = ticket.request_id.clone().unwrap();
        let payload = h.endpoint.check_auth_status(&ticket.flow_token, &id).unwrap();
        assert_eq!(payload.status, AuthState::Approved);
    }

    #[test]
    fn test_poll_of_other_flow_is_rejected() {
        let h = harness(RemoteStatus::Pending);
        let bob = h.endpoint.begin("bob").unwrap();
        let mallory = h.endpoint.begin("mallory").unwrap();

        let result = h
            .endpoint
            .check_auth_status(&mallory.flow_token, bob.request_id.as_deref().unwrap());

        assert_eq!(result, Err(StatusError::UnknownRequest));
        assert_eq!(h.remote.polls.load(Ordering::SeqCst), 0);
        assert!(h
            .audit
            .event_types()
            .contains(&"STATUS_POLL_REJECTED"));
    }

    #[test]
    fn test_unknown_flow_token_is_rejected() {
        let h = harness(RemoteStatus::Pending);

        let result = h.endpoint.check_auth_status("ntk-0-00", "req-1");

        assert_eq!(result, Err(StatusError::UnknownRequest));
        assert_eq!(h.audit.event_types(), vec!["STATUS_POLL_REJECTED"]);
    }

    #[test]
    fn test_payload_serialization() {
        let payload = StatusPayload {
            status: AuthState::Pending,
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"status":"pending"}"#
        );
    }

    #[test]
    fn test_finish_forgets_terminal_logins() {
        let h = harness(RemoteStatus::Rejected);
        let ticket = h.endpoint.begin("carol").unwrap();

        assert_eq!(h.endpoint.finish(&ticket.flow_token), Some(AuthState::Rejected));
        assert!(h.endpoint.is_empty());
        assert_eq!(h.endpoint.finish(&ticket.flow_token), None);
    }

    #[test]
    fn test_finish_keeps_pending_logins() {
        let h = harness(RemoteStatus::Pending);
        let ticket = h.endpoint.begin("bob").unwrap();

        assert_eq!(h.endpoint.finish(&ticket.flow_token), Some(AuthState::Pending));
        assert_eq!(h.endpoint.len(), 1);
    }

    #[test]
    fn test_purge_after_ttl_and_grace() {
        let h = harness(RemoteStatus::Pending);
        let endpoint = h.endpoint.with_purge_grace(Duration::seconds(10));
        endpoint.begin("bob").unwrap();

        h.clock.advance(Duration::seconds(40));
        assert_eq!(endpoint.purge_stale(), 0);

        h.clock.advance(Duration::seconds(1));
        assert_eq!(endpoint.purge_stale(), 1);
        assert!(endpoint.is_empty());
    }

    #[test]
    fn test_begin_purges_stale_logins() {
        let h = harness(RemoteStatus::Pending);
        h.endpoint.begin("bob").unwrap();

        h.clock.advance(Duration::seconds(120));
        h.endpoint.begin("carol").unwrap();

        assert_eq!(h.endpoint.len(), 1);
    }

    #[test]
    fn test_concurrent_polls_share_one_request() {
        let h = harness(RemoteStatus::Pending);
        let ticket = h.endpoint.begin("bob").unwrap();
        let id = ticket.request_id.clone().unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let payload = h.endpoint.check_auth_status(&ticket.flow_token, &id).unwrap();
                    assert_eq!(payload.status, AuthState::Pending);
                });
            }
        });

        assert_eq!(h.remote.polls.load(Ordering::SeqCst), 8);
        assert_eq!(h.endpoint.len(), 1);
    }

    fn endpoint_for(remote: Arc<dyn RemoteService>, audit: Arc<MemoryAuditSink>) -> StatusEndpoint {
        let clock = Arc::new(ManualClock::default());
        let lifecycle = Arc::new(AuthRequestLifecycle::new(
            remote,
            RequestTemplate {
                title: "Login".into(),
                message: "Proceed as %user%?".into(),
                ttl_seconds: 30,
            },
            clock.clone(),
            audit.clone(),
        ));
        StatusEndpoint::new(lifecycle, clock, audit)
    }

    /// Blocks status reads of `req-1` until the test has observed them.
    struct SlowRemote {
        next_id: AtomicUsize,
        entered: Mutex<mpsc::Sender<()>>,
        delay: StdDuration,
    }

    impl RemoteService for SlowRemote {
        fn create_request(&self, _: &str, _: &str, _: &str, _: u64) -> Result<String, TwoFactorError> {
            Ok(format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn get_status(&self, request_id: &str) -> Result<RemoteStatus, TwoFactorError> {
            if request_id == "req-1" {
                let _ = self.entered.lock().unwrap().send(());
                std::thread::sleep(self.delay);
            }
            Ok(RemoteStatus::Pending)
        }

        fn delete_user(&self, _: &str) -> Result<(), TwoFactorError> {
            Ok(())
        }

        fn description(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_slow_poll_does_not_stall_other_flows() {
        let (entered, poll_started) = mpsc::channel();
        let remote = Arc::new(SlowRemote {
            next_id: AtomicUsize::new(1),
            entered: Mutex::new(entered),
            delay: StdDuration::from_millis(1500),
        });
        let endpoint = endpoint_for(remote, Arc::new(MemoryAuditSink::new()));
        let bob = endpoint.begin("bob").unwrap();
        assert_eq!(bob.request_id.as_deref(), Some("req-1"));

        std::thread::scope(|s| {
            s.spawn(|| endpoint.check_auth_status(&bob.flow_token, "req-1").unwrap());
            poll_started.recv().unwrap();

            let started = Instant::now();
            let carol = endpoint.begin("carol").unwrap();
            let payload = endpoint
                .check_auth_status(&carol.flow_token, carol.request_id.as_deref().unwrap())
                .unwrap();
            endpoint.purge_stale();
            let elapsed = started.elapsed();

            assert_eq!(payload.status, AuthState::Pending);
            assert!(
                elapsed < StdDuration::from_millis(500),
                "other flow waited {:?}",
                elapsed
            );
        });
    }

    struct RefusingRemote;

    impl RemoteService for RefusingRemote {
        fn create_request(&self, _: &str, _: &str, _: &str, _: u64) -> Result<String, TwoFactorError> {
            Err(TwoFactorError::RemoteRejected("no enrolled device".into()))
        }

        fn get_status(&self, _: &str) -> Result<RemoteStatus, TwoFactorError> {
            unreachable!("failed requests are never polled remotely")
        }

        fn delete_user(&self, _: &str) -> Result<(), TwoFactorError> {
            Ok(())
        }

        fn description(&self) -> &str {
            "refusing"
        }
    }

    #[test]
    fn test_failed_creation_reports_error_to_own_flow() {
        let audit = Arc::new(MemoryAuditSink::new());
        let endpoint = endpoint_for(Arc::new(RefusingRemote), audit.clone());

        let ticket = endpoint.begin("dave").unwrap();
        assert_eq!(ticket.state, AuthState::Error);
        assert!(ticket.request_id.is_none());

        let payload = endpoint.check_auth_status(&ticket.flow_token, "").unwrap();
        assert_eq!(payload.status, AuthState::Error);
        assert_eq!(audit.event_types(), vec!["PUSH_REQUEST_FAILED"]);
    }
}
