//! Push authentication request and its states.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::PushOutcome;

/// State of a push authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Built locally, not yet accepted by the remote service.
    Created,
    /// Awaiting the user's answer on their device.
    Pending,
    /// The user approved the login.
    Approved,
    /// The user denied the login, or the remote service forgot the request.
    Rejected,
    /// No answer arrived within the request's TTL.
    Expired,
    /// The request could not be created or its outcome cannot be determined.
    Error,
}

impl AuthState {
    /// Terminal states accept no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthState::Approved | AuthState::Rejected | AuthState::Expired | AuthState::Error
        )
    }

    /// Only an approval lets the login continue.
    pub fn allows_login(self) -> bool {
        self == AuthState::Approved
    }

    pub(crate) fn outcome(self) -> Option<PushOutcome> {
        match self {
            AuthState::Approved => Some(PushOutcome::Approved),
            AuthState::Rejected => Some(PushOutcome::Rejected),
            AuthState::Expired => Some(PushOutcome::Expired),
            AuthState::Error => Some(PushOutcome::Error),
            AuthState::Created | AuthState::Pending => None,
        }
    }
}

/// One push-approval attempt for one login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    id: Option<String>,
    subject: String,
    title: String,
    message: String,
    created_at: DateTime<Utc>,
    ttl_seconds: u64,
    state: AuthState,
    #[serde(skip)]
    last_poll_failed: bool,
    #[serde(skip)]
    last_error: Option<String>,
}

impl AuthRequest {
    pub(crate) fn new(
        subject: &str,
        title: String,
        message: String,
        created_at: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            id: None,
            subject: subject.to_string(),
            title,
            message,
            created_at,
            ttl_seconds,
            state: AuthState::Created,
            last_poll_failed: false,
            last_error: None,
        }
    }

    /// Identifier issued by the remote service; absent if creation failed.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Description of the most recent failure, for diagnostics.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the most recent poll could not reach the remote service.
    pub fn last_poll_failed(&self) -> bool {
        self.last_poll_failed
    }

    /// Instant after which the request counts as expired; `None` when the
    /// TTL reaches beyond the representable calendar.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)?;
        self.created_at.checked_add_signed(ttl)
    }

    /// True once strictly more than `ttl_seconds` have elapsed.
    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    pub(crate) fn accept(&mut self, id: String) {
        self.id = Some(id);
        self.transition(AuthState::Pending);
    }

    /// Move to `next` unless already terminal. Returns whether the state changed.
    pub(crate) fn transition(&mut self, next: AuthState) -> bool {
        if self.state.is_terminal() || self.state == next {
            return false;
        }
        self.state = next;
        true
    }

    pub(crate) fn record_failure(&mut self, reason: String, transient: bool) {
        self.last_poll_failed = transient;
        self.last_error = Some(reason);
    }

    pub(crate) fn clear_failure(&mut self) {
        self.last_poll_failed = false;
    }
}
