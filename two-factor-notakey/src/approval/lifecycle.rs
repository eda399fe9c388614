//! Push request lifecycle: creation, polling and expiry.
//!
//! ```text
//! Created --create ok--> Pending --approved----------> Approved
//!    |                      |----denied / not found--> Rejected
//!    |                      |----past TTL------------> Expired
//!    |                      `----past TTL after an
//!    |                           unreachable poll----> Error
//!    `--create failed-----------------------------------> Error
//! ```
//!
//! A poll that cannot reach the remote service leaves the state unchanged so a
//! single dropped packet does not fail the login.

use std::sync::Arc;

use super::request::{AuthRequest, AuthState};
use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::config::{NotakeyConfig, USER_PLACEHOLDER};
use crate::error::TwoFactorError;
use crate::remote::{RemoteService, RemoteStatus};

/// Request text and lifetime taken from configuration.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub title: String,
    pub message: String,
    pub ttl_seconds: u64,
}

impl RequestTemplate {
    pub fn from_config(config: &NotakeyConfig) -> Self {
        Self {
            title: config.request_title.clone(),
            message: config.request_message.clone(),
            ttl_seconds: config.request_ttl,
        }
    }

    fn render(&self, subject: &str) -> (String, String) {
        (
            self.title.replace(USER_PLACEHOLDER, subject),
            self.message.replace(USER_PLACEHOLDER, subject),
        )
    }
}

/// Drives push requests against a remote service.
pub struct AuthRequestLifecycle {
    remote: Arc<dyn RemoteService>,
    template: RequestTemplate,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl AuthRequestLifecycle {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        template: RequestTemplate,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            remote,
            template,
            clock,
            audit,
        }
    }

    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    /// Create the remote request for one login attempt.
    ///
    /// The returned request is `Pending` on success and `Error` otherwise.
    /// Callers keep the returned value for every later poll; calling `start`
    /// again creates a second remote request.
    pub fn start(&self, subject: &str) -> AuthRequest {
        let (title, message) = self.template.render(subject);
        let mut request = AuthRequest::new(
            subject,
            title,
            message,
            self.clock.now(),
            self.template.ttl_seconds,
        );

        match self.remote.create_request(
            subject,
            request.title(),
            request.message(),
            request.ttl_seconds(),
        ) {
            Ok(id) => {
                tracing::info!(user = %subject, request_id = %id, service = self.remote.description(), "Push request created");
                self.audit.record(AuditEvent::push_request_created(
                    subject,
                    &id,
                    request.ttl_seconds(),
                ));
                request.accept(id);
            }
            Err(err) => {
                tracing::warn!(user = %subject, error = %err, "Push request creation failed");
                self.audit
                    .record(AuditEvent::push_request_failed(subject, &err.to_string()));
                request.record_failure(err.to_string(), false);
                request.transition(AuthState::Error);
            }
        }

        request
    }

    /// Advance a request by at most one remote status read.
    ///
    /// Terminal requests are returned unchanged without a remote call, as are
    /// requests past their TTL, which resolve locally.
    pub fn poll(&self, request: &mut AuthRequest) -> AuthState {
        if request.state().is_terminal() {
            return request.state();
        }

        if request.is_past_ttl(self.clock.now()) {
            let next = if request.last_poll_failed() {
                AuthState::Error
            } else {
                AuthState::Expired
            };
            self.resolve(request, next);
            return request.state();
        }

        let Some(id) = request.id().map(str::to_string) else {
            request.record_failure("request was never accepted remotely".to_string(), false);
            self.resolve(request, AuthState::Error);
            return request.state();
        };

        match self.remote.get_status(&id) {
            Ok(status) => {
                request.clear_failure();
                let next = match status {
                    RemoteStatus::Pending => AuthState::Pending,
                    RemoteStatus::Approved => AuthState::Approved,
                    RemoteStatus::Rejected => AuthState::Rejected,
                    // The service will never resolve a request it has forgotten
                    RemoteStatus::NotFound => AuthState::Rejected,
                    RemoteStatus::Expired => AuthState::Expired,
                    RemoteStatus::Unrecognized(value) => {
                        tracing::warn!(request_id = %id, response_type = %value, "Unrecognized remote request status");
                        request.record_failure(format!("unrecognized status: {}", value), false);
                        AuthState::Error
                    }
                };
                self.resolve(request, next);
            }
            Err(err) => self.handle_poll_error(request, &id, err),
        }

        request.state()
    }

    fn handle_poll_error(&self, request: &mut AuthRequest, id: &str, err: TwoFactorError) {
        if err.is_transient() {
            tracing::warn!(request_id = %id, error = %err, "Status poll failed, keeping previous state");
            request.record_failure(err.to_string(), true);
            return;
        }

        tracing::warn!(request_id = %id, error = %err, "Status poll failed permanently");
        request.record_failure(err.to_string(), false);
        let next = match err {
            TwoFactorError::RemoteRejected(_) => AuthState::Rejected,
            _ => AuthState::Error,
        };
        self.resolve(request, next);
    }

    fn resolve(&self, request: &mut AuthRequest, next: AuthState) {
        if !request.transition(next) {
            return;
        }
        if let Some(outcome) = next.outcome() {
            tracing::info!(user = %request.subject(), state = ?next, "Push request resolved");
            self.audit.record(AuditEvent::push_resolved(
                request.subject(),
                request.id().unwrap_or("-"),
                outcome,
            ));
        }
    }
}
