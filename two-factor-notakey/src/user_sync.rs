//! Remote identity cleanup when a host user is deleted.

use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::remote::RemoteService;

/// Mirrors host user deletions to the remote authentication service.
pub struct UserSyncService {
    remote: Option<Arc<dyn RemoteService>>,
    audit: Arc<dyn AuditSink>,
}

impl UserSyncService {
    pub fn new(remote: Arc<dyn RemoteService>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            remote: Some(remote),
            audit,
        }
    }

    /// A service for a site whose remote settings are incomplete. Every
    /// removal is logged as failed and skipped.
    pub fn unconfigured(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            remote: None,
            audit,
        }
    }

    /// Handle one host user deletion.
    ///
    /// Never fails: the local deletion must go ahead whatever happens
    /// remotely. Exactly one audit event is recorded per call.
    pub fn on_user_removed(&self, login: &str) {
        let Some(remote) = &self.remote else {
            tracing::warn!(user = %login, "Remote service not configured, skipping remote user removal");
            self.audit.record(AuditEvent::remote_user_delete_failed(
                login,
                "remote service not configured",
            ));
            return;
        };

        match remote.delete_user(login) {
            Ok(()) => {
                tracing::info!(user = %login, "Remote user removed");
                self.audit.record(AuditEvent::remote_user_deleted(login));
            }
            Err(err) => {
                tracing::error!(user = %login, error = %err, "Remote user removal failed");
                self.audit
                    .record(AuditEvent::remote_user_delete_failed(login, &err.to_string()));
            }
        }
    }
}
