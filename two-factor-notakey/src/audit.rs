//! Audit logging for second-factor events.
//!
//! Events are serialized as JSON tagged by event name. [`SystemAuditSink`]
//! writes them to:
//! 1. Syslog (AUTH facility) - for SIEM integration
//! 2. The audit file (`NOTAKEY_AUDIT_LOG`, default
//!    `/var/log/two-factor-notakey-audit.log`)
//! 3. `tracing` - for operators running with a subscriber
//!
//! Secrets (client secret, access tokens) are never part of an event.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use syslog::{Facility, Formatter3164};

/// Default audit log file path
const DEFAULT_AUDIT_LOG: &str = "/var/log/two-factor-notakey-audit.log";

/// Global syslog writer
static SYSLOG_WRITER: Lazy<Mutex<Option<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>> =
    Lazy::new(|| {
        let formatter = Formatter3164 {
            facility: Facility::LOG_AUTH,
            hostname: None,
            process: "two-factor-notakey".to_string(),
            pid: std::process::id(),
        };

        let logger = syslog::unix(formatter).ok();
        Mutex::new(logger)
    });

/// Final outcome of a push request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Approved,
    Rejected,
    Expired,
    Error,
}

/// Audit events for the push second factor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum AuditEvent {
    /// Push request accepted by the remote service
    #[serde(rename = "PUSH_REQUEST_CREATED")]
    PushRequestCreated {
        timestamp: String,
        user: String,
        request_id: String,
        ttl_seconds: u64,
    },

    /// Push request could not be created
    #[serde(rename = "PUSH_REQUEST_FAILED")]
    PushRequestFailed {
        timestamp: String,
        user: String,
        reason: String,
    },

    /// Push request reached a terminal state
    #[serde(rename = "PUSH_RESOLVED")]
    PushResolved {
        timestamp: String,
        user: String,
        request_id: String,
        outcome: PushOutcome,
    },

    /// Login refused because the user has no second factor enabled
    #[serde(rename = "LOGIN_REJECTED_NO_MFA")]
    LoginRejectedNoMfa { timestamp: String, user_id: u64 },

    /// Remote identity removed after local user deletion
    #[serde(rename = "REMOTE_USER_DELETED")]
    RemoteUserDeleted { timestamp: String, user: String },

    /// Remote identity removal failed; local deletion still proceeded
    #[serde(rename = "REMOTE_USER_DELETE_FAILED")]
    RemoteUserDeleteFailed {
        timestamp: String,
        user: String,
        reason: String,
    },

    /// A status poll named a request the caller's login flow did not create
    #[serde(rename = "STATUS_POLL_REJECTED")]
    StatusPollRejected { timestamp: String, reason: String },
}

impl AuditEvent {
    pub fn push_request_created(user: &str, request_id: &str, ttl_seconds: u64) -> Self {
        Self::PushRequestCreated {
            timestamp: iso_timestamp(),
            user: user.to_string(),
            request_id: request_id.to_string(),
            ttl_seconds,
        }
    }

    pub fn push_request_failed(user: &str, reason: &str) -> Self {
        Self::PushRequestFailed {
            timestamp: iso_timestamp(),
            user: user.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn push_resolved(user: &str, request_id: &str, outcome: PushOutcome) -> Self {
        Self::PushResolved {
            timestamp: iso_timestamp(),
            user: user.to_string(),
            request_id: request_id.to_string(),
            outcome,
        }
    }

    pub fn login_rejected_no_mfa(user_id: u64) -> Self {
        Self::LoginRejectedNoMfa {
            timestamp: iso_timestamp(),
            user_id,
        }
    }

    pub fn remote_user_deleted(user: &str) -> Self {
        Self::RemoteUserDeleted {
            timestamp: iso_timestamp(),
            user: user.to_string(),
        }
    }

    pub fn remote_user_delete_failed(user: &str, reason: &str) -> Self {
        Self::RemoteUserDeleteFailed {
            timestamp: iso_timestamp(),
            user: user.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn status_poll_rejected(reason: &str) -> Self {
        Self::StatusPollRejected {
            timestamp: iso_timestamp(),
            reason: reason.to_string(),
        }
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PushRequestCreated { .. } => "PUSH_REQUEST_CREATED",
            Self::PushRequestFailed { .. } => "PUSH_REQUEST_FAILED",
            Self::PushResolved { .. } => "PUSH_RESOLVED",
            Self::LoginRejectedNoMfa { .. } => "LOGIN_REJECTED_NO_MFA",
            Self::RemoteUserDeleted { .. } => "REMOTE_USER_DELETED",
            Self::RemoteUserDeleteFailed { .. } => "REMOTE_USER_DELETE_FAILED",
            Self::StatusPollRejected { .. } => "STATUS_POLL_REJECTED",
        }
    }

    /// Failures are logged at warning level.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::PushRequestFailed { .. }
                | Self::LoginRejectedNoMfa { .. }
                | Self::RemoteUserDeleteFailed { .. }
                | Self::StatusPollRejected { .. }
        )
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes events to syslog, the audit file and `tracing`.
#[derive(Debug, Clone, Default)]
pub struct SystemAuditSink {
    log_path: Option<String>,
}

impl SystemAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the audit file at a specific path.
    pub fn with_log_path(path: &str) -> Self {
        Self {
            log_path: Some(path.to_string()),
        }
    }
}

impl AuditSink for SystemAuditSink {
    fn record(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, event = event.event_type(), "Failed to serialize audit event");
                return;
            }
        };

        log_to_syslog(&json);

        let log_path = self.log_path.clone().unwrap_or_else(|| {
            std::env::var("NOTAKEY_AUDIT_LOG").unwrap_or_else(|_| DEFAULT_AUDIT_LOG.to_string())
        });
        if let Err(e) = append_to_file(&log_path, &json) {
            tracing::debug!(path = %log_path, error = %e, "Audit file not writable");
        }

        if event.is_failure() {
            tracing::warn!(target: "audit", event = event.event_type(), "{}", json);
        } else {
            tracing::info!(target: "audit", event = event.event_type(), "{}", json);
        }
    }
}

/// Keeps events in memory; used by tests and embedding hosts that forward
/// events elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event type names, in recording order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(AuditEvent::event_type).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Get the current timestamp in ISO 8601 format.
fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Append a line to a file.
fn append_to_file(path: &str, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(file, "{}", content)?;
    Ok(())
}

/// Log a message to syslog.
fn log_to_syslog(message: &str) {
    if let Ok(mut guard) = SYSLOG_WRITER.lock() {
        if let Some(ref mut logger) = *guard {
            let _ = logger.info(message);
        }
    }
}
