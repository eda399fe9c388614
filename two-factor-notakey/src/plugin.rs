//! Entry points called by the host authentication pipeline.
//!
//! The host invokes these directly:
//! 1. Provider registration - [`NotakeyTwoFactor::register_providers`]
//! 2. Per-user provider resolution - [`NotakeyTwoFactor::enabled_providers_for_user`]
//! 3. Login with the push provider - [`NotakeyTwoFactor::begin_login`], then
//!    browser polls through [`NotakeyTwoFactor::check_auth_status`], then
//!    [`NotakeyTwoFactor::finish_login`]
//! 4. User deletion - [`NotakeyTwoFactor::on_user_deleted`]
//! 5. Settings save - [`NotakeyTwoFactor::save_settings`]

use std::sync::Arc;

use crate::approval::{AuthRequestLifecycle, AuthState, RequestTemplate};
use crate::audit::{AuditEvent, AuditSink, SystemAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigProvider, NotakeyConfig};
use crate::endpoint::{LoginTicket, StatusEndpoint, StatusError, StatusPayload};
use crate::error::TwoFactorError;
use crate::policy::{guard_settings, GuardedSettings, ProviderPolicyEngine, ProviderRegistry, UserContext};
use crate::remote::{NasClient, RemoteService};
use crate::user_sync::UserSyncService;

/// Push second factor wired for one loaded configuration.
pub struct NotakeyTwoFactor {
    config: NotakeyConfig,
    audit: Arc<dyn AuditSink>,
    endpoint: Option<StatusEndpoint>,
    user_sync: UserSyncService,
}

impl NotakeyTwoFactor {
    /// Load configuration and connect to the configured service.
    ///
    /// Incomplete server settings are not an error here: provider policy
    /// still applies, while push logins and user sync are unavailable.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self, TwoFactorError> {
        let config = provider.load()?;
        let audit: Arc<dyn AuditSink> = Arc::new(SystemAuditSink::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        if !config.ready() {
            tracing::warn!(missing = ?config.missing_remote_fields(), "Push authentication not configured");
            return Ok(Self::unconfigured(config, audit));
        }

        let remote: Arc<dyn RemoteService> = Arc::new(NasClient::new(&config)?);
        Ok(Self::with_remote(config, remote, clock, audit))
    }

    /// Wire against a given remote service, clock and audit sink.
    pub fn with_remote(
        config: NotakeyConfig,
        remote: Arc<dyn RemoteService>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        if !config.ready() {
            return Self::unconfigured(config, audit);
        }

        let lifecycle = Arc::new(AuthRequestLifecycle::new(
            remote.clone(),
            RequestTemplate::from_config(&config),
            clock.clone(),
            audit.clone(),
        ));

        Self {
            endpoint: Some(StatusEndpoint::new(lifecycle, clock, audit.clone())),
            user_sync: UserSyncService::new(remote, audit.clone()),
            config,
            audit,
        }
    }

    fn unconfigured(config: NotakeyConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            endpoint: None,
            user_sync: UserSyncService::unconfigured(audit.clone()),
            config,
            audit,
        }
    }

    pub fn config(&self) -> &NotakeyConfig {
        &self.config
    }

    /// Whether push logins can be started.
    pub fn is_ready(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Start a push login. Fails with a configuration error while the
    /// server settings are incomplete.
    pub fn begin_login(&self, subject: &str) -> Result<LoginTicket, TwoFactorError> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            TwoFactorError::Configuration(format!(
                "missing settings: {}",
                self.config.missing_remote_fields().join(", ")
            ))
        })?;
        endpoint.begin(subject)
    }

    /// Answer a browser status poll.
    pub fn check_auth_status(
        &self,
        flow_token: &str,
        request_id: &str,
    ) -> Result<StatusPayload, StatusError> {
        match &self.endpoint {
            Some(endpoint) => endpoint.check_auth_status(flow_token, request_id),
            None => {
                self.audit
                    .record(AuditEvent::status_poll_rejected("push authentication not configured"));
                Err(StatusError::UnknownRequest)
            }
        }
    }

    /// State of a login flow when the host continues the login. Only
    /// [`AuthState::Approved`] lets it proceed.
    pub fn finish_login(&self, flow_token: &str) -> Option<AuthState> {
        self.endpoint.as_ref()?.finish(flow_token)
    }

    /// Host user deletion hook. Never fails.
    pub fn on_user_deleted(&self, login: &str) {
        self.user_sync.on_user_removed(login);
    }

    /// Validate settings submitted by an administrator.
    pub fn save_settings(config: NotakeyConfig, admin_uses_two_factor: bool) -> GuardedSettings {
        guard_settings(config, admin_uses_two_factor)
    }

    /// Purge finished and abandoned logins.
    pub fn purge_stale_logins(&self) -> usize {
        self.endpoint.as_ref().map_or(0, StatusEndpoint::purge_stale)
    }
}

impl ProviderRegistry for NotakeyTwoFactor {
    fn register_providers(&self, candidates: &[String]) -> Vec<String> {
        ProviderPolicyEngine::new(&self.config).register_providers(candidates)
    }

    fn enabled_providers_for_user(
        &self,
        enabled: &[String],
        context: &UserContext,
    ) -> Result<Vec<String>, TwoFactorError> {
        let result =
            ProviderPolicyEngine::new(&self.config).enabled_providers_for_user(enabled, context);
        if let Err(TwoFactorError::PolicyLockout) = result {
            tracing::warn!(user_id = context.user_id, "Login refused: no second factor enabled");
            self.audit
                .record(AuditEvent::login_rejected_no_mfa(context.user_id));
        }
        result
    }
}
