//! Provider policy and user removal scenarios.

use std::sync::Arc;

use two_factor_notakey::audit::MemoryAuditSink;
use two_factor_notakey::config::NotakeyConfig;
use two_factor_notakey::policy::{ProviderPolicyEngine, UserContext, NOTAKEY_PROVIDER};
use two_factor_notakey::remote::{RemoteService, RemoteStatus};
use two_factor_notakey::user_sync::UserSyncService;
use two_factor_notakey::TwoFactorError;

fn names(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn override_list_intersects_candidates() {
    let config = NotakeyConfig {
        provider_override_active: true,
        provider_override_list: names(&["A", "C"]),
        ..NotakeyConfig::default()
    };
    let engine = ProviderPolicyEngine::new(&config);

    assert_eq!(
        engine.resolve_providers(&names(&["A", "B", "C", "D"])),
        names(&["A", "C"])
    );
}

#[test]
fn enable_for_all_prevents_reject_lockout() {
    let config = NotakeyConfig {
        enable_notakey_for_all: true,
        reject_login_without_mfa: true,
        ..NotakeyConfig::default()
    };
    let engine = ProviderPolicyEngine::new(&config);

    for context in [
        UserContext::login(5),
        UserContext::viewed_by(5, 5),
        UserContext::viewed_by(5, 1),
    ] {
        let enabled = engine
            .resolve_enabled_for_user(&[], &context)
            .expect("enable-for-all must never lock a user out");
        assert_eq!(enabled, names(&[NOTAKEY_PROVIDER]));
    }
}

#[test]
fn reject_without_mfa_only_applies_to_login_subject() {
    let config = NotakeyConfig {
        reject_login_without_mfa: true,
        ..NotakeyConfig::default()
    };
    let engine = ProviderPolicyEngine::new(&config);

    assert!(matches!(
        engine.resolve_enabled_for_user(&[], &UserContext::login(5)),
        Err(TwoFactorError::PolicyLockout)
    ));
    assert!(engine
        .resolve_enabled_for_user(&[], &UserContext::viewed_by(5, 1))
        .is_ok());
}

struct UnreachableRemote;

impl RemoteService for UnreachableRemote {
    fn create_request(&self, _: &str, _: &str, _: &str, _: u64) -> Result<String, TwoFactorError> {
        Err(TwoFactorError::RemoteUnavailable("connection refused".into()))
    }

    fn get_status(&self, _: &str) -> Result<RemoteStatus, TwoFactorError> {
        Err(TwoFactorError::RemoteUnavailable("connection refused".into()))
    }

    fn delete_user(&self, _: &str) -> Result<(), TwoFactorError> {
        Err(TwoFactorError::RemoteUnavailable("connection refused".into()))
    }

    fn description(&self) -> &str {
        "unreachable"
    }
}

#[test]
fn alice_removal_survives_unreachable_remote() {
    let audit = Arc::new(MemoryAuditSink::new());
    let sync = UserSyncService::new(Arc::new(UnreachableRemote), audit.clone());

    sync.on_user_removed("alice");

    assert_eq!(audit.events().len(), 1);
    assert_eq!(audit.event_types(), vec!["REMOTE_USER_DELETE_FAILED"]);
}
