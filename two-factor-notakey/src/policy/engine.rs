//! Provider visibility and per-user enablement rules.

use crate::config::NotakeyConfig;
use crate::error::{TwoFactorError, LOCKOUT_MESSAGE};

use super::providers::NOTAKEY_PROVIDER;

/// Who is being evaluated, and who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    /// User whose providers are being resolved.
    pub user_id: u64,
    /// Logged-in user performing the request; `None` while still anonymous.
    pub current_user_id: Option<u64>,
}

impl UserContext {
    /// The user is authenticating themselves.
    pub fn login(user_id: u64) -> Self {
        Self {
            user_id,
            current_user_id: None,
        }
    }

    /// `viewer` is looking at `user_id`'s profile.
    pub fn viewed_by(user_id: u64, viewer: u64) -> Self {
        Self {
            user_id,
            current_user_id: Some(viewer),
        }
    }

    /// True when the evaluation concerns the subject of the current login
    /// attempt rather than another user's profile.
    pub fn is_authenticating_subject(&self) -> bool {
        self.current_user_id.map_or(true, |id| id == self.user_id)
    }
}

/// Whether the login may proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Reject { message: String },
}

/// Result of evaluating enabled providers for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub providers: Vec<String>,
    pub verdict: Verdict,
}

impl PolicyDecision {
    pub fn is_rejected(&self) -> bool {
        matches!(self.verdict, Verdict::Reject { .. })
    }
}

/// Provider hooks invoked by the host authentication pipeline.
pub trait ProviderRegistry {
    /// Providers offered site-wide, given the host's candidate set.
    fn register_providers(&self, candidates: &[String]) -> Vec<String>;

    /// Providers enabled for one user.
    ///
    /// Fails with [`TwoFactorError::PolicyLockout`] when the login must be refused.
    fn enabled_providers_for_user(
        &self,
        enabled: &[String],
        context: &UserContext,
    ) -> Result<Vec<String>, TwoFactorError>;
}

/// Policy rules over a loaded configuration.
pub struct ProviderPolicyEngine<'a> {
    config: &'a NotakeyConfig,
}

impl<'a> ProviderPolicyEngine<'a> {
    pub fn new(config: &'a NotakeyConfig) -> Self {
        Self { config }
    }

    /// Apply the global override list, keeping candidate order.
    ///
    /// Without an active override the candidates pass through unchanged.
    pub fn resolve_providers(&self, candidates: &[String]) -> Vec<String> {
        if !self.config.provider_override_active {
            return candidates.to_vec();
        }

        candidates
            .iter()
            .filter(|p| self.config.provider_override_list.contains(p))
            .cloned()
            .collect()
    }

    /// Add the push provider to the candidates, then apply the override list.
    pub fn registered_providers(&self, candidates: &[String]) -> Vec<String> {
        let mut all = candidates.to_vec();
        push_unique(&mut all, NOTAKEY_PROVIDER);
        self.resolve_providers(&all)
    }

    /// Evaluate the enabled providers of one user.
    pub fn evaluate(&self, enabled: &[String], context: &UserContext) -> PolicyDecision {
        let mut providers = enabled.to_vec();
        if self.config.enable_notakey_for_all {
            push_unique(&mut providers, NOTAKEY_PROVIDER);
        }

        let verdict = if self.config.reject_login_without_mfa
            && context.is_authenticating_subject()
            && providers.is_empty()
        {
            Verdict::Reject {
                message: LOCKOUT_MESSAGE.to_string(),
            }
        } else {
            Verdict::Continue
        };

        PolicyDecision { providers, verdict }
    }

    /// Enabled providers for one user, or `PolicyLockout` when the login
    /// must be refused.
    pub fn resolve_enabled_for_user(
        &self,
        enabled: &[String],
        context: &UserContext,
    ) -> Result<Vec<String>, TwoFactorError> {
        let decision = self.evaluate(enabled, context);
        match decision.verdict {
            Verdict::Continue => Ok(decision.providers),
            Verdict::Reject { .. } => Err(TwoFactorError::PolicyLockout),
        }
    }
}

impl ProviderRegistry for ProviderPolicyEngine<'_> {
    fn register_providers(&self, candidates: &[String]) -> Vec<String> {
        self.registered_providers(candidates)
    }

    fn enabled_providers_for_user(
        &self,
        enabled: &[String],
        context: &UserContext,
    ) -> Result<Vec<String>, TwoFactorError> {
        self.resolve_enabled_for_user(enabled, context)
    }
}

fn push_unique(providers: &mut Vec<String>, id: &str) {
    if !providers.iter().any(|p| p == id) {
        providers.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn config() -> NotakeyConfig {
        NotakeyConfig::default()
    }

    #[test]
    fn test_override_intersects_candidates() {
        let mut cfg = config();
        cfg.provider_override_active = true;
        cfg.provider_override_list = names(&["A", "C"]);
        let engine = ProviderPolicyEngine::new(&cfg);

        assert_eq!(
            engine.resolve_providers(&names(&["A", "B", "C", "D"])),
            names(&["A", "C"])
        );
    }

    #[test]
    fn test_inactive_override_passes_through() {
        let mut cfg = config();
        cfg.provider_override_list = names(&["A"]);
        let engine = ProviderPolicyEngine::new(&cfg);

        assert_eq!(
            engine.resolve_providers(&names(&["A", "B"])),
            names(&["A", "B"])
        );
    }

    #[test]
    fn test_override_never_adds_providers() {
        let mut cfg = config();
        cfg.provider_override_active = true;
        cfg.provider_override_list = names(&["A", "Z"]);
        let engine = ProviderPolicyEngine::new(&cfg);

        assert_eq!(engine.resolve_providers(&names(&["A", "B"])), names(&["A"]));
    }

    #[test]
    fn test_registration_adds_push_provider() {
        let cfg = config();
        let engine = ProviderPolicyEngine::new(&cfg);

        let providers = engine.register_providers(&names(&["Two_Factor_Totp"]));
        assert_eq!(providers, names(&["Two_Factor_Totp", NOTAKEY_PROVIDER]));

        // Already present: not duplicated
        let again = engine.register_providers(&providers);
        assert_eq!(again, providers);
    }

    #[test]
    fn test_registration_override_can_hide_push_provider() {
        let mut cfg = config();
        cfg.provider_override_active = true;
        cfg.provider_override_list = names(&["Two_Factor_Totp"]);
        let engine = ProviderPolicyEngine::new(&cfg);

        assert_eq!(
            engine.register_providers(&names(&["Two_Factor_Totp", "Two_Factor_Email"])),
            names(&["Two_Factor_Totp"])
        );
    }

    #[test]
    fn test_enable_for_all_is_idempotent() {
        let mut cfg = config();
        cfg.enable_notakey_for_all = true;
        let engine = ProviderPolicyEngine::new(&cfg);
        let ctx = UserContext::login(7);

        let once = engine.resolve_enabled_for_user(&[], &ctx).unwrap();
        assert_eq!(once, names(&[NOTAKEY_PROVIDER]));

        let twice = engine.resolve_enabled_for_user(&once, &ctx).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_reject_without_mfa_for_login_subject() {
        let mut cfg = config();
        cfg.reject_login_without_mfa = true;
        let engine = ProviderPolicyEngine::new(&cfg);

        let anonymous = engine.resolve_enabled_for_user(&[], &UserContext::login(7));
        assert!(matches!(anonymous, Err(TwoFactorError::PolicyLockout)));

        let own_profile = engine.resolve_enabled_for_user(&[], &UserContext::viewed_by(7, 7));
        assert!(matches!(own_profile, Err(TwoFactorError::PolicyLockout)));
    }

    #[test]
    fn test_admin_viewing_other_user_is_not_rejected() {
        let mut cfg = config();
        cfg.reject_login_without_mfa = true;
        let engine = ProviderPolicyEngine::new(&cfg);

        let result = engine.resolve_enabled_for_user(&[], &UserContext::viewed_by(7, 1));
        assert_eq!(result.unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_enable_for_all_prevents_lockout() {
        let mut cfg = config();
        cfg.reject_login_without_mfa = true;
        cfg.enable_notakey_for_all = true;
        let engine = ProviderPolicyEngine::new(&cfg);

        let decision = engine.evaluate(&[], &UserContext::login(7));
        assert_eq!(decision.verdict, Verdict::Continue);
        assert!(!decision.providers.is_empty());
    }

    #[test]
    fn test_reject_verdict_carries_message() {
        let mut cfg = config();
        cfg.reject_login_without_mfa = true;
        let engine = ProviderPolicyEngine::new(&cfg);

        let decision = engine.evaluate(&[], &UserContext::login(3));
        assert!(decision.is_rejected());
        assert_eq!(
            decision.verdict,
            Verdict::Reject {
                message: LOCKOUT_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_existing_providers_satisfy_reject_rule() {
        let mut cfg = config();
        cfg.reject_login_without_mfa = true;
        let engine = ProviderPolicyEngine::new(&cfg);

        let result = engine.resolve_enabled_for_user(&names(&["Two_Factor_Totp"]), &UserContext::login(3));
        assert_eq!(result.unwrap(), names(&["Two_Factor_Totp"]));
    }
}
