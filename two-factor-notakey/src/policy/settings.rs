//! Validation applied when an administrator saves plugin settings.

use crate::config::NotakeyConfig;

/// Settings after validation.
#[derive(Debug, Clone)]
pub struct GuardedSettings {
    pub config: NotakeyConfig,
    /// `reject_login_without_mfa` was requested but dropped.
    pub reject_flag_dropped: bool,
}

/// Refuse to enable `reject_login_without_mfa` for an administrator who has
/// no second factor of their own, which would lock them out on next login.
pub fn guard_settings(mut config: NotakeyConfig, admin_uses_two_factor: bool) -> GuardedSettings {
    let mut reject_flag_dropped = false;

    if config.reject_login_without_mfa && !admin_uses_two_factor {
        tracing::warn!("Not enabling reject_login_without_mfa: saving administrator has no second factor");
        config.reject_login_without_mfa = false;
        reject_flag_dropped = true;
    }

    GuardedSettings {
        config,
        reject_flag_dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_reject() -> NotakeyConfig {
        NotakeyConfig {
            reject_login_without_mfa: true,
            ..NotakeyConfig::default()
        }
    }

    #[test]
    fn test_flag_dropped_for_admin_without_two_factor() {
        let guarded = guard_settings(with_reject(), false);
        assert!(guarded.reject_flag_dropped);
        assert!(!guarded.config.reject_login_without_mfa);
    }

    #[test]
    fn test_flag_kept_for_admin_with_two_factor() {
        let guarded = guard_settings(with_reject(), true);
        assert!(!guarded.reject_flag_dropped);
        assert!(guarded.config.reject_login_without_mfa);
    }

    #[test]
    fn test_other_settings_untouched() {
        let mut cfg = with_reject();
        cfg.request_ttl = 60;
        let guarded = guard_settings(cfg, false);
        assert_eq!(guarded.config.request_ttl, 60);
    }
}
