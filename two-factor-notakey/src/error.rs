//! Error taxonomy shared by the remote client, the request lifecycle and the
//! provider policy.
//!
//! Transport-level errors are translated into these variants inside
//! [`crate::remote`]; nothing above that layer sees a `reqwest` error.

use thiserror::Error;

/// Message shown to a user refused by the reject-without-MFA policy.
pub const LOCKOUT_MESSAGE: &str =
    "Login without 2FA is not allowed. Contact your site administrator.";

#[derive(Debug, Error)]
pub enum TwoFactorError {
    /// Required settings are missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote service refused the configured client credentials.
    #[error("Authentication with remote service failed: {0}")]
    AuthFailure(String),

    /// Network or transport failure talking to the remote service.
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote service explicitly refused the operation.
    #[error("Remote service rejected request: {0}")]
    RemoteRejected(String),

    /// The reject-without-MFA policy refused a login with no enabled provider.
    #[error("Login without 2FA is not allowed. Contact your site administrator.")]
    PolicyLockout,
}

impl TwoFactorError {
    /// Whether the error is a transient condition that a later poll may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> &str {
        match self {
            Self::PolicyLockout => LOCKOUT_MESSAGE,
            Self::RemoteRejected(_) => "Authentication request was refused.",
            Self::Configuration(_) | Self::AuthFailure(_) => {
                "Two-factor authentication is not available. Contact your site administrator."
            }
            Self::RemoteUnavailable(_) => {
                "Authentication service is temporarily unavailable. Please try again."
            }
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse configuration YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

impl From<ConfigError> for TwoFactorError {
    fn from(err: ConfigError) -> Self {
        TwoFactorError::Configuration(err.to_string())
    }
}
