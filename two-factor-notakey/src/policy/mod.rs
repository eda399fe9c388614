//! Second-factor provider policy.
//!
//! Decides which providers the host offers site-wide, which are enabled for
//! a given user, and whether a login without any second factor is refused.
//! Everything here is a pure function of the loaded [`NotakeyConfig`];
//! policy changes affect only logins that start after the new configuration
//! is loaded.
//!
//! [`NotakeyConfig`]: crate::config::NotakeyConfig

pub mod engine;
pub mod providers;
pub mod settings;

pub use engine::{PolicyDecision, ProviderPolicyEngine, ProviderRegistry, UserContext, Verdict};
pub use providers::{known_providers, provider_label, NOTAKEY_PROVIDER, PROVIDER_CATALOGUE};
pub use settings::{guard_settings, GuardedSettings};
