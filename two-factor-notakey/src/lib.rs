//! Notakey push second factor for a host authentication pipeline.
//!
//! After the first factor succeeds the host asks this crate which second
//! factors apply to the user. When the push provider is selected:
//! 1. A push request is created on the Notakey Authentication Server
//! 2. The user approves or denies it on their phone
//! 3. The browser polls the status endpoint until the request is resolved
//! 4. The login continues only on approval
//!
//! Deleting a host user removes the matching remote identity.
//!
//! ## Environment Variables
//! - `NOTAKEY_CONFIG_FILE` (optional): configuration file path
//! - `NOTAKEY_CONFIG_YAML` (optional): inline YAML configuration
//! - `NOTAKEY_SERVICE_URL`, `NOTAKEY_CLIENT_ID`, `NOTAKEY_CLIENT_SECRET`,
//!   `NOTAKEY_SERVICE_ID`: server settings when no file is used
//! - `NOTAKEY_AUDIT_LOG` (optional): audit file path

#![deny(unsafe_code)]

pub mod approval;
pub mod audit;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod plugin;
pub mod policy;
pub mod remote;
pub mod security;
pub mod user_sync;

pub use error::TwoFactorError;
pub use plugin::NotakeyTwoFactor;
