//! Protocol client for the remote authentication service.
//!
//! [`RemoteService`] is the seam the request lifecycle and user sync depend
//! on; [`NasClient`] implements it over HTTP.

pub mod client;
pub mod credential;
pub mod types;

pub use client::NasClient;
pub use credential::{CallError, CredentialStore, RemoteCredential};
pub use types::RemoteStatus;

use crate::error::TwoFactorError;

/// Operations the core needs from the remote authentication service.
pub trait RemoteService: Send + Sync {
    /// Submit a new out-of-band approval request and return its identifier.
    fn create_request(
        &self,
        subject: &str,
        title: &str,
        message: &str,
        ttl_seconds: u64,
    ) -> Result<String, TwoFactorError>;

    /// Read the current state of a request. Has no remote side effects.
    fn get_status(&self, request_id: &str) -> Result<RemoteStatus, TwoFactorError>;

    /// Remove the remote identity of a subject. Absent subjects are not an error.
    fn delete_user(&self, subject: &str) -> Result<(), TwoFactorError>;

    /// Get a user-friendly description of this service.
    fn description(&self) -> &str;
}
