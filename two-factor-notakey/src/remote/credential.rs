//! Access credential caching for the remote service.
//!
//! The cached bearer token is the only state shared between concurrent
//! logins. Renewal is serialized so that at most one credential exchange is
//! in flight; a call rejected with an authorization failure is retried once
//! after exactly one renewal and then fails permanently.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::TwoFactorError;

/// Credentials are treated as expired this long before the server says so.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Longest lifetime honoured, whatever the token endpoint claims.
pub const MAX_CREDENTIAL_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Short-lived bearer credential for the remote service.
pub struct RemoteCredential {
    access_token: String,
    expires_at: Instant,
}

impl RemoteCredential {
    /// Lifetimes above [`MAX_CREDENTIAL_LIFETIME`] are clamped.
    pub fn new(access_token: String, lifetime: Duration) -> Self {
        let now = Instant::now();
        let usable = lifetime
            .min(MAX_CREDENTIAL_LIFETIME)
            .saturating_sub(EXPIRY_SKEW);
        Self {
            access_token,
            expires_at: now.checked_add(usable).unwrap_or(now),
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Value for the `Authorization` header.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for RemoteCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredential")
            .field("access_token", &"<redacted>")
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Outcome of a single authorized call attempt.
#[derive(Debug)]
pub enum CallError {
    /// The server refused the credential; renewal may help.
    Unauthorized,
    /// Any other failure, already translated.
    Failed(TwoFactorError),
}

impl From<TwoFactorError> for CallError {
    fn from(err: TwoFactorError) -> Self {
        CallError::Failed(err)
    }
}

/// Thread-safe holder for the current credential.
#[derive(Debug, Default)]
pub struct CredentialStore {
    cached: RwLock<Option<Arc<RemoteCredential>>>,
    renewal: Mutex<()>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached credential, if present and not expired.
    pub fn current(&self) -> Option<Arc<RemoteCredential>> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached.as_ref().filter(|c| !c.is_expired()).cloned()
    }

    /// Drop the cached credential if it is still the one that failed.
    pub fn invalidate(&self, failed: &Arc<RemoteCredential>) {
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        if cached.as_ref().is_some_and(|c| Arc::ptr_eq(c, failed)) {
            *cached = None;
        }
    }

    /// Obtain a usable credential, exchanging client credentials if needed.
    ///
    /// Concurrent callers wait for a renewal already in flight and reuse its
    /// result instead of starting their own.
    pub fn obtain<A>(&self, authenticate: A) -> Result<Arc<RemoteCredential>, TwoFactorError>
    where
        A: Fn() -> Result<RemoteCredential, TwoFactorError>,
    {
        if let Some(credential) = self.current() {
            return Ok(credential);
        }

        let _renewal = self.renewal.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have renewed while we waited
        if let Some(credential) = self.current() {
            return Ok(credential);
        }

        let credential = Arc::new(authenticate()?);
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(Arc::clone(&credential));
        Ok(credential)
    }

    /// Run `call` with a valid credential, renewing it at most once.
    pub fn with_credential<T, A, C>(&self, authenticate: A, call: C) -> Result<T, TwoFactorError>
    where
        A: Fn() -> Result<RemoteCredential, TwoFactorError>,
        C: Fn(&RemoteCredential) -> Result<T, CallError>,
    {
        let credential = self.obtain(&authenticate)?;

        match call(&credential) {
            Ok(value) => Ok(value),
            Err(CallError::Failed(err)) => Err(err),
            Err(CallError::Unauthorized) => {
                tracing::debug!("Remote service rejected credential, renewing once");
                self.invalidate(&credential);

                let renewed = self.obtain(&authenticate)?;
                match call(&renewed) {
                    Ok(value) => Ok(value),
                    Err(CallError::Failed(err)) => Err(err),
                    Err(CallError::Unauthorized) => {
                        self.invalidate(&renewed);
                        Err(TwoFactorError::AuthFailure(
                            "credential rejected after renewal".to_string(),
                        ))
                    }
                }
            }
        }
    }
}
