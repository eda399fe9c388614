//! Notakey Authentication Server API client.
//!
//! ## Endpoints used
//!
//! | Operation     | Request                                                                   |
//! |---------------|---------------------------------------------------------------------------|
//! | credentials   | `POST /api/token` (form, client credentials grant)                        |
//! | create        | `POST /api/v3/application/{service}/application_user/{user}/auth_request` |
//! | status        | `GET /api/v3/application/{service}/auth_request/{uuid}`                   |
//! | delete user   | `DELETE /api/v3/application/{service}/application_user/{user}`            |
//!
//! Every call is bounded by the configured HTTP timeout.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};

use super::credential::{CallError, CredentialStore, RemoteCredential};
use super::types::{
    AuthRequestRecord, CreateAuthRequest, CreatedAuthRequest, ErrorResponse, RemoteStatus,
    TokenResponse, CLIENT_SCOPES,
};
use super::RemoteService;
use crate::config::NotakeyConfig;
use crate::error::TwoFactorError;

const API_PREFIX: [&str; 2] = ["api", "v3"];

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Authenticated client for one configured service.
pub struct NasClient {
    http_client: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    service_id: String,
    credentials: CredentialStore,
}

impl NasClient {
    /// Create a client from configuration.
    ///
    /// Fails with [`TwoFactorError::Configuration`] when a required server
    /// setting is empty or the service URL cannot be parsed.
    pub fn new(config: &NotakeyConfig) -> Result<Self, TwoFactorError> {
        let missing = config.missing_remote_fields();
        if !missing.is_empty() {
            return Err(TwoFactorError::Configuration(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let base_url = Url::parse(config.service_url.trim().trim_end_matches('/'))
            .map_err(|e| TwoFactorError::Configuration(format!("invalid service_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TwoFactorError::Configuration(
                "service_url must be an http(s) URL".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("two-factor-notakey/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TwoFactorError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url,
            client_id: config.client_id.trim().to_string(),
            client_secret: config.client_secret.clone(),
            service_id: config.service_id.trim().to_string(),
            credentials: CredentialStore::new(),
        })
    }

    /// Exchange client ID and secret for a bearer credential.
    pub fn authenticate(&self) -> Result<RemoteCredential, TwoFactorError> {
        let url = self.endpoint(&["api", "token"]);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", CLIENT_SCOPES),
        ];

        let response = self
            .http_client
            .post(url)
            .form(&params)
            .send()
            .map_err(|e| TwoFactorError::AuthFailure(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let details = error_details(response);
            tracing::warn!(http_status = %status, client_id = %self.client_id, "Credential exchange refused");
            return Err(TwoFactorError::AuthFailure(format!(
                "HTTP {}: {}",
                status, details
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| TwoFactorError::AuthFailure(format!("invalid token response: {}", e)))?;

        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(TwoFactorError::AuthFailure(format!(
                "unsupported token type: {}",
                token.token_type
            )));
        }

        let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        tracing::debug!(expires_in = lifetime, "Obtained remote service credential");

        Ok(RemoteCredential::new(
            token.access_token,
            Duration::from_secs(lifetime),
        ))
    }

    /// Build an absolute URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn service_endpoint(&self, tail: &[&str]) -> Url {
        let mut segments: Vec<&str> = API_PREFIX.to_vec();
        segments.push("application");
        segments.push(&self.service_id);
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url, credential: &RemoteCredential) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", credential.bearer())
            .header("Accept", "application/json")
    }

    fn send(&self, builder: RequestBuilder) -> Result<Response, CallError> {
        let response = builder.send().map_err(|e| {
            CallError::Failed(TwoFactorError::RemoteUnavailable(e.to_string()))
        })?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CallError::Unauthorized);
        }
        Ok(response)
    }
}

impl RemoteService for NasClient {
    fn create_request(
        &self,
        subject: &str,
        title: &str,
        message: &str,
        ttl_seconds: u64,
    ) -> Result<String, TwoFactorError> {
        let url = self.service_endpoint(&["application_user", subject, "auth_request"]);
        let body = CreateAuthRequest {
            action: title,
            description: message,
            ttl_seconds,
        };

        self.credentials
            .with_credential(
                || self.authenticate(),
                |credential| {
                    let response =
                        self.send(self.request(Method::POST, url.clone(), credential).json(&body))?;

                    let status = response.status();
                    if status.is_server_error() {
                        return Err(TwoFactorError::RemoteUnavailable(format!(
                            "HTTP {}: {}",
                            status,
                            error_details(response)
                        ))
                        .into());
                    }
                    if !status.is_success() {
                        return Err(TwoFactorError::RemoteRejected(format!(
                            "HTTP {}: {}",
                            status,
                            error_details(response)
                        ))
                        .into());
                    }

                    let created: CreatedAuthRequest = response.json().map_err(|e| {
                        TwoFactorError::RemoteUnavailable(format!("invalid create response: {}", e))
                    })?;
                    if created.uuid.is_empty() {
                        return Err(TwoFactorError::RemoteUnavailable(
                            "create response carried no request id".to_string(),
                        )
                        .into());
                    }
                    Ok(created.uuid)
                },
            )
    }

    fn get_status(&self, request_id: &str) -> Result<RemoteStatus, TwoFactorError> {
        let url = self.service_endpoint(&["auth_request", request_id]);

        self.credentials
            .with_credential(
                || self.authenticate(),
                |credential| {
                    let response = self.send(self.request(Method::GET, url.clone(), credential))?;

                    let status = response.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(RemoteStatus::NotFound);
                    }
                    if status.is_client_error() {
                        return Err(TwoFactorError::RemoteRejected(format!(
                            "HTTP {}: {}",
                            status,
                            error_details(response)
                        ))
                        .into());
                    }
                    if !status.is_success() {
                        return Err(TwoFactorError::RemoteUnavailable(format!(
                            "HTTP {}: {}",
                            status,
                            error_details(response)
                        ))
                        .into());
                    }

                    let record: AuthRequestRecord = response.json().map_err(|e| {
                        TwoFactorError::RemoteUnavailable(format!("invalid status response: {}", e))
                    })?;
                    Ok(record.status())
                },
            )
    }

    fn delete_user(&self, subject: &str) -> Result<(), TwoFactorError> {
        let url = self.service_endpoint(&["application_user", subject]);

        self.credentials
            .with_credential(
                || self.authenticate(),
                |credential| {
                    let response =
                        self.send(self.request(Method::DELETE, url.clone(), credential))?;

                    let status = response.status();
                    // Already absent remotely
                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(());
                    }
                    if status.is_server_error() {
                        return Err(TwoFactorError::RemoteUnavailable(format!(
                            "HTTP {}: {}",
                            status,
                            error_details(response)
                        ))
                        .into());
                    }
                    Err(TwoFactorError::RemoteRejected(format!(
                        "HTTP {}: {}",
                        status,
                        error_details(response)
                    ))
                    .into())
                },
            )
    }

    fn description(&self) -> &str {
        "Notakey Authentication Server"
    }
}

/// Extract a short description from an error response body.
fn error_details(response: Response) -> String {
    let body = response.text().unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => parsed.describe(),
        Err(_) if body.is_empty() => "no details".to_string(),
        Err(_) => body.chars().take(200).collect(),
    }
}
