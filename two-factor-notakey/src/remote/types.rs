//! Wire types for the Notakey Authentication Server API.

use serde::{Deserialize, Serialize};

/// Scopes requested during the client-credentials exchange.
pub const CLIENT_SCOPES: &str =
    "urn:notakey:auth urn:notakey:usermanager urn:notakey:user urn:notakey:devicemanager";

/// Token response from the credential exchange endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// The token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Body of an authentication request creation call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAuthRequest<'a> {
    /// Request title shown on the device.
    pub action: &'a str,
    /// Request body shown on the device.
    pub description: &'a str,
    /// Seconds the request stays valid on the server.
    pub ttl_seconds: u64,
}

/// Response to an authentication request creation call.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedAuthRequest {
    /// Identifier of the new request.
    pub uuid: String,
}

/// Authentication request as reported by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthRequestRecord {
    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default)]
    pub approved: bool,

    #[serde(default)]
    pub expired: bool,

    /// `ApproveRequest`, `DenyRequest`, or null while unanswered.
    #[serde(default)]
    pub response_type: Option<String>,
}

/// Remote view of an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// No answer from the user yet.
    Pending,
    /// The user approved the request.
    Approved,
    /// The user denied the request.
    Rejected,
    /// The server expired the request without an answer.
    Expired,
    /// The server has no record of the request.
    NotFound,
    /// A response vocabulary this client does not know.
    Unrecognized(String),
}

impl AuthRequestRecord {
    /// Interpret the server's response fields.
    pub fn status(&self) -> RemoteStatus {
        match self.response_type.as_deref() {
            Some("ApproveRequest") => RemoteStatus::Approved,
            Some("DenyRequest") => RemoteStatus::Rejected,
            Some(other) => RemoteStatus::Unrecognized(other.to_string()),
            None if self.expired => RemoteStatus::Expired,
            None => RemoteStatus::Pending,
        }
    }
}

/// Error body returned by the server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub error_description: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Best human-readable description available.
    pub fn describe(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "no details".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_deserialize() {
        let json = r#"{"access_token":"abc","token_type":"Bearer","expires_in":7200}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();

        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in, Some(7200));
    }

    #[test]
    fn test_token_response_defaults() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn test_record_status_mapping() {
        let parse = |json: &str| serde_json::from_str::<AuthRequestRecord>(json).unwrap().status();

        assert_eq!(
            parse(r#"{"uuid":"u","approved":false,"expired":false,"response_type":null}"#),
            RemoteStatus::Pending
        );
        assert_eq!(
            parse(r#"{"approved":true,"response_type":"ApproveRequest"}"#),
            RemoteStatus::Approved
        );
        assert_eq!(
            parse(r#"{"approved":false,"response_type":"DenyRequest"}"#),
            RemoteStatus::Rejected
        );
        assert_eq!(parse(r#"{"expired":true}"#), RemoteStatus::Expired);
        assert_eq!(
            parse(r#"{"response_type":"MaybeLater"}"#),
            RemoteStatus::Unrecognized("MaybeLater".to_string())
        );
    }

    #[test]
    fn test_answer_wins_over_expired_flag() {
        let record: AuthRequestRecord =
            serde_json::from_str(r#"{"expired":true,"response_type":"DenyRequest"}"#).unwrap();
        assert_eq!(record.status(), RemoteStatus::Rejected);
    }

    #[test]
    fn test_error_response_describe() {
        let err: ErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_client","error_description":"bad secret"}"#)
                .unwrap();
        assert_eq!(err.describe(), "bad secret");
        assert_eq!(ErrorResponse::default().describe(), "no details");
    }
}
