//! Token, revocation and introspection endpoint types.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange an authorization code for tokens
//! - `refresh_token` - Mint a new access token (no rotation)
//! - `client_credentials` - Machine-to-machine authentication

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::AuthError;

/// Token request parameters (form encoded).
///
/// Clients authenticate with HTTP Basic or with `client_id`/`client_secret`
/// in the body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// One of "authorization_code", "refresh_token", "client_credentials".
    #[serde(default)]
    pub grant_type: String,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (client_credentials only).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "openid",
///   "refresh_token": "9f2c..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    /// Always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Token error response.
///
/// ```json
/// { "error": "invalid_grant", "error_description": "Authorization code expired" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct TokenError {
    pub error: TokenErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a new token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }

    /// Maps an [`AuthError`] onto the token endpoint's error vocabulary.
    #[must_use]
    pub fn from_auth_error(error: &AuthError) -> Self {
        let code = match error {
            AuthError::InvalidClient { .. } => TokenErrorCode::InvalidClient,
            AuthError::InvalidGrant { .. } => TokenErrorCode::InvalidGrant,
            AuthError::InvalidScope { .. } => TokenErrorCode::InvalidScope,
            AuthError::UnauthorizedClient { .. } => TokenErrorCode::UnauthorizedClient,
            AuthError::UnsupportedGrantType { .. } => TokenErrorCode::UnsupportedGrantType,
            AuthError::InvalidRequest { .. }
            | AuthError::InvalidToken { .. }
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::AccessDenied { .. }
            | AuthError::UnsupportedResponseType { .. } => TokenErrorCode::InvalidRequest,
            AuthError::Storage { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => TokenErrorCode::ServerError,
        };
        Self::with_description(code, error.public_description())
    }
}

/// OAuth 2.0 token error codes (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    InvalidScope,
    ServerError,
}

impl TokenErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Form parameters shared by the revocation (RFC 7009) and introspection
/// (RFC 7662) endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenForm {
    #[serde(default)]
    pub token: String,

    /// "access_token" or "refresh_token". Only used to order the lookups.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Introspection response.
///
/// Inactive tokens carry only `active: false`, never the reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Principal claims carried by the token.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntrospectionResponse {
    /// The response for any token that is not currently valid.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_deserialization() {
        let json = r#"{
            "grant_type": "authorization_code",
            "code": "SplxlOBeZQQYbYS6WxSbIA",
            "redirect_uri": "https://app.example.com/callback",
            "client_id": "my-app"
        }"#;
        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.grant_type, "authorization_code");
        assert_eq!(request.code.as_deref(), Some("SplxlOBeZQQYbYS6WxSbIA"));
        assert!(request.client_secret.is_none());
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse::new("at".to_string(), 3600, "openid".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert!(json.get("refresh_token").is_none());

        let json = serde_json::to_value(response.with_refresh_token("rt".to_string())).unwrap();
        assert_eq!(json["refresh_token"], "rt");
    }

    #[test]
    fn test_token_error_mapping() {
        let err = TokenError::from_auth_error(&AuthError::invalid_client("bad secret"));
        assert_eq!(err.error, TokenErrorCode::InvalidClient);
        assert_eq!(err.error.http_status(), 401);

        let err = TokenError::from_auth_error(&AuthError::storage("db down"));
        assert_eq!(err.error, TokenErrorCode::ServerError);
        assert!(!err.error_description.unwrap().contains("db down"));

        let json = serde_json::to_value(TokenError::from_auth_error(
            &AuthError::unsupported_grant_type("password"),
        ))
        .unwrap();
        assert_eq!(json["error"], "unsupported_grant_type");
    }

    #[test]
    fn test_inactive_introspection_is_minimal() {
        let json = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn test_introspection_flattens_claims() {
        let mut response = IntrospectionResponse {
            active: true,
            sub: Some("u1".to_string()),
            ..Default::default()
        };
        response
            .extra
            .insert("program_id".to_string(), Value::String("P1".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["program_id"], "P1");
        assert_eq!(json["sub"], "u1");
    }
}
