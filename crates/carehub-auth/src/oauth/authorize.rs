//! Authorization endpoint types.
//!
//! The authorize flow keeps the raw query parameters in the session and
//! re-validates them on the final page, so [`AuthorizeRequest`] is always
//! derived from a parameter map rather than deserialized directly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthResult};

/// A validated authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    /// Always "code".
    pub response_type: String,

    /// Client identifier issued during registration.
    pub client_id: String,

    /// Redirect URI. Exactly matches one of the client's registered URIs.
    pub redirect_uri: String,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// CSRF protection state, echoed back on the redirect.
    pub state: String,
}

impl AuthorizeRequest {
    /// Reads the parameters without checking them against a client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a missing parameter and
    /// `UnsupportedResponseType` for anything other than `code`.
    pub fn from_params(params: &BTreeMap<String, String>) -> AuthResult<Self> {
        let required = |name: &str| -> AuthResult<String> {
            params
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| {
                    AuthError::invalid_request(format!("Missing required parameter: {name}"))
                })
        };

        let response_type = required("response_type")?;
        let client_id = required("client_id")?;
        let redirect_uri = required("redirect_uri")?;
        let state = required("state")?;
        if response_type != "code" {
            return Err(AuthError::unsupported_response_type(response_type));
        }
        let scopes = params
            .get("scope")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            response_type,
            client_id,
            redirect_uri,
            scopes,
            state,
        })
    }

    /// Space-separated scope string.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Authorization response parameters.
///
/// # Example
///
/// ```ignore
/// HTTP/1.1 303 See Other
/// Location: https://app.example.com/callback?code=SplxlOBeZQQYbYS6WxSbIA&state=abc123xyz
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    /// Single-use authorization code.
    pub code: String,

    /// Echoed state parameter.
    pub state: String,
}

impl AuthorizeResponse {
    #[must_use]
    pub fn new(code: String, state: String) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not a valid URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        url.query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &self.state);
        Ok(url.to_string())
    }
}

/// Authorization error response, delivered on the redirect URI.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: AuthorizationErrorCode,

    /// Human-readable error description (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state parameter.
    pub state: String,
}

impl AuthorizationError {
    /// Creates a new authorization error with description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: String,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Maps an [`AuthError`] onto the closest RFC 6749 authorize error.
    #[must_use]
    pub fn from_auth_error(error: &AuthError, state: String) -> Self {
        let code = match error {
            AuthError::InvalidRequest { .. } | AuthError::InvalidGrant { .. } => {
                AuthorizationErrorCode::InvalidRequest
            }
            AuthError::InvalidClient { .. } | AuthError::UnauthorizedClient { .. } => {
                AuthorizationErrorCode::UnauthorizedClient
            }
            AuthError::AccessDenied { .. } => AuthorizationErrorCode::AccessDenied,
            AuthError::UnsupportedResponseType { .. } => {
                AuthorizationErrorCode::UnsupportedResponseType
            }
            AuthError::InvalidScope { .. } => AuthorizationErrorCode::InvalidScope,
            _ => AuthorizationErrorCode::ServerError,
        };
        Self::with_description(code, error.public_description(), state)
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is not a valid URL.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            pairs.append_pair("state", &self.state);
        }
        Ok(url.to_string())
    }
}

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    InvalidRequest,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
}

impl AuthorizationErrorCode {
    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_params() {
        let request = AuthorizeRequest::from_params(&params(&[
            ("response_type", "code"),
            ("client_id", "web"),
            ("redirect_uri", "https://app.example.com/cb"),
            ("scope", "openid  profile"),
            ("state", "xyz"),
        ]))
        .unwrap();
        assert_eq!(request.client_id, "web");
        assert_eq!(request.scopes, vec!["openid", "profile"]);
        assert_eq!(request.scope(), "openid profile");
    }

    #[test]
    fn test_missing_state_is_invalid_request() {
        let err = AuthorizeRequest::from_params(&params(&[
            ("response_type", "code"),
            ("client_id", "web"),
            ("redirect_uri", "https://app.example.com/cb"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        assert!(err.to_string().contains("state"));
    }

    #[test]
    fn test_token_response_type_is_unsupported() {
        let err = AuthorizeRequest::from_params(&params(&[
            ("response_type", "token"),
            ("client_id", "web"),
            ("redirect_uri", "https://app.example.com/cb"),
            ("state", "xyz"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedResponseType { .. }));
    }

    #[test]
    fn test_response_redirect_url() {
        let response = AuthorizeResponse::new("code123".to_string(), "state456".to_string());
        let url = response
            .to_redirect_url("https://app.example.com/callback?existing=1")
            .unwrap();
        assert!(url.starts_with("https://app.example.com/callback?existing=1&"));
        assert!(url.contains("code=code123"));
        assert!(url.contains("state=state456"));
    }

    #[test]
    fn test_error_redirect_hides_server_details() {
        let error = AuthorizationError::from_auth_error(
            &AuthError::storage("pg: connection refused"),
            "s".to_string(),
        );
        assert_eq!(error.error, AuthorizationErrorCode::ServerError);
        let url = error.to_redirect_url("https://app.example.com/cb").unwrap();
        assert!(url.contains("error=server_error"));
        assert!(!url.contains("connection"));
    }

    #[test]
    fn test_error_code_mapping() {
        let cases = [
            (AuthError::invalid_scope("x"), AuthorizationErrorCode::InvalidScope),
            (AuthError::invalid_client("x"), AuthorizationErrorCode::UnauthorizedClient),
            (AuthError::access_denied("x"), AuthorizationErrorCode::AccessDenied),
            (
                AuthError::unsupported_response_type("token"),
                AuthorizationErrorCode::UnsupportedResponseType,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(
                AuthorizationError::from_auth_error(&err, String::new()).error,
                expected
            );
        }
    }
}
