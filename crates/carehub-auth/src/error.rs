//! Authentication and authorization error types.
//!
//! Expected login outcomes (bad PIN, lockout, missing profile) are not errors;
//! they travel in [`LoginResult`](crate::login::LoginResult). `AuthError` covers
//! OAuth protocol failures and unexpected collaborator failures.

use std::fmt;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The client credentials are invalid or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant or refresh token is invalid, expired, or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is invalid, unknown, or malformed.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The access token is invalid, malformed, or cannot be parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The client is not allowed to use the requested grant or response type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of why the client is not authorized.
        message: String,
    },

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The authorization request is invalid or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The resource owner or server denied the authorization request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The authorization server does not support the requested response type.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The authorization server does not support the requested grant type.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred, including collaborator deadlines.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidClient { .. }
                | Self::InvalidGrant { .. }
                | Self::InvalidScope { .. }
                | Self::InvalidToken { .. }
                | Self::UnauthorizedClient { .. }
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::InvalidRequest { .. }
                | Self::AccessDenied { .. }
                | Self::UnsupportedResponseType { .. }
                | Self::UnsupportedGrantType { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } => ErrorCategory::Authentication,
            Self::InvalidGrant { .. } => ErrorCategory::Authentication,
            Self::UnauthorizedClient { .. } => ErrorCategory::Authorization,
            Self::InvalidScope { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::TokenExpired => ErrorCategory::Token,
            Self::TokenRevoked => ErrorCategory::Token,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::UnsupportedResponseType { .. } => ErrorCategory::Validation,
            Self::UnsupportedGrantType { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::InvalidToken { .. } => "invalid_token",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::TokenExpired => "invalid_token",
            Self::TokenRevoked => "invalid_token",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::Storage { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::Internal { .. } => "server_error",
        }
    }

    /// Returns a description that is safe to send to a browser or client.
    ///
    /// Server-side failures never leak their internal message.
    #[must_use]
    pub fn public_description(&self) -> String {
        if self.is_server_error() {
            "The server encountered an unexpected condition".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Categories of authentication/authorization errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Authentication-related errors (identity verification).
    Authentication,
    /// Authorization-related errors (permission checks).
    Authorization,
    /// Token-related errors (validation, expiration).
    Token,
    /// Request validation errors.
    Validation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_grant("authorization code already used");
        assert_eq!(
            err.to_string(),
            "Invalid grant: authorization code already used"
        );

        let err = AuthError::TokenRevoked;
        assert_eq!(err.to_string(), "Token revoked");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_client("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = AuthError::TokenExpired;
        assert!(err.is_client_error());

        let err = AuthError::storage("database down");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::access_denied("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            AuthError::internal("deadline exceeded").category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_request("test").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("password").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(AuthError::TokenRevoked.oauth_error_code(), "invalid_token");
        assert_eq!(
            AuthError::storage("db").oauth_error_code(),
            "server_error"
        );
    }

    #[test]
    fn test_public_description_hides_internals() {
        let err = AuthError::storage("connection refused to 10.0.0.4:5432");
        assert!(!err.public_description().contains("10.0.0.4"));

        let err = AuthError::invalid_scope("unknown scope: admin");
        assert_eq!(err.public_description(), "Invalid scope: unknown scope: admin");
    }
}
