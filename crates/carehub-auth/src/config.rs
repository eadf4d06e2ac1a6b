//! Authentication and authorization configuration.
//!
//! Grouped into lockout, session and OAuth subsections, each of which can be
//! omitted from the config file and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth.lockout]
/// base = "3s"
/// cap = 12
///
/// [auth.session]
/// cookie_name = "carehub_session"
/// ttl = "30m"
///
/// [auth.oauth]
/// issuer = "http://localhost:8080"
/// signing_secret = "a-long-random-string"
///
/// [[auth.oauth.clients]]
/// client_id = "carehub-web"
/// redirect_uris = ["http://localhost:3000/callback"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Failed-login backoff settings.
    pub lockout: LockoutConfig,

    /// Authorization flow session settings.
    pub session: SessionConfig,

    /// Token issuance and client registration.
    pub oauth: OAuthConfig,
}

/// Exponential backoff applied after PIN mismatches.
///
/// The delay after `n` consecutive failures is `base * 2^min(n, cap)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Base delay.
    #[serde(with = "humantime_serde")]
    pub base: Duration,

    /// Maximum exponent.
    pub cap: u32,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(3),
            cap: 12,
        }
    }
}

/// Browser session settings for the authorize flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie.
    pub cookie_name: String,

    /// How long an abandoned flow session survives in the store.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Sets the `Secure` attribute on the session cookie.
    /// Disable only for local development over plain HTTP.
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "carehub_session".to_string(),
            ttl: Duration::from_secs(30 * 60),
            secure_cookies: false,
        }
    }
}

/// OAuth 2.0 configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Value of the `iss` claim.
    pub issuer: String,

    /// HS256 signing key for access tokens.
    pub signing_secret: String,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Registered clients.
    pub clients: Vec<ClientConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            signing_secret: String::new(),
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            clients: Vec::new(),
        }
    }
}

/// A client registration loaded from configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Client identifier.
    pub client_id: String,

    /// Plaintext secret for confidential clients. Hashed when the provider
    /// registers the client and never kept in memory afterwards.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Exact-match redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Allowed grant types.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,

    /// Scopes the client may request.
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_grant_types() -> Vec<String> {
    vec![
        "authorization_code".to_string(),
        "refresh_token".to_string(),
    ]
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The signing secret is empty
    /// - The lockout base delay is zero
    /// - A client has no redirect URI or an unknown grant type
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth.signing_secret.is_empty() {
            return Err(ConfigError::Missing("auth.oauth.signing_secret".to_string()));
        }

        if self.oauth.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.lockout.base.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.lockout.base must be > 0".to_string(),
            ));
        }

        if self.session.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "auth.session.cookie_name cannot be empty".to_string(),
            ));
        }

        for client in &self.oauth.clients {
            if client.client_id.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "client_id cannot be empty".to_string(),
                ));
            }
            for grant in &client.grant_types {
                match grant.as_str() {
                    "authorization_code" | "client_credentials" | "refresh_token" => {}
                    other => {
                        return Err(ConfigError::InvalidValue(format!(
                            "Invalid grant type '{}' for client '{}'",
                            other, client.client_id
                        )));
                    }
                }
            }
            if client.grant_types.iter().any(|g| g == "authorization_code")
                && client.redirect_uris.is_empty()
            {
                return Err(ConfigError::InvalidValue(format!(
                    "client '{}' uses authorization_code but has no redirect_uris",
                    client.client_id
                )));
            }
            if client.grant_types.iter().any(|g| g == "client_credentials")
                && client.client_secret.is_none()
            {
                return Err(ConfigError::InvalidValue(format!(
                    "client '{}' uses client_credentials but has no client_secret",
                    client.client_id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.oauth.signing_secret = "test-secret".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.lockout.base, Duration::from_secs(3));
        assert_eq!(config.lockout.cap, 12);
        assert_eq!(config.session.cookie_name, "carehub_session");
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(600)
        );
        assert!(config.oauth.clients.is_empty());
    }

    #[test]
    fn test_default_config_requires_signing_secret() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_lockout_base_fails_validation() {
        let mut config = valid_config();
        config.lockout.base = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lockout"));
    }

    #[test]
    fn test_invalid_grant_type_fails_validation() {
        let mut config = valid_config();
        config.oauth.clients.push(ClientConfig {
            client_id: "app".to_string(),
            client_secret: None,
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            grant_types: vec!["password".to_string()],
            scopes: vec![],
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_authorization_code_client_needs_redirect_uri() {
        let mut config = valid_config();
        config.oauth.clients.push(ClientConfig {
            client_id: "app".to_string(),
            client_secret: None,
            redirect_uris: vec![],
            grant_types: default_grant_types(),
            scopes: vec![],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let json = r#"{
            "lockout": { "base": "5s", "cap": 4 },
            "session": { "ttl": "10m" },
            "oauth": {
                "signing_secret": "s",
                "access_token_lifetime": "15m",
                "clients": [{ "client_id": "web", "redirect_uris": ["https://a/cb"] }]
            }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.lockout.base, Duration::from_secs(5));
        assert_eq!(config.lockout.cap, 4);
        assert_eq!(config.session.ttl, Duration::from_secs(600));
        assert_eq!(config.session.cookie_name, "carehub_session");
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(900));
        assert_eq!(
            config.oauth.clients[0].grant_types,
            vec!["authorization_code", "refresh_token"]
        );
    }
}
