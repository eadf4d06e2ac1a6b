//! OAuth 2.0 client registrations and client authentication.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::pin::{hash_secret, verify_secret};
use crate::{AuthError, AuthResult};

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a grant_type parameter value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Registered Client
// =============================================================================

/// A client known to the provider.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub client_id: String,

    /// Argon2 hash of the secret. `None` for public clients.
    pub secret_hash: Option<String>,

    pub redirect_uris: Vec<String>,

    pub grant_types: Vec<GrantType>,

    pub scopes: Vec<String>,
}

impl RegisteredClient {
    /// Registers a client from configuration, hashing its secret.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an unknown grant type or a hashing failure.
    pub fn from_config(config: &ClientConfig) -> AuthResult<Self> {
        let grant_types = config
            .grant_types
            .iter()
            .map(|g| {
                GrantType::parse(g).ok_or_else(|| {
                    AuthError::configuration(format!(
                        "client '{}' has unknown grant type '{g}'",
                        config.client_id
                    ))
                })
            })
            .collect::<AuthResult<Vec<_>>>()?;

        let secret_hash = config
            .client_secret
            .as_deref()
            .map(hash_secret)
            .transpose()
            .map_err(|e| AuthError::configuration(format!("cannot hash client secret: {e}")))?;

        Ok(Self {
            client_id: config.client_id.clone(),
            secret_hash,
            redirect_uris: config.redirect_uris.clone(),
            grant_types,
            scopes: config.scopes.clone(),
        })
    }

    /// Returns `true` for clients with a secret.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Exact-match check against the registered redirect URIs.
    #[must_use]
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|r| r == uri)
    }

    /// Returns the first requested scope the client may not use.
    #[must_use]
    pub fn disallowed_scope<'a>(&self, requested: &'a [String]) -> Option<&'a str> {
        requested
            .iter()
            .find(|s| !self.scopes.contains(s))
            .map(String::as_str)
    }

    /// Authenticates the client with the secret it presented.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if a confidential client sends no secret or a
    /// wrong one.
    pub fn authenticate(&self, secret: Option<&str>) -> AuthResult<()> {
        let Some(hash) = self.secret_hash.as_deref() else {
            return Ok(());
        };
        let secret = secret.ok_or_else(|| {
            AuthError::invalid_client("Client secret required for confidential client")
        })?;
        if verify_secret(secret, hash) {
            Ok(())
        } else {
            Err(AuthError::invalid_client("Invalid client secret"))
        }
    }
}

// =============================================================================
// Client Authentication
// =============================================================================

/// Credentials a client presented on a back-channel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedClient {
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Reads client credentials from the Basic header, falling back to form
/// fields.
#[must_use]
pub fn extract_client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Option<PresentedClient> {
    if let Some((client_id, client_secret)) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth)
    {
        return Some(PresentedClient {
            client_id,
            client_secret: Some(client_secret),
        });
    }

    form_client_id
        .filter(|id| !id.is_empty())
        .map(|client_id| PresentedClient {
            client_id: client_id.to_string(),
            client_secret: form_client_secret.map(str::to_string),
        })
}

/// Parses HTTP Basic authentication header.
///
/// Returns `(client_id, client_secret)`.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on first colon (secret may contain colons)
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((client_id.to_string(), client_secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn config(secret: Option<&str>) -> ClientConfig {
        ClientConfig {
            client_id: "web".to_string(),
            client_secret: secret.map(str::to_string),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            scopes: vec!["openid".to_string(), "profile".to_string()],
        }
    }

    #[test]
    fn test_parse_basic_auth() {
        let header = format!("Basic {}", STANDARD.encode("client:pa:ss"));
        assert_eq!(
            parse_basic_auth(&header),
            Some(("client".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(parse_basic_auth("Bearer abc"), None);
        assert_eq!(parse_basic_auth("Basic !!!"), None);
        assert_eq!(parse_basic_auth(&format!("Basic {}", STANDARD.encode("nocolon"))), None);
    }

    #[test]
    fn test_extract_prefers_basic_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", STANDARD.encode("hdr:secret"))).unwrap(),
        );
        let presented = extract_client_credentials(&headers, Some("form"), None).unwrap();
        assert_eq!(presented.client_id, "hdr");
        assert_eq!(presented.client_secret.as_deref(), Some("secret"));

        let presented =
            extract_client_credentials(&HeaderMap::new(), Some("form"), Some("s")).unwrap();
        assert_eq!(presented.client_id, "form");
        assert!(extract_client_credentials(&HeaderMap::new(), None, None).is_none());
    }

    #[test]
    fn test_from_config_hashes_secret() {
        let client = RegisteredClient::from_config(&config(Some("s3cret"))).unwrap();
        assert!(client.is_confidential());
        assert_ne!(client.secret_hash.as_deref(), Some("s3cret"));
        assert!(client.authenticate(Some("s3cret")).is_ok());
        assert!(matches!(
            client.authenticate(Some("wrong")),
            Err(AuthError::InvalidClient { .. })
        ));
        assert!(client.authenticate(None).is_err());
    }

    #[test]
    fn test_public_client_needs_no_secret() {
        let client = RegisteredClient::from_config(&config(None)).unwrap();
        assert!(!client.is_confidential());
        assert!(client.authenticate(None).is_ok());
    }

    #[test]
    fn test_client_checks() {
        let client = RegisteredClient::from_config(&config(None)).unwrap();
        assert!(client.allows_grant(GrantType::AuthorizationCode));
        assert!(!client.allows_grant(GrantType::ClientCredentials));
        assert!(client.has_redirect_uri("https://app.example.com/cb"));
        assert!(!client.has_redirect_uri("https://app.example.com/cb/"));
        let requested = vec!["openid".to_string(), "admin".to_string()];
        assert_eq!(client.disallowed_scope(&requested), Some("admin"));
    }

    #[test]
    fn test_unknown_grant_in_config() {
        let mut cfg = config(None);
        cfg.grant_types.push("password".to_string());
        assert!(matches!(
            RegisteredClient::from_config(&cfg),
            Err(AuthError::Configuration { .. })
        ));
    }
}
