//! HS256 JWT implementation of [`OAuth2Provider`].
//!
//! Authorization codes and refresh tokens are opaque random strings kept in
//! memory. Access tokens are self-contained JWTs; revoking one records its
//! `jti` until the token would have expired anyway.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::authorize::{AuthorizeRequest, AuthorizeResponse};
use super::client::{GrantType, RegisteredClient, extract_client_credentials};
use super::provider::{AccessRequest, InternalTokenIssuer, OAuth2Provider, TokenSession};
use super::token::{IntrospectionResponse, TokenForm, TokenRequest, TokenResponse};
use crate::config::OAuthConfig;
use crate::{AuthError, AuthResult};

/// Client id under which `/login_by_phone` tokens are issued.
pub const INTERNAL_CLIENT_ID: &str = "carehub-internal";

// =============================================================================
// Claims
// =============================================================================

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Principal claims (program, facility, staff...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidKeyFormat => Self::configuration(err.to_string()),
            _ => Self::invalid_token(err.to_string()),
        }
    }
}

// =============================================================================
// Grant State
// =============================================================================

#[derive(Debug, Clone)]
struct PendingCode {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    session: TokenSession,
    expires_at: i64,
}

#[derive(Debug, Clone)]
struct RefreshGrant {
    client_id: String,
    scopes: Vec<String>,
    session: TokenSession,
    issued_at: i64,
    expires_at: i64,
}

// =============================================================================
// Provider
// =============================================================================

/// OAuth2 provider signing access tokens with a shared HS256 secret.
pub struct JwtProvider {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    code_lifetime: Duration,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    clients: HashMap<String, RegisteredClient>,
    codes: DashMap<String, PendingCode>,
    refresh_tokens: DashMap<String, RefreshGrant>,
    /// Revoked access token ids and their `exp`.
    revoked: DashMap<String, i64>,
}

impl JwtProvider {
    /// Builds the provider and registers the configured clients.
    ///
    /// A public client named [`INTERNAL_CLIENT_ID`] limited to the refresh
    /// grant is added unless the configuration defines one.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an empty signing secret or an invalid
    /// client registration.
    pub fn new(config: &OAuthConfig) -> AuthResult<Self> {
        if config.signing_secret.is_empty() {
            return Err(AuthError::configuration("oauth.signing_secret is empty"));
        }

        let mut clients = HashMap::new();
        for client in &config.clients {
            let registered = RegisteredClient::from_config(client)?;
            clients.insert(registered.client_id.clone(), registered);
        }
        clients
            .entry(INTERNAL_CLIENT_ID.to_string())
            .or_insert_with(|| RegisteredClient {
                client_id: INTERNAL_CLIENT_ID.to_string(),
                secret_hash: None,
                redirect_uris: Vec::new(),
                grant_types: vec![GrantType::RefreshToken],
                scopes: Vec::new(),
            });

        tracing::info!(clients = clients.len(), "OAuth2 provider initialized");

        Ok(Self {
            issuer: config.issuer.clone(),
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            code_lifetime: config.authorization_code_lifetime,
            access_lifetime: config.access_token_lifetime,
            refresh_lifetime: config.refresh_token_lifetime,
            clients,
            codes: DashMap::new(),
            refresh_tokens: DashMap::new(),
            revoked: DashMap::new(),
        })
    }

    /// Returns a registered client.
    #[must_use]
    pub fn client(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    /// Decodes and validates an access token.
    ///
    /// # Errors
    ///
    /// Returns `TokenExpired`, `TokenRevoked` or `InvalidToken`.
    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let data = self.decode(token, true)?;
        if self.revoked.contains_key(&data.claims.jti) {
            return Err(AuthError::TokenRevoked);
        }
        Ok(data.claims)
    }

    /// Drops expired codes, refresh tokens and revocation records.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = unix_now();
        let before = self.codes.len() + self.refresh_tokens.len() + self.revoked.len();
        self.codes.retain(|_, c| c.expires_at > now);
        self.refresh_tokens.retain(|_, r| r.expires_at > now);
        self.revoked.retain(|_, exp| *exp > now);
        let after = self.codes.len() + self.refresh_tokens.len() + self.revoked.len();
        before.saturating_sub(after)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> AuthResult<TokenData<AccessTokenClaims>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        validation.leeway = 0;
        Ok(jsonwebtoken::decode(token, &self.decoding_key, &validation)?)
    }

    fn mint_access_token(
        &self,
        client_id: &str,
        scopes: &[String],
        session: &TokenSession,
    ) -> AuthResult<String> {
        let iat = unix_now();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: session.subject.clone(),
            client_id: client_id.to_string(),
            scope: scopes.join(" "),
            iat,
            exp: iat + seconds(self.access_lifetime),
            jti: Uuid::new_v4().to_string(),
            username: session.username.clone(),
            extra: session.claims.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("Failed to sign access token: {e}")))
    }

    fn mint_refresh_token(&self, client_id: &str, scopes: &[String], session: &TokenSession) -> String {
        let token = random_token();
        let now = unix_now();
        self.refresh_tokens.insert(
            token.clone(),
            RefreshGrant {
                client_id: client_id.to_string(),
                scopes: scopes.to_vec(),
                session: session.clone(),
                issued_at: now,
                expires_at: now + seconds(self.refresh_lifetime),
            },
        );
        token
    }

    fn authenticate_client(
        &self,
        headers: &HeaderMap,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> AuthResult<&RegisteredClient> {
        let presented = extract_client_credentials(headers, client_id, client_secret)
            .ok_or_else(|| AuthError::invalid_client("Client authentication required"))?;
        let client = self
            .clients
            .get(&presented.client_id)
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;
        client.authenticate(presented.client_secret.as_deref())?;
        Ok(client)
    }

    fn revoke_refresh_token(&self, client: &RegisteredClient, token: &str) -> bool {
        self.refresh_tokens
            .remove_if(token, |_, grant| grant.client_id == client.client_id)
            .is_some()
    }

    fn revoke_access_token(&self, client: &RegisteredClient, token: &str) -> bool {
        match self.decode(token, false) {
            Ok(data) if data.claims.client_id == client.client_id => {
                self.revoked.insert(data.claims.jti, data.claims.exp);
                true
            }
            _ => false,
        }
    }

    fn introspect_refresh_token(&self, token: &str) -> Option<IntrospectionResponse> {
        let grant = self.refresh_tokens.get(token)?;
        if grant.expires_at <= unix_now() {
            return Some(IntrospectionResponse::inactive());
        }
        Some(IntrospectionResponse {
            active: true,
            scope: Some(grant.scopes.join(" ")),
            client_id: Some(grant.client_id.clone()),
            username: grant.session.username.clone(),
            token_type: Some("refresh_token".to_string()),
            exp: Some(grant.expires_at),
            iat: Some(grant.issued_at),
            sub: Some(grant.session.subject.clone()),
            iss: Some(self.issuer.clone()),
            ..Default::default()
        })
    }

    fn introspect_access_token(&self, token: &str) -> Option<IntrospectionResponse> {
        let claims = self.decode_access_token(token).ok()?;
        Some(IntrospectionResponse {
            active: true,
            scope: Some(claims.scope),
            client_id: Some(claims.client_id),
            username: claims.username,
            token_type: Some("Bearer".to_string()),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            sub: Some(claims.sub),
            iss: Some(claims.iss),
            jti: Some(claims.jti),
            extra: claims.extra,
        })
    }
}

#[async_trait]
impl OAuth2Provider for JwtProvider {
    async fn new_authorize_request(
        &self,
        params: &BTreeMap<String, String>,
    ) -> AuthResult<AuthorizeRequest> {
        let request = AuthorizeRequest::from_params(params)?;
        let client = self
            .clients
            .get(&request.client_id)
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;
        if !client.has_redirect_uri(&request.redirect_uri) {
            return Err(AuthError::invalid_request("redirect_uri is not registered"));
        }
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "Client may not use the authorization code grant",
            ));
        }
        if let Some(scope) = client.disallowed_scope(&request.scopes) {
            return Err(AuthError::invalid_scope(format!("Scope '{scope}' not allowed")));
        }
        Ok(request)
    }

    async fn new_authorize_response(
        &self,
        request: &AuthorizeRequest,
        session: TokenSession,
    ) -> AuthResult<AuthorizeResponse> {
        let code = random_token();
        self.codes.insert(
            code.clone(),
            PendingCode {
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                scopes: request.scopes.clone(),
                session,
                expires_at: unix_now() + seconds(self.code_lifetime),
            },
        );
        tracing::debug!(client_id = %request.client_id, "Issued authorization code");
        Ok(AuthorizeResponse::new(code, request.state.clone()))
    }

    async fn new_access_request(
        &self,
        headers: &HeaderMap,
        request: &TokenRequest,
    ) -> AuthResult<AccessRequest> {
        if request.grant_type.is_empty() {
            return Err(AuthError::invalid_request("Missing required parameter: grant_type"));
        }
        let grant_type = GrantType::parse(&request.grant_type)
            .ok_or_else(|| AuthError::unsupported_grant_type(request.grant_type.clone()))?;
        let client = self.authenticate_client(
            headers,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        )?;
        if !client.allows_grant(grant_type) {
            return Err(AuthError::unauthorized_client(format!(
                "Client may not use the {grant_type} grant"
            )));
        }

        match grant_type {
            GrantType::AuthorizationCode => {
                let code = request
                    .code
                    .as_deref()
                    .ok_or_else(|| AuthError::invalid_request("Missing required parameter: code"))?;
                // Single use: consumed even when the checks below fail.
                let (_, pending) = self
                    .codes
                    .remove(code)
                    .ok_or_else(|| AuthError::invalid_grant("Invalid authorization code"))?;
                if pending.client_id != client.client_id {
                    return Err(AuthError::invalid_grant(
                        "Authorization code was issued to another client",
                    ));
                }
                if pending.expires_at <= unix_now() {
                    return Err(AuthError::invalid_grant("Authorization code expired"));
                }
                if request.redirect_uri.as_deref() != Some(pending.redirect_uri.as_str()) {
                    return Err(AuthError::invalid_grant("redirect_uri mismatch"));
                }
                Ok(AccessRequest {
                    client: client.clone(),
                    grant_type,
                    scopes: pending.scopes,
                    session: pending.session,
                    issue_refresh_token: client.allows_grant(GrantType::RefreshToken),
                })
            }
            GrantType::RefreshToken => {
                let token = request.refresh_token.as_deref().ok_or_else(|| {
                    AuthError::invalid_request("Missing required parameter: refresh_token")
                })?;
                let grant = self
                    .refresh_tokens
                    .get(token)
                    .map(|g| g.clone())
                    .ok_or_else(|| AuthError::invalid_grant("Invalid refresh token"))?;
                if grant.client_id != client.client_id {
                    return Err(AuthError::invalid_grant(
                        "Refresh token was issued to another client",
                    ));
                }
                if grant.expires_at <= unix_now() {
                    self.refresh_tokens.remove(token);
                    return Err(AuthError::invalid_grant("Refresh token expired"));
                }
                Ok(AccessRequest {
                    client: client.clone(),
                    grant_type,
                    scopes: grant.scopes,
                    session: grant.session,
                    issue_refresh_token: false,
                })
            }
            GrantType::ClientCredentials => {
                if !client.is_confidential() {
                    return Err(AuthError::unauthorized_client(
                        "client_credentials requires a confidential client",
                    ));
                }
                let scopes: Vec<String> = match request.scope.as_deref() {
                    Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
                    None => client.scopes.clone(),
                };
                if let Some(scope) = client.disallowed_scope(&scopes) {
                    return Err(AuthError::invalid_scope(format!("Scope '{scope}' not allowed")));
                }
                Ok(AccessRequest {
                    client: client.clone(),
                    grant_type,
                    scopes,
                    session: TokenSession::new(client.client_id.clone()),
                    issue_refresh_token: false,
                })
            }
        }
    }

    async fn new_access_response(&self, request: &AccessRequest) -> AuthResult<TokenResponse> {
        let client_id = &request.client.client_id;
        let access_token = self.mint_access_token(client_id, &request.scopes, &request.session)?;
        let mut response = TokenResponse::new(
            access_token,
            self.access_lifetime.as_secs(),
            request.scopes.join(" "),
        );
        if request.issue_refresh_token {
            response = response.with_refresh_token(self.mint_refresh_token(
                client_id,
                &request.scopes,
                &request.session,
            ));
        }
        tracing::info!(
            client_id = %client_id,
            grant_type = %request.grant_type,
            sub = %request.session.subject,
            "Issued access token"
        );
        Ok(response)
    }

    async fn new_revocation_request(
        &self,
        headers: &HeaderMap,
        form: &TokenForm,
    ) -> AuthResult<()> {
        let client = self.authenticate_client(
            headers,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )?;
        if form.token.is_empty() {
            return Err(AuthError::invalid_request("Missing required parameter: token"));
        }
        let revoked = if form.token_type_hint.as_deref() == Some("access_token") {
            self.revoke_access_token(client, &form.token)
                || self.revoke_refresh_token(client, &form.token)
        } else {
            self.revoke_refresh_token(client, &form.token)
                || self.revoke_access_token(client, &form.token)
        };
        tracing::debug!(client_id = %client.client_id, revoked, "Processed revocation request");
        Ok(())
    }

    async fn new_introspection_request(
        &self,
        headers: &HeaderMap,
        form: &TokenForm,
    ) -> AuthResult<IntrospectionResponse> {
        self.authenticate_client(
            headers,
            form.client_id.as_deref(),
            form.client_secret.as_deref(),
        )?;
        if form.token.is_empty() {
            return Err(AuthError::invalid_request("Missing required parameter: token"));
        }
        let response = self
            .introspect_refresh_token(&form.token)
            .or_else(|| self.introspect_access_token(&form.token))
            .unwrap_or_else(IntrospectionResponse::inactive);
        Ok(response)
    }
}

#[async_trait]
impl InternalTokenIssuer for JwtProvider {
    async fn issue_internal_tokens(&self, session: TokenSession) -> AuthResult<TokenResponse> {
        let access_token = self.mint_access_token(INTERNAL_CLIENT_ID, &[], &session)?;
        let refresh_token = self.mint_refresh_token(INTERNAL_CLIENT_ID, &[], &session);
        Ok(
            TokenResponse::new(access_token, self.access_lifetime.as_secs(), String::new())
                .with_refresh_token(refresh_token),
        )
    }
}

fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX / 2)
}
