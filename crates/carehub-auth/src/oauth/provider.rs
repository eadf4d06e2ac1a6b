//! The OAuth2 provider capability.
//!
//! The flow controller and the token endpoints only talk to an
//! [`OAuth2Provider`]. `new_*` operations validate and mint; `write_*`
//! operations turn the outcome into an HTTP response. The writers have
//! default implementations that every provider shares.

use async_trait::async_trait;
use axum::{
    Json,
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::authorize::{AuthorizationError, AuthorizeRequest, AuthorizeResponse};
use super::client::{GrantType, RegisteredClient};
use super::token::{IntrospectionResponse, TokenError, TokenForm, TokenRequest, TokenResponse};
use crate::http::templates::render_error_page;
use crate::{AuthError, AuthResult};

/// The authenticated principal a token is minted for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSession {
    /// Becomes the `sub` claim.
    pub subject: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Extra claims embedded in the access token.
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl TokenSession {
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            username: None,
            claims: Map::new(),
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Adds a claim.
    #[must_use]
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }
}

/// A validated token request, ready to be answered.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub client: RegisteredClient,
    pub grant_type: GrantType,
    pub scopes: Vec<String>,
    pub session: TokenSession,
    pub issue_refresh_token: bool,
}

/// Authorize, token, revocation and introspection semantics.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    /// Validates authorize query parameters against the client registry.
    async fn new_authorize_request(
        &self,
        params: &BTreeMap<String, String>,
    ) -> AuthResult<AuthorizeRequest>;

    /// Mints an authorization code for the principal.
    async fn new_authorize_response(
        &self,
        request: &AuthorizeRequest,
        session: TokenSession,
    ) -> AuthResult<AuthorizeResponse>;

    /// Authenticates the client and validates the grant.
    async fn new_access_request(
        &self,
        headers: &HeaderMap,
        request: &TokenRequest,
    ) -> AuthResult<AccessRequest>;

    /// Mints the tokens for a validated access request.
    async fn new_access_response(&self, request: &AccessRequest) -> AuthResult<TokenResponse>;

    /// Authenticates the client and revokes the token.
    ///
    /// Unknown tokens are not an error.
    async fn new_revocation_request(&self, headers: &HeaderMap, form: &TokenForm)
    -> AuthResult<()>;

    /// Authenticates the client and describes the token.
    async fn new_introspection_request(
        &self,
        headers: &HeaderMap,
        form: &TokenForm,
    ) -> AuthResult<IntrospectionResponse>;

    /// Redirects an authorize error to the client when the request was
    /// validated, otherwise renders an error page.
    fn write_authorize_error(
        &self,
        request: Option<&AuthorizeRequest>,
        error: &AuthError,
    ) -> Response {
        if let Some(request) = request {
            let redirect = AuthorizationError::from_auth_error(error, request.state.clone())
                .to_redirect_url(&request.redirect_uri);
            if let Ok(url) = redirect {
                return Redirect::to(&url).into_response();
            }
        }
        let status = if error.is_server_error() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        };
        (
            status,
            Html(render_error_page(
                error.oauth_error_code(),
                &error.public_description(),
            )),
        )
            .into_response()
    }

    /// Redirects the browser back to the client with the code.
    fn write_authorize_response(
        &self,
        request: &AuthorizeRequest,
        response: &AuthorizeResponse,
    ) -> Response {
        match response.to_redirect_url(&request.redirect_uri) {
            Ok(url) => Redirect::to(&url).into_response(),
            Err(e) => self.write_authorize_error(None, &AuthError::internal(e.to_string())),
        }
    }

    fn write_access_error(&self, error: &AuthError) -> Response {
        token_error_response(error)
    }

    fn write_access_response(&self, response: &TokenResponse) -> Response {
        (
            StatusCode::OK,
            [
                ("Cache-Control", "no-store"),
                ("Pragma", "no-cache"),
            ],
            Json(response),
        )
            .into_response()
    }

    /// Per RFC 7009, 200 with an empty body unless client authentication failed.
    fn write_revocation_response(&self, result: AuthResult<()>) -> Response {
        match result {
            Ok(()) => StatusCode::OK.into_response(),
            Err(e) => token_error_response(&e),
        }
    }

    fn write_introspection_response(&self, response: &IntrospectionResponse) -> Response {
        (
            StatusCode::OK,
            [("Cache-Control", "no-store")],
            Json(response),
        )
            .into_response()
    }

    fn write_introspection_error(&self, error: &AuthError) -> Response {
        token_error_response(error)
    }
}

/// Mints an access/refresh pair for a principal that logged in directly
/// with username and PIN.
#[async_trait]
pub trait InternalTokenIssuer: Send + Sync {
    async fn issue_internal_tokens(&self, session: TokenSession) -> AuthResult<TokenResponse>;
}

fn token_error_response(error: &AuthError) -> Response {
    let body = TokenError::from_auth_error(error);
    let status = StatusCode::from_u16(body.error.http_status())
        .unwrap_or(StatusCode::BAD_REQUEST);
    let mut response = (
        status,
        [
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
        ],
        Json(body),
    )
        .into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            axum::http::header::WWW_AUTHENTICATE,
            axum::http::HeaderValue::from_static("Basic realm=\"carehub\""),
        );
    }
    response
}
