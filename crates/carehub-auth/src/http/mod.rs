//! Axum handlers for the authorize flow, the OAuth2 endpoints and
//! `/login_by_phone`.
//!
//! # Available Handlers
//!
//! - [`authorize`] - session-driven authorize flow (GET/POST)
//! - [`token`] - token endpoint
//! - [`revoke`] - token revocation (RFC 7009)
//! - [`introspect`] - token introspection (RFC 7662)
//! - [`login`] - direct PIN login returning profile and tokens

pub mod authorize;
pub mod introspect;
pub mod login;
pub mod revoke;
pub mod templates;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};

pub use authorize::{authorize_get_handler, authorize_post_handler};
pub use introspect::introspect_handler;
pub use login::login_by_phone_handler;
pub use revoke::revoke_handler;
pub use token::token_handler;

use crate::config::{AuthConfig, SessionConfig};
use crate::flow::FlowController;
use crate::login::{LockoutPolicy, LoginService};
use crate::oauth::{InternalTokenIssuer, OAuth2Provider};
use crate::storage::{CredentialStore, ProgramDirectory, SessionStore};

/// Shared state for every auth route.
#[derive(Clone)]
pub struct AuthState {
    pub flow: Arc<FlowController>,
    pub login: LoginService,
    pub provider: Arc<dyn OAuth2Provider>,
    pub issuer: Arc<dyn InternalTokenIssuer>,
    pub session: SessionConfig,
    pub request_timeout: Duration,
}

impl AuthState {
    /// Wires the login service and flow controller from their collaborators.
    #[must_use]
    pub fn new<P>(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        directory: Arc<dyn ProgramDirectory>,
        provider: Arc<P>,
        config: &AuthConfig,
        request_timeout: Duration,
    ) -> Self
    where
        P: OAuth2Provider + InternalTokenIssuer + 'static,
    {
        let login = LoginService::new(
            credentials,
            LockoutPolicy::from(&config.lockout),
            request_timeout,
        );
        let flow = FlowController::new(
            sessions,
            login.clone(),
            directory,
            provider.clone(),
            request_timeout,
        );
        Self {
            flow: Arc::new(flow),
            login,
            provider: provider.clone(),
            issuer: provider,
            session: config.session.clone(),
            request_timeout,
        }
    }
}

/// Builds the auth routes.
pub fn router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/oauth/authorize",
            get(authorize_get_handler).post(authorize_post_handler),
        )
        .route("/oauth/token", post(token_handler))
        .route("/oauth/revoke", post(revoke_handler))
        .route("/oauth/introspect", post(introspect_handler))
        .route("/login_by_phone", post(login_by_phone_handler))
        .with_state(state)
}
