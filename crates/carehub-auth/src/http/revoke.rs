//! Token revocation endpoint (RFC 7009).
//!
//! # Response
//!
//! - 200 OK: token revoked, or it was unknown or already invalid
//! - 400 Bad Request: missing token parameter
//! - 401 Unauthorized: invalid client credentials

use axum::{
    Form,
    extract::{State, rejection::FormRejection},
    http::HeaderMap,
    response::Response,
};
use tokio::time::Instant;

use super::AuthState;
use crate::AuthError;
use crate::deadline::with_deadline;
use crate::oauth::TokenForm;

/// `POST /oauth/revoke`
pub async fn revoke_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let provider = &state.provider;
    let result = match form {
        Ok(Form(form)) => {
            with_deadline(
                Instant::now() + state.request_timeout,
                "provider.new_revocation_request",
                provider.new_revocation_request(&headers, &form),
            )
            .await
        }
        Err(rejection) => Err(AuthError::invalid_request(rejection.body_text())),
    };
    if let Err(e) = &result {
        tracing::debug!(error = %e, "Revocation request rejected");
    }
    provider.write_revocation_response(result)
}
