//! Token introspection endpoint (RFC 7662).
//!
//! Invalid, expired and revoked tokens all answer `{"active": false}`.
//! Only client authentication failures produce an error response.

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

/// `POST /oauth/introspect`
pub async fn introspect_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let provider = &state.provider;
    let Ok(Form(form)) = form.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Malformed introspection request");
    }) else {
        return provider.write_introspection_error(&AuthError::invalid_request(
            "Malformed introspection request",
        ));
    };

    match with_deadline(
        Instant::now() + state.request_timeout,
        "provider.new_introspection_request",
        provider.new_introspection_request(&headers, &form),
    )
    .await
    {
        Ok(response) => provider.write_introspection_response(&response),
        Err(e) => {
            tracing::debug!(error = %e, "Introspection request rejected");
            provider.write_introspection_error(&e)
        }
    }
}
