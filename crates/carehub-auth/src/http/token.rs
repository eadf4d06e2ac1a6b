//! Token endpoint handler.
//!
//! ```ignore
//! POST /oauth/token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! ```

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
use crate::oauth::TokenRequest;

/// `POST /oauth/token`
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let provider = &state.provider;
    let Form(request) = match form {
        Ok(form) => form,
        Err(rejection) => {
            return provider.write_access_error(&AuthError::invalid_request(rejection.body_text()));
        }
    };
    let deadline = Instant::now() + state.request_timeout;

    let access = match with_deadline(
        deadline,
        "provider.new_access_request",
        provider.new_access_request(&headers, &request),
    )
    .await
    {
        Ok(access) => access,
        Err(e) => {
            tracing::info!(grant_type = %request.grant_type, error = %e, "Token request rejected");
            return provider.write_access_error(&e);
        }
    };

    match with_deadline(
        deadline,
        "provider.new_access_response",
        provider.new_access_response(&access),
    )
    .await
    {
        Ok(response) => provider.write_access_response(&response),
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue tokens");
            provider.write_access_error(&e)
        }
    }
}
