//! `POST /login_by_phone`
//!
//! Direct PIN login for the mobile apps. Runs the login pipeline with the
//! flavour the client sends and, on success, returns the profile together
//! with an internal access/refresh token pair.
//!
//! ```ignore
//! POST /login_by_phone
//! {"username": "jdoe", "pin": "4821", "flavour": "PRO"}
//!
//! 400 Bad Request
//! {"code": 8, "message": "Invalid username or PIN", "failedLoginCount": 1, "retryTime": 6}
//! ```

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::time::Instant;

use super::AuthState;
use crate::deadline::with_deadline;
use crate::login::{LoginCode, LoginResult};
use crate::oauth::{TokenResponse, TokenSession};
use crate::types::{LoginCredentials, UserProfile};

/// Successful login body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub code: LoginCode,
    pub message: String,
    pub profile: UserProfile,
    pub is_client: bool,
    pub is_staff: bool,
    pub is_caregiver: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tokens: TokenResponse,
}

/// Failed login body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFailure {
    pub code: LoginCode,
    pub message: String,
    #[serde(rename = "retryTime", skip_serializing_if = "Option::is_none")]
    pub retry_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_login_count: Option<u32>,
}

impl From<&LoginResult> for LoginFailure {
    fn from(result: &LoginResult) -> Self {
        Self {
            code: result.outcome(),
            message: result.message.clone(),
            retry_time: result.retry_after_seconds,
            failed_login_count: result.failed_login_count,
        }
    }
}

/// `POST /login_by_phone`
pub async fn login_by_phone_handler(
    State(state): State<AuthState>,
    Json(creds): Json<LoginCredentials>,
) -> Response {
    let deadline = Instant::now() + state.request_timeout;
    let result = state.login.login_before(&creds, deadline).await;

    let Some(profile) = result.user.clone().filter(|_| result.is_success()) else {
        return (StatusCode::BAD_REQUEST, Json(LoginFailure::from(&result))).into_response();
    };

    let session = TokenSession::new(profile.id.clone())
        .with_username(profile.username.clone())
        .claim("user_id", profile.id.clone())
        .claim("user_type", profile.user_type.as_str())
        .claim("flavour", creds.flavour.as_str())
        .claim("is_superuser", profile.is_superuser)
        .claim("roles", result.roles.clone())
        .claim("permissions", result.permissions.clone());

    let tokens = match with_deadline(
        deadline,
        "provider.issue_internal_tokens",
        state.issuer.issue_internal_tokens(session),
    )
    .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(user_id = %profile.id, error = %e, "Failed to issue tokens after login");
            let failure = LoginFailure {
                code: LoginCode::Internal,
                message: LoginCode::Internal.default_message().to_string(),
                retry_time: None,
                failed_login_count: None,
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response();
        }
    };

    let body = LoginResponse {
        code: LoginCode::Ok,
        message: result.message,
        profile,
        is_client: result.is_client,
        is_staff: result.is_staff,
        is_caregiver: result.is_caregiver,
        roles: result.roles,
        permissions: result.permissions,
        tokens,
    };
    (StatusCode::OK, [("Cache-Control", "no-store")], Json(body)).into_response()
}
