//! Authorize endpoint handlers.
//!
//! The handlers only translate between HTTP and the [`FlowController`]:
//! they read the session cookie, hand the query and form over, and write
//! back the page or the provider's response together with the cookie.
//!
//! [`FlowController`]: crate::flow::FlowController

use std::collections::BTreeMap;

use axum::{
    Form,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::AuthState;
use super::templates::render_page;
use crate::config::SessionConfig;
use crate::flow::{FlowForm, FlowOutcome, FlowRequest};

/// `GET /oauth/authorize`
pub async fn authorize_get_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    run_flow(&state, jar, query, None).await
}

/// `POST /oauth/authorize` (form encoded)
pub async fn authorize_post_handler(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(query): Query<BTreeMap<String, String>>,
    Form(form): Form<FlowForm>,
) -> Response {
    run_flow(&state, jar, query, Some(form)).await
}

async fn run_flow(
    state: &AuthState,
    jar: CookieJar,
    query: BTreeMap<String, String>,
    form: Option<FlowForm>,
) -> Response {
    let session_id = jar
        .get(&state.session.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let response = state
        .flow
        .handle(FlowRequest {
            session_id,
            query,
            form,
        })
        .await;

    let jar = match response.session_id {
        Some(id) => jar.add(session_cookie(&state.session, id)),
        None => jar.remove(
            Cookie::build((state.session.cookie_name.clone(), ""))
                .path("/")
                .build(),
        ),
    };

    match response.outcome {
        FlowOutcome::Render(view) => (jar, Html(render_page(&view))).into_response(),
        FlowOutcome::Provider(provider_response) => (jar, provider_response).into_response(),
    }
}

/// Creates the session cookie.
fn session_cookie(config: &SessionConfig, session_id: String) -> Cookie<'static> {
    let max_age = time::Duration::try_from(config.ttl).unwrap_or(time::Duration::minutes(30));
    Cookie::build((config.cookie_name.clone(), session_id))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}
