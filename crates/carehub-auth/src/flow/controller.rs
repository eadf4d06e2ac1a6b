//! The authorize flow state machine.
//!
//! Each request loads the [`AuthorizationSession`] named by the cookie,
//! checks that the page the browser submitted is the page the session is
//! on, and dispatches to that page's handler. Handlers either re-render a
//! page or hand the browser over to the OAuth2 provider.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use serde::Deserialize;
use tokio::time::Instant;
use uuid::Uuid;

use super::session::{AuthorizationSession, Page, SESSION_KEY};
use crate::deadline::with_deadline;
use crate::login::{LoginCode, LoginService};
use crate::oauth::{AuthorizeRequest, OAuth2Provider, TokenSession};
use crate::storage::{ProgramDirectory, SessionStore};
use crate::types::{Facility, Flavour, LoginCredentials, Program};
use crate::{AuthError, AuthResult};

const RESET_PIN_MESSAGE: &str = "Please use your mobile device to reset your pin.";
const RESTARTED_NOTICE: &str = "Your session was restarted. Please sign in again.";
const SELECT_PROGRAM: &str = "Please select a program";
const SELECT_FACILITY: &str = "Please select a facility";
const TRY_AGAIN: &str = "Something went wrong. Please try again.";

// =============================================================================
// Request / Response
// =============================================================================

/// Fields posted by the flow's HTML forms.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FlowForm {
    /// The page the browser believes it is on.
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub facility: Option<String>,
}

impl FlowForm {
    /// The page named by the form. Unknown names map to `None`.
    #[must_use]
    pub fn intended_page(&self) -> Option<Page> {
        Page::parse(self.page.as_deref().unwrap_or_default())
    }

    fn field(value: Option<&String>) -> Option<&str> {
        value.map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

/// One `/oauth/authorize` round trip.
#[derive(Debug, Default)]
pub struct FlowRequest {
    pub session_id: Option<String>,
    pub query: BTreeMap<String, String>,
    /// `None` for GET.
    pub form: Option<FlowForm>,
}

/// A page to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageView {
    Login {
        error: Option<String>,
        notice: Option<String>,
    },
    ChooseProgram {
        programs: Vec<Program>,
        error: Option<String>,
    },
    ChooseFacility {
        facilities: Vec<Facility>,
        error: Option<String>,
    },
}

impl PageView {
    /// The page the rendered form posts back as.
    #[must_use]
    pub fn page(&self) -> Page {
        match self {
            Self::Login { .. } => Page::Login,
            Self::ChooseProgram { .. } => Page::ChooseProgram,
            Self::ChooseFacility { .. } => Page::ChooseFacility,
        }
    }

    fn login() -> Self {
        Self::Login {
            error: None,
            notice: None,
        }
    }

    fn login_error(error: impl Into<String>) -> Self {
        Self::Login {
            error: Some(error.into()),
            notice: None,
        }
    }
}

#[derive(Debug)]
pub enum FlowOutcome {
    Render(PageView),
    /// A response written by the OAuth2 provider (redirect or error page).
    Provider(Response),
}

/// Result of a round trip.
#[derive(Debug)]
pub struct FlowResponse {
    /// Session the browser should carry next. `None` clears the cookie.
    pub session_id: Option<String>,
    pub outcome: FlowOutcome,
}

impl FlowResponse {
    fn render(session_id: &str, view: PageView) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            outcome: FlowOutcome::Render(view),
        }
    }

    fn provider(session_id: Option<String>, response: Response) -> Self {
        Self {
            session_id,
            outcome: FlowOutcome::Provider(response),
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives the login → chooseProgram → chooseFacility flow.
#[derive(Clone)]
pub struct FlowController {
    sessions: Arc<dyn SessionStore>,
    login: LoginService,
    directory: Arc<dyn ProgramDirectory>,
    provider: Arc<dyn OAuth2Provider>,
    request_timeout: Duration,
}

impl FlowController {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        login: LoginService,
        directory: Arc<dyn ProgramDirectory>,
        provider: Arc<dyn OAuth2Provider>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            login,
            directory,
            provider,
            request_timeout,
        }
    }

    /// Handles one authorize request.
    pub async fn handle(&self, request: FlowRequest) -> FlowResponse {
        let deadline = Instant::now() + self.request_timeout;

        let stored = match &request.session_id {
            Some(id) => match self.load(id, deadline).await {
                Ok(session) => session.map(|s| (id.clone(), s)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load authorize session");
                    return FlowResponse::provider(
                        request.session_id.clone(),
                        self.provider.write_authorize_error(None, &e),
                    );
                }
            },
            None => None,
        };

        let Some((session_id, session)) = stored else {
            let notice = request
                .form
                .as_ref()
                .and_then(FlowForm::intended_page)
                .filter(|p| *p != Page::Login)
                .map(|_| RESTARTED_NOTICE);
            return self.start(&request.query, notice, deadline).await;
        };

        let Some(form) = request.form else {
            return self.show(&session_id, &session, None, deadline).await;
        };

        if form.intended_page() != Some(session.page) || session.page == Page::Done {
            tracing::warn!(
                stored = %session.page,
                submitted = form.page.as_deref().unwrap_or_default(),
                "Page mismatch, restarting authorize flow"
            );
            return self.restart(&session_id, &session.query_params, deadline).await;
        }

        match session.page {
            Page::Login => self.login_page(session_id, session, &form, deadline).await,
            Page::ChooseProgram => self.program_page(session_id, session, &form, deadline).await,
            Page::ChooseFacility => self.facility_page(session_id, session, &form, deadline).await,
            Page::Done => self.restart(&session_id, &session.query_params, deadline).await,
        }
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    async fn load(&self, session_id: &str, deadline: Instant) -> AuthResult<Option<AuthorizationSession>> {
        let bytes = with_deadline(
            deadline,
            "session.get_bytes",
            self.sessions.get_bytes(session_id, SESSION_KEY),
        )
        .await?;
        Ok(bytes.and_then(|b| AuthorizationSession::decode(&b)))
    }

    async fn save(&self, session_id: &str, session: &AuthorizationSession, deadline: Instant) -> AuthResult<()> {
        let bytes = session
            .encode()
            .map_err(|e| AuthError::internal(format!("Failed to encode session: {e}")))?;
        with_deadline(
            deadline,
            "session.put",
            self.sessions.put(session_id, SESSION_KEY, bytes),
        )
        .await
    }

    async fn destroy(&self, session_id: &str, deadline: Instant) -> AuthResult<()> {
        with_deadline(deadline, "session.destroy", self.sessions.destroy(session_id)).await
    }

    /// Validates the query and opens a new session on the login page.
    async fn start(
        &self,
        query: &BTreeMap<String, String>,
        notice: Option<&str>,
        deadline: Instant,
    ) -> FlowResponse {
        let validated = with_deadline(
            deadline,
            "provider.new_authorize_request",
            self.provider.new_authorize_request(query),
        )
        .await;
        if let Err(e) = validated {
            tracing::info!(error = %e, "Rejected authorize request");
            return FlowResponse::provider(None, self.provider.write_authorize_error(None, &e));
        }

        let session_id = Uuid::new_v4().simple().to_string();
        let session = AuthorizationSession::new(query.clone());
        if let Err(e) = self.save(&session_id, &session, deadline).await {
            tracing::error!(error = %e, "Failed to store authorize session");
            return FlowResponse::provider(None, self.provider.write_authorize_error(None, &e));
        }
        tracing::debug!(client_id = query.get("client_id").map(String::as_str), "Started authorize flow");

        FlowResponse::render(
            &session_id,
            PageView::Login {
                error: None,
                notice: notice.map(str::to_string),
            },
        )
    }

    async fn restart(
        &self,
        session_id: &str,
        query: &BTreeMap<String, String>,
        deadline: Instant,
    ) -> FlowResponse {
        if let Err(e) = self.destroy(session_id, deadline).await {
            tracing::warn!(error = %e, "Failed to destroy stale authorize session");
        }
        self.start(query, Some(RESTARTED_NOTICE), deadline).await
    }

    /// Re-renders the page the session is on.
    async fn show(
        &self,
        session_id: &str,
        session: &AuthorizationSession,
        error: Option<&str>,
        deadline: Instant,
    ) -> FlowResponse {
        let view = match session.page {
            Page::Login | Page::Done => PageView::Login {
                error: error.map(str::to_string),
                notice: None,
            },
            Page::ChooseProgram => {
                let listed = match &session.user_id {
                    Some(user_id) => self.programs(user_id, deadline).await,
                    None => Ok(Vec::new()),
                };
                let (programs, error) = Self::listing(listed, error, "programs");
                PageView::ChooseProgram { programs, error }
            }
            Page::ChooseFacility => {
                let listed = match &session.program_id {
                    Some(program_id) => self.facilities(program_id, deadline).await,
                    None => Ok(Vec::new()),
                };
                let (facilities, error) = Self::listing(listed, error, "facilities");
                PageView::ChooseFacility { facilities, error }
            }
        };
        FlowResponse::render(session_id, view)
    }

    /// A failed listing renders an empty page with an error.
    fn listing<T>(
        listed: AuthResult<Vec<T>>,
        error: Option<&str>,
        what: &'static str,
    ) -> (Vec<T>, Option<String>) {
        match listed {
            Ok(items) => (items, error.map(str::to_string)),
            Err(e) => {
                tracing::warn!(error = %e, listing = what, "Failed to load page choices");
                (Vec::new(), Some(error.unwrap_or(TRY_AGAIN).to_string()))
            }
        }
    }

    async fn programs(&self, user_id: &str, deadline: Instant) -> AuthResult<Vec<Program>> {
        with_deadline(
            deadline,
            "directory.list_user_programs",
            self.directory.list_user_programs(user_id),
        )
        .await
    }

    async fn facilities(&self, program_id: &str, deadline: Instant) -> AuthResult<Vec<Facility>> {
        with_deadline(
            deadline,
            "directory.list_program_facilities",
            self.directory.list_program_facilities(program_id),
        )
        .await
    }

    // -------------------------------------------------------------------------
    // Pages
    // -------------------------------------------------------------------------

    async fn login_page(
        &self,
        session_id: String,
        mut session: AuthorizationSession,
        form: &FlowForm,
        deadline: Instant,
    ) -> FlowResponse {
        let (Some(username), Some(pin)) = (
            FlowForm::field(form.username.as_ref()),
            FlowForm::field(form.pin.as_ref()),
        ) else {
            return FlowResponse::render(&session_id, PageView::login());
        };

        let creds = LoginCredentials::new(username, pin, Flavour::Pro);
        let result = self.login.login_before(&creds, deadline).await;
        if !result.is_success() {
            let message = if result.code == Some(LoginCode::RetryLogin) {
                RESET_PIN_MESSAGE.to_string()
            } else {
                result.message
            };
            return FlowResponse::render(&session_id, PageView::login_error(message));
        }
        let Some(user_id) = result.user.map(|u| u.id) else {
            return FlowResponse::render(&session_id, PageView::login_error(TRY_AGAIN));
        };

        let programs = match self.after_login(&user_id, deadline).await {
            Ok(programs) => programs,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load programs after login");
                return FlowResponse::render(&session_id, PageView::login_error(TRY_AGAIN));
            }
        };

        session.user_id = Some(user_id);
        session.advance();
        if let Err(e) = self.save(&session_id, &session, deadline).await {
            tracing::error!(error = %e, "Failed to store authorize session");
            return FlowResponse::render(&session_id, PageView::login_error(TRY_AGAIN));
        }

        FlowResponse::render(
            &session_id,
            PageView::ChooseProgram {
                programs,
                error: None,
            },
        )
    }

    async fn after_login(&self, user_id: &str, deadline: Instant) -> AuthResult<Vec<Program>> {
        with_deadline(
            deadline,
            "directory.get_user_profile",
            self.directory.get_user_profile(user_id),
        )
        .await?
        .ok_or_else(|| AuthError::access_denied("Profile not found"))?;
        self.programs(user_id, deadline).await
    }

    async fn program_page(
        &self,
        session_id: String,
        mut session: AuthorizationSession,
        form: &FlowForm,
        deadline: Instant,
    ) -> FlowResponse {
        let Some(user_id) = session.user_id.clone() else {
            return self.restart(&session_id, &session.query_params, deadline).await;
        };
        let Some(program_id) = FlowForm::field(form.program.as_ref()) else {
            return self.show(&session_id, &session, Some(SELECT_PROGRAM), deadline).await;
        };

        let facilities = match self.select_program(&user_id, program_id, deadline).await {
            Ok(facilities) => facilities,
            Err(e) => {
                tracing::warn!(user_id = %user_id, program_id, error = %e, "Program selection failed");
                let message = if e.is_client_error() { SELECT_PROGRAM } else { TRY_AGAIN };
                return self.show(&session_id, &session, Some(message), deadline).await;
            }
        };

        session.program_id = Some(program_id.to_string());
        session.advance();
        if let Err(e) = self.save(&session_id, &session, deadline).await {
            tracing::error!(error = %e, "Failed to store authorize session");
            session.page = Page::ChooseProgram;
            return self.show(&session_id, &session, Some(TRY_AGAIN), deadline).await;
        }

        FlowResponse::render(
            &session_id,
            PageView::ChooseFacility {
                facilities,
                error: None,
            },
        )
    }

    async fn select_program(
        &self,
        user_id: &str,
        program_id: &str,
        deadline: Instant,
    ) -> AuthResult<Vec<Facility>> {
        let program = with_deadline(
            deadline,
            "directory.get_program",
            self.directory.get_program(program_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_request("Unknown program"))?;
        with_deadline(
            deadline,
            "directory.set_current_program",
            self.directory.set_current_program(user_id, &program.id),
        )
        .await?;
        with_deadline(
            deadline,
            "directory.get_staff_profile",
            self.directory.get_staff_profile(user_id, &program.id),
        )
        .await?
        .ok_or_else(|| AuthError::access_denied("Not a staff member of this program"))?;
        self.facilities(&program.id, deadline).await
    }

    async fn facility_page(
        &self,
        session_id: String,
        session: AuthorizationSession,
        form: &FlowForm,
        deadline: Instant,
    ) -> FlowResponse {
        let (Some(user_id), Some(program_id)) = (session.user_id.clone(), session.program_id.clone())
        else {
            return self.restart(&session_id, &session.query_params, deadline).await;
        };
        let Some(facility_id) = FlowForm::field(form.facility.as_ref()) else {
            return self.show(&session_id, &session, Some(SELECT_FACILITY), deadline).await;
        };

        let request = match with_deadline(
            deadline,
            "provider.new_authorize_request",
            self.provider.new_authorize_request(&session.query_params),
        )
        .await
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Stored authorize request no longer valid");
                return FlowResponse::provider(
                    Some(session_id),
                    self.provider.write_authorize_error(None, &e),
                );
            }
        };

        let minted = self
            .mint_code(&request, &user_id, &program_id, facility_id, deadline)
            .await;
        let response = match minted {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(user_id = %user_id, facility_id, error = %e, "Facility selection failed");
                return FlowResponse::provider(
                    Some(session_id),
                    self.provider.write_authorize_error(Some(&request), &e),
                );
            }
        };
        if let Err(e) = self.destroy(&session_id, deadline).await {
            tracing::error!(
                error = %e,
                client_id = %request.client_id,
                "Failed to destroy authorize session after issuing code"
            );
            return FlowResponse::provider(
                Some(session_id),
                self.provider
                    .write_authorize_error(Some(&request), &AuthError::internal(e.to_string())),
            );
        }

        tracing::info!(user_id = %user_id, program_id = %program_id, facility_id, "Authorize flow completed");
        FlowResponse::provider(None, self.provider.write_authorize_response(&request, &response))
    }

    /// Sets the default facility, builds the principal and mints the code.
    async fn mint_code(
        &self,
        request: &AuthorizeRequest,
        user_id: &str,
        program_id: &str,
        facility_id: &str,
        deadline: Instant,
    ) -> AuthResult<crate::oauth::AuthorizeResponse> {
        let facility = with_deadline(
            deadline,
            "directory.get_facility",
            self.directory.get_facility(facility_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_request("Unknown facility"))?;
        let staff = with_deadline(
            deadline,
            "directory.get_staff_profile",
            self.directory.get_staff_profile(user_id, program_id),
        )
        .await?
        .ok_or_else(|| AuthError::access_denied("Not a staff member of this program"))?;
        let program = with_deadline(
            deadline,
            "directory.get_program",
            self.directory.get_program(program_id),
        )
        .await?
        .ok_or_else(|| AuthError::invalid_request("Unknown program"))?;
        let profile = with_deadline(
            deadline,
            "directory.get_user_profile",
            self.directory.get_user_profile(user_id),
        )
        .await?
        .ok_or_else(|| AuthError::access_denied("Profile not found"))?;

        with_deadline(
            deadline,
            "directory.set_staff_default_facility",
            self.directory.set_staff_default_facility(&staff.id, &facility.id),
        )
        .await?;

        let mut principal = TokenSession::new(profile.id.clone())
            .with_username(profile.username.clone())
            .claim("user_id", profile.id.clone())
            .claim("name", profile.name.clone())
            .claim("program_id", program.id.clone())
            .claim("organisation_id", program.organisation_id.clone())
            .claim("facility_id", facility.id.clone())
            .claim("staff_id", staff.id.clone())
            .claim("is_superuser", profile.is_superuser)
            .claim("is_organisation_admin", false)
            .claim("is_program_admin", false);
        if let Some(gender) = &profile.gender {
            principal = principal.claim("gender", gender.clone());
        }
        if let Some(email) = &profile.email {
            principal = principal.claim("email", email.clone());
        }

        with_deadline(
            deadline,
            "provider.new_authorize_response",
            self.provider.new_authorize_response(request, principal),
        )
        .await
    }
}
