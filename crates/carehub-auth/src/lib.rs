//! # carehub-auth
//!
//! Authentication and authorization engine for the CareHub backend.
//!
//! This crate provides:
//! - The PIN login pipeline with exponential lockout backoff
//! - A session-driven authorize flow (login → chooseProgram → chooseFacility)
//! - An OAuth 2.0 provider with token, revocation and introspection endpoints
//! - Direct PIN login (`/login_by_phone`) returning profile and tokens
//!
//! ## Modules
//!
//! - [`config`] - Lockout, session and OAuth configuration
//! - [`login`] - Login pipeline, steps and lockout policy
//! - [`pin`] - PIN and client secret hashing
//! - [`flow`] - Authorize flow session and controller
//! - [`oauth`] - OAuth 2.0 types and the provider capability
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`http`] - Axum HTTP handlers and router

pub mod config;
pub mod deadline;
pub mod error;
pub mod flow;
pub mod http;
pub mod login;
pub mod oauth;
pub mod pin;
pub mod storage;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use flow::{AuthorizationSession, FlowController, Page};
pub use http::{AuthState, router};
pub use login::{LockoutPolicy, LoginCode, LoginResult, LoginService};
pub use oauth::{InternalTokenIssuer, JwtProvider, OAuth2Provider, TokenSession};
pub use storage::{
    CredentialStore, MemoryCredentialStore, MemoryProgramDirectory, MemorySessionStore,
    ProgramDirectory, SessionStore,
};
pub use types::{
    Facility, Flavour, LoginCredentials, PinRecord, Program, StaffProfile, UserProfile, UserType,
};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use carehub_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{AuthState, router};
    pub use crate::login::{LoginCode, LoginResult, LoginService};
    pub use crate::oauth::{InternalTokenIssuer, JwtProvider, OAuth2Provider, TokenSession};
    pub use crate::storage::{CredentialStore, ProgramDirectory, SessionStore};
    pub use crate::types::{Flavour, LoginCredentials, UserProfile};
}
