//! PIN login pipeline.
//!
//! A login is a fold over [`LOGIN_STEPS`] that stops at the first step that
//! returns `false`. Whatever the earlier steps wrote to the [`LoginResult`]
//! (including a persisted failure counter) is returned as-is.
//!
//! # Example
//!
//! ```ignore
//! let service = LoginService::new(store, LockoutPolicy::default(), Duration::from_secs(30));
//! let result = service.login(&LoginCredentials::new("jdoe", "4821", Flavour::Pro)).await;
//! if result.is_success() { /* issue tokens */ }
//! ```

pub mod lockout;
pub mod result;
pub mod steps;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;

pub use lockout::{LockoutPolicy, retry_after_seconds};
pub use result::{LoginCode, LoginResult};
pub use steps::{LOGIN_STEPS, LoginStep, NamedStep};

use crate::AuthResult;
use crate::deadline::with_deadline;
use crate::storage::CredentialStore;
use crate::types::LoginCredentials;

/// Per-attempt inputs shared by every step.
///
/// `now` is taken once so every step judges expiry and lockout against the
/// same instant.
pub struct LoginContext {
    pub store: Arc<dyn CredentialStore>,
    pub lockout: LockoutPolicy,
    pub now: OffsetDateTime,
    pub deadline: Instant,
}

impl LoginContext {
    /// Runs a store call under the attempt's deadline.
    pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        with_deadline(self.deadline, operation, fut).await
    }
}

/// Runs every step in order against a fresh accumulator.
pub async fn run_pipeline(ctx: &LoginContext, creds: &LoginCredentials) -> LoginResult {
    let mut result = LoginResult::default();
    for step in &LOGIN_STEPS {
        if !(step.run)(ctx, creds, &mut result).await {
            tracing::info!(
                username = %creds.username,
                flavour = %creds.flavour,
                step = step.name,
                code = result.outcome().code(),
                "login rejected"
            );
            return result;
        }
    }
    result.succeed();
    tracing::info!(username = %creds.username, flavour = %creds.flavour, "login succeeded");
    result
}

/// Entry point for PIN logins.
#[derive(Clone)]
pub struct LoginService {
    store: Arc<dyn CredentialStore>,
    lockout: LockoutPolicy,
    request_timeout: Duration,
}

impl LoginService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        lockout: LockoutPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lockout,
            request_timeout,
        }
    }

    /// Builds a context for an attempt made at `now`.
    #[must_use]
    pub fn context(&self, now: OffsetDateTime) -> LoginContext {
        LoginContext {
            store: Arc::clone(&self.store),
            lockout: self.lockout,
            now,
            deadline: Instant::now() + self.request_timeout,
        }
    }

    /// Runs the pipeline for an attempt made now.
    pub async fn login(&self, creds: &LoginCredentials) -> LoginResult {
        let ctx = self.context(OffsetDateTime::now_utc());
        run_pipeline(&ctx, creds).await
    }

    /// Runs the pipeline under a deadline the caller already holds.
    pub async fn login_before(&self, creds: &LoginCredentials, deadline: Instant) -> LoginResult {
        let ctx = LoginContext {
            deadline,
            ..self.context(OffsetDateTime::now_utc())
        };
        run_pipeline(&ctx, creds).await
    }
}
