//! Request-scoped deadlines for collaborator calls.

use std::future::Future;

use tokio::time::{Instant, timeout_at};

use crate::{AuthError, AuthResult};

/// Runs a collaborator call that must finish before `deadline`.
///
/// An elapsed deadline becomes `AuthError::Internal`. The call is not retried.
pub async fn with_deadline<T, F>(deadline: Instant, operation: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, "collaborator call exceeded request deadline");
            Err(AuthError::internal(format!("{operation} timed out")))
        }
    }
}
