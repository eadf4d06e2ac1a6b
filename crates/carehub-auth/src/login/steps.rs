//! The ordered login checks.
//!
//! Each step reads the credentials and the accumulator, may call the
//! credential store, and returns `false` to halt the pipeline after recording
//! a code on the result. Collaborator errors are logged and reported as
//! [`LoginCode::Internal`].

use futures_util::future::BoxFuture;

use super::LoginContext;
use super::lockout::retry_after_seconds;
use super::result::{LoginCode, LoginResult};
use crate::AuthError;
use crate::pin::verify_pin;
use crate::types::{Flavour, LoginCredentials, UserUpdate};

/// Signature shared by every step.
pub type LoginStep = for<'a> fn(
    &'a LoginContext,
    &'a LoginCredentials,
    &'a mut LoginResult,
) -> BoxFuture<'a, bool>;

/// A step with the name it is traced under.
#[derive(Clone, Copy)]
pub struct NamedStep {
    pub name: &'static str,
    pub run: LoginStep,
}

/// Steps in execution order.
pub const LOGIN_STEPS: [NamedStep; 10] = [
    NamedStep { name: "resolve_profile", run: resolve_profile },
    NamedStep { name: "check_active", run: check_active },
    NamedStep { name: "check_client_profile", run: check_client_profile },
    NamedStep { name: "require_profile_kind", run: require_profile_kind },
    NamedStep { name: "check_pending_pin_reset", run: check_pending_pin_reset },
    NamedStep { name: "check_staff_profile", run: check_staff_profile },
    NamedStep { name: "check_lockout", run: check_lockout },
    NamedStep { name: "verify_pin", run: verify_stored_pin },
    NamedStep { name: "check_caregiver_profile", run: check_caregiver_profile },
    NamedStep { name: "enrich_roles", run: enrich_roles },
];

fn internal(result: &mut LoginResult, step: &'static str, err: &AuthError) -> bool {
    tracing::error!(step, error = %err, category = %err.category(), "login step failed");
    result.fail(LoginCode::Internal)
}

/// Looks up the profile by username. Writes `user`.
pub fn resolve_profile<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        match ctx
            .call("get_profile_by_username", ctx.store.get_profile_by_username(&creds.username))
            .await
        {
            Ok(Some(user)) => {
                result.user = Some(user);
                true
            }
            Ok(None) => {
                tracing::info!(username = %creds.username, "no profile for username");
                result.fail(LoginCode::ProfileNotFound)
            }
            Err(e) => internal(result, "resolve_profile", &e),
        }
    })
}

/// Rejects deactivated users.
pub fn check_active<'a>(
    _ctx: &'a LoginContext,
    _creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        match &result.user {
            Some(user) if user.active => true,
            Some(_) => result.fail(LoginCode::InactiveUser),
            None => result.fail(LoginCode::ProfileNotFound),
        }
    })
}

/// Consumer only. Writes `is_client`; never fails on absence.
pub fn check_client_profile<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        if creds.flavour != Flavour::Consumer {
            return true;
        }
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        match ctx
            .call("check_client_exists", ctx.store.check_client_exists(&user_id))
            .await
        {
            Ok(exists) => {
                result.is_client = exists;
                true
            }
            Err(e) => internal(result, "check_client_profile", &e),
        }
    })
}

/// Consumer only. Fails unless the user is a client or a caregiver.
pub fn require_profile_kind<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        if creds.flavour != Flavour::Consumer || result.is_client {
            return true;
        }
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        match ctx
            .call("check_caregiver_exists", ctx.store.check_caregiver_exists(&user_id))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!(user_id = %user_id, "consumer login without client or caregiver profile");
                result.fail(LoginCode::ProfileNotFound)
            }
            Err(e) => internal(result, "require_profile_kind", &e),
        }
    })
}

/// Consumer clients only. A pending PIN reset routes the user to the reset
/// flow before any credential check.
pub fn check_pending_pin_reset<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        if creds.flavour != Flavour::Consumer || !result.is_client {
            return true;
        }
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        match ctx
            .call(
                "get_pending_pin_reset_requests",
                ctx.store.get_pending_pin_reset_requests(&user_id),
            )
            .await
        {
            Ok(pending) if pending.is_empty() => true,
            Ok(_) => result.fail(LoginCode::PinResetServiceRequest),
            Err(e) => internal(result, "check_pending_pin_reset", &e),
        }
    })
}

/// Pro only. Writes `is_staff`; a pro login without a staff record fails.
pub fn check_staff_profile<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        if creds.flavour != Flavour::Pro {
            return true;
        }
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        match ctx
            .call("check_staff_exists", ctx.store.check_staff_exists(&user_id))
            .await
        {
            Ok(true) => {
                result.is_staff = true;
                true
            }
            Ok(false) => {
                tracing::info!(user_id = %user_id, "pro login without staff profile");
                result.fail(LoginCode::ProfileNotFound)
            }
            Err(e) => internal(result, "check_staff_profile", &e),
        }
    })
}

/// Rejects attempts made before `next_allowed_login`. Writes
/// `retry_after_seconds` and `failed_login_count`.
pub fn check_lockout<'a>(
    ctx: &'a LoginContext,
    _creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        let Some(user) = result.user.as_ref() else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        if ctx.now >= user.next_allowed_login {
            return true;
        }
        let retry_after = retry_after_seconds(user.next_allowed_login, ctx.now);
        let failed = user.failed_login_count;
        tracing::info!(user_id = %user.id, retry_after, "login attempted during lockout");
        result.retry_after_seconds = Some(retry_after);
        result.failed_login_count = Some(failed);
        result.fail_with(
            LoginCode::RetryLogin,
            format!("Please try again after {retry_after} seconds"),
        )
    })
}

/// Compares the PIN and persists the lockout outcome as one write.
///
/// Expiry is checked first and leaves the counters untouched.
pub fn verify_stored_pin<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        let Some(user) = result.user.clone() else {
            return result.fail(LoginCode::ProfileNotFound);
        };

        let record = match ctx
            .call(
                "get_pin_by_user_id",
                ctx.store.get_pin_by_user_id(&user.id, creds.flavour),
            )
            .await
        {
            Ok(Some(record)) if record.is_usable(ctx.now) => record,
            Ok(_) => return result.fail(LoginCode::PinNotFound),
            Err(e) => return internal(result, "verify_pin", &e),
        };

        if record.is_expired(ctx.now) {
            tracing::info!(user_id = %user.id, "login with expired PIN");
            return result.fail(LoginCode::ExpiredPin);
        }

        let candidate = creds.pin.clone();
        let matched = match tokio::task::spawn_blocking(move || {
            verify_pin(&candidate, &record.salt, &record.hashed_pin)
        })
        .await
        {
            Ok(matched) => matched,
            Err(e) => {
                return internal(result, "verify_pin", &AuthError::internal(e.to_string()));
            }
        };

        if matched {
            let update = UserUpdate::successful_login(ctx.now);
            if let Err(e) = ctx
                .call("update_user", ctx.store.update_user(&user.id, &update))
                .await
            {
                return internal(result, "verify_pin", &e);
            }
            if let Some(user) = result.user.as_mut() {
                user.apply(&update);
            }
            result.failed_login_count = Some(0);
            return true;
        }

        let failed = user.failed_login_count.saturating_add(1);
        let next_allowed = ctx.lockout.next_allowed_login(failed, ctx.now);
        let update = UserUpdate::failed_attempt(failed, next_allowed, ctx.now);
        if let Err(e) = ctx
            .call("update_user", ctx.store.update_user(&user.id, &update))
            .await
        {
            return internal(result, "verify_pin", &e);
        }
        if let Some(user) = result.user.as_mut() {
            user.apply(&update);
        }
        tracing::warn!(
            user_id = %user.id,
            code = LoginCode::PinMismatch.code(),
            failed_login_count = failed,
            "PIN mismatch"
        );
        result.failed_login_count = Some(failed);
        result.retry_after_seconds = Some(retry_after_seconds(next_allowed, ctx.now));
        result.fail(LoginCode::PinMismatch)
    })
}

/// Consumer only. Writes `is_caregiver`.
pub fn check_caregiver_profile<'a>(
    ctx: &'a LoginContext,
    creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        if creds.flavour != Flavour::Consumer {
            return true;
        }
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        match ctx
            .call("check_caregiver_exists", ctx.store.check_caregiver_exists(&user_id))
            .await
        {
            Ok(exists) => {
                result.is_caregiver = exists;
                true
            }
            Err(e) => internal(result, "check_caregiver_profile", &e),
        }
    })
}

/// Writes `roles` and `permissions`.
pub fn enrich_roles<'a>(
    ctx: &'a LoginContext,
    _creds: &'a LoginCredentials,
    result: &'a mut LoginResult,
) -> BoxFuture<'a, bool> {
    Box::pin(async move {
        let Some(user_id) = result.user.as_ref().map(|u| u.id.clone()) else {
            return result.fail(LoginCode::ProfileNotFound);
        };
        let roles = ctx
            .call("get_user_roles", ctx.store.get_user_roles(&user_id))
            .await;
        let permissions = ctx
            .call("get_user_permissions", ctx.store.get_user_permissions(&user_id))
            .await;
        match (roles, permissions) {
            (Ok(roles), Ok(permissions)) => {
                result.roles = roles;
                result.permissions = permissions;
                true
            }
            (Err(e), _) | (_, Err(e)) => internal(result, "enrich_roles", &e),
        }
    })
}
