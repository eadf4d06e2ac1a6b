//! Login outcome codes and the pipeline accumulator.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::types::UserProfile;

/// Stable outcome codes shared with mobile and web clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginCode {
    Ok,
    Internal,
    ProfileNotFound,
    PinMismatch,
    PinNotFound,
    ExpiredPin,
    PinResetServiceRequest,
    RetryLogin,
    InactiveUser,
}

impl LoginCode {
    /// Returns the numeric wire code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 1,
            Self::Internal => 2,
            Self::ProfileNotFound => 7,
            Self::PinMismatch => 8,
            Self::PinNotFound => 9,
            Self::ExpiredPin => 48,
            Self::PinResetServiceRequest => 72,
            Self::RetryLogin => 73,
            Self::InactiveUser => 75,
        }
    }

    /// Returns the user-facing message for this outcome.
    ///
    /// Credential failures share one message so the response does not reveal
    /// whether the username exists.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Ok => "login successful",
            Self::Internal => "Something went wrong, please try again",
            Self::ProfileNotFound | Self::PinNotFound | Self::PinMismatch => {
                "Invalid username or PIN"
            }
            Self::ExpiredPin => "Your PIN has expired, please reset it",
            Self::PinResetServiceRequest => "A PIN reset request is already pending for this account",
            Self::RetryLogin => "Too many failed attempts, please try again later",
            Self::InactiveUser => "This account is inactive",
        }
    }
}

impl fmt::Display for LoginCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for LoginCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// Accumulator threaded through the login steps.
///
/// | Field | Written by |
/// |---|---|
/// | `user` | profile resolution, PIN verification |
/// | `is_client` | client-profile check |
/// | `is_staff` | staff-profile check |
/// | `is_caregiver` | caregiver-profile check |
/// | `retry_after_seconds`, `failed_login_count` | lockout check, PIN verification |
/// | `roles`, `permissions` | role enrichment |
/// | `code`, `message` | the failing step, or the pipeline on success |
#[derive(Debug, Clone, Default)]
pub struct LoginResult {
    pub user: Option<UserProfile>,
    pub is_client: bool,
    pub is_caregiver: bool,
    pub is_staff: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub code: Option<LoginCode>,
    pub message: String,
    pub retry_after_seconds: Option<i64>,
    pub failed_login_count: Option<u32>,
}

impl LoginResult {
    /// Records a failure with the code's default message. Always returns
    /// `false` so steps can `return result.fail(..)`.
    pub fn fail(&mut self, code: LoginCode) -> bool {
        self.fail_with(code, code.default_message())
    }

    /// Records a failure with a specific message.
    pub fn fail_with(&mut self, code: LoginCode, message: impl Into<String>) -> bool {
        self.code = Some(code);
        self.message = message.into();
        false
    }

    pub(crate) fn succeed(&mut self) {
        self.code = Some(LoginCode::Ok);
        self.message = LoginCode::Ok.default_message().to_string();
    }

    /// Returns `true` once every step has passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(LoginCode::Ok)
    }

    /// The outcome code. A result that never ran is reported as internal.
    #[must_use]
    pub fn outcome(&self) -> LoginCode {
        self.code.unwrap_or(LoginCode::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(LoginCode::Ok.code(), 1);
        assert_eq!(LoginCode::Internal.code(), 2);
        assert_eq!(LoginCode::ProfileNotFound.code(), 7);
        assert_eq!(LoginCode::PinMismatch.code(), 8);
        assert_eq!(LoginCode::PinNotFound.code(), 9);
        assert_eq!(LoginCode::ExpiredPin.code(), 48);
        assert_eq!(LoginCode::PinResetServiceRequest.code(), 72);
        assert_eq!(LoginCode::RetryLogin.code(), 73);
        assert_eq!(LoginCode::InactiveUser.code(), 75);
    }

    #[test]
    fn test_code_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&LoginCode::RetryLogin).unwrap(), "73");
    }

    #[test]
    fn test_credential_failures_share_message() {
        assert_eq!(
            LoginCode::ProfileNotFound.default_message(),
            LoginCode::PinMismatch.default_message()
        );
    }

    #[test]
    fn test_fail_and_succeed() {
        let mut result = LoginResult::default();
        assert_eq!(result.outcome(), LoginCode::Internal);

        assert!(!result.fail(LoginCode::InactiveUser));
        assert_eq!(result.code, Some(LoginCode::InactiveUser));
        assert!(!result.is_success());

        result.succeed();
        assert!(result.is_success());
        assert_eq!(result.message, "login successful");
    }
}
