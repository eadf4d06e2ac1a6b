//! User identity and login credential types.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Flavour
// =============================================================================

/// The audience a login is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flavour {
    /// Client-facing mobile app (clients and caregivers).
    #[serde(alias = "consumer")]
    Consumer,
    /// Staff-facing app and the browser authorize flow.
    #[serde(alias = "pro")]
    Pro,
}

impl Flavour {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consumer => "CONSUMER",
            Self::Pro => "PRO",
        }
    }
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of account a user profile was created as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    /// A patient enrolled in a program.
    Client,
    /// A facility staff member.
    Staff,
    /// A caregiver acting for one or more clients.
    Caregiver,
}

impl UserType {
    /// Returns the wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Staff => "STAFF",
            Self::Caregiver => "CAREGIVER",
        }
    }

    /// Parses the wire representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CLIENT" => Some(Self::Client),
            "STAFF" => Some(Self::Staff),
            "CAREGIVER" => Some(Self::Caregiver),
            _ => None,
        }
    }
}

// =============================================================================
// User Profile
// =============================================================================

/// A user identity record as held by the credential store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique identifier.
    pub id: String,

    /// Login name.
    pub username: String,

    /// Display name.
    pub name: String,

    /// Email address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Gender as recorded at registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Deactivated users cannot log in.
    pub active: bool,

    /// Consecutive PIN mismatches since the last successful login.
    pub failed_login_count: u32,

    /// Earliest instant at which a login attempt is accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub next_allowed_login: OffsetDateTime,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_successful_login: Option<OffsetDateTime>,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_failed_login: Option<OffsetDateTime>,

    pub terms_accepted: bool,

    pub is_superuser: bool,

    pub user_type: UserType,

    /// Program the user last worked in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_program_id: Option<String>,
}

impl UserProfile {
    /// Creates an active profile with no login history.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>, user_type: UserType) -> Self {
        let username = username.into();
        Self {
            id: id.into(),
            name: username.clone(),
            username,
            email: None,
            gender: None,
            active: true,
            failed_login_count: 0,
            next_allowed_login: OffsetDateTime::UNIX_EPOCH,
            last_successful_login: None,
            last_failed_login: None,
            terms_accepted: true,
            is_superuser: false,
            user_type,
            current_program_id: None,
        }
    }

    /// Creates a new profile builder.
    #[must_use]
    pub fn builder(
        id: impl Into<String>,
        username: impl Into<String>,
        user_type: UserType,
    ) -> UserProfileBuilder {
        UserProfileBuilder {
            profile: Self::new(id, username, user_type),
        }
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &UserUpdate) {
        if let Some(count) = update.failed_login_count {
            self.failed_login_count = count;
        }
        if let Some(next) = update.next_allowed_login {
            self.next_allowed_login = next;
        }
        if let Some(last) = update.last_successful_login {
            self.last_successful_login = last;
        }
        if let Some(last) = update.last_failed_login {
            self.last_failed_login = last;
        }
    }
}

/// Builder for creating `UserProfile` instances.
pub struct UserProfileBuilder {
    profile: UserProfile,
}

impl UserProfileBuilder {
    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.profile.name = name.into();
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.profile.email = Some(email.into());
        self
    }

    /// Sets the gender.
    #[must_use]
    pub fn gender(mut self, gender: impl Into<String>) -> Self {
        self.profile.gender = Some(gender.into());
        self
    }

    /// Sets whether the user is active.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.profile.active = active;
        self
    }

    #[must_use]
    pub fn superuser(mut self, is_superuser: bool) -> Self {
        self.profile.is_superuser = is_superuser;
        self
    }

    /// Sets the lockout state.
    #[must_use]
    pub fn lockout(mut self, failed_login_count: u32, next_allowed_login: OffsetDateTime) -> Self {
        self.profile.failed_login_count = failed_login_count;
        self.profile.next_allowed_login = next_allowed_login;
        self
    }

    #[must_use]
    pub fn current_program(mut self, program_id: impl Into<String>) -> Self {
        self.profile.current_program_id = Some(program_id.into());
        self
    }

    /// Builds the profile.
    #[must_use]
    pub fn build(self) -> UserProfile {
        self.profile
    }
}

// =============================================================================
// User Update
// =============================================================================

/// A partial write to the lockout fields of a user profile.
///
/// `None` leaves a field untouched. For the nullable timestamps,
/// `Some(None)` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub failed_login_count: Option<u32>,
    pub next_allowed_login: Option<OffsetDateTime>,
    pub last_successful_login: Option<Option<OffsetDateTime>>,
    pub last_failed_login: Option<Option<OffsetDateTime>>,
}

impl UserUpdate {
    /// The write made after a PIN mismatch.
    #[must_use]
    pub fn failed_attempt(
        failed_login_count: u32,
        next_allowed_login: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            failed_login_count: Some(failed_login_count),
            next_allowed_login: Some(next_allowed_login),
            last_successful_login: None,
            last_failed_login: Some(Some(now)),
        }
    }

    /// The write made after a PIN match. Resets the lockout state.
    #[must_use]
    pub fn successful_login(now: OffsetDateTime) -> Self {
        Self {
            failed_login_count: Some(0),
            next_allowed_login: Some(now),
            last_successful_login: Some(Some(now)),
            last_failed_login: Some(None),
        }
    }
}

// =============================================================================
// Login Credentials
// =============================================================================

/// Transient login input. Never persisted or logged.
#[derive(Clone, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub pin: String,
    pub flavour: Flavour,
}

impl LoginCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, pin: impl Into<String>, flavour: Flavour) -> Self {
        Self {
            username: username.into(),
            pin: pin.into(),
            flavour,
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("pin", &"[redacted]")
            .field("flavour", &self.flavour)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_flavour_accepts_both_cases() {
        let f: Flavour = serde_json::from_str(r#""PRO""#).unwrap();
        assert_eq!(f, Flavour::Pro);
        let f: Flavour = serde_json::from_str(r#""consumer""#).unwrap();
        assert_eq!(f, Flavour::Consumer);
        assert_eq!(serde_json::to_string(&Flavour::Pro).unwrap(), r#""PRO""#);
    }

    #[test]
    fn test_user_type_parse() {
        assert_eq!(UserType::parse("staff"), Some(UserType::Staff));
        assert_eq!(UserType::parse("CLIENT"), Some(UserType::Client));
        assert_eq!(UserType::parse("robot"), None);
    }

    #[test]
    fn test_builder() {
        let user = UserProfile::builder("u1", "jdoe", UserType::Staff)
            .name("Jane Doe")
            .email("jane@example.com")
            .gender("female")
            .active(false)
            .build();
        assert_eq!(user.name, "Jane Doe");
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
        assert!(!user.active);
        assert_eq!(user.failed_login_count, 0);
    }

    #[test]
    fn test_apply_failed_then_successful() {
        let now = OffsetDateTime::now_utc();
        let mut user = UserProfile::new("u1", "jdoe", UserType::Staff);

        user.apply(&UserUpdate::failed_attempt(2, now + Duration::seconds(12), now));
        assert_eq!(user.failed_login_count, 2);
        assert_eq!(user.next_allowed_login, now + Duration::seconds(12));
        assert_eq!(user.last_failed_login, Some(now));
        assert_eq!(user.last_successful_login, None);

        user.apply(&UserUpdate::successful_login(now));
        assert_eq!(user.failed_login_count, 0);
        assert_eq!(user.next_allowed_login, now);
        assert_eq!(user.last_failed_login, None);
        assert_eq!(user.last_successful_login, Some(now));
    }

    #[test]
    fn test_credentials_debug_redacts_pin() {
        let creds = LoginCredentials::new("jdoe", "1234", Flavour::Pro);
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("1234"));
        assert!(rendered.contains("jdoe"));
    }
}
