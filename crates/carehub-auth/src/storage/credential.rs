//! Credential store trait.
//!
//! Persistence of user identity, stored PINs, lockout counters and
//! role/permission assignments. The login pipeline is the only writer of the
//! lockout fields.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Flavour, PinRecord, UserProfile, UserUpdate};

/// Storage operations consumed by the login pipeline.
///
/// # Implementations
///
/// - [`MemoryCredentialStore`](super::MemoryCredentialStore) for tests and demos
/// - PostgreSQL (in `carehub-auth-postgres` crate)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Finds a user profile by username.
    ///
    /// # Returns
    ///
    /// `None` if no profile exists.
    async fn get_profile_by_username(&self, username: &str) -> AuthResult<Option<UserProfile>>;

    /// Finds the active PIN record for a user and flavour.
    async fn get_pin_by_user_id(
        &self,
        user_id: &str,
        flavour: Flavour,
    ) -> AuthResult<Option<PinRecord>>;

    /// Applies a partial update to a user profile as a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if the user does not exist or the write fails.
    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> AuthResult<()>;

    /// Returns `true` if the user has a client record.
    async fn check_client_exists(&self, user_id: &str) -> AuthResult<bool>;

    /// Returns `true` if the user has a staff record in any program.
    async fn check_staff_exists(&self, user_id: &str) -> AuthResult<bool>;

    /// Returns `true` if the user has a caregiver record.
    async fn check_caregiver_exists(&self, user_id: &str) -> AuthResult<bool>;

    /// Returns the ids of unresolved PIN-reset service requests raised by
    /// the user's client record.
    async fn get_pending_pin_reset_requests(&self, user_id: &str) -> AuthResult<Vec<String>>;

    /// Returns the names of the roles assigned to the user.
    async fn get_user_roles(&self, user_id: &str) -> AuthResult<Vec<String>>;

    /// Returns the permissions granted to the user through their roles.
    async fn get_user_permissions(&self, user_id: &str) -> AuthResult<Vec<String>>;
}
