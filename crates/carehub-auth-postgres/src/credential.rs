//! Credential storage.
//!
//! Users, PIN records, lockout counters, profile records, PIN-reset
//! requests and role/permission assignments.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;

use carehub_auth::storage::CredentialStore;
use carehub_auth::types::{Flavour, PinRecord, UserProfile, UserType, UserUpdate};
use carehub_auth::AuthResult;

use crate::{PgPool, StorageError, StorageResult};

// =============================================================================
// Row Types
// =============================================================================

/// Raw `users` row as selected by [`USER_COLUMNS`].
pub(crate) type UserTuple = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    i32,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    bool,
    bool,
    String,
    Option<String>,
);

pub(crate) const USER_COLUMNS: &str = "id, username, name, email, gender, active, \
     failed_login_count, next_allowed_login, last_successful_login, last_failed_login, \
     terms_accepted, is_superuser, user_type, current_program_id";

/// Maps a `users` row to a profile.
pub(crate) fn user_from_tuple(row: UserTuple) -> StorageResult<UserProfile> {
    let user_type = UserType::parse(&row.12).ok_or_else(|| {
        StorageError::invalid_data(format!("user '{}' has unknown type '{}'", row.0, row.12))
    })?;
    let failed_login_count = u32::try_from(row.6).map_err(|_| {
        StorageError::invalid_data(format!(
            "user '{}' has negative failed_login_count {}",
            row.0, row.6
        ))
    })?;

    Ok(UserProfile {
        id: row.0,
        username: row.1,
        name: row.2,
        email: row.3,
        gender: row.4,
        active: row.5,
        failed_login_count,
        next_allowed_login: row.7,
        last_successful_login: row.8,
        last_failed_login: row.9,
        terms_accepted: row.10,
        is_superuser: row.11,
        user_type,
        current_program_id: row.13,
    })
}

type PinTuple = (String, String, String, OffsetDateTime, OffsetDateTime, bool);

fn pin_from_tuple(row: PinTuple, flavour: Flavour) -> PinRecord {
    PinRecord {
        user_id: row.0,
        flavour,
        hashed_pin: row.1,
        salt: row.2,
        valid_from: row.3,
        valid_to: row.4,
        active: row.5,
    }
}

/// Bind values for a partial user update.
///
/// Nullable timestamps are sent as a (set, value) pair so that "leave as is"
/// and "clear" stay distinguishable.
#[derive(Debug, PartialEq)]
struct UpdateBinds {
    failed_login_count: Option<i32>,
    next_allowed_login: Option<OffsetDateTime>,
    set_last_successful: bool,
    last_successful_login: Option<OffsetDateTime>,
    set_last_failed: bool,
    last_failed_login: Option<OffsetDateTime>,
}

impl UpdateBinds {
    fn from_update(update: &UserUpdate) -> StorageResult<Self> {
        let failed_login_count = update
            .failed_login_count
            .map(i32::try_from)
            .transpose()
            .map_err(|_| StorageError::invalid_data("failed_login_count out of range"))?;

        Ok(Self {
            failed_login_count,
            next_allowed_login: update.next_allowed_login,
            set_last_successful: update.last_successful_login.is_some(),
            last_successful_login: update.last_successful_login.flatten(),
            set_last_failed: update.last_failed_login.is_some(),
            last_failed_login: update.last_failed_login.flatten(),
        })
    }
}

// =============================================================================
// Credential Store
// =============================================================================

/// PostgreSQL-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: Arc<PgPool>,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Find a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row holds invalid data.
    pub async fn find_by_username(&self, username: &str) -> StorageResult<Option<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await?;

        row.map(user_from_tuple).transpose()
    }

    /// Find the newest active PIN for a user and flavour.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_pin(
        &self,
        user_id: &str,
        flavour: Flavour,
    ) -> StorageResult<Option<PinRecord>> {
        let row: Option<PinTuple> = query_as(
            r#"
            SELECT user_id, hashed_pin, salt, valid_from, valid_to, active
            FROM user_pins
            WHERE user_id = $1
              AND flavour = $2
              AND active
            ORDER BY valid_from DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(flavour.as_str())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|r| pin_from_tuple(r, flavour)))
    }

    /// Apply a partial update to the lockout fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub async fn update(&self, user_id: &str, update: &UserUpdate) -> StorageResult<()> {
        let binds = UpdateBinds::from_update(update)?;
        let result = query(
            r#"
            UPDATE users SET
                failed_login_count = COALESCE($2, failed_login_count),
                next_allowed_login = COALESCE($3, next_allowed_login),
                last_successful_login = CASE WHEN $4::boolean THEN $5 ELSE last_successful_login END,
                last_failed_login = CASE WHEN $6::boolean THEN $7 ELSE last_failed_login END
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(binds.failed_login_count)
        .bind(binds.next_allowed_login)
        .bind(binds.set_last_successful)
        .bind(binds.last_successful_login)
        .bind(binds.set_last_failed)
        .bind(binds.last_failed_login)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("user '{user_id}'")));
        }
        Ok(())
    }

    async fn exists_in(&self, table: &'static str, user_id: &str) -> StorageResult<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE user_id = $1)");
        let exists: bool = query_scalar(&sql)
            .bind(user_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(exists)
    }

    async fn strings(&self, sql: &'static str, user_id: &str) -> StorageResult<Vec<String>> {
        let rows: Vec<String> = query_scalar(sql)
            .bind(user_id)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_profile_by_username(&self, username: &str) -> AuthResult<Option<UserProfile>> {
        Ok(self.find_by_username(username).await?)
    }

    async fn get_pin_by_user_id(
        &self,
        user_id: &str,
        flavour: Flavour,
    ) -> AuthResult<Option<PinRecord>> {
        Ok(self.find_pin(user_id, flavour).await?)
    }

    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> AuthResult<()> {
        Ok(self.update(user_id, update).await?)
    }

    async fn check_client_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.exists_in("client_profiles", user_id).await?)
    }

    async fn check_staff_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.exists_in("staff_profiles", user_id).await?)
    }

    async fn check_caregiver_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.exists_in("caregiver_profiles", user_id).await?)
    }

    async fn get_pending_pin_reset_requests(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .strings(
                r#"
                SELECT r.id
                FROM pin_reset_requests r
                JOIN client_profiles c ON c.user_id = r.user_id
                WHERE r.user_id = $1
                  AND r.status = 'PENDING'
                ORDER BY r.created_at
                "#,
                user_id,
            )
            .await?)
    }

    async fn get_user_roles(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .strings(
                "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
                user_id,
            )
            .await?)
    }

    async fn get_user_permissions(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .strings(
                "SELECT permission FROM user_permissions WHERE user_id = $1 ORDER BY permission",
                user_id,
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn tuple(user_type: &str, failed: i32) -> UserTuple {
        (
            "u1".to_string(),
            "jdoe".to_string(),
            "Jane Doe".to_string(),
            Some("jane@example.com".to_string()),
            None,
            true,
            failed,
            OffsetDateTime::UNIX_EPOCH,
            None,
            None,
            true,
            false,
            user_type.to_string(),
            Some("p1".to_string()),
        )
    }

    #[test]
    fn test_user_from_tuple() {
        let user = user_from_tuple(tuple("STAFF", 2)).unwrap();
        assert_eq!(user.username, "jdoe");
        assert_eq!(user.user_type, UserType::Staff);
        assert_eq!(user.failed_login_count, 2);
        assert_eq!(user.current_program_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_user_from_tuple_rejects_bad_rows() {
        let err = user_from_tuple(tuple("ROBOT", 0)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));

        let err = user_from_tuple(tuple("CLIENT", -1)).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_update_binds_keep_clear_and_set() {
        let now = OffsetDateTime::now_utc();

        let binds = UpdateBinds::from_update(&UserUpdate::successful_login(now)).unwrap();
        assert_eq!(binds.failed_login_count, Some(0));
        assert!(binds.set_last_successful);
        assert_eq!(binds.last_successful_login, Some(now));
        assert!(binds.set_last_failed);
        assert_eq!(binds.last_failed_login, None);

        let binds = UpdateBinds::from_update(&UserUpdate::failed_attempt(
            3,
            now + Duration::seconds(24),
            now,
        ))
        .unwrap();
        assert_eq!(binds.failed_login_count, Some(3));
        assert!(!binds.set_last_successful);
        assert_eq!(binds.last_failed_login, Some(now));
    }

    #[test]
    fn test_update_binds_reject_overflow() {
        let update = UserUpdate {
            failed_login_count: Some(u32::MAX),
            ..UserUpdate::default()
        };
        assert!(UpdateBinds::from_update(&update).is_err());
    }

    #[test]
    fn test_pin_from_tuple_carries_flavour() {
        let now = OffsetDateTime::now_utc();
        let pin = pin_from_tuple(
            (
                "u1".to_string(),
                "$argon2id$...".to_string(),
                "salt".to_string(),
                now,
                now + Duration::days(90),
                true,
            ),
            Flavour::Consumer,
        );
        assert_eq!(pin.flavour, Flavour::Consumer);
        assert!(pin.is_usable(now));
    }
}
