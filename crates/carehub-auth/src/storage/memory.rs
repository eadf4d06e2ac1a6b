//! In-memory store implementations.
//!
//! Backed by `dashmap`, so no global lock is taken. Used by the server's
//! `memory` storage backend and throughout the tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::time::Instant;

use super::{CredentialStore, ProgramDirectory, SessionStore};
use crate::types::{Facility, Flavour, PinRecord, Program, StaffProfile, UserProfile, UserUpdate};
use crate::{AuthError, AuthResult};

// =============================================================================
// Credential Store
// =============================================================================

/// In-memory [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: DashMap<String, UserProfile>,
    usernames: DashMap<String, String>,
    pins: DashMap<(String, Flavour), PinRecord>,
    clients: DashSet<String>,
    staff: DashSet<String>,
    caregivers: DashSet<String>,
    pin_resets: DashMap<String, Vec<String>>,
    roles: DashMap<String, Vec<String>>,
    permissions: DashMap<String, Vec<String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user profile.
    pub fn insert_user(&self, profile: UserProfile) {
        self.usernames
            .insert(profile.username.clone(), profile.id.clone());
        self.users.insert(profile.id.clone(), profile);
    }

    /// Inserts or replaces the PIN for the record's (user, flavour).
    pub fn insert_pin(&self, record: PinRecord) {
        self.pins
            .insert((record.user_id.clone(), record.flavour), record);
    }

    pub fn add_client(&self, user_id: impl Into<String>) {
        self.clients.insert(user_id.into());
    }

    pub fn add_staff(&self, user_id: impl Into<String>) {
        self.staff.insert(user_id.into());
    }

    pub fn add_caregiver(&self, user_id: impl Into<String>) {
        self.caregivers.insert(user_id.into());
    }

    /// Raises an unresolved PIN-reset request for a client.
    pub fn add_pin_reset_request(&self, user_id: impl Into<String>, request_id: impl Into<String>) {
        self.pin_resets
            .entry(user_id.into())
            .or_default()
            .push(request_id.into());
    }

    /// Assigns roles and their permissions to a user.
    pub fn assign_roles(&self, user_id: &str, roles: Vec<String>, permissions: Vec<String>) {
        self.roles.insert(user_id.to_string(), roles);
        self.permissions.insert(user_id.to_string(), permissions);
    }

    /// Returns a snapshot of a user profile.
    #[must_use]
    pub fn profile_by_id(&self, user_id: &str) -> Option<UserProfile> {
        self.users.get(user_id).map(|u| u.clone())
    }

    fn set_current_program(&self, user_id: &str, program_id: &str) -> AuthResult<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::storage(format!("user '{user_id}' not found")))?;
        user.current_program_id = Some(program_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_profile_by_username(&self, username: &str) -> AuthResult<Option<UserProfile>> {
        let Some(id) = self.usernames.get(username).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.profile_by_id(&id))
    }

    async fn get_pin_by_user_id(
        &self,
        user_id: &str,
        flavour: Flavour,
    ) -> AuthResult<Option<PinRecord>> {
        Ok(self
            .pins
            .get(&(user_id.to_string(), flavour))
            .map(|p| p.clone()))
    }

    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> AuthResult<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AuthError::storage(format!("user '{user_id}' not found")))?;
        user.apply(update);
        Ok(())
    }

    async fn check_client_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.clients.contains(user_id))
    }

    async fn check_staff_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.staff.contains(user_id))
    }

    async fn check_caregiver_exists(&self, user_id: &str) -> AuthResult<bool> {
        Ok(self.caregivers.contains(user_id))
    }

    async fn get_pending_pin_reset_requests(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .pin_resets
            .get(user_id)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn get_user_roles(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self.roles.get(user_id).map(|r| r.clone()).unwrap_or_default())
    }

    async fn get_user_permissions(&self, user_id: &str) -> AuthResult<Vec<String>> {
        Ok(self
            .permissions
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}

// =============================================================================
// Session Store
// =============================================================================

#[derive(Debug)]
struct SessionEntry {
    values: HashMap<String, Vec<u8>>,
    expires_at: Instant,
}

/// In-memory [`SessionStore`] with an idle timeout.
///
/// Every `put` pushes the expiry forward by the configured TTL.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, SessionEntry>,
    ttl: Duration,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Drops every expired session. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    /// Number of sessions currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_if_expired(&self, session_id: &str) {
        let now = Instant::now();
        self.sessions
            .remove_if(session_id, |_, entry| entry.expires_at <= now);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session_id: &str, key: &str, value: Vec<u8>) -> AuthResult<()> {
        self.evict_if_expired(session_id);
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                values: HashMap::new(),
                expires_at: Instant::now(),
            });
        entry.values.insert(key.to_string(), value);
        entry.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    async fn exists(&self, session_id: &str, key: &str) -> AuthResult<bool> {
        self.evict_if_expired(session_id);
        Ok(self
            .sessions
            .get(session_id)
            .is_some_and(|entry| entry.values.contains_key(key)))
    }

    async fn get_bytes(&self, session_id: &str, key: &str) -> AuthResult<Option<Vec<u8>>> {
        self.evict_if_expired(session_id);
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|entry| entry.values.get(key).cloned()))
    }

    async fn destroy(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

// =============================================================================
// Program Directory
// =============================================================================

/// In-memory [`ProgramDirectory`].
///
/// Shares user profiles with a [`MemoryCredentialStore`] so that
/// `set_current_program` is visible to later logins.
#[derive(Debug)]
pub struct MemoryProgramDirectory {
    credentials: Arc<MemoryCredentialStore>,
    programs: DashMap<String, Program>,
    memberships: DashMap<String, Vec<String>>,
    facilities: DashMap<String, Facility>,
    program_facilities: DashMap<String, Vec<String>>,
    staff: DashMap<String, StaffProfile>,
}

impl MemoryProgramDirectory {
    #[must_use]
    pub fn new(credentials: Arc<MemoryCredentialStore>) -> Self {
        Self {
            credentials,
            programs: DashMap::new(),
            memberships: DashMap::new(),
            facilities: DashMap::new(),
            program_facilities: DashMap::new(),
            staff: DashMap::new(),
        }
    }

    pub fn insert_program(&self, program: Program) {
        self.programs.insert(program.id.clone(), program);
    }

    /// Adds a facility and attaches it to a program.
    pub fn insert_facility(&self, facility: Facility, program_id: &str) {
        self.program_facilities
            .entry(program_id.to_string())
            .or_default()
            .push(facility.id.clone());
        self.facilities.insert(facility.id.clone(), facility);
    }

    /// Adds a staff record. The user also becomes a member of the program
    /// and passes the credential store's staff check.
    pub fn insert_staff(&self, staff: StaffProfile) {
        self.credentials.add_staff(staff.user_id.clone());
        self.add_member(&staff.user_id, &staff.program_id);
        self.staff.insert(staff.id.clone(), staff);
    }

    pub fn add_member(&self, user_id: &str, program_id: &str) {
        let mut programs = self.memberships.entry(user_id.to_string()).or_default();
        if !programs.iter().any(|p| p == program_id) {
            programs.push(program_id.to_string());
        }
    }

    /// Returns a snapshot of a staff record.
    #[must_use]
    pub fn staff_by_id(&self, staff_id: &str) -> Option<StaffProfile> {
        self.staff.get(staff_id).map(|s| s.clone())
    }
}

#[async_trait]
impl ProgramDirectory for MemoryProgramDirectory {
    async fn get_user_profile(&self, user_id: &str) -> AuthResult<Option<UserProfile>> {
        Ok(self.credentials.profile_by_id(user_id))
    }

    async fn list_user_programs(&self, user_id: &str) -> AuthResult<Vec<Program>> {
        let ids = self
            .memberships
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.programs.get(id).map(|p| p.clone()))
            .collect())
    }

    async fn get_program(&self, program_id: &str) -> AuthResult<Option<Program>> {
        Ok(self.programs.get(program_id).map(|p| p.clone()))
    }

    async fn set_current_program(&self, user_id: &str, program_id: &str) -> AuthResult<()> {
        self.credentials.set_current_program(user_id, program_id)
    }

    async fn get_staff_profile(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> AuthResult<Option<StaffProfile>> {
        Ok(self
            .staff
            .iter()
            .find(|s| s.user_id == user_id && s.program_id == program_id)
            .map(|s| s.clone()))
    }

    async fn list_program_facilities(&self, program_id: &str) -> AuthResult<Vec<Facility>> {
        let ids = self
            .program_facilities
            .get(program_id)
            .map(|f| f.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.facilities.get(id).map(|f| f.clone()))
            .collect())
    }

    async fn get_facility(&self, facility_id: &str) -> AuthResult<Option<Facility>> {
        Ok(self.facilities.get(facility_id).map(|f| f.clone()))
    }

    async fn set_staff_default_facility(
        &self,
        staff_id: &str,
        facility_id: &str,
    ) -> AuthResult<()> {
        let mut staff = self
            .staff
            .get_mut(staff_id)
            .ok_or_else(|| AuthError::storage(format!("staff '{staff_id}' not found")))?;
        let attached = self
            .program_facilities
            .get(&staff.program_id)
            .is_some_and(|ids| ids.iter().any(|id| id == facility_id));
        if !attached {
            return Err(AuthError::invalid_request(
                "facility is not attached to the staff member's program",
            ));
        }
        staff.default_facility_id = Some(facility_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserType;
    use time::OffsetDateTime;
    use tokio_test::block_on;

    fn store_with_user() -> MemoryCredentialStore {
        let store = MemoryCredentialStore::new();
        store.insert_user(UserProfile::new("u1", "jdoe", UserType::Staff));
        store
    }

    #[test]
    fn test_profile_lookup_by_username() {
        let store = store_with_user();
        let user = block_on(store.get_profile_by_username("jdoe")).unwrap();
        assert_eq!(user.map(|u| u.id), Some("u1".to_string()));
        assert!(block_on(store.get_profile_by_username("nobody")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_user_applies_partial_write() {
        let store = store_with_user();
        let now = OffsetDateTime::now_utc();
        store
            .update_user("u1", &UserUpdate::failed_attempt(1, now, now))
            .await
            .unwrap();
        let user = store.profile_by_id("u1").unwrap();
        assert_eq!(user.failed_login_count, 1);
        assert_eq!(user.last_failed_login, Some(now));
    }

    #[tokio::test]
    async fn test_update_unknown_user_fails() {
        let store = MemoryCredentialStore::new();
        let err = store
            .update_user("ghost", &UserUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_server_error());
    }

    #[tokio::test]
    async fn test_profile_kind_checks() {
        let store = store_with_user();
        store.add_client("u1");
        store.add_pin_reset_request("u1", "sr-1");
        assert!(store.check_client_exists("u1").await.unwrap());
        assert!(!store.check_caregiver_exists("u1").await.unwrap());
        assert!(!store.check_staff_exists("u1").await.unwrap());
        assert_eq!(
            store.get_pending_pin_reset_requests("u1").await.unwrap(),
            vec!["sr-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_session_put_get_destroy() {
        let sessions = MemorySessionStore::new(Duration::from_secs(60));
        sessions.put("s1", "flow", b"abc".to_vec()).await.unwrap();
        assert!(sessions.exists("s1", "flow").await.unwrap());
        assert_eq!(
            sessions.get_bytes("s1", "flow").await.unwrap(),
            Some(b"abc".to_vec())
        );

        sessions.destroy("s1").await.unwrap();
        assert!(!sessions.exists("s1", "flow").await.unwrap());
        assert!(sessions.get_bytes("s1", "flow").await.unwrap().is_none());
        sessions.destroy("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_expires_after_ttl() {
        let sessions = MemorySessionStore::new(Duration::from_millis(20));
        sessions.put("s1", "flow", b"abc".to_vec()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(sessions.get_bytes("s1", "flow").await.unwrap().is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let sessions = MemorySessionStore::new(Duration::from_millis(20));
        sessions.put("old", "flow", vec![1]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let fresh = MemorySessionStore::new(Duration::from_secs(60));
        fresh.put("new", "flow", vec![2]).await.unwrap();

        assert_eq!(sessions.purge_expired(), 1);
        assert!(sessions.is_empty());
        assert_eq!(fresh.purge_expired(), 0);
        assert_eq!(fresh.len(), 1);
    }

    fn directory() -> MemoryProgramDirectory {
        let credentials = Arc::new(store_with_user());
        let dir = MemoryProgramDirectory::new(credentials);
        dir.insert_program(Program {
            id: "P1".to_string(),
            name: "Diabetes".to_string(),
            organisation_id: "O1".to_string(),
        });
        dir.insert_facility(
            Facility {
                id: "F1".to_string(),
                name: "Kisumu".to_string(),
            },
            "P1",
        );
        dir.insert_facility(
            Facility {
                id: "F9".to_string(),
                name: "Elsewhere".to_string(),
            },
            "P9",
        );
        dir.insert_staff(StaffProfile {
            id: "S1".to_string(),
            user_id: "u1".to_string(),
            program_id: "P1".to_string(),
            default_facility_id: None,
        });
        dir
    }

    #[tokio::test]
    async fn test_directory_programs_and_staff() {
        let dir = directory();
        let programs = dir.list_user_programs("u1").await.unwrap();
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].id, "P1");

        let staff = dir.get_staff_profile("u1", "P1").await.unwrap().unwrap();
        assert_eq!(staff.id, "S1");
        assert!(dir.get_staff_profile("u1", "P9").await.unwrap().is_none());
        assert!(dir.credentials.check_staff_exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_current_program_updates_profile() {
        let dir = directory();
        dir.set_current_program("u1", "P1").await.unwrap();
        let user = dir.get_user_profile("u1").await.unwrap().unwrap();
        assert_eq!(user.current_program_id.as_deref(), Some("P1"));
    }

    #[tokio::test]
    async fn test_default_facility_must_belong_to_program() {
        let dir = directory();
        assert!(dir.set_staff_default_facility("S1", "F9").await.is_err());

        dir.set_staff_default_facility("S1", "F1").await.unwrap();
        assert_eq!(
            dir.staff_by_id("S1").unwrap().default_facility_id.as_deref(),
            Some("F1")
        );
    }
}
