//! Program directory trait.
//!
//! Program, staff and facility lookups used by the authorize flow after a
//! successful login.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Facility, Program, StaffProfile, UserProfile};

/// Directory operations consumed by the authorize flow controller.
#[async_trait]
pub trait ProgramDirectory: Send + Sync {
    /// Finds a user profile by id.
    async fn get_user_profile(&self, user_id: &str) -> AuthResult<Option<UserProfile>>;

    /// Lists the programs the user belongs to.
    async fn list_user_programs(&self, user_id: &str) -> AuthResult<Vec<Program>>;

    /// Finds a program by id.
    async fn get_program(&self, program_id: &str) -> AuthResult<Option<Program>>;

    /// Records the program the user is now working in.
    async fn set_current_program(&self, user_id: &str, program_id: &str) -> AuthResult<()>;

    /// Finds the user's staff record in a program.
    async fn get_staff_profile(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> AuthResult<Option<StaffProfile>>;

    /// Lists the facilities attached to a program.
    async fn list_program_facilities(&self, program_id: &str) -> AuthResult<Vec<Facility>>;

    /// Finds a facility by id.
    async fn get_facility(&self, facility_id: &str) -> AuthResult<Option<Facility>>;

    /// Sets the facility a staff member lands in by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the facility is not attached to the staff
    /// member's program.
    async fn set_staff_default_facility(&self, staff_id: &str, facility_id: &str)
    -> AuthResult<()>;
}
