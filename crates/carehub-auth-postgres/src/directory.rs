//! Program directory storage.
//!
//! Programs, program membership, facilities and staff records.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;

use carehub_auth::storage::ProgramDirectory;
use carehub_auth::types::{Facility, Program, StaffProfile, UserProfile};
use carehub_auth::{AuthError, AuthResult};

use crate::credential::{USER_COLUMNS, UserTuple, user_from_tuple};
use crate::{PgPool, StorageError, StorageResult};

type ProgramTuple = (String, String, String);
type FacilityTuple = (String, String);
type StaffTuple = (String, String, String, Option<String>);

fn program_from_tuple(row: ProgramTuple) -> Program {
    Program {
        id: row.0,
        name: row.1,
        organisation_id: row.2,
    }
}

fn facility_from_tuple(row: FacilityTuple) -> Facility {
    Facility {
        id: row.0,
        name: row.1,
    }
}

fn staff_from_tuple(row: StaffTuple) -> StaffProfile {
    StaffProfile {
        id: row.0,
        user_id: row.1,
        program_id: row.2,
        default_facility_id: row.3,
    }
}

/// PostgreSQL-backed [`ProgramDirectory`].
#[derive(Debug, Clone)]
pub struct PgProgramDirectory {
    pool: Arc<PgPool>,
}

impl PgProgramDirectory {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn find_user(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(user_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(user_from_tuple).transpose()
    }

    async fn programs_for(&self, user_id: &str) -> StorageResult<Vec<Program>> {
        let rows: Vec<ProgramTuple> = query_as(
            r#"
            SELECT p.id, p.name, p.organisation_id
            FROM programs p
            JOIN program_members m ON m.program_id = p.id
            WHERE m.user_id = $1
            ORDER BY p.name, p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(program_from_tuple).collect())
    }

    async fn find_program(&self, program_id: &str) -> StorageResult<Option<Program>> {
        let row: Option<ProgramTuple> =
            query_as("SELECT id, name, organisation_id FROM programs WHERE id = $1")
                .bind(program_id)
                .fetch_optional(&*self.pool)
                .await?;
        Ok(row.map(program_from_tuple))
    }

    async fn update_current_program(&self, user_id: &str, program_id: &str) -> StorageResult<()> {
        let result = query("UPDATE users SET current_program_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(program_id)
            .execute(&*self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("user '{user_id}'")));
        }
        Ok(())
    }

    async fn find_staff(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> StorageResult<Option<StaffProfile>> {
        let row: Option<StaffTuple> = query_as(
            r#"
            SELECT id, user_id, program_id, default_facility_id
            FROM staff_profiles
            WHERE user_id = $1 AND program_id = $2
            "#,
        )
        .bind(user_id)
        .bind(program_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(staff_from_tuple))
    }

    async fn facilities_for(&self, program_id: &str) -> StorageResult<Vec<Facility>> {
        let rows: Vec<FacilityTuple> = query_as(
            r#"
            SELECT f.id, f.name
            FROM facilities f
            JOIN program_facilities pf ON pf.facility_id = f.id
            WHERE pf.program_id = $1
            ORDER BY f.name, f.id
            "#,
        )
        .bind(program_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(facility_from_tuple).collect())
    }

    async fn find_facility(&self, facility_id: &str) -> StorageResult<Option<Facility>> {
        let row: Option<FacilityTuple> = query_as("SELECT id, name FROM facilities WHERE id = $1")
            .bind(facility_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(facility_from_tuple))
    }

    /// Returns `false` when the facility is not attached to the staff
    /// member's program.
    async fn update_default_facility(
        &self,
        staff_id: &str,
        facility_id: &str,
    ) -> StorageResult<bool> {
        let staff_exists: bool =
            query_scalar("SELECT EXISTS (SELECT 1 FROM staff_profiles WHERE id = $1)")
                .bind(staff_id)
                .fetch_one(&*self.pool)
                .await?;
        if !staff_exists {
            return Err(StorageError::not_found(format!("staff '{staff_id}'")));
        }

        let result = query(
            r#"
            UPDATE staff_profiles s
            SET default_facility_id = $2
            WHERE s.id = $1
              AND EXISTS (
                  SELECT 1 FROM program_facilities pf
                  WHERE pf.program_id = s.program_id AND pf.facility_id = $2
              )
            "#,
        )
        .bind(staff_id)
        .bind(facility_id)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProgramDirectory for PgProgramDirectory {
    async fn get_user_profile(&self, user_id: &str) -> AuthResult<Option<UserProfile>> {
        Ok(self.find_user(user_id).await?)
    }

    async fn list_user_programs(&self, user_id: &str) -> AuthResult<Vec<Program>> {
        Ok(self.programs_for(user_id).await?)
    }

    async fn get_program(&self, program_id: &str) -> AuthResult<Option<Program>> {
        Ok(self.find_program(program_id).await?)
    }

    async fn set_current_program(&self, user_id: &str, program_id: &str) -> AuthResult<()> {
        Ok(self.update_current_program(user_id, program_id).await?)
    }

    async fn get_staff_profile(
        &self,
        user_id: &str,
        program_id: &str,
    ) -> AuthResult<Option<StaffProfile>> {
        Ok(self.find_staff(user_id, program_id).await?)
    }

    async fn list_program_facilities(&self, program_id: &str) -> AuthResult<Vec<Facility>> {
        Ok(self.facilities_for(program_id).await?)
    }

    async fn get_facility(&self, facility_id: &str) -> AuthResult<Option<Facility>> {
        Ok(self.find_facility(facility_id).await?)
    }

    async fn set_staff_default_facility(
        &self,
        staff_id: &str,
        facility_id: &str,
    ) -> AuthResult<()> {
        if self.update_default_facility(staff_id, facility_id).await? {
            Ok(())
        } else {
            Err(AuthError::invalid_request(format!(
                "facility '{facility_id}' is not attached to the staff member's program"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_mapping() {
        let program = program_from_tuple(("p1".into(), "Maternal".into(), "org1".into()));
        assert_eq!(program.organisation_id, "org1");

        let staff = staff_from_tuple(("s1".into(), "u1".into(), "p1".into(), None));
        assert_eq!(staff.program_id, "p1");
        assert!(staff.default_facility_id.is_none());

        let facility = facility_from_tuple(("f1".into(), "Kisumu Clinic".into()));
        assert_eq!(facility.name, "Kisumu Clinic");
    }
}
