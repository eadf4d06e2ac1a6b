//! Loads `[seed]` data into the memory backend.

use carehub_auth::pin::hash_pin;
use carehub_auth::storage::{MemoryCredentialStore, MemoryProgramDirectory};
use carehub_auth::types::{
    Facility, PinRecord, Program, StaffProfile, UserProfile, UserType,
};
use time::{Duration, OffsetDateTime};

use crate::config::SeedConfig;

/// Validity window given to seeded PINs.
const SEED_PIN_VALIDITY: Duration = Duration::days(365);

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to hash PIN for seed user '{username}': {message}")]
    Hash { username: String, message: String },

    #[error("seed staff '{staff_id}' references unknown user '{user_id}'")]
    UnknownUser { staff_id: String, user_id: String },
}

/// Inserts the configured users, programs, facilities and staff records.
pub fn apply(
    seed: &SeedConfig,
    credentials: &MemoryCredentialStore,
    directory: &MemoryProgramDirectory,
) -> Result<(), SeedError> {
    let now = OffsetDateTime::now_utc();

    for user in &seed.users {
        let mut builder = UserProfile::builder(&user.id, &user.username, user.user_type)
            .superuser(user.is_superuser);
        if let Some(name) = &user.name {
            builder = builder.name(name);
        }
        if let Some(email) = &user.email {
            builder = builder.email(email);
        }
        if let Some(gender) = &user.gender {
            builder = builder.gender(gender);
        }
        credentials.insert_user(builder.build());

        for flavour in &user.flavours {
            let (salt, hashed_pin) = hash_pin(&user.pin).map_err(|e| SeedError::Hash {
                username: user.username.clone(),
                message: e.to_string(),
            })?;
            credentials.insert_pin(PinRecord {
                user_id: user.id.clone(),
                flavour: *flavour,
                hashed_pin,
                salt,
                valid_from: now,
                valid_to: now + SEED_PIN_VALIDITY,
                active: true,
            });
        }

        match user.user_type {
            UserType::Client => credentials.add_client(&user.id),
            UserType::Caregiver => credentials.add_caregiver(&user.id),
            UserType::Staff => {}
        }
        if !user.roles.is_empty() || !user.permissions.is_empty() {
            credentials.assign_roles(&user.id, user.roles.clone(), user.permissions.clone());
        }
    }

    for program in &seed.programs {
        directory.insert_program(Program {
            id: program.id.clone(),
            name: program.name.clone(),
            organisation_id: program.organisation_id.clone(),
        });
        for facility in &program.facilities {
            directory.insert_facility(
                Facility {
                    id: facility.id.clone(),
                    name: facility.name.clone(),
                },
                &program.id,
            );
        }
        for staff in &program.staff {
            if credentials.profile_by_id(&staff.user_id).is_none() {
                return Err(SeedError::UnknownUser {
                    staff_id: staff.id.clone(),
                    user_id: staff.user_id.clone(),
                });
            }
            directory.insert_staff(StaffProfile {
                id: staff.id.clone(),
                user_id: staff.user_id.clone(),
                program_id: program.id.clone(),
                default_facility_id: staff.default_facility_id.clone(),
            });
        }
    }

    tracing::info!(
        users = seed.users.len(),
        programs = seed.programs.len(),
        "Seed data loaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SeedFacility, SeedProgram, SeedStaff, SeedUser};
    use carehub_auth::storage::{CredentialStore, ProgramDirectory};
    use carehub_auth::types::Flavour;
    use std::sync::Arc;

    fn seed() -> SeedConfig {
        SeedConfig {
            users: vec![SeedUser {
                id: "u1".into(),
                username: "jdoe".into(),
                name: Some("Jane Doe".into()),
                email: None,
                gender: Some("female".into()),
                user_type: UserType::Staff,
                is_superuser: false,
                pin: "4821".into(),
                flavours: vec![Flavour::Pro, Flavour::Consumer],
                roles: vec!["nurse".into()],
                permissions: vec!["read_client".into()],
            }],
            programs: vec![SeedProgram {
                id: "P1".into(),
                name: "Maternal Health".into(),
                organisation_id: "org1".into(),
                facilities: vec![SeedFacility {
                    id: "F1".into(),
                    name: "Kisumu Clinic".into(),
                }],
                staff: vec![SeedStaff {
                    id: "S1".into(),
                    user_id: "u1".into(),
                    default_facility_id: None,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_apply_seed() {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let directory = MemoryProgramDirectory::new(credentials.clone());
        apply(&seed(), &credentials, &directory).unwrap();

        let user = credentials
            .get_profile_by_username("jdoe")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "Jane Doe");
        assert!(credentials.check_staff_exists("u1").await.unwrap());
        assert!(
            credentials
                .get_pin_by_user_id("u1", Flavour::Consumer)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(credentials.get_user_roles("u1").await.unwrap(), vec!["nurse"]);

        let programs = directory.list_user_programs("u1").await.unwrap();
        assert_eq!(programs[0].id, "P1");
        let facilities = directory.list_program_facilities("P1").await.unwrap();
        assert_eq!(facilities[0].name, "Kisumu Clinic");
    }

    #[test]
    fn test_staff_for_unknown_user_fails() {
        let mut seed = seed();
        seed.programs[0].staff[0].user_id = "ghost".into();
        let credentials = Arc::new(MemoryCredentialStore::new());
        let directory = MemoryProgramDirectory::new(credentials.clone());
        let err = apply(&seed, &credentials, &directory).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
