//! Embedded schema migrations.
//!
//! To add a migration, create the SQL file under `migrations/` and append it
//! to [`EMBEDDED`].

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};

use crate::{PgPool, StorageResult};

/// (version, description, sql) in the order they are applied.
const EMBEDDED: &[(i64, &str, &str)] = &[
    (
        20260301000001,
        "identity",
        include_str!("../migrations/20260301000001_identity.sql"),
    ),
    (
        20260301000002,
        "programs",
        include_str!("../migrations/20260301000002_programs.sql"),
    ),
];

fn build_migrations() -> Vec<Migration> {
    EMBEDDED
        .iter()
        .map(|&(version, description, sql)| Migration {
            version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Runs all pending migrations. Applied versions are tracked in
/// `_sqlx_migrations`.
///
/// # Errors
///
/// Returns an error if a migration fails to execute.
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    tracing::info!(count = migrations.len(), "Running auth schema migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };
    migrator.run(pool).await?;

    tracing::info!("Auth schema migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let migrations = build_migrations();
        assert_eq!(migrations.len(), 2);
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
        assert!(migrations[0].sql.contains("CREATE TABLE IF NOT EXISTS users"));
        assert!(migrations[1].sql.contains("staff_profiles"));
    }
}
