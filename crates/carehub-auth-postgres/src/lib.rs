//! PostgreSQL storage backend for CareHub Auth
//!
//! Provides persistent implementations of:
//!
//! - [`CredentialStore`](carehub_auth::CredentialStore) - users, PINs,
//!   lockout counters, profile records, PIN resets, roles
//! - [`ProgramDirectory`](carehub_auth::ProgramDirectory) - programs,
//!   facilities and staff records
//!
//! Authorize flow sessions stay in memory; they are short-lived and bound
//! to one browser.
//!
//! # Example
//!
//! ```ignore
//! use carehub_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/carehub", 10).await?;
//! storage.migrate().await?;
//! let credentials = storage.credentials();
//! ```

pub mod credential;
pub mod directory;
pub mod migrations;

use std::sync::Arc;

use carehub_auth::AuthError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use credential::PgCredentialStore;
pub use directory::PgProgramDirectory;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx_core::migrate::MigrateError),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be mapped to a domain type.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// Holds the connection pool and hands out the store implementations.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn credentials(&self) -> PgCredentialStore {
        PgCredentialStore::new(Arc::clone(&self.pool))
    }

    #[must_use]
    pub fn directory(&self) -> PgProgramDirectory {
        PgProgramDirectory::new(Arc::clone(&self.pool))
    }
}
