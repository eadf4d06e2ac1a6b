//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - User credentials, PINs and lockout counters
//! - Authorize flow sessions
//! - Program, staff and facility lookups
//!
//! # Implementations
//!
//! - [`memory`] - `dashmap`-backed stores for tests and local runs
//! - `carehub-auth-postgres` - PostgreSQL storage backend

pub mod credential;
pub mod directory;
pub mod memory;
pub mod session;

pub use credential::CredentialStore;
pub use directory::ProgramDirectory;
pub use memory::{MemoryCredentialStore, MemoryProgramDirectory, MemorySessionStore};
pub use session::SessionStore;
