//! Session store trait.
//!
//! A cookie-keyed key/value store that holds the authorize flow state between
//! browser round trips. The session id is opaque: the flow controller creates
//! it, puts it in a cookie, and passes it back here unchanged.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Expire idle sessions (the memory store uses the configured TTL)
//! - Make `destroy` idempotent

use async_trait::async_trait;

use crate::AuthResult;

/// Storage trait for authorize flow sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores a value under `key`, creating the session if needed.
    async fn put(&self, session_id: &str, key: &str, value: Vec<u8>) -> AuthResult<()>;

    /// Returns `true` if the session holds a live value under `key`.
    async fn exists(&self, session_id: &str, key: &str) -> AuthResult<bool>;

    /// Returns the value under `key`, or `None` for unknown or expired sessions.
    async fn get_bytes(&self, session_id: &str, key: &str) -> AuthResult<Option<Vec<u8>>>;

    /// Removes the session and all of its values.
    async fn destroy(&self, session_id: &str) -> AuthResult<()>;
}
