//! Stored PIN records.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Flavour;

/// The active PIN for a (user, flavour) pair.
///
/// Expiry is time based: a record past `valid_to` is still `active` until a
/// PIN change replaces it.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PinRecord {
    pub user_id: String,
    pub flavour: Flavour,
    /// Argon2 PHC string.
    pub hashed_pin: String,
    /// Salt embedded in `hashed_pin`, stored separately for the verifier.
    pub salt: String,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_to: OffsetDateTime,
    pub active: bool,
}

impl PinRecord {
    /// Returns `true` if `now` is past the end of the validity window.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.valid_to
    }

    /// Returns `true` if the record can be compared against at `now`.
    #[must_use]
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.active && now >= self.valid_from
    }
}

impl fmt::Debug for PinRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinRecord")
            .field("user_id", &self.user_id)
            .field("flavour", &self.flavour)
            .field("valid_from", &self.valid_from)
            .field("valid_to", &self.valid_to)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
