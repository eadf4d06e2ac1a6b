//! PIN and client secret hashing.
//!
//! PINs are stored as Argon2id PHC strings. The salt is also kept in its own
//! column so the verifier can reject a hash that was re-salted out of band.
//!
//! # Example
//!
//! ```
//! use carehub_auth::pin::{hash_pin, verify_pin};
//!
//! let (salt, hash) = hash_pin("4821").unwrap();
//! assert!(verify_pin("4821", &salt, &hash));
//! assert!(!verify_pin("0000", &salt, &hash));
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Number of digits in a PIN.
pub const PIN_LENGTH: usize = 4;

/// Reasons a new PIN is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    #[error("PIN must be exactly {PIN_LENGTH} digits")]
    WrongLength,

    #[error("PIN must contain digits only")]
    NotNumeric,
}

/// Checks that a PIN is exactly four ASCII digits.
///
/// # Errors
///
/// Returns the first rule the PIN breaks.
pub fn validate_pin(pin: &str) -> Result<(), PinError> {
    if pin.len() != PIN_LENGTH {
        return Err(PinError::WrongLength);
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::NotNumeric);
    }
    Ok(())
}

/// Hashes a PIN with a fresh random salt.
///
/// Returns `(salt, phc_hash)`.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_pin(pin: &str) -> Result<(String, String), argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(pin.as_bytes(), &salt)?;
    Ok((salt.as_str().to_string(), hash.to_string()))
}

/// Compares a candidate PIN with a stored hash.
///
/// A malformed hash, or a salt that differs from the one embedded in the
/// hash, never matches.
#[must_use]
pub fn verify_pin(candidate: &str, salt: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    if parsed.salt.map(|s| s.as_str()) != Some(salt) {
        return false;
    }
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

/// Hashes a client secret for in-memory registration.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a client secret against a stored hash.
#[must_use]
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("0042").is_ok());
        assert_eq!(validate_pin("123"), Err(PinError::WrongLength));
        assert_eq!(validate_pin("12345"), Err(PinError::WrongLength));
        assert_eq!(validate_pin("12a4"), Err(PinError::NotNumeric));
    }

    #[test]
    fn test_hash_and_verify() {
        let (salt, hash) = hash_pin("4821").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_pin("4821", &salt, &hash));
        assert!(!verify_pin("4822", &salt, &hash));
    }

    #[test]
    fn test_same_pin_different_salts() {
        let (salt1, hash1) = hash_pin("1111").unwrap();
        let (salt2, hash2) = hash_pin("1111").unwrap();
        assert_ne!(salt1, salt2);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_mismatched_salt_never_verifies() {
        let (_, hash) = hash_pin("4821").unwrap();
        let (other_salt, _) = hash_pin("4821").unwrap();
        assert!(!verify_pin("4821", &other_salt, &hash));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_pin("4821", "salt", "not-a-phc-string"));
        assert!(!verify_secret("secret", ""));
    }

    #[test]
    fn test_secret_roundtrip() {
        let hash = hash_secret("s3cr3t").unwrap();
        assert!(verify_secret("s3cr3t", &hash));
        assert!(!verify_secret("other", &hash));
    }
}
