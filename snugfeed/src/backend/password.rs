//! Password hashing and verification using Argon2id.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};

use crate::errors::BackendError;

/// Minimum password length accepted by the bundled auth services.
pub(crate) const MIN_PASSWORD_LENGTH: usize = 6;

/// Hashing cost profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum HashCost {
    /// Argon2 recommended parameters.
    #[default]
    Standard,
    /// Minimal memory/time cost for in-process backends.
    Light,
}

fn hasher(cost: HashCost) -> Argon2<'static> {
    match cost {
        HashCost::Standard => Argon2::default(),
        HashCost::Light => {
            let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default();
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        }
    }
}

/// Hash a password; the result is a PHC string suitable for storage.
pub(crate) fn hash_password(password: &str, cost: HashCost) -> Result<String, BackendError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(BackendError::WeakPassword {
            min_length: MIN_PASSWORD_LENGTH,
        });
    }
    let salt = SaltString::generate(&mut OsRng);
    hasher(cost)
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| BackendError::unavailable("failed to hash password"))
}

/// Verify a password against a stored PHC string.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<(), BackendError> {
    let parsed = PasswordHash::new(hash).map_err(|_| BackendError::decode("invalid password hash format"))?;
    // Parameters are read back from the PHC string, so the default hasher verifies both cost profiles.
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| BackendError::InvalidCredentials)
}
