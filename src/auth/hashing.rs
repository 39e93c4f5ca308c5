use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::AuthConfig;
use crate::errors::{HackathonError, Result};

/// Argon2id with the cost settings from `config`.
///
/// Stored hashes record their own parameters, so changing the cost only
/// affects hashes created afterwards.
pub fn password_hasher(config: &AuthConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.password_memory_kib,
        config.password_iterations,
        config.password_parallelism,
        Some(32),
    )
    .map_err(|e| HackathonError::config(format!("Invalid password hashing parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC string with a random salt.
pub fn hash_password(hasher: &Argon2<'_>, plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HackathonError::internal(format!("Failed to hash password: {}", e)))
}

/// Check a plaintext password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only an unparseable stored hash is an error.
pub fn verify_password(hasher: &Argon2<'_>, stored_hash: &str, plaintext: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| HackathonError::internal(format!("Stored password hash is malformed: {}", e)))?;

    match hasher.verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(HackathonError::internal(format!("Password verification failed: {}", e))),
    }
}
