//! Passphrase-based key derivation using Argon2id
//!
//! Used when operators configure the vault with a passphrase instead of a raw
//! 256-bit key. The salt is generated once and persisted with the store so the
//! same passphrase always yields the same key.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use super::EncryptionKey;
use crate::error::{Result, VaultError};

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct KeyDerivationParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Generate a random salt in PHC base64 form
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Derive the vault key from a passphrase
pub fn derive_key(
    passphrase: &str,
    salt: &str,
    params: Option<KeyDerivationParams>,
) -> Result<EncryptionKey> {
    if passphrase.is_empty() {
        return Err(VaultError::KeyDerivationError(
            "Passphrase must not be empty".to_string(),
        ));
    }

    let params = params.unwrap_or_default();
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| VaultError::KeyDerivationError(e.to_string()))?;

    let salt = SaltString::from_b64(salt)
        .map_err(|e| VaultError::KeyDerivationError(format!("Invalid salt: {}", e)))?;

    let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params)
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| VaultError::KeyDerivationError(e.to_string()))?
        .hash
        .ok_or_else(|| VaultError::KeyDerivationError("No hash output".to_string()))?;

    EncryptionKey::from_slice(hash.as_bytes())
        .ok_or_else(|| VaultError::KeyDerivationError("Hash output is not 32 bytes".to_string()))
}
