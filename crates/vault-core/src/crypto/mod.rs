//! Cryptographic primitives for credential storage
//!
//! This module provides:
//! - AES-256-CBC field encryption with per-record IVs
//! - Argon2id key derivation from passphrases
//! - Secure memory handling with zeroize

mod cipher;
mod key_derivation;
mod secure_memory;

pub use cipher::{
    decrypt, decrypt_field, encrypt, encrypt_field, generate_iv, parse_iv, IV_LEN,
};
pub use key_derivation::{derive_key, generate_salt, KeyDerivationParams};
pub use secure_memory::{EncryptionKey, SecretString};
