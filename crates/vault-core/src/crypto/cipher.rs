//! AES-256-CBC field encryption
//!
//! Every sensitive field of a credential record is encrypted separately with
//! the process-wide key and the record's IV.
//! - IV: 16 bytes, stored hex-encoded next to the fields it protects
//! - Padding: PKCS#7
//! - Ciphertext: hex-encoded

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::EncryptionKey;
use crate::error::{Result, VaultError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV length for AES-CBC
pub const IV_LEN: usize = 16;

/// Generate a random IV
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Parse a hex-encoded IV
pub fn parse_iv(encoded: &str) -> Result<[u8; IV_LEN]> {
    let bytes = hex::decode(encoded)
        .map_err(|e| VaultError::DecryptionError(format!("Invalid IV hex: {}", e)))?;

    if bytes.len() != IV_LEN {
        return Err(VaultError::DecryptionError(format!(
            "Invalid IV length: expected {}, got {}",
            IV_LEN,
            bytes.len()
        )));
    }

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&bytes);
    Ok(iv)
}

/// Encrypt plaintext with AES-256-CBC
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| VaultError::EncryptionError(e.to_string()))?;

    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC ciphertext
pub fn decrypt(ciphertext: &[u8], key: &EncryptionKey, iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| VaultError::DecryptionError(e.to_string()))?;

    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::DecryptionError("Invalid padding".to_string()))
}

/// Encrypt a string and return hex-encoded ciphertext
pub fn encrypt_field(plaintext: &str, key: &EncryptionKey, iv: &[u8; IV_LEN]) -> Result<String> {
    let ciphertext = encrypt(plaintext.as_bytes(), key, iv)?;
    Ok(hex::encode(ciphertext))
}

/// Decrypt hex-encoded ciphertext back to a string
pub fn decrypt_field(ciphertext_hex: &str, key: &EncryptionKey, iv: &[u8; IV_LEN]) -> Result<String> {
    let ciphertext = hex::decode(ciphertext_hex)
        .map_err(|e| VaultError::DecryptionError(format!("Invalid ciphertext hex: {}", e)))?;

    let plaintext = decrypt(&ciphertext, key, iv)?;
    String::from_utf8(plaintext)
        .map_err(|e| VaultError::DecryptionError(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let iv = generate_iv();
        let plaintext = b"Hello, World!";

        let encrypted = encrypt(plaintext, &key, &iv).unwrap();
        let decrypted = decrypt(&encrypted, &key, &iv).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(encrypted.len() % 16, 0);
    }

    #[test]
    fn test_field_roundtrip() {
        let key = EncryptionKey::generate();
        let iv = generate_iv();
        let plaintext = "sk-proj-abc123xyz789";

        let encrypted = encrypt_field(plaintext, &key, &iv).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(decrypt_field(&encrypted, &key, &iv).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_string_roundtrip() {
        let key = EncryptionKey::generate();
        let iv = generate_iv();

        let encrypted = encrypt_field("", &key, &iv).unwrap();
        assert_eq!(decrypt_field(&encrypted, &key, &iv).unwrap(), "");
    }

    #[test]
    fn test_different_ivs_produce_different_ciphertext() {
        let key = EncryptionKey::generate();
        let plaintext = "same plaintext";

        let iv1 = generate_iv();
        let iv2 = generate_iv();
        assert_ne!(iv1, iv2);

        let encrypted1 = encrypt_field(plaintext, &key, &iv1).unwrap();
        let encrypted2 = encrypt_field(plaintext, &key, &iv2).unwrap();
        assert_ne!(encrypted1, encrypted2);
    }

    #[test]
    fn test_known_key_is_deterministic() {
        let key = EncryptionKey::new([1u8; 32]);
        let iv = [2u8; IV_LEN];

        let first = encrypt_field("secret", &key, &iv).unwrap();
        let second = encrypt_field("secret", &key, &iv).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wrong_key_does_not_reveal_plaintext() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let iv = generate_iv();

        let encrypted = encrypt_field("secret data", &key1, &iv).unwrap();
        let result = decrypt_field(&encrypted, &key2, &iv);

        assert!(result.map(|p| p != "secret data").unwrap_or(true));
    }

    #[test]
    fn test_malformed_ciphertext_fails() {
        let key = EncryptionKey::generate();
        let iv = generate_iv();

        assert!(decrypt_field("not_hex", &key, &iv).is_err());
        // Not a whole number of blocks
        assert!(decrypt_field("abcd", &key, &iv).is_err());
    }

    #[test]
    fn test_parse_iv() {
        let iv = generate_iv();
        assert_eq!(parse_iv(&hex::encode(iv)).unwrap(), iv);
        assert!(parse_iv("abcd").is_err());
        assert!(parse_iv("xyz").is_err());
    }
}
