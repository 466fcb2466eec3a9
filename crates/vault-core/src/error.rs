//! Error types for vault-core

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Encryption key is not configured")]
    MissingEncryptionKey,

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(Uuid),

    #[error("Credential {id} is referenced by {instances} instance(s)")]
    CredentialInUse { id: Uuid, instances: usize },

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(Uuid),

    #[error("Template already exists: {0}")]
    TemplateExists(Uuid),

    #[error("Template {id} is referenced by {instances} instance(s)")]
    TemplateInUse { id: Uuid, instances: usize },

    #[error("Invalid template: {0}")]
    InvalidTemplate(#[from] api_template::TemplateError),

    #[error("Instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("Credential {credential} does not belong to organization {organization}")]
    OrganizationMismatch { credential: Uuid, organization: Uuid },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
