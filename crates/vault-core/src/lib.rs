//! # vault-core
//!
//! Credential storage for API Vault:
//! - AES-256-CBC field encryption under a process-wide key
//! - Argon2id passphrase derivation
//! - Credential vault, template and instance registries
//! - File-backed and in-memory record storage

pub mod crypto;
pub mod storage;
pub mod credential;
pub mod template;
pub mod instance;
pub mod error;
pub mod settings;

pub use error::{VaultError, Result};
pub use crypto::{EncryptionKey, SecretString, derive_key, generate_salt, KeyDerivationParams};
pub use storage::{RecordStorage, FileStorage, MemoryStorage};
pub use credential::{
    CredentialCipher, CredentialDescriptor, CredentialMaterial, CredentialType, CredentialVault,
    OAuth2Material, BasicMaterial, StoredCredential,
};
pub use template::TemplateRegistry;
pub use instance::{ApiInstance, InstanceRegistry, InstanceStatus};
pub use settings::{Settings, SettingsManager, DEFAULT_TIMEOUT_MS};
