//! Credential vault with field-level encryption at rest

mod seal;
mod types;
mod vault;

pub use seal::CredentialCipher;
pub use types::*;
pub use vault::CredentialVault;
pub(crate) use vault::CREDENTIAL_PREFIX;
