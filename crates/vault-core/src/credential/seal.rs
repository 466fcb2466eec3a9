//! Sealing and unsealing of credential secrets

use serde_json::{Map, Value};
use tracing::warn;
use zeroize::Zeroize;

use super::types::{
    BasicMaterial, CredentialMaterial, OAuth2Material, SealedSecrets, StoredCredential,
};
use crate::crypto::{decrypt_field, encrypt_field, generate_iv, parse_iv, EncryptionKey, SecretString, IV_LEN};
use crate::error::{Result, VaultError};

/// Encrypts and decrypts credential secrets with the process-wide key
#[derive(Clone, Debug)]
pub struct CredentialCipher {
    key: EncryptionKey,
}

impl CredentialCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt every sensitive field of `material` under a fresh IV.
    ///
    /// Returns `None` when there is nothing to encrypt. Either every field is
    /// sealed or an error is returned; no partial result escapes.
    pub fn seal(&self, material: &CredentialMaterial) -> Result<Option<SealedSecrets>> {
        if !material.has_sensitive_fields() {
            return Ok(None);
        }

        let iv = generate_iv();
        let seal = |secret: &Option<SecretString>| -> Result<Option<String>> {
            secret
                .as_ref()
                .map(|s| encrypt_field(s.expose(), &self.key, &iv))
                .transpose()
        };

        let oauth2 = material.oauth2.as_ref();
        let custom = match &material.custom {
            Some(data) => {
                let mut json = serde_json::to_string(data)?;
                let sealed = encrypt_field(&json, &self.key, &iv);
                json.zeroize();
                Some(sealed?)
            }
            None => None,
        };

        Ok(Some(SealedSecrets {
            iv: hex::encode(iv),
            api_key: seal(&material.api_key)?,
            client_secret: seal(&oauth2.and_then(|o| o.client_secret.clone()))?,
            access_token: seal(&oauth2.and_then(|o| o.access_token.clone()))?,
            refresh_token: seal(&oauth2.and_then(|o| o.refresh_token.clone()))?,
            password: seal(&material.basic.as_ref().and_then(|b| b.password.clone()))?,
            custom,
        }))
    }

    /// Decrypt a stored credential back into plaintext material
    pub fn unseal(&self, stored: &StoredCredential) -> Result<CredentialMaterial> {
        let descriptor = &stored.descriptor;

        let Some(sealed) = &stored.sealed else {
            return Ok(CredentialMaterial {
                credential_type: descriptor.credential_type,
                oauth2: descriptor.oauth2.as_ref().map(|o| OAuth2Material {
                    client_id: o.client_id.clone(),
                    client_secret: None,
                    access_token: None,
                    refresh_token: None,
                    token_expires_at: o.token_expires_at,
                    scope: o.scope.clone(),
                }),
                basic: descriptor.basic.as_ref().map(|b| BasicMaterial {
                    username: b.username.clone(),
                    password: None,
                }),
                ..Default::default()
            });
        };

        let iv = parse_iv(&sealed.iv)?;
        let open = |field: &Option<String>| self.open_field(field, &iv);

        let oauth2 = match &descriptor.oauth2 {
            Some(o) => Some(OAuth2Material {
                client_id: o.client_id.clone(),
                client_secret: open(&sealed.client_secret)?,
                access_token: open(&sealed.access_token)?,
                refresh_token: open(&sealed.refresh_token)?,
                token_expires_at: o.token_expires_at,
                scope: o.scope.clone(),
            }),
            None if sealed.client_secret.is_some()
                || sealed.access_token.is_some()
                || sealed.refresh_token.is_some() =>
            {
                return Err(VaultError::DecryptionError(
                    "sealed OAuth2 secrets without OAuth2 descriptor".to_string(),
                ));
            }
            None => None,
        };

        let basic = match &descriptor.basic {
            Some(b) => Some(BasicMaterial {
                username: b.username.clone(),
                password: open(&sealed.password)?,
            }),
            None if sealed.password.is_some() => {
                return Err(VaultError::DecryptionError(
                    "sealed password without Basic descriptor".to_string(),
                ));
            }
            None => None,
        };

        let custom = match open(&sealed.custom)? {
            Some(json) => {
                let data: Map<String, Value> = serde_json::from_str(json.expose())
                    .map_err(|e| VaultError::DecryptionError(format!("Invalid custom data: {}", e)))?;
                Some(data)
            }
            None => None,
        };

        Ok(CredentialMaterial {
            credential_type: descriptor.credential_type,
            api_key: open(&sealed.api_key)?,
            oauth2,
            basic,
            custom,
        })
    }

    /// Decrypt a stored credential, logging and swallowing any failure.
    ///
    /// `None` means the credential cannot be used to authenticate.
    pub fn decrypt_credentials(&self, stored: &StoredCredential) -> Option<CredentialMaterial> {
        match self.unseal(stored) {
            Ok(material) => Some(material),
            Err(e) => {
                warn!(
                    credential_id = %stored.descriptor.id,
                    error = %e,
                    "Failed to decrypt credential"
                );
                None
            }
        }
    }

    fn open_field(&self, field: &Option<String>, iv: &[u8; IV_LEN]) -> Result<Option<SecretString>> {
        field
            .as_ref()
            .map(|ciphertext| decrypt_field(ciphertext, &self.key, iv).map(SecretString::new))
            .transpose()
    }
}
