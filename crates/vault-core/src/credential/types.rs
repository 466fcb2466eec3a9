//! Credential type definitions
//!
//! A stored credential is split in two: a plaintext [`CredentialDescriptor`]
//! that is safe to display and list, and an optional [`SealedSecrets`] blob
//! holding every sensitive field encrypted under one IV. Plaintext secrets only
//! ever live in [`CredentialMaterial`], which redacts itself in `Debug` output
//! and zeroes its secret strings on drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};

/// Type of credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Static API key
    #[default]
    ApiKey,
    /// OAuth2 client and token set
    #[serde(rename = "oauth2")]
    OAuth2,
    /// Basic authentication (username:password)
    Basic,
    /// Static bearer token, stored in the API key field
    Bearer,
    /// Arbitrary key-value authentication data
    Custom,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::ApiKey => "api_key",
            CredentialType::OAuth2 => "oauth2",
            CredentialType::Basic => "basic",
            CredentialType::Bearer => "bearer",
            CredentialType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth2 credential values in plaintext
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Material {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub access_token: Option<SecretString>,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuth2Material {
    /// Whether the stored access token has passed its expiry time
    pub fn is_token_expired(&self) -> bool {
        self.token_expires_at
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }
}

/// Basic authentication values in plaintext
#[derive(Debug, Clone, Deserialize)]
pub struct BasicMaterial {
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
}

/// Decrypted credential: `{type, apiKey?, oauth2?, basic?, custom?}`
///
/// This is both the input when a credential is created or its secrets are
/// replaced, and the result of decrypting a stored credential.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMaterial {
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub oauth2: Option<OAuth2Material>,
    #[serde(default)]
    pub basic: Option<BasicMaterial>,
    #[serde(default)]
    pub custom: Option<Map<String, Value>>,
}

impl CredentialMaterial {
    pub fn api_key(key: &str) -> Self {
        Self {
            credential_type: CredentialType::ApiKey,
            api_key: Some(SecretString::from(key)),
            ..Default::default()
        }
    }

    pub fn bearer(token: &str) -> Self {
        Self {
            credential_type: CredentialType::Bearer,
            api_key: Some(SecretString::from(token)),
            ..Default::default()
        }
    }

    pub fn basic(username: &str, password: &str) -> Self {
        Self {
            credential_type: CredentialType::Basic,
            basic: Some(BasicMaterial {
                username: username.to_string(),
                password: Some(SecretString::from(password)),
            }),
            ..Default::default()
        }
    }

    pub fn oauth2(oauth2: OAuth2Material) -> Self {
        Self {
            credential_type: CredentialType::OAuth2,
            oauth2: Some(oauth2),
            ..Default::default()
        }
    }

    pub fn custom(data: Map<String, Value>) -> Self {
        Self {
            credential_type: CredentialType::Custom,
            custom: Some(data),
            ..Default::default()
        }
    }

    /// Whether any field that must be encrypted at rest is set
    pub fn has_sensitive_fields(&self) -> bool {
        self.api_key.is_some()
            || self.custom.is_some()
            || self.oauth2.as_ref().is_some_and(|o| {
                o.client_secret.is_some() || o.access_token.is_some() || o.refresh_token.is_some()
            })
            || self.basic.as_ref().is_some_and(|b| b.password.is_some())
    }

    /// Check that the section matching the credential type is present
    pub fn validate(&self) -> Result<()> {
        let missing = match self.credential_type {
            CredentialType::ApiKey | CredentialType::Bearer if self.api_key.is_none() => "apiKey",
            CredentialType::OAuth2 if self.oauth2.is_none() => "oauth2",
            CredentialType::Basic if self.basic.is_none() => "basic",
            CredentialType::Custom if self.custom.is_none() => "custom",
            _ => return Ok(()),
        };

        Err(VaultError::InvalidCredential(format!(
            "{} credential requires {}",
            self.credential_type, missing
        )))
    }

    /// Plaintext parts that are stored in the descriptor
    pub(crate) fn public_parts(&self) -> (Option<OAuth2Descriptor>, Option<BasicDescriptor>) {
        let oauth2 = self.oauth2.as_ref().map(|o| OAuth2Descriptor {
            client_id: o.client_id.clone(),
            token_expires_at: o.token_expires_at,
            scope: o.scope.clone(),
        });
        let basic = self.basic.as_ref().map(|b| BasicDescriptor {
            username: b.username.clone(),
        });
        (oauth2, basic)
    }
}

impl std::fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMaterial")
            .field("credential_type", &self.credential_type)
            .field("api_key", &self.api_key)
            .field("oauth2", &self.oauth2)
            .field("basic", &self.basic)
            .field(
                "custom",
                &self
                    .custom
                    .as_ref()
                    .map(|c| c.keys().collect::<Vec<_>>()),
            )
            .finish()
    }
}

/// Plaintext OAuth2 fields kept in the descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Descriptor {
    pub client_id: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// Plaintext Basic auth fields kept in the descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicDescriptor {
    pub username: String,
}

/// Credential metadata (safe to display)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDescriptor {
    pub id: Uuid,
    /// Organization that owns the credential
    pub organization_id: Uuid,
    /// User-friendly name
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub oauth2: Option<OAuth2Descriptor>,
    pub basic: Option<BasicDescriptor>,
    /// Member who created the credential
    pub created_by: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sensitive fields encrypted with AES-256-CBC under a single IV
///
/// Every ciphertext is hex-encoded. The IV is regenerated on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedSecrets {
    /// Hex-encoded 16-byte IV
    pub iv: String,
    pub api_key: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub password: Option<String>,
    /// Encrypted JSON serialization of the custom data
    pub custom: Option<String>,
}

/// Stored credential record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub descriptor: CredentialDescriptor,
    /// Absent when the credential has no sensitive fields
    pub sealed: Option<SealedSecrets>,
}
