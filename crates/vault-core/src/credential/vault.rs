//! Credential vault for CRUD operations on encrypted credentials

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::seal::CredentialCipher;
use super::types::{CredentialDescriptor, CredentialMaterial, StoredCredential};
use crate::crypto::EncryptionKey;
use crate::error::{Result, VaultError};
use crate::instance::instances_referencing;
use crate::storage::RecordStorage;

/// Storage key prefix for credentials
pub(crate) const CREDENTIAL_PREFIX: &str = "credential:";

/// Storage key prefix for last-use timestamps, kept apart from the sealed record
const LAST_USED_PREFIX: &str = "credential-used:";

fn storage_key(id: Uuid) -> String {
    format!("{}{}", CREDENTIAL_PREFIX, id)
}

fn last_used_key(id: Uuid) -> String {
    format!("{}{}", LAST_USED_PREFIX, id)
}

/// Encrypted-at-rest credential store
pub struct CredentialVault {
    storage: Arc<dyn RecordStorage>,
    cipher: CredentialCipher,
}

impl CredentialVault {
    /// Create a vault over `storage` using the process-wide key
    pub fn new(storage: Arc<dyn RecordStorage>, key: EncryptionKey) -> Self {
        Self::with_cipher(storage, CredentialCipher::new(key))
    }

    pub fn with_cipher(storage: Arc<dyn RecordStorage>, cipher: CredentialCipher) -> Self {
        Self { storage, cipher }
    }

    pub fn cipher(&self) -> &CredentialCipher {
        &self.cipher
    }

    /// Create a credential for an organization
    pub async fn create(
        &self,
        organization_id: Uuid,
        name: &str,
        created_by: Option<&str>,
        material: CredentialMaterial,
    ) -> Result<CredentialDescriptor> {
        material.validate()?;

        let sealed = self.cipher.seal(&material)?;
        let (oauth2, basic) = material.public_parts();
        let now = Utc::now();

        let stored = StoredCredential {
            descriptor: CredentialDescriptor {
                id: Uuid::new_v4(),
                organization_id,
                name: name.to_string(),
                credential_type: material.credential_type,
                oauth2,
                basic,
                created_by: created_by.map(str::to_string),
                last_used_at: None,
                created_at: now,
                updated_at: now,
            },
            sealed,
        };

        self.save_credential(&stored).await?;

        info!(
            "Added {} credential: {} ({})",
            stored.descriptor.credential_type, stored.descriptor.name, stored.descriptor.id
        );
        Ok(stored.descriptor)
    }

    /// Get credential metadata by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<CredentialDescriptor>> {
        Ok(self.get_stored(id).await?.map(|s| s.descriptor))
    }

    /// Get the full stored record, secrets still sealed
    pub async fn get_stored(&self, id: Uuid) -> Result<Option<StoredCredential>> {
        let Some(data) = self.storage.retrieve(&storage_key(id)).await? else {
            return Ok(None);
        };
        let mut stored: StoredCredential = serde_json::from_slice(&data)?;
        self.apply_last_used(&mut stored.descriptor).await?;
        Ok(Some(stored))
    }

    async fn require_stored(&self, id: Uuid) -> Result<StoredCredential> {
        self.get_stored(id)
            .await?
            .ok_or(VaultError::CredentialNotFound(id))
    }

    /// List credentials, optionally restricted to one organization
    pub async fn list(&self, organization_id: Option<Uuid>) -> Result<Vec<CredentialDescriptor>> {
        let keys = self.storage.list_keys(CREDENTIAL_PREFIX).await?;
        let mut credentials = Vec::new();

        for key in keys {
            if let Some(data) = self.storage.retrieve(&key).await? {
                let mut stored: StoredCredential = serde_json::from_slice(&data)?;
                if organization_id.map_or(true, |org| stored.descriptor.organization_id == org) {
                    self.apply_last_used(&mut stored.descriptor).await?;
                    credentials.push(stored.descriptor);
                }
            }
        }

        Ok(credentials)
    }

    /// Rename a credential. Secrets are left sealed as they are.
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<CredentialDescriptor> {
        let mut stored = self.require_stored(id).await?;
        stored.descriptor.name = name.to_string();
        stored.descriptor.updated_at = Utc::now();

        self.save_credential(&stored).await?;
        Ok(stored.descriptor)
    }

    /// Replace a credential's material, re-encrypting under a new IV
    pub async fn update_material(
        &self,
        id: Uuid,
        material: CredentialMaterial,
    ) -> Result<CredentialDescriptor> {
        material.validate()?;

        let mut stored = self.require_stored(id).await?;
        let sealed = self.cipher.seal(&material)?;
        let (oauth2, basic) = material.public_parts();

        stored.descriptor.credential_type = material.credential_type;
        stored.descriptor.oauth2 = oauth2;
        stored.descriptor.basic = basic;
        stored.descriptor.updated_at = Utc::now();
        stored.sealed = sealed;

        self.save_credential(&stored).await?;

        info!("Re-encrypted credential: {}", id);
        Ok(stored.descriptor)
    }

    /// Load and decrypt a credential.
    ///
    /// The sealed record is never written here; only the separate last-use
    /// timestamp is, so a concurrent `update_material` cannot be undone.
    ///
    /// Returns `Ok(None)` when the record exists but cannot be decrypted; the
    /// cause has already been logged. Callers must treat that as "cannot
    /// authenticate".
    pub async fn decrypt_credentials(&self, id: Uuid) -> Result<Option<CredentialMaterial>> {
        let stored = self.require_stored(id).await?;

        let Some(material) = self.cipher.decrypt_credentials(&stored) else {
            return Ok(None);
        };

        if let Err(e) = self.record_use(id).await {
            warn!("Failed to record credential use for {}: {}", id, e);
        }

        debug!("Decrypted credential: {}", id);
        Ok(Some(material))
    }

    /// Delete a credential that no instance references
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.storage.exists(&storage_key(id)).await? {
            return Err(VaultError::CredentialNotFound(id));
        }

        let referencing = instances_referencing(self.storage.as_ref(), id).await?;
        if !referencing.is_empty() {
            return Err(VaultError::CredentialInUse {
                id,
                instances: referencing.len(),
            });
        }

        self.storage.delete(&storage_key(id)).await?;
        self.storage.delete(&last_used_key(id)).await?;

        info!("Deleted credential: {}", id);
        Ok(())
    }

    async fn save_credential(&self, stored: &StoredCredential) -> Result<()> {
        let data = serde_json::to_vec(stored)?;
        self.storage
            .store(&storage_key(stored.descriptor.id), &data)
            .await
    }

    async fn record_use(&self, id: Uuid) -> Result<()> {
        let data = serde_json::to_vec(&Utc::now())?;
        self.storage.store(&last_used_key(id), &data).await
    }

    async fn apply_last_used(&self, descriptor: &mut CredentialDescriptor) -> Result<()> {
        if let Some(data) = self.storage.retrieve(&last_used_key(descriptor.id)).await? {
            descriptor.last_used_at = Some(serde_json::from_slice(&data)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceRegistry;
    use crate::storage::MemoryStorage;
    use crate::template::TemplateRegistry;
    use api_template::ApiTemplate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Memory storage that can hold one credential read until released
    struct GatedStorage {
        inner: MemoryStorage,
        armed: AtomicBool,
        paused: Notify,
        resume: Notify,
    }

    impl GatedStorage {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                armed: AtomicBool::new(false),
                paused: Notify::new(),
                resume: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl RecordStorage for GatedStorage {
        async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.store(key, value).await
        }

        async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let value = self.inner.retrieve(key).await?;
            if key.starts_with(CREDENTIAL_PREFIX) && self.armed.swap(false, Ordering::SeqCst) {
                self.paused.notify_one();
                self.resume.notified().await;
            }
            Ok(value)
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
            self.inner.list_keys(prefix).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }
    }

    fn test_vault() -> (CredentialVault, Arc<dyn RecordStorage>) {
        let storage: Arc<dyn RecordStorage> = Arc::new(MemoryStorage::new());
        let vault = CredentialVault::new(storage.clone(), EncryptionKey::generate());
        (vault, storage)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (vault, _) = test_vault();
        let org = Uuid::new_v4();

        let cred = vault
            .create(org, "Stripe", Some("alice"), CredentialMaterial::api_key("sk_live_abc"))
            .await
            .unwrap();

        assert_eq!(cred.name, "Stripe");
        assert_eq!(cred.organization_id, org);
        assert_eq!(cred.created_by.as_deref(), Some("alice"));

        let retrieved = vault.get(cred.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, cred.id);
    }

    #[tokio::test]
    async fn test_stored_record_has_no_plaintext() {
        let (vault, storage) = test_vault();

        let cred = vault
            .create(Uuid::new_v4(), "Basic", None, CredentialMaterial::basic("svc", "p4ssw0rd"))
            .await
            .unwrap();

        let raw = storage.retrieve(&storage_key(cred.id)).await.unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(raw.contains("svc"));
        assert!(!raw.contains("p4ssw0rd"));
    }

    #[tokio::test]
    async fn test_decrypt_credentials() {
        let (vault, _) = test_vault();

        let cred = vault
            .create(Uuid::new_v4(), "Key", None, CredentialMaterial::api_key("sk_live_abc123"))
            .await
            .unwrap();

        let material = vault.decrypt_credentials(cred.id).await.unwrap().unwrap();
        assert_eq!(material.api_key.unwrap().expose(), "sk_live_abc123");

        let used = vault.get(cred.id).await.unwrap().unwrap();
        assert!(used.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_decrypt_does_not_undo_concurrent_rotation() {
        let storage = Arc::new(GatedStorage::new());
        let vault = Arc::new(CredentialVault::new(storage.clone(), EncryptionKey::generate()));
        let cred = vault
            .create(Uuid::new_v4(), "Key", None, CredentialMaterial::api_key("old-key"))
            .await
            .unwrap();

        storage.armed.store(true, Ordering::SeqCst);
        let reader = {
            let vault = vault.clone();
            tokio::spawn(async move { vault.decrypt_credentials(cred.id).await })
        };

        storage.paused.notified().await;
        vault
            .update_material(cred.id, CredentialMaterial::api_key("rotated-key"))
            .await
            .unwrap();
        storage.resume.notify_one();

        let stale = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(stale.api_key.unwrap().expose(), "old-key");

        let current = vault.decrypt_credentials(cred.id).await.unwrap().unwrap();
        assert_eq!(current.api_key.unwrap().expose(), "rotated-key");
        assert!(vault.get(cred.id).await.unwrap().unwrap().last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_decrypt_missing_credential() {
        let (vault, _) = test_vault();
        assert!(matches!(
            vault.decrypt_credentials(Uuid::new_v4()).await,
            Err(VaultError::CredentialNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_decrypt_with_other_key_does_not_reveal_secret() {
        let (vault, storage) = test_vault();
        let cred = vault
            .create(Uuid::new_v4(), "Key", None, CredentialMaterial::api_key("sk_live_abc123"))
            .await
            .unwrap();

        let other = CredentialVault::new(storage, EncryptionKey::generate());
        let result = other.decrypt_credentials(cred.id).await.unwrap();
        assert!(result
            .and_then(|m| m.api_key)
            .map(|k| k.expose() != "sk_live_abc123")
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn test_invalid_material_rejected() {
        let (vault, _) = test_vault();
        let material = CredentialMaterial {
            credential_type: super::super::CredentialType::OAuth2,
            ..Default::default()
        };

        assert!(matches!(
            vault.create(Uuid::new_v4(), "Bad", None, material).await,
            Err(VaultError::InvalidCredential(_))
        ));
        assert!(vault.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_material_rotates_iv() {
        let (vault, _) = test_vault();
        let cred = vault
            .create(Uuid::new_v4(), "Key", None, CredentialMaterial::api_key("old-key"))
            .await
            .unwrap();
        let before = vault.get_stored(cred.id).await.unwrap().unwrap();

        vault
            .update_material(cred.id, CredentialMaterial::api_key("old-key"))
            .await
            .unwrap();
        let after = vault.get_stored(cred.id).await.unwrap().unwrap();

        let (before, after) = (before.sealed.unwrap(), after.sealed.unwrap());
        assert_ne!(before.iv, after.iv);
        assert_ne!(before.api_key, after.api_key);

        vault
            .update_material(cred.id, CredentialMaterial::bearer("new-token"))
            .await
            .unwrap();
        let material = vault.decrypt_credentials(cred.id).await.unwrap().unwrap();
        assert_eq!(material.api_key.unwrap().expose(), "new-token");
    }

    #[tokio::test]
    async fn test_rename_keeps_sealed_secrets() {
        let (vault, _) = test_vault();
        let cred = vault
            .create(Uuid::new_v4(), "Old", None, CredentialMaterial::api_key("k"))
            .await
            .unwrap();
        let before = vault.get_stored(cred.id).await.unwrap().unwrap();

        let renamed = vault.rename(cred.id, "New").await.unwrap();
        let after = vault.get_stored(cred.id).await.unwrap().unwrap();

        assert_eq!(renamed.name, "New");
        assert_eq!(before.sealed, after.sealed);
    }

    #[tokio::test]
    async fn test_list_by_organization() {
        let (vault, _) = test_vault();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();

        vault.create(org_a, "A1", None, CredentialMaterial::api_key("1")).await.unwrap();
        vault.create(org_a, "A2", None, CredentialMaterial::api_key("2")).await.unwrap();
        vault.create(org_b, "B1", None, CredentialMaterial::api_key("3")).await.unwrap();

        assert_eq!(vault.list(None).await.unwrap().len(), 3);
        assert_eq!(vault.list(Some(org_a)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_blocked_while_referenced() {
        let (vault, storage) = test_vault();
        let org = Uuid::new_v4();

        let templates = TemplateRegistry::new(storage.clone());
        let template = templates
            .add(ApiTemplate::new("Users", "https://api.example.com"))
            .await
            .unwrap();

        let cred = vault
            .create(org, "Key", None, CredentialMaterial::api_key("k"))
            .await
            .unwrap();

        let instances = InstanceRegistry::new(storage.clone());
        let instance = instances
            .create(org, template.id, "prod", Some(cred.id))
            .await
            .unwrap();

        assert!(matches!(
            vault.delete(cred.id).await,
            Err(VaultError::CredentialInUse { instances: 1, .. })
        ));

        instances.remove(instance.id).await.unwrap();
        vault.delete(cred.id).await.unwrap();
        assert!(vault.get(cred.id).await.unwrap().is_none());
    }
}
