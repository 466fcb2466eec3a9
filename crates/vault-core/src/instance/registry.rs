//! Instance registry

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{ApiInstance, InstanceStatus};
use crate::credential::{StoredCredential, CREDENTIAL_PREFIX};
use crate::error::{Result, VaultError};
use crate::storage::RecordStorage;
use crate::template::template_key;

/// Storage key prefix for instances
const INSTANCE_PREFIX: &str = "instance:";

fn instance_key(id: Uuid) -> String {
    format!("{}{}", INSTANCE_PREFIX, id)
}

async fn load_all(storage: &dyn RecordStorage) -> Result<Vec<ApiInstance>> {
    let keys = storage.list_keys(INSTANCE_PREFIX).await?;
    let mut instances = Vec::with_capacity(keys.len());

    for key in keys {
        if let Some(data) = storage.retrieve(&key).await? {
            instances.push(serde_json::from_slice(&data)?);
        }
    }

    Ok(instances)
}

/// Instances whose credential binding points at `credential_id`
pub(crate) async fn instances_referencing(
    storage: &dyn RecordStorage,
    credential_id: Uuid,
) -> Result<Vec<ApiInstance>> {
    Ok(load_all(storage)
        .await?
        .into_iter()
        .filter(|i| i.credential_id == Some(credential_id))
        .collect())
}

/// Instances created from `template_id`
pub(crate) async fn instances_of_template(
    storage: &dyn RecordStorage,
    template_id: Uuid,
) -> Result<Vec<ApiInstance>> {
    Ok(load_all(storage)
        .await?
        .into_iter()
        .filter(|i| i.template_id == template_id)
        .collect())
}

/// Registry of API instances
pub struct InstanceRegistry {
    storage: Arc<dyn RecordStorage>,
}

impl InstanceRegistry {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self { storage }
    }

    /// Create an instance of a template for an organization
    pub async fn create(
        &self,
        organization_id: Uuid,
        template_id: Uuid,
        name: &str,
        credential_id: Option<Uuid>,
    ) -> Result<ApiInstance> {
        if !self.storage.exists(&template_key(template_id)).await? {
            return Err(VaultError::TemplateNotFound(template_id));
        }
        if let Some(credential_id) = credential_id {
            self.check_credential(organization_id, credential_id).await?;
        }

        let now = Utc::now();
        let instance = ApiInstance {
            id: Uuid::new_v4(),
            organization_id,
            template_id,
            credential_id,
            name: name.to_string(),
            status: InstanceStatus::Active,
            created_at: now,
            updated_at: now,
        };

        self.save_instance(&instance).await?;

        info!("Created instance: {} ({})", instance.name, instance.id);
        Ok(instance)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ApiInstance>> {
        match self.storage.retrieve(&instance_key(id)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// List instances, optionally restricted to one organization
    pub async fn list(&self, organization_id: Option<Uuid>) -> Result<Vec<ApiInstance>> {
        let mut instances = load_all(self.storage.as_ref()).await?;
        if let Some(org) = organization_id {
            instances.retain(|i| i.organization_id == org);
        }
        Ok(instances)
    }

    /// Bind a credential to an instance, or unbind with `None`
    pub async fn set_credential(
        &self,
        id: Uuid,
        credential_id: Option<Uuid>,
    ) -> Result<ApiInstance> {
        let mut instance = self
            .get(id)
            .await?
            .ok_or(VaultError::InstanceNotFound(id))?;

        if let Some(credential_id) = credential_id {
            self.check_credential(instance.organization_id, credential_id)
                .await?;
        }

        instance.credential_id = credential_id;
        instance.updated_at = Utc::now();
        self.save_instance(&instance).await?;

        debug!("Instance {} bound to credential {:?}", id, credential_id);
        Ok(instance)
    }

    pub async fn set_status(&self, id: Uuid, status: InstanceStatus) -> Result<ApiInstance> {
        let mut instance = self
            .get(id)
            .await?
            .ok_or(VaultError::InstanceNotFound(id))?;

        instance.status = status;
        instance.updated_at = Utc::now();
        self.save_instance(&instance).await?;
        Ok(instance)
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        if !self.storage.exists(&instance_key(id)).await? {
            return Err(VaultError::InstanceNotFound(id));
        }

        self.storage.delete(&instance_key(id)).await?;

        info!("Removed instance: {}", id);
        Ok(())
    }

    /// Instances that would block deletion of a credential
    pub async fn referencing_credential(&self, credential_id: Uuid) -> Result<Vec<ApiInstance>> {
        instances_referencing(self.storage.as_ref(), credential_id).await
    }

    async fn check_credential(&self, organization_id: Uuid, credential_id: Uuid) -> Result<()> {
        let key = format!("{}{}", CREDENTIAL_PREFIX, credential_id);
        let data = self
            .storage
            .retrieve(&key)
            .await?
            .ok_or(VaultError::CredentialNotFound(credential_id))?;
        let stored: StoredCredential = serde_json::from_slice(&data)?;

        if stored.descriptor.organization_id != organization_id {
            return Err(VaultError::OrganizationMismatch {
                credential: credential_id,
                organization: organization_id,
            });
        }
        Ok(())
    }

    async fn save_instance(&self, instance: &ApiInstance) -> Result<()> {
        let data = serde_json::to_vec(instance)?;
        self.storage.store(&instance_key(instance.id), &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialMaterial, CredentialVault};
    use crate::crypto::EncryptionKey;
    use crate::storage::MemoryStorage;
    use crate::template::TemplateRegistry;
    use api_template::ApiTemplate;

    struct Fixture {
        instances: InstanceRegistry,
        vault: CredentialVault,
        template_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let storage: Arc<dyn RecordStorage> = Arc::new(MemoryStorage::new());
        let template = TemplateRegistry::new(storage.clone())
            .add(ApiTemplate::new("Users", "https://api.example.com"))
            .await
            .unwrap();

        Fixture {
            instances: InstanceRegistry::new(storage.clone()),
            vault: CredentialVault::new(storage, EncryptionKey::generate()),
            template_id: template.id,
        }
    }

    #[tokio::test]
    async fn test_create_without_credential() {
        let f = fixture().await;
        let org = Uuid::new_v4();

        let instance = f.instances.create(org, f.template_id, "prod", None).await.unwrap();
        assert!(instance.is_active());
        assert_eq!(f.instances.get(instance.id).await.unwrap().unwrap(), instance);
    }

    #[tokio::test]
    async fn test_create_requires_template() {
        let f = fixture().await;
        assert!(matches!(
            f.instances.create(Uuid::new_v4(), Uuid::new_v4(), "x", None).await,
            Err(VaultError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_foreign_credential() {
        let f = fixture().await;
        let cred = f
            .vault
            .create(Uuid::new_v4(), "Key", None, CredentialMaterial::api_key("k"))
            .await
            .unwrap();

        assert!(matches!(
            f.instances
                .create(Uuid::new_v4(), f.template_id, "prod", Some(cred.id))
                .await,
            Err(VaultError::OrganizationMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_missing_credential() {
        let f = fixture().await;
        assert!(matches!(
            f.instances
                .create(Uuid::new_v4(), f.template_id, "prod", Some(Uuid::new_v4()))
                .await,
            Err(VaultError::CredentialNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_and_lookup_references() {
        let f = fixture().await;
        let org = Uuid::new_v4();
        let cred = f
            .vault
            .create(org, "Key", None, CredentialMaterial::api_key("k"))
            .await
            .unwrap();

        let a = f.instances.create(org, f.template_id, "a", None).await.unwrap();
        f.instances.create(org, f.template_id, "b", None).await.unwrap();

        f.instances.set_credential(a.id, Some(cred.id)).await.unwrap();
        let refs = f.instances.referencing_credential(cred.id).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, a.id);

        f.instances.set_credential(a.id, None).await.unwrap();
        assert!(f.instances.referencing_credential(cred.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_remove() {
        let f = fixture().await;
        let org = Uuid::new_v4();

        let a = f.instances.create(org, f.template_id, "a", None).await.unwrap();
        f.instances
            .create(Uuid::new_v4(), f.template_id, "other", None)
            .await
            .unwrap();

        assert_eq!(f.instances.list(None).await.unwrap().len(), 2);
        assert_eq!(f.instances.list(Some(org)).await.unwrap().len(), 1);

        let disabled = f.instances.set_status(a.id, InstanceStatus::Disabled).await.unwrap();
        assert!(!disabled.is_active());

        f.instances.remove(a.id).await.unwrap();
        assert!(matches!(
            f.instances.remove(a.id).await,
            Err(VaultError::InstanceNotFound(_))
        ));
    }
}
