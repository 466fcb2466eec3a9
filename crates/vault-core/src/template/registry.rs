//! Template registry for managing API templates

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::instance::instances_of_template;
use crate::storage::RecordStorage;
use api_template::ApiTemplate;

/// Storage key prefix for templates
pub(crate) const TEMPLATE_PREFIX: &str = "template:";

pub(crate) fn template_key(id: Uuid) -> String {
    format!("{}{}", TEMPLATE_PREFIX, id)
}

/// Registry of API templates, cached in memory and persisted to storage
pub struct TemplateRegistry {
    templates: Arc<RwLock<HashMap<Uuid, ApiTemplate>>>,
    storage: Arc<dyn RecordStorage>,
}

impl TemplateRegistry {
    pub fn new(storage: Arc<dyn RecordStorage>) -> Self {
        Self {
            templates: Arc::new(RwLock::new(HashMap::new())),
            storage,
        }
    }

    /// Load all templates from storage into the cache
    pub async fn load(&self) -> Result<()> {
        let keys = self.storage.list_keys(TEMPLATE_PREFIX).await?;
        let mut templates = self.templates.write().await;

        for key in keys {
            match self.storage.retrieve(&key).await? {
                Some(data) => {
                    let template: ApiTemplate = serde_json::from_slice(&data)?;
                    templates.insert(template.id, template);
                }
                None => warn!("Template key exists but no data: {}", key),
            }
        }

        info!(
            "Loaded {} templates from {} storage",
            templates.len(),
            self.storage.backend_name()
        );
        Ok(())
    }

    /// Validate and register a new template. Existing IDs go through `update`.
    pub async fn add(&self, template: ApiTemplate) -> Result<ApiTemplate> {
        template.validate()?;

        if self.storage.exists(&template_key(template.id)).await? {
            return Err(VaultError::TemplateExists(template.id));
        }

        self.save_template(&template).await?;
        self.templates
            .write()
            .await
            .insert(template.id, template.clone());

        info!(
            "Added template: {} ({}, {} endpoints)",
            template.name,
            template.id,
            template.endpoints.len()
        );
        Ok(template)
    }

    /// Replace an existing template, keeping its creation time
    pub async fn update(&self, mut template: ApiTemplate) -> Result<ApiTemplate> {
        template.validate()?;

        let existing = self
            .get(template.id)
            .await?
            .ok_or(VaultError::TemplateNotFound(template.id))?;
        template.created_at = existing.created_at;
        template.updated_at = Utc::now();

        self.save_template(&template).await?;
        self.templates
            .write()
            .await
            .insert(template.id, template.clone());

        info!("Updated template: {}", template.id);
        Ok(template)
    }

    /// Get a template by ID, falling back to storage on a cache miss
    pub async fn get(&self, id: Uuid) -> Result<Option<ApiTemplate>> {
        if let Some(template) = self.templates.read().await.get(&id) {
            return Ok(Some(template.clone()));
        }

        let Some(data) = self.storage.retrieve(&template_key(id)).await? else {
            return Ok(None);
        };
        let template: ApiTemplate = serde_json::from_slice(&data)?;
        self.templates
            .write()
            .await
            .insert(template.id, template.clone());
        Ok(Some(template))
    }

    /// List cached templates ordered by name
    pub async fn list(&self) -> Vec<ApiTemplate> {
        let mut templates: Vec<ApiTemplate> =
            self.templates.read().await.values().cloned().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        templates
    }

    /// Remove a template that no instance was created from
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        if !self.storage.exists(&template_key(id)).await? {
            return Err(VaultError::TemplateNotFound(id));
        }

        let instances = instances_of_template(self.storage.as_ref(), id).await?;
        if !instances.is_empty() {
            return Err(VaultError::TemplateInUse {
                id,
                instances: instances.len(),
            });
        }

        self.storage.delete(&template_key(id)).await?;
        self.templates.write().await.remove(&id);

        info!("Removed template: {}", id);
        Ok(())
    }

    async fn save_template(&self, template: &ApiTemplate) -> Result<()> {
        let data = serde_json::to_vec(template)?;
        self.storage.store(&template_key(template.id), &data).await
    }
}
