//! Instance type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Active,
    Disabled,
}

/// A template bound to an organization and, optionally, a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInstance {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub template_id: Uuid,
    /// Credential used to authenticate requests
    pub credential_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiInstance {
    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Active
    }
}
