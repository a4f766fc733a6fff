// Internal maintenance record shape shared by the record-store seam.
// The CRUD services that own these records live outside this subsystem;
// the orchestrator only reads by external id, creates, and updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::integration::EntityType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    /// Identifier of the corresponding record in the external ERP, once known.
    pub external_id: Option<String>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecord {
    pub tenant_id: Uuid,
    pub entity_type: EntityType,
    pub external_id: Option<String>,
    pub data: serde_json::Value,
}
