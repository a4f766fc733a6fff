// Sync log models
// Append-only record of every sync and connection-test attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::integration::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Inbound,
    Outbound,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Inbound => "inbound",
            SyncDirection::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(SyncDirection::Inbound),
            "outbound" => Some(SyncDirection::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(LogStatus::Success),
            "failed" => Some(LogStatus::Failed),
            _ => None,
        }
    }
}

/// One entry per attempt; a retried operation produces a new entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLogEntry {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub direction: SyncDirection,
    pub entity_type: EntityType,
    pub status: LogStatus,
    pub response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub records_processed: i32,
    pub records_errored: i32,
    pub created_at: DateTime<Utc>,
}

impl IntegrationLogEntry {
    pub fn new(
        integration_id: Uuid,
        direction: SyncDirection,
        entity_type: EntityType,
        status: LogStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            integration_id,
            direction,
            entity_type,
            status,
            response: None,
            error_message: None,
            duration_ms: 0,
            records_processed: 0,
            records_errored: 0,
            created_at: Utc::now(),
        }
    }
}
