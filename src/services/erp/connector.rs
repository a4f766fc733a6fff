// ERP connector capability
// Every ERP adapter implements the same six-operation contract; the
// orchestrator and retry queue only ever see this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;

use crate::models::integration::{ErpType, MappingTable};
use crate::services::erp::mapping::ErpRecord;

/// Field carrying the ERP-native identifier on records crossing the boundary.
pub const EXTERNAL_ID_FIELD: &str = "external_id";

/// Bound on every outbound connector network call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid connection configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Response(String),
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

// ============================================================================
// Connection Parameters
// ============================================================================

/// Decrypted contents of an integration's credential blob.
///
/// The auth strategy is selected by shape: client credentials plus a token
/// endpoint mean OAuth client-credentials flow, otherwise basic auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub base_url: String,

    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,

    #[serde(default)]
    pub company_code: Option<String>,
    #[serde(default)]
    pub plant: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Basic,
    OAuth,
}

impl ConnectionParams {
    pub fn auth_mode(&self) -> AuthMode {
        if self.client_id.is_some() && self.client_secret.is_some() && self.token_url.is_some() {
            AuthMode::OAuth
        } else {
            AuthMode::Basic
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::Config("base_url is required".to_string()));
        }

        match self.auth_mode() {
            AuthMode::OAuth => Ok(()),
            AuthMode::Basic => {
                if self.username.as_deref().unwrap_or_default().is_empty() {
                    return Err(ConnectorError::Config(
                        "username is required for basic auth".to_string(),
                    ));
                }
                if self.password.is_none() {
                    return Err(ConnectorError::Config(
                        "password is required for basic auth".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub response_time_ms: i64,
}

/// Outcome of one sync operation.
///
/// `success` is false only when the whole batch failed; partial failure is
/// `success == true` with `errors > 0` and populated `error_messages`
/// alongside the successfully produced data.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult<T = ErpRecord> {
    pub success: bool,
    pub data: Vec<T>,
    pub created: i32,
    pub updated: i32,
    pub errors: i32,
    pub error_messages: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> Default for SyncResult<T> {
    fn default() -> Self {
        Self {
            success: true,
            data: Vec::new(),
            created: 0,
            updated: 0,
            errors: 0,
            error_messages: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

impl<T> SyncResult<T> {
    /// Whole-batch failure with a single explanatory message.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: 1,
            error_messages: vec![message],
            ..Self::default()
        }
    }

    /// Whole-batch failure where the number of affected items is known.
    pub fn failed_batch(message: impl Into<String>, item_count: usize) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: item_count.max(1) as i32,
            error_messages: vec![message],
            ..Self::default()
        }
    }
}

/// Outcome of pushing a single record outward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Created(String),
    Updated(String),
}

/// Echo record returned from a push: the internal id (when present) plus the
/// external id the ERP now knows the record by, so callers can link them.
pub fn push_echo(item: &ErpRecord, external_id: String) -> ErpRecord {
    let mut record = ErpRecord::new();
    if let Some(id) = item.get("id") {
        record.insert("id".to_string(), id.clone());
    }
    record.insert(
        EXTERNAL_ID_FIELD.to_string(),
        serde_json::Value::String(external_id),
    );
    record
}

/// Best-effort identifier for per-item error messages.
pub fn item_label(item: &ErpRecord) -> String {
    item.get("id")
        .or_else(|| item.get(EXTERNAL_ID_FIELD))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "<unidentified>".to_string())
}

// ============================================================================
// Shared connector session state
// ============================================================================

/// Connected flag plus last-sync watermark, shared by the concrete adapters.
#[derive(Debug, Default)]
pub struct ConnectorState {
    connected: AtomicBool,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
}

impl ConnectorState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn mark_synced(&self) {
        *self.last_sync_at.write().expect("last_sync lock poisoned") = Some(Utc::now());
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.read().expect("last_sync lock poisoned")
    }
}

// ============================================================================
// Connector trait
// ============================================================================

#[async_trait]
pub trait ErpConnector: Send + Sync {
    fn erp_type(&self) -> ErpType;

    /// Resolved mapping table (adapter defaults overlaid with the
    /// configuration's overrides).
    fn mappings(&self) -> &MappingTable;

    /// Establish credentials/session state. Network and auth failures are
    /// caught at the adapter boundary and surfaced as
    /// `ConnectorError::Connection`/`Auth`, never a panic. Idempotent after
    /// disconnect.
    async fn connect(&self) -> Result<()>;

    /// Release session state. Always succeeds.
    async fn disconnect(&self);

    /// Lightweight liveness check. Returns `success: false` with an
    /// explanatory message when not connected, rather than erroring.
    async fn test_connection(&self) -> ConnectionTestResult;

    /// Pull assets changed after `since`; `None` means full sync.
    async fn sync_assets(&self, since: Option<DateTime<Utc>>) -> SyncResult;

    /// Pull spare-parts inventory changed after `since`.
    async fn sync_inventory(&self, since: Option<DateTime<Utc>>) -> SyncResult;

    /// Push work orders. An item without `external_id` is created, one with
    /// it is updated; assigned ids are echoed back in the result data.
    async fn sync_work_orders(&self, items: Vec<ErpRecord>) -> SyncResult;

    /// Push purchase orders, same create/update semantics as work orders.
    async fn sync_purchase_orders(&self, items: Vec<ErpRecord>) -> SyncResult;
}
