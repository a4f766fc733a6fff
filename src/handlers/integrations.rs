// Integration management handlers
// Tenant-scoped CRUD over integration configurations plus the sync,
// connection-test, queue, and log surfaces. Credentials are accepted in
// requests, stored encrypted, and never returned in responses.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::middleware::tenant::TenantId;
use crate::models::integration::{
    ErpType, IntegrationConfig, MappingTable, SyncSettings, SyncStats, SyncStatus,
};
use crate::models::sync_log::{IntegrationLogEntry, LogStatus, SyncDirection};
use crate::models::sync_queue::SyncQueueItem;
use crate::models::{integration::EntityType, sync_queue::QueueStatus};
use crate::repositories::{LogFilter, QueueFilter};
use crate::services::audit_service::AuditEvent;
use crate::services::erp::connector::{ConnectionParams, ConnectionTestResult};
use crate::services::erp::{oracle_connector, sap_connector};
use crate::AppState;

// ============================================================================
// Request / response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateIntegrationRequest {
    pub erp_type: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub connection: ConnectionParams,
    #[serde(default)]
    pub mappings: MappingTable,
    #[serde(default)]
    pub settings: Option<SyncSettings>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIntegrationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub connection: Option<ConnectionParams>,
    #[serde(default)]
    pub settings: Option<SyncSettings>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Outward view of a configuration; the encrypted credential blob stays out.
#[derive(Debug, Serialize)]
pub struct IntegrationResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub erp_type: ErpType,
    pub name: String,
    pub description: Option<String>,
    pub mappings: MappingTable,
    pub settings: SyncSettings,
    pub active: bool,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_stats: Option<SyncStats>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IntegrationConfig> for IntegrationResponse {
    fn from(config: IntegrationConfig) -> Self {
        Self {
            id: config.id,
            tenant_id: config.tenant_id,
            erp_type: config.erp_type,
            name: config.name,
            description: config.description,
            mappings: config.mappings,
            settings: config.settings,
            active: config.active,
            sync_status: config.sync_status,
            last_sync_at: config.last_sync_at,
            last_sync_stats: config.last_sync_stats,
            last_error: config.last_error,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErpTypeInfo {
    #[serde(rename = "type")]
    pub erp_type: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub stats: SyncStats,
}

/// Optional manual-sync body; naming entity types overrides the
/// configuration's per-entity flags for this run only.
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub entity_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub integration_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn parse_erp_type(raw: &str) -> Result<ErpType> {
    ErpType::parse(raw)
        .ok_or_else(|| AppError::BadRequest(format!("Unsupported ERP type '{}'", raw)))
}

async fn owned_integration(
    state: &AppState,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<IntegrationConfig> {
    state
        .integrations
        .get_for_tenant(tenant_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Integration not found".to_string()))
}

// ============================================================================
// CRUD
// ============================================================================

pub async fn create_integration(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(request): Json<CreateIntegrationRequest>,
) -> Result<(StatusCode, Json<IntegrationResponse>)> {
    let erp_type = parse_erp_type(&request.erp_type)?;

    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name must not be empty".to_string()));
    }
    request
        .connection
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let credentials = state.encryption.encrypt_json(&request.connection)?;
    let now = Utc::now();
    let config = IntegrationConfig {
        id: Uuid::new_v4(),
        tenant_id,
        erp_type,
        name: request.name,
        description: request.description,
        credentials,
        mappings: request.mappings,
        settings: request.settings.unwrap_or_default(),
        active: true,
        sync_status: SyncStatus::Idle,
        last_sync_at: None,
        last_sync_stats: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };

    state.integrations.create(&config).await?;
    state
        .audit
        .record(
            AuditEvent::IntegrationCreated,
            config.id,
            serde_json::json!({ "erp_type": erp_type.as_str() }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(config.into())))
}

pub async fn list_integrations(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
) -> Result<Json<Vec<IntegrationResponse>>> {
    let configs = state.integrations.list_for_tenant(tenant_id).await?;
    Ok(Json(configs.into_iter().map(Into::into).collect()))
}

pub async fn get_integration(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<IntegrationResponse>> {
    let config = owned_integration(&state, tenant_id, id).await?;
    Ok(Json(config.into()))
}

pub async fn update_integration(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateIntegrationRequest>,
) -> Result<Json<IntegrationResponse>> {
    let mut config = owned_integration(&state, tenant_id, id).await?;

    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Name must not be empty".to_string()));
        }
        config.name = name;
    }
    if let Some(description) = request.description {
        config.description = Some(description);
    }
    if let Some(connection) = request.connection {
        connection
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        config.credentials = state.encryption.encrypt_json(&connection)?;
    }
    if let Some(settings) = request.settings {
        config.settings = settings;
    }
    if let Some(active) = request.active {
        config.active = active;
    }

    state.integrations.update(&config).await?;
    // The cached connector may hold stale credentials or mappings.
    state.factory.invalidate(id).await;
    state
        .audit
        .record(AuditEvent::IntegrationUpdated, id, serde_json::json!({}))
        .await;

    let refreshed = owned_integration(&state, tenant_id, id).await?;
    Ok(Json(refreshed.into()))
}

pub async fn delete_integration(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    owned_integration(&state, tenant_id, id).await?;

    // Disconnect before the row disappears.
    state.factory.invalidate(id).await;
    state.integrations.delete(id).await?;
    state
        .audit
        .record(AuditEvent::IntegrationDeleted, id, serde_json::json!({}))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ERP metadata
// ============================================================================

pub async fn get_erp_types() -> Json<Vec<ErpTypeInfo>> {
    Json(
        ErpType::all()
            .iter()
            .map(|t| ErpTypeInfo {
                erp_type: t.as_str(),
                label: t.label(),
            })
            .collect(),
    )
}

pub async fn get_default_mappings(Path(erp_type): Path<String>) -> Result<Json<MappingTable>> {
    let erp_type = parse_erp_type(&erp_type)?;
    let mappings = match erp_type {
        ErpType::Sap => sap_connector::default_mappings(),
        ErpType::Oracle => oracle_connector::default_mappings(),
    };
    Ok(Json(mappings.clone()))
}

pub async fn update_mappings(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Json(overlay): Json<MappingTable>,
) -> Result<Json<IntegrationResponse>> {
    let mut config = owned_integration(&state, tenant_id, id).await?;

    config.merge_mappings(overlay);
    state.integrations.update(&config).await?;
    // Cached connectors resolve mappings at construction.
    state.factory.invalidate(id).await;

    let refreshed = owned_integration(&state, tenant_id, id).await?;
    Ok(Json(refreshed.into()))
}

// ============================================================================
// Connection test and sync
// ============================================================================

pub async fn test_connection(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionTestResult>> {
    let config = owned_integration(&state, tenant_id, id).await?;
    let connector = state.factory.get_or_create(&config)?;

    let result = match connector.connect().await {
        Ok(()) => connector.test_connection().await,
        Err(e) => ConnectionTestResult {
            success: false,
            message: e.to_string(),
            details: None,
            response_time_ms: 0,
        },
    };

    let mut entry = IntegrationLogEntry::new(
        id,
        SyncDirection::Outbound,
        EntityType::ConnectionTest,
        if result.success {
            LogStatus::Success
        } else {
            LogStatus::Failed
        },
    );
    entry.duration_ms = result.response_time_ms;
    if !result.success {
        entry.error_message = Some(result.message.clone());
    }
    state.logs.append(&entry).await?;

    state
        .audit
        .record(
            AuditEvent::ConnectionTested,
            id,
            serde_json::json!({ "success": result.success }),
        )
        .await;

    Ok(Json(result))
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    request: Option<Json<SyncRequest>>,
) -> Result<Json<SyncResponse>> {
    owned_integration(&state, tenant_id, id).await?;

    let overrides = request
        .and_then(|Json(r)| r.entity_types)
        .map(|names| {
            names
                .iter()
                .map(|s| {
                    EntityType::parse(s).filter(|t| *t != EntityType::ConnectionTest).ok_or_else(
                        || AppError::BadRequest(format!("Unknown entity type '{}'", s)),
                    )
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let stats = match overrides {
        Some(entity_types) => state.orchestrator.run_sync_subset(id, &entity_types).await?,
        None => state.orchestrator.run_sync(id).await?,
    };
    Ok(Json(SyncResponse {
        success: stats.total_errors() == 0,
        stats,
    }))
}

// ============================================================================
// Queue and log inspection
// ============================================================================

pub async fn list_queue(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<SyncQueueItem>>> {
    // Scope to the tenant's integrations.
    let integration_ids: Vec<Uuid> = match query.integration_id {
        Some(id) => {
            owned_integration(&state, tenant_id, id).await?;
            vec![id]
        }
        None => state
            .integrations
            .list_for_tenant(tenant_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect(),
    };

    let status = query
        .status
        .as_deref()
        .map(|s| {
            QueueStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown queue status '{}'", s)))
        })
        .transpose()?;
    let entity_type = query
        .entity_type
        .as_deref()
        .map(|s| {
            EntityType::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown entity type '{}'", s)))
        })
        .transpose()?;

    let items = state
        .queue
        .list(&QueueFilter {
            integration_ids: Some(integration_ids),
            status,
            entity_type,
            limit: query.limit,
        })
        .await?;

    Ok(Json(items))
}

pub async fn list_logs(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<IntegrationLogEntry>>> {
    owned_integration(&state, tenant_id, id).await?;

    let direction = query
        .direction
        .as_deref()
        .map(|s| {
            SyncDirection::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown direction '{}'", s)))
        })
        .transpose()?;
    let entity_type = query
        .entity_type
        .as_deref()
        .map(|s| {
            EntityType::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown entity type '{}'", s)))
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            LogStatus::parse(s)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown log status '{}'", s)))
        })
        .transpose()?;

    let entries = state
        .logs
        .list(
            id,
            &LogFilter {
                direction,
                entity_type,
                status,
                limit: query.limit,
            },
        )
        .await?;

    Ok(Json(entries))
}
