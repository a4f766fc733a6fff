use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::models::integration::{
    ErpType, IntegrationConfig, MappingTable, SyncSettings, SyncStats, SyncStatus,
};
use crate::repositories::{Result, StoreError};

/// Persistence seam for integration configurations.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn create(&self, config: &IntegrationConfig) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<IntegrationConfig>>;
    async fn get_for_tenant(&self, tenant_id: Uuid, id: Uuid)
        -> Result<Option<IntegrationConfig>>;
    async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<IntegrationConfig>>;
    async fn update(&self, config: &IntegrationConfig) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Write the run-state fields only. `last_sync_at` and `stats` overwrite
    /// when `Some` and are left untouched when `None`; `last_error` is always
    /// written, so passing `None` clears it.
    async fn update_sync_state(
        &self,
        id: Uuid,
        status: SyncStatus,
        last_sync_at: Option<DateTime<Utc>>,
        stats: Option<&SyncStats>,
        last_error: Option<&str>,
    ) -> Result<()>;

    /// Active configurations with auto-sync enabled, for the scheduler sweep.
    async fn list_auto_sync_candidates(&self) -> Result<Vec<IntegrationConfig>>;
}

pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INTEGRATION_COLUMNS: &str = "id, tenant_id, erp_type, name, description, credentials, \
     mappings, settings, active, sync_status, last_sync_at, last_sync_stats, last_error, \
     created_at, updated_at";

fn build_integration_from_row(row: &sqlx::postgres::PgRow) -> Result<IntegrationConfig> {
    let erp_type_raw: String = row.try_get("erp_type")?;
    let erp_type = ErpType::parse(&erp_type_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown erp_type '{}'", erp_type_raw)))?;

    let status_raw: String = row.try_get("sync_status")?;
    let sync_status = SyncStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown sync_status '{}'", status_raw)))?;

    let mappings: MappingTable = serde_json::from_value(row.try_get("mappings")?)?;
    let settings: SyncSettings = serde_json::from_value(row.try_get("settings")?)?;
    let last_sync_stats: Option<SyncStats> = row
        .try_get::<Option<serde_json::Value>, _>("last_sync_stats")?
        .map(serde_json::from_value)
        .transpose()?;

    Ok(IntegrationConfig {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        erp_type,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        credentials: row.try_get("credentials")?,
        mappings,
        settings,
        active: row.try_get("active")?,
        sync_status,
        last_sync_at: row.try_get("last_sync_at")?,
        last_sync_stats,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn create(&self, config: &IntegrationConfig) -> Result<()> {
        query(
            r#"
            INSERT INTO integrations (id, tenant_id, erp_type, name, description, credentials,
                mappings, settings, active, sync_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(config.id)
        .bind(config.tenant_id)
        .bind(config.erp_type.as_str())
        .bind(&config.name)
        .bind(&config.description)
        .bind(&config.credentials)
        .bind(serde_json::to_value(&config.mappings)?)
        .bind(serde_json::to_value(&config.settings)?)
        .bind(config.active)
        .bind(config.sync_status.as_str())
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntegrationConfig>> {
        let row = query(&format!(
            "SELECT {} FROM integrations WHERE id = $1",
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(build_integration_from_row).transpose()
    }

    async fn get_for_tenant(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<IntegrationConfig>> {
        let row = query(&format!(
            "SELECT {} FROM integrations WHERE id = $1 AND tenant_id = $2",
            INTEGRATION_COLUMNS
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(build_integration_from_row).transpose()
    }

    async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<IntegrationConfig>> {
        let rows = query(&format!(
            "SELECT {} FROM integrations WHERE tenant_id = $1 ORDER BY created_at",
            INTEGRATION_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_integration_from_row).collect()
    }

    async fn update(&self, config: &IntegrationConfig) -> Result<()> {
        query(
            r#"
            UPDATE integrations
            SET name = $2, description = $3, credentials = $4, mappings = $5,
                settings = $6, active = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(config.id)
        .bind(&config.name)
        .bind(&config.description)
        .bind(&config.credentials)
        .bind(serde_json::to_value(&config.mappings)?)
        .bind(serde_json::to_value(&config.settings)?)
        .bind(config.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = query("DELETE FROM integrations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        status: SyncStatus,
        last_sync_at: Option<DateTime<Utc>>,
        stats: Option<&SyncStats>,
        last_error: Option<&str>,
    ) -> Result<()> {
        let stats_value = stats.map(serde_json::to_value).transpose()?;

        query(
            r#"
            UPDATE integrations
            SET sync_status = $2,
                last_sync_at = COALESCE($3, last_sync_at),
                last_sync_stats = COALESCE($4, last_sync_stats),
                last_error = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(last_sync_at)
        .bind(stats_value)
        .bind(last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_auto_sync_candidates(&self) -> Result<Vec<IntegrationConfig>> {
        let rows = query(&format!(
            "SELECT {} FROM integrations \
             WHERE active = TRUE AND (settings->>'auto_sync_enabled')::boolean = TRUE \
             ORDER BY created_at",
            INTEGRATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_integration_from_row).collect()
    }
}
