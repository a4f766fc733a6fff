use async_trait::async_trait;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::models::integration::EntityType;
use crate::models::sync_log::{IntegrationLogEntry, LogStatus, SyncDirection};
use crate::repositories::{Result, StoreError};

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub direction: Option<SyncDirection>,
    pub entity_type: Option<EntityType>,
    pub status: Option<LogStatus>,
    pub limit: Option<i64>,
}

/// Append-only sync history seam. Entries are never updated or deleted.
#[async_trait]
pub trait SyncLogStore: Send + Sync {
    async fn append(&self, entry: &IntegrationLogEntry) -> Result<()>;

    /// Entries for one integration, newest first.
    async fn list(&self, integration_id: Uuid, filter: &LogFilter)
        -> Result<Vec<IntegrationLogEntry>>;
}

pub struct PgSyncLogStore {
    pool: PgPool,
}

impl PgSyncLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn build_log_entry_from_row(row: &sqlx::postgres::PgRow) -> Result<IntegrationLogEntry> {
    let direction_raw: String = row.try_get("direction")?;
    let direction = SyncDirection::parse(&direction_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown direction '{}'", direction_raw)))?;

    let entity_raw: String = row.try_get("entity_type")?;
    let entity_type = EntityType::parse(&entity_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown entity_type '{}'", entity_raw)))?;

    let status_raw: String = row.try_get("status")?;
    let status = LogStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown log status '{}'", status_raw)))?;

    Ok(IntegrationLogEntry {
        id: row.try_get("id")?,
        integration_id: row.try_get("integration_id")?,
        direction,
        entity_type,
        status,
        response: row.try_get("response")?,
        error_message: row.try_get("error_message")?,
        duration_ms: row.try_get("duration_ms")?,
        records_processed: row.try_get("records_processed")?,
        records_errored: row.try_get("records_errored")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SyncLogStore for PgSyncLogStore {
    async fn append(&self, entry: &IntegrationLogEntry) -> Result<()> {
        query(
            r#"
            INSERT INTO integration_sync_logs (id, integration_id, direction, entity_type,
                status, response, error_message, duration_ms, records_processed,
                records_errored, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.integration_id)
        .bind(entry.direction.as_str())
        .bind(entry.entity_type.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.response)
        .bind(&entry.error_message)
        .bind(entry.duration_ms)
        .bind(entry.records_processed)
        .bind(entry.records_errored)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        integration_id: Uuid,
        filter: &LogFilter,
    ) -> Result<Vec<IntegrationLogEntry>> {
        let mut sql = String::from(
            "SELECT id, integration_id, direction, entity_type, status, response, \
             error_message, duration_ms, records_processed, records_errored, created_at \
             FROM integration_sync_logs WHERE integration_id = $1",
        );
        let mut param = 2;

        if filter.direction.is_some() {
            sql.push_str(&format!(" AND direction = ${}", param));
            param += 1;
        }
        if filter.entity_type.is_some() {
            sql.push_str(&format!(" AND entity_type = ${}", param));
            param += 1;
        }
        if filter.status.is_some() {
            sql.push_str(&format!(" AND status = ${}", param));
            param += 1;
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${}", param));

        let mut q = query(&sql).bind(integration_id);
        if let Some(direction) = filter.direction {
            q = q.bind(direction.as_str());
        }
        if let Some(entity_type) = filter.entity_type {
            q = q.bind(entity_type.as_str());
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        q = q.bind(filter.limit.unwrap_or(100).min(500));

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(build_log_entry_from_row).collect()
    }
}
