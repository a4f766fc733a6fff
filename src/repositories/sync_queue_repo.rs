use async_trait::async_trait;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::models::integration::EntityType;
use crate::models::sync_queue::{QueueStatus, SyncOperation, SyncQueueItem};
use crate::repositories::{Result, StoreError};

/// Filters for the queue inspection surface.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    /// Restrict to these integrations; used for tenant scoping.
    pub integration_ids: Option<Vec<Uuid>>,
    pub status: Option<QueueStatus>,
    pub entity_type: Option<EntityType>,
    pub limit: Option<i64>,
}

/// Persistence seam for the retry queue.
#[async_trait]
pub trait SyncQueueStore: Send + Sync {
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()>;

    /// Pending items within their retry budget, ordered by priority
    /// ascending then enqueue time ascending.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<SyncQueueItem>>;

    /// Conditional pending -> processing transition. Returns false when the
    /// item was already claimed or finished by another worker.
    async fn claim(&self, id: Uuid) -> Result<bool>;

    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Failure with budget remaining: increment the retry count and return
    /// the item to pending.
    async fn requeue(&self, id: Uuid, error: &str) -> Result<()>;

    /// Terminal failure: increment the retry count and mark failed.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<SyncQueueItem>>;
}

pub struct PgSyncQueueStore {
    pool: PgPool,
}

impl PgSyncQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const QUEUE_COLUMNS: &str = "id, integration_id, operation, entity_type, entity_id, payload, \
     priority, status, retry_count, max_retries, started_at, completed_at, error_message, \
     created_at";

fn build_queue_item_from_row(row: &sqlx::postgres::PgRow) -> Result<SyncQueueItem> {
    let operation_raw: String = row.try_get("operation")?;
    let operation = SyncOperation::parse(&operation_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown operation '{}'", operation_raw)))?;

    let entity_raw: String = row.try_get("entity_type")?;
    let entity_type = EntityType::parse(&entity_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown entity_type '{}'", entity_raw)))?;

    let status_raw: String = row.try_get("status")?;
    let status = QueueStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown queue status '{}'", status_raw)))?;

    Ok(SyncQueueItem {
        id: row.try_get("id")?,
        integration_id: row.try_get("integration_id")?,
        operation,
        entity_type,
        entity_id: row.try_get("entity_id")?,
        payload: row.try_get("payload")?,
        priority: row.try_get("priority")?,
        status,
        retry_count: row.try_get("retry_count")?,
        max_retries: row.try_get("max_retries")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SyncQueueStore for PgSyncQueueStore {
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()> {
        query(
            r#"
            INSERT INTO sync_queue_items (id, integration_id, operation, entity_type, entity_id,
                payload, priority, status, retry_count, max_retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id)
        .bind(item.integration_id)
        .bind(item.operation.as_str())
        .bind(item.entity_type.as_str())
        .bind(&item.entity_id)
        .bind(&item.payload)
        .bind(item.priority)
        .bind(item.status.as_str())
        .bind(item.retry_count)
        .bind(item.max_retries)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<SyncQueueItem>> {
        let rows = query(&format!(
            "SELECT {} FROM sync_queue_items \
             WHERE status = 'pending' AND retry_count < max_retries \
             ORDER BY priority ASC, created_at ASC \
             LIMIT $1",
            QUEUE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_queue_item_from_row).collect()
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let result = query(
            "UPDATE sync_queue_items \
             SET status = 'processing', started_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        query(
            "UPDATE sync_queue_items \
             SET status = 'completed', completed_at = NOW(), error_message = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn requeue(&self, id: Uuid, error: &str) -> Result<()> {
        query(
            "UPDATE sync_queue_items \
             SET status = 'pending', retry_count = retry_count + 1, error_message = $2, \
                 started_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        query(
            "UPDATE sync_queue_items \
             SET status = 'failed', retry_count = retry_count + 1, error_message = $2, \
                 completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<SyncQueueItem>> {
        let mut sql = format!("SELECT {} FROM sync_queue_items WHERE 1=1", QUEUE_COLUMNS);
        let mut param = 1;

        if filter.integration_ids.is_some() {
            sql.push_str(&format!(" AND integration_id = ANY(${})", param));
            param += 1;
        }
        if filter.status.is_some() {
            sql.push_str(&format!(" AND status = ${}", param));
            param += 1;
        }
        if filter.entity_type.is_some() {
            sql.push_str(&format!(" AND entity_type = ${}", param));
            param += 1;
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${}",
            param
        ));

        let mut q = query(&sql);
        if let Some(ids) = &filter.integration_ids {
            q = q.bind(ids.clone());
        }
        if let Some(status) = filter.status {
            q = q.bind(status.as_str());
        }
        if let Some(entity_type) = filter.entity_type {
            q = q.bind(entity_type.as_str());
        }
        q = q.bind(filter.limit.unwrap_or(100).min(500));

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(build_queue_item_from_row).collect()
    }
}
