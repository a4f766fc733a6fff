use async_trait::async_trait;
use sqlx::{query, PgPool, Row};
use uuid::Uuid;

use crate::models::integration::EntityType;
use crate::models::record::{InternalRecord, NewRecord};
use crate::repositories::{Result, StoreError};

/// Seam onto the internal maintenance records the sync engine reconciles
/// against. Ownership of these records lives with the CRUD services; the
/// engine only needs external-id lookup, create, update, and linking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<InternalRecord>>;

    async fn create(&self, record: NewRecord) -> Result<InternalRecord>;

    async fn update_data(&self, id: Uuid, data: &serde_json::Value) -> Result<()>;

    /// Attach the ERP-assigned identifier to a record after an outbound create.
    async fn link_external_id(&self, id: Uuid, external_id: &str) -> Result<()>;

    async fn list(&self, tenant_id: Uuid, entity_type: EntityType)
        -> Result<Vec<InternalRecord>>;
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn build_record_from_row(row: &sqlx::postgres::PgRow) -> Result<InternalRecord> {
    let entity_raw: String = row.try_get("entity_type")?;
    let entity_type = EntityType::parse(&entity_raw)
        .ok_or_else(|| StoreError::Invalid(format!("unknown entity_type '{}'", entity_raw)))?;

    Ok(InternalRecord {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        entity_type,
        external_id: row.try_get("external_id")?,
        data: row.try_get("data")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<InternalRecord>> {
        let row = query(
            "SELECT id, tenant_id, entity_type, external_id, data, created_at, updated_at \
             FROM maintenance_records \
             WHERE tenant_id = $1 AND entity_type = $2 AND external_id = $3",
        )
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(build_record_from_row).transpose()
    }

    async fn create(&self, record: NewRecord) -> Result<InternalRecord> {
        let row = query(
            r#"
            INSERT INTO maintenance_records (id, tenant_id, entity_type, external_id, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, entity_type, external_id, data, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.tenant_id)
        .bind(record.entity_type.as_str())
        .bind(&record.external_id)
        .bind(&record.data)
        .fetch_one(&self.pool)
        .await?;

        build_record_from_row(&row)
    }

    async fn update_data(&self, id: Uuid, data: &serde_json::Value) -> Result<()> {
        query("UPDATE maintenance_records SET data = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(data)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn link_external_id(&self, id: Uuid, external_id: &str) -> Result<()> {
        query(
            "UPDATE maintenance_records SET external_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> Result<Vec<InternalRecord>> {
        let rows = query(
            "SELECT id, tenant_id, entity_type, external_id, data, created_at, updated_at \
             FROM maintenance_records \
             WHERE tenant_id = $1 AND entity_type = $2 \
             ORDER BY created_at",
        )
        .bind(tenant_id)
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(build_record_from_row).collect()
    }
}
