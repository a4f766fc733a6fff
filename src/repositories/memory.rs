// In-memory store implementations
// Back the orchestrator and queue tests; behavior mirrors the Postgres
// stores, including conditional claims and update-sync-state semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::integration::{EntityType, IntegrationConfig, SyncStats, SyncStatus};
use crate::models::record::{InternalRecord, NewRecord};
use crate::models::sync_log::IntegrationLogEntry;
use crate::models::sync_queue::{QueueStatus, SyncQueueItem};
use crate::repositories::{
    IntegrationStore, LogFilter, QueueFilter, RecordStore, Result, SyncLogStore, SyncQueueStore,
};

#[derive(Default)]
pub struct MemoryIntegrationStore {
    items: RwLock<HashMap<Uuid, IntegrationConfig>>,
}

impl MemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn create(&self, config: &IntegrationConfig) -> Result<()> {
        self.items
            .write()
            .expect("integration store lock poisoned")
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntegrationConfig>> {
        Ok(self
            .items
            .read()
            .expect("integration store lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn get_for_tenant(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<IntegrationConfig>> {
        Ok(self
            .items
            .read()
            .expect("integration store lock poisoned")
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<IntegrationConfig>> {
        let mut configs: Vec<_> = self
            .items
            .read()
            .expect("integration store lock poisoned")
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }

    async fn update(&self, config: &IntegrationConfig) -> Result<()> {
        let mut items = self.items.write().expect("integration store lock poisoned");
        if let Some(existing) = items.get_mut(&config.id) {
            existing.name = config.name.clone();
            existing.description = config.description.clone();
            existing.credentials = config.credentials.clone();
            existing.mappings = config.mappings.clone();
            existing.settings = config.settings.clone();
            existing.active = config.active;
            existing.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .items
            .write()
            .expect("integration store lock poisoned")
            .remove(&id)
            .is_some())
    }

    async fn update_sync_state(
        &self,
        id: Uuid,
        status: SyncStatus,
        last_sync_at: Option<DateTime<Utc>>,
        stats: Option<&SyncStats>,
        last_error: Option<&str>,
    ) -> Result<()> {
        let mut items = self.items.write().expect("integration store lock poisoned");
        if let Some(config) = items.get_mut(&id) {
            config.sync_status = status;
            if last_sync_at.is_some() {
                config.last_sync_at = last_sync_at;
            }
            if let Some(stats) = stats {
                config.last_sync_stats = Some(stats.clone());
            }
            config.last_error = last_error.map(str::to_string);
            config.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_auto_sync_candidates(&self) -> Result<Vec<IntegrationConfig>> {
        let mut configs: Vec<_> = self
            .items
            .read()
            .expect("integration store lock poisoned")
            .values()
            .filter(|c| c.active && c.settings.auto_sync_enabled)
            .cloned()
            .collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }
}

#[derive(Default)]
pub struct MemorySyncQueueStore {
    items: RwLock<HashMap<Uuid, SyncQueueItem>>,
}

impl MemorySyncQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<SyncQueueItem> {
        self.items
            .read()
            .expect("queue store lock poisoned")
            .get(&id)
            .cloned()
    }
}

#[async_trait]
impl SyncQueueStore for MemorySyncQueueStore {
    async fn enqueue(&self, item: &SyncQueueItem) -> Result<()> {
        self.items
            .write()
            .expect("queue store lock poisoned")
            .insert(item.id, item.clone());
        Ok(())
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<SyncQueueItem>> {
        let mut pending: Vec<_> = self
            .items
            .read()
            .expect("queue store lock poisoned")
            .values()
            .filter(|i| i.status == QueueStatus::Pending && i.retry_count < i.max_retries)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn claim(&self, id: Uuid) -> Result<bool> {
        let mut items = self.items.write().expect("queue store lock poisoned");
        match items.get_mut(&id) {
            Some(item) if item.status == QueueStatus::Pending => {
                item.status = QueueStatus::Processing;
                item.started_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let mut items = self.items.write().expect("queue store lock poisoned");
        if let Some(item) = items.get_mut(&id) {
            item.status = QueueStatus::Completed;
            item.completed_at = Some(Utc::now());
            item.error_message = None;
        }
        Ok(())
    }

    async fn requeue(&self, id: Uuid, error: &str) -> Result<()> {
        let mut items = self.items.write().expect("queue store lock poisoned");
        if let Some(item) = items.get_mut(&id) {
            item.status = QueueStatus::Pending;
            item.retry_count += 1;
            item.error_message = Some(error.to_string());
            item.started_at = None;
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        let mut items = self.items.write().expect("queue store lock poisoned");
        if let Some(item) = items.get_mut(&id) {
            item.status = QueueStatus::Failed;
            item.retry_count += 1;
            item.error_message = Some(error.to_string());
            item.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<SyncQueueItem>> {
        let mut matched: Vec<_> = self
            .items
            .read()
            .expect("queue store lock poisoned")
            .values()
            .filter(|i| {
                filter
                    .integration_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&i.integration_id))
                    && filter.status.map_or(true, |s| i.status == s)
                    && filter.entity_type.map_or(true, |t| i.entity_type == t)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(filter.limit.unwrap_or(100).min(500) as usize);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct MemorySyncLogStore {
    entries: RwLock<Vec<IntegrationLogEntry>>,
}

impl MemorySyncLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<IntegrationLogEntry> {
        self.entries.read().expect("log store lock poisoned").clone()
    }
}

#[async_trait]
impl SyncLogStore for MemorySyncLogStore {
    async fn append(&self, entry: &IntegrationLogEntry) -> Result<()> {
        self.entries
            .write()
            .expect("log store lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn list(
        &self,
        integration_id: Uuid,
        filter: &LogFilter,
    ) -> Result<Vec<IntegrationLogEntry>> {
        let mut matched: Vec<_> = self
            .entries
            .read()
            .expect("log store lock poisoned")
            .iter()
            .filter(|e| {
                e.integration_id == integration_id
                    && filter.direction.map_or(true, |d| e.direction == d)
                    && filter.entity_type.map_or(true, |t| e.entity_type == t)
                    && filter.status.map_or(true, |s| e.status == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(filter.limit.unwrap_or(100).min(500) as usize);
        Ok(matched)
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<Uuid, InternalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<InternalRecord> {
        self.records
            .read()
            .expect("record store lock poisoned")
            .get(&id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.records.read().expect("record store lock poisoned").len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_external_id(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<InternalRecord>> {
        Ok(self
            .records
            .read()
            .expect("record store lock poisoned")
            .values()
            .find(|r| {
                r.tenant_id == tenant_id
                    && r.entity_type == entity_type
                    && r.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn create(&self, record: NewRecord) -> Result<InternalRecord> {
        let now = Utc::now();
        let created = InternalRecord {
            id: Uuid::new_v4(),
            tenant_id: record.tenant_id,
            entity_type: record.entity_type,
            external_id: record.external_id,
            data: record.data,
            created_at: now,
            updated_at: now,
        };
        self.records
            .write()
            .expect("record store lock poisoned")
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_data(&self, id: Uuid, data: &serde_json::Value) -> Result<()> {
        let mut records = self.records.write().expect("record store lock poisoned");
        if let Some(record) = records.get_mut(&id) {
            record.data = data.clone();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn link_external_id(&self, id: Uuid, external_id: &str) -> Result<()> {
        let mut records = self.records.write().expect("record store lock poisoned");
        if let Some(record) = records.get_mut(&id) {
            record.external_id = Some(external_id.to_string());
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        entity_type: EntityType,
    ) -> Result<Vec<InternalRecord>> {
        let mut matched: Vec<_> = self
            .records
            .read()
            .expect("record store lock poisoned")
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.entity_type == entity_type)
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        Ok(matched)
    }
}
