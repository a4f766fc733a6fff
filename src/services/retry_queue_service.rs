// Retry queue worker
// Drains pending queue items in priority order, claiming each one before
// executing so concurrent drains never double-process. Failures consume
// retry budget; the last failure parks the item as failed.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::integration::EntityType;
use crate::models::sync_queue::SyncQueueItem;
use crate::repositories::{IntegrationStore, StoreError, SyncQueueStore};
use crate::services::erp::connector_factory::ConnectorProvider;
use crate::services::erp::mapping::ErpRecord;

pub const DEFAULT_DRAIN_BATCH: i64 = 50;

#[derive(Error, Debug)]
pub enum RetryQueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RetryQueueError>;

/// One attempt of one queue item. A returned error message consumes retry
/// budget; implementations never panic.
#[async_trait]
pub trait QueueExecutor: Send + Sync {
    async fn execute(&self, item: &SyncQueueItem) -> std::result::Result<(), String>;
}

/// Replays a queue item's payload through the owning integration's
/// connector as a single-item push.
pub struct ConnectorQueueExecutor {
    integrations: Arc<dyn IntegrationStore>,
    factory: Arc<dyn ConnectorProvider>,
}

impl ConnectorQueueExecutor {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        factory: Arc<dyn ConnectorProvider>,
    ) -> Self {
        Self {
            integrations,
            factory,
        }
    }
}

#[async_trait]
impl QueueExecutor for ConnectorQueueExecutor {
    async fn execute(&self, item: &SyncQueueItem) -> std::result::Result<(), String> {
        let config = self
            .integrations
            .get(item.integration_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "integration no longer exists".to_string())?;

        if !config.active {
            return Err("integration is not active".to_string());
        }

        let connector = self
            .factory
            .get_or_create(&config)
            .map_err(|e| e.to_string())?;
        connector.connect().await.map_err(|e| e.to_string())?;

        let payload = match &item.payload {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                let mut map = ErpRecord::new();
                map.insert("data".to_string(), other.clone());
                map
            }
        };

        let result = match item.entity_type {
            EntityType::WorkOrders => connector.sync_work_orders(vec![payload]).await,
            EntityType::PurchaseOrders => connector.sync_purchase_orders(vec![payload]).await,
            other => {
                return Err(format!("{} items cannot be replayed", other.as_str()));
            }
        };

        if result.errors > 0 {
            return Err(result
                .error_messages
                .first()
                .cloned()
                .unwrap_or_else(|| "push failed".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub processed: i32,
    pub completed: i32,
    pub requeued: i32,
    pub failed: i32,
    pub skipped: i32,
}

pub struct RetryQueueService {
    queue: Arc<dyn SyncQueueStore>,
    executor: Arc<dyn QueueExecutor>,
    batch_size: i64,
}

impl RetryQueueService {
    pub fn new(queue: Arc<dyn SyncQueueStore>, executor: Arc<dyn QueueExecutor>) -> Self {
        Self {
            queue,
            executor,
            batch_size: DEFAULT_DRAIN_BATCH,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// One drain pass over the pending queue.
    pub async fn drain(&self) -> Result<DrainStats> {
        let pending = self.queue.fetch_pending(self.batch_size).await?;
        let mut stats = DrainStats::default();

        for item in pending {
            // Another worker may have taken it since the fetch.
            if !self.queue.claim(item.id).await? {
                stats.skipped += 1;
                continue;
            }
            stats.processed += 1;

            match self.executor.execute(&item).await {
                Ok(()) => {
                    self.queue.complete(item.id).await?;
                    stats.completed += 1;
                }
                Err(message) => {
                    if item.retries_exhausted_after_failure() {
                        tracing::warn!(
                            item_id = %item.id,
                            entity_id = %item.entity_id,
                            "queue item failed permanently: {}",
                            message
                        );
                        self.queue.fail(item.id, &message).await?;
                        stats.failed += 1;
                    } else {
                        self.queue.requeue(item.id, &message).await?;
                        stats.requeued += 1;
                    }
                }
            }
        }

        Ok(stats)
    }
}
