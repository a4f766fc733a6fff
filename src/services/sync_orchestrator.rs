// Sync orchestrator
// Drives one full synchronization run for an integration configuration:
// single-flight admission, connect, per-entity pull/push in fixed order,
// log entries, aggregated stats, and final status on the configuration.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::models::integration::{
    EntityStats, EntityType, IntegrationConfig, SyncStats, SyncStatus,
};
use crate::models::record::NewRecord;
use crate::models::sync_log::{IntegrationLogEntry, LogStatus, SyncDirection};
use crate::models::sync_queue::{SyncOperation, SyncQueueItem};
use crate::repositories::{IntegrationStore, RecordStore, StoreError, SyncLogStore, SyncQueueStore};
use crate::services::audit_service::{AuditEvent, AuditSink};
use crate::services::erp::connector::{ConnectorError, ErpConnector, SyncResult, EXTERNAL_ID_FIELD};
use crate::services::erp::connector_factory::ConnectorProvider;
use crate::services::erp::mapping::ErpRecord;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Integration not found")]
    NotFound,

    #[error("Integration is not active")]
    Inactive,

    #[error("A sync is already running for this integration")]
    AlreadyRunning,

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Releases the single-flight slot when a run ends, on every exit path.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

/// Per-entity outcome before aggregation.
struct EntityOutcome {
    stats: EntityStats,
    whole_batch_failed: bool,
    messages: Vec<String>,
}

pub struct SyncOrchestrator {
    integrations: Arc<dyn IntegrationStore>,
    records: Arc<dyn RecordStore>,
    logs: Arc<dyn SyncLogStore>,
    queue: Arc<dyn SyncQueueStore>,
    factory: Arc<dyn ConnectorProvider>,
    audit: Arc<dyn AuditSink>,
    in_flight: DashMap<Uuid, ()>,
}

impl SyncOrchestrator {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        records: Arc<dyn RecordStore>,
        logs: Arc<dyn SyncLogStore>,
        queue: Arc<dyn SyncQueueStore>,
        factory: Arc<dyn ConnectorProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            integrations,
            records,
            logs,
            queue,
            factory,
            audit,
            in_flight: DashMap::new(),
        }
    }

    /// Run one full sync over the configuration's enabled entity types. At
    /// most one run per configuration is admitted at a time; a second caller
    /// is rejected immediately with `AlreadyRunning` rather than queued.
    pub async fn run_sync(&self, integration_id: Uuid) -> Result<SyncStats> {
        self.run(integration_id, None).await
    }

    /// Run a sync restricted to the requested entity types, overriding the
    /// configuration's per-entity flags. Manual sync uses this when the
    /// caller names a subset.
    pub async fn run_sync_subset(
        &self,
        integration_id: Uuid,
        entity_types: &[EntityType],
    ) -> Result<SyncStats> {
        self.run(integration_id, Some(entity_types)).await
    }

    async fn run(
        &self,
        integration_id: Uuid,
        overrides: Option<&[EntityType]>,
    ) -> Result<SyncStats> {
        let config = self
            .integrations
            .get(integration_id)
            .await?
            .ok_or(OrchestratorError::NotFound)?;

        if !config.active {
            return Err(OrchestratorError::Inactive);
        }

        let _guard = match self.in_flight.entry(integration_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(OrchestratorError::AlreadyRunning)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                FlightGuard {
                    in_flight: &self.in_flight,
                    id: integration_id,
                }
            }
        };

        self.integrations
            .update_sync_state(integration_id, SyncStatus::Running, None, None, None)
            .await?;

        self.audit
            .record(
                AuditEvent::SyncStarted,
                integration_id,
                serde_json::json!({ "erp_type": config.erp_type.as_str() }),
            )
            .await;

        match self.execute(&config, overrides).await {
            Ok(stats) => {
                self.audit
                    .record(
                        AuditEvent::SyncCompleted,
                        integration_id,
                        serde_json::to_value(&stats).unwrap_or(Value::Null),
                    )
                    .await;
                Ok(stats)
            }
            Err(e) => {
                self.integrations
                    .update_sync_state(
                        integration_id,
                        SyncStatus::Failed,
                        None,
                        None,
                        Some(&e.to_string()),
                    )
                    .await?;
                self.audit
                    .record(
                        AuditEvent::SyncFailed,
                        integration_id,
                        serde_json::json!({ "error": e.to_string() }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Whether a run is currently admitted for this integration.
    pub fn is_running(&self, integration_id: Uuid) -> bool {
        self.in_flight.contains_key(&integration_id)
    }

    async fn execute(
        &self,
        config: &IntegrationConfig,
        overrides: Option<&[EntityType]>,
    ) -> Result<SyncStats> {
        let connector = self.factory.get_or_create(config)?;

        if let Err(e) = connector.connect().await {
            let mut entry = IntegrationLogEntry::new(
                config.id,
                SyncDirection::Outbound,
                EntityType::ConnectionTest,
                LogStatus::Failed,
            );
            entry.error_message = Some(e.to_string());
            self.logs.append(&entry).await?;
            return Err(e.into());
        }

        let mut stats = SyncStats::default();
        let mut any_entity_succeeded = false;
        let mut any_entity_failed_whole = false;
        let mut failure_messages: Vec<String> = Vec::new();

        let entity_types: Vec<EntityType> = match overrides {
            Some(requested) => EntityType::SYNC_ORDER
                .iter()
                .copied()
                .filter(|t| requested.contains(t))
                .collect(),
            None => config.settings.enabled_entity_types(),
        };

        for entity_type in entity_types {
            let started = Instant::now();

            let outcome = if entity_type.is_pull() {
                self.run_pull(connector.as_ref(), config, entity_type).await
            } else {
                self.run_push(connector.as_ref(), config, entity_type).await
            };

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    connector.disconnect().await;
                    return Err(e);
                }
            };

            let mut entry = IntegrationLogEntry::new(
                config.id,
                if entity_type.is_pull() {
                    SyncDirection::Inbound
                } else {
                    SyncDirection::Outbound
                },
                entity_type,
                if outcome.whole_batch_failed {
                    LogStatus::Failed
                } else {
                    LogStatus::Success
                },
            );
            entry.duration_ms = started.elapsed().as_millis() as i64;
            entry.records_processed = outcome.stats.created + outcome.stats.updated;
            entry.records_errored = outcome.stats.errors;
            if !outcome.messages.is_empty() {
                entry.error_message = Some(outcome.messages.join("; "));
            }
            entry.response = Some(serde_json::json!({
                "created": outcome.stats.created,
                "updated": outcome.stats.updated,
                "errors": outcome.stats.errors,
            }));
            self.logs.append(&entry).await?;

            if outcome.whole_batch_failed {
                any_entity_failed_whole = true;
            } else {
                any_entity_succeeded = true;
            }
            failure_messages.extend(outcome.messages);
            stats.record(entity_type, outcome.stats);
        }

        connector.disconnect().await;

        let final_status = if any_entity_failed_whole && !any_entity_succeeded {
            SyncStatus::Failed
        } else if stats.total_errors() > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Success
        };

        let last_error = if failure_messages.is_empty() {
            None
        } else {
            Some(failure_messages.join("; "))
        };

        // The incremental watermark only advances when the run completed;
        // a failed run will re-cover the same window next time.
        let watermark = if final_status == SyncStatus::Failed {
            None
        } else {
            Some(chrono::Utc::now())
        };

        self.integrations
            .update_sync_state(
                config.id,
                final_status,
                watermark,
                Some(&stats),
                last_error.as_deref(),
            )
            .await?;

        Ok(stats)
    }

    /// Pull one entity type from the ERP and reconcile into the record store
    /// by external id: known records are updated in place, unknown ones are
    /// created under the configuration's tenant.
    async fn run_pull(
        &self,
        connector: &dyn ErpConnector,
        config: &IntegrationConfig,
        entity_type: EntityType,
    ) -> Result<EntityOutcome> {
        let result: SyncResult = match entity_type {
            EntityType::Assets => connector.sync_assets(config.last_sync_at).await,
            EntityType::Inventory => connector.sync_inventory(config.last_sync_at).await,
            _ => SyncResult::failed(format!("{} is not a pull entity", entity_type.as_str())),
        };

        let mut outcome = EntityOutcome {
            stats: EntityStats {
                created: 0,
                updated: 0,
                errors: result.errors,
            },
            whole_batch_failed: !result.success,
            messages: result.error_messages,
        };

        if !result.success {
            return Ok(outcome);
        }

        for item in &result.data {
            let Some(external_id) = item.get(EXTERNAL_ID_FIELD).and_then(Value::as_str) else {
                outcome.stats.errors += 1;
                outcome
                    .messages
                    .push("pulled record missing external id".to_string());
                continue;
            };

            let data = Value::Object(item.clone());
            let existing = self
                .records
                .find_by_external_id(config.tenant_id, entity_type, external_id)
                .await?;

            match existing {
                Some(record) => {
                    self.records.update_data(record.id, &data).await?;
                    outcome.stats.updated += 1;
                }
                None => {
                    self.records
                        .create(NewRecord {
                            tenant_id: config.tenant_id,
                            entity_type,
                            external_id: Some(external_id.to_string()),
                            data,
                        })
                        .await?;
                    outcome.stats.created += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Push one entity type to the ERP. Records without an external id are
    /// created remotely and the assigned id is linked back, so the next push
    /// updates instead of duplicating.
    async fn run_push(
        &self,
        connector: &dyn ErpConnector,
        config: &IntegrationConfig,
        entity_type: EntityType,
    ) -> Result<EntityOutcome> {
        let records = self.records.list(config.tenant_id, entity_type).await?;
        let items: Vec<ErpRecord> = records
            .iter()
            .map(|record| {
                let mut item = match &record.data {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = ErpRecord::new();
                        map.insert("data".to_string(), other.clone());
                        map
                    }
                };
                item.insert("id".to_string(), Value::String(record.id.to_string()));
                if let Some(external_id) = &record.external_id {
                    item.insert(
                        EXTERNAL_ID_FIELD.to_string(),
                        Value::String(external_id.clone()),
                    );
                }
                item
            })
            .collect();

        let result = match entity_type {
            EntityType::WorkOrders => connector.sync_work_orders(items.clone()).await,
            EntityType::PurchaseOrders => connector.sync_purchase_orders(items.clone()).await,
            _ => SyncResult::failed(format!("{} is not a push entity", entity_type.as_str())),
        };

        // Link ERP-assigned ids echoed back for newly created records.
        for echo in &result.data {
            let Some(internal_id) = echo
                .get("id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            let Some(external_id) = echo.get(EXTERNAL_ID_FIELD).and_then(Value::as_str) else {
                continue;
            };

            let had_link = records
                .iter()
                .find(|r| r.id == internal_id)
                .map(|r| r.external_id.is_some())
                .unwrap_or(true);
            if !had_link {
                self.records.link_external_id(internal_id, external_id).await?;
            }
        }

        // Items the ERP rejected go to the retry queue; the drain worker
        // replays them with their own retry budget. A whole-batch failure is
        // not queued, the next run re-pushes everything.
        if result.success && result.errors > 0 {
            let echoed: std::collections::HashSet<String> = result
                .data
                .iter()
                .filter_map(|e| e.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();

            for (record, item) in records.iter().zip(&items) {
                if echoed.contains(&record.id.to_string()) {
                    continue;
                }
                let operation = if record.external_id.is_some() {
                    SyncOperation::Update
                } else {
                    SyncOperation::Create
                };
                let queued = SyncQueueItem::new(
                    config.id,
                    operation,
                    entity_type,
                    record.id.to_string(),
                    Value::Object(item.clone()),
                );
                self.queue.enqueue(&queued).await?;
            }
        }

        Ok(EntityOutcome {
            stats: EntityStats {
                created: result.created,
                updated: result.updated,
                errors: result.errors,
            },
            whole_batch_failed: !result.success,
            messages: result.error_messages,
        })
    }
}
