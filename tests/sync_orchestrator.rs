// Orchestrator behavior against scripted connectors and in-memory stores:
// reconciliation, status aggregation, failure handling, and single-flight.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use mainstay_erp::models::integration::{
    EntityType, ErpType, IntegrationConfig, MappingTable, SyncSettings, SyncStatus,
};
use mainstay_erp::models::record::NewRecord;
use mainstay_erp::models::sync_log::LogStatus;
use mainstay_erp::models::sync_queue::{QueueStatus, SyncOperation};
use mainstay_erp::repositories::memory::{
    MemoryIntegrationStore, MemoryRecordStore, MemorySyncLogStore, MemorySyncQueueStore,
};
use mainstay_erp::repositories::{IntegrationStore, RecordStore, SyncQueueStore};
use mainstay_erp::services::audit_service::TracingAuditSink;
use mainstay_erp::services::erp::connector::{
    push_echo, ConnectionTestResult, ConnectorError, ErpConnector, SyncResult, EXTERNAL_ID_FIELD,
};
use mainstay_erp::services::erp::connector_factory::ConnectorProvider;
use mainstay_erp::services::erp::mapping::ErpRecord;
use mainstay_erp::services::sync_orchestrator::{OrchestratorError, SyncOrchestrator};

// ============================================================================
// Scripted connector and provider
// ============================================================================

#[derive(Default)]
struct MockConnector {
    connect_fails: bool,
    assets: Vec<ErpRecord>,
    push_fail_titles: Vec<String>,
    pull_gate: Option<Arc<Notify>>,
    next_external: AtomicUsize,
    mappings: MappingTable,
}

impl MockConnector {
    fn with_assets(assets: Vec<Value>) -> Self {
        Self {
            assets: assets
                .into_iter()
                .map(|v| v.as_object().unwrap().clone())
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ErpConnector for MockConnector {
    fn erp_type(&self) -> ErpType {
        ErpType::Sap
    }

    fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        if self.connect_fails {
            return Err(ConnectorError::Connection("scripted refusal".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn test_connection(&self) -> ConnectionTestResult {
        ConnectionTestResult {
            success: !self.connect_fails,
            message: String::new(),
            details: None,
            response_time_ms: 1,
        }
    }

    async fn sync_assets(&self, _since: Option<DateTime<Utc>>) -> SyncResult {
        if let Some(gate) = &self.pull_gate {
            gate.notified().await;
        }
        SyncResult {
            data: self.assets.clone(),
            ..Default::default()
        }
    }

    async fn sync_inventory(&self, _since: Option<DateTime<Utc>>) -> SyncResult {
        SyncResult::default()
    }

    async fn sync_work_orders(&self, items: Vec<ErpRecord>) -> SyncResult {
        let mut result = SyncResult::default();
        for item in &items {
            let title = item.get("title").and_then(Value::as_str).unwrap_or("");
            if self.push_fail_titles.iter().any(|t| t == title) {
                result.errors += 1;
                result.error_messages.push(format!("{}: rejected", title));
                continue;
            }
            match item.get(EXTERNAL_ID_FIELD).and_then(Value::as_str) {
                Some(id) => {
                    result.updated += 1;
                    result.data.push(push_echo(item, id.to_string()));
                }
                None => {
                    let n = self.next_external.fetch_add(1, Ordering::SeqCst) + 1;
                    result.created += 1;
                    result.data.push(push_echo(item, format!("EXT-{}", n)));
                }
            }
        }
        if !items.is_empty() && result.errors as usize == items.len() {
            result.success = false;
        }
        result
    }

    async fn sync_purchase_orders(&self, _items: Vec<ErpRecord>) -> SyncResult {
        SyncResult::default()
    }
}

#[derive(Default)]
struct ScriptedProvider {
    connectors: DashMap<Uuid, Arc<dyn ErpConnector>>,
}

#[async_trait]
impl ConnectorProvider for ScriptedProvider {
    fn get_or_create(
        &self,
        config: &IntegrationConfig,
    ) -> Result<Arc<dyn ErpConnector>, ConnectorError> {
        self.connectors
            .get(&config.id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| ConnectorError::Config("no connector scripted".to_string()))
    }

    async fn invalidate(&self, config_id: Uuid) {
        self.connectors.remove(&config_id);
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    integrations: Arc<MemoryIntegrationStore>,
    records: Arc<MemoryRecordStore>,
    logs: Arc<MemorySyncLogStore>,
    queue: Arc<MemorySyncQueueStore>,
    provider: Arc<ScriptedProvider>,
    orchestrator: Arc<SyncOrchestrator>,
}

fn harness() -> Harness {
    let integrations = Arc::new(MemoryIntegrationStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let logs = Arc::new(MemorySyncLogStore::new());
    let queue = Arc::new(MemorySyncQueueStore::new());
    let provider = Arc::new(ScriptedProvider::default());

    let orchestrator = Arc::new(SyncOrchestrator::new(
        integrations.clone(),
        records.clone(),
        logs.clone(),
        queue.clone(),
        provider.clone(),
        Arc::new(TracingAuditSink),
    ));

    Harness {
        integrations,
        records,
        logs,
        queue,
        provider,
        orchestrator,
    }
}

fn test_config(settings: SyncSettings) -> IntegrationConfig {
    IntegrationConfig {
        id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        erp_type: ErpType::Sap,
        name: "plant erp".to_string(),
        description: None,
        credentials: String::new(),
        mappings: MappingTable::new(),
        settings,
        active: true,
        sync_status: SyncStatus::Idle,
        last_sync_at: None,
        last_sync_stats: None,
        last_error: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn asset(external_id: &str, name: &str) -> Value {
    json!({
        EXTERNAL_ID_FIELD: external_id,
        "asset_number": external_id,
        "name": name,
    })
}

async fn seed(h: &Harness, config: IntegrationConfig, connector: MockConnector) -> Uuid {
    let id = config.id;
    h.integrations.create(&config).await.unwrap();
    h.provider.connectors.insert(id, Arc::new(connector));
    id
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn full_run_reconciles_and_marks_success() {
    let h = harness();
    let config = test_config(SyncSettings::default());
    let tenant_id = config.tenant_id;

    // A2 already exists locally; A1 and A3 are new.
    h.records
        .create(NewRecord {
            tenant_id,
            entity_type: EntityType::Assets,
            external_id: Some("A2".to_string()),
            data: json!({"name": "stale"}),
        })
        .await
        .unwrap();

    let connector = MockConnector::with_assets(vec![
        asset("A1", "Pump"),
        asset("A2", "Compressor"),
        asset("A3", "Belt"),
    ]);
    let id = seed(&h, config, connector).await;

    let stats = h.orchestrator.run_sync(id).await.unwrap();

    let assets = stats.get(EntityType::Assets).unwrap();
    assert_eq!(assets.created, 2);
    assert_eq!(assets.updated, 1);
    assert_eq!(assets.errors, 0);
    assert_eq!(stats.total_errors(), 0);
    assert_eq!(h.records.count(), 3);

    // Updated in place, not duplicated.
    let existing = h
        .records
        .find_by_external_id(tenant_id, EntityType::Assets, "A2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(existing.data["name"], "Compressor");

    let stored = h.integrations.get(id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Success);
    assert!(stored.last_sync_at.is_some());
    assert!(stored.last_error.is_none());

    // One log entry per enabled entity type, in sync order.
    let entries = h.logs.all();
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0].entity_type, EntityType::Assets);
    assert_eq!(entries[0].records_processed, 3);
    assert_eq!(entries[0].status, LogStatus::Success);
}

#[tokio::test]
async fn connect_failure_marks_failed_and_keeps_watermark() {
    let h = harness();
    let config = test_config(SyncSettings::default());
    let connector = MockConnector {
        connect_fails: true,
        ..Default::default()
    };
    let id = seed(&h, config, connector).await;

    match h.orchestrator.run_sync(id).await {
        Err(OrchestratorError::Connection(_)) => {}
        other => panic!("expected connection error, got {:?}", other.map(|_| ())),
    }

    let stored = h.integrations.get(id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Failed);
    assert!(stored.last_sync_at.is_none());
    assert!(stored.last_error.is_some());

    // The failed attempt is visible in the history.
    let entries = h.logs.all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, EntityType::ConnectionTest);
    assert_eq!(entries[0].status, LogStatus::Failed);
}

#[tokio::test]
async fn partial_push_failure_yields_partial_status() {
    let h = harness();
    let config = test_config(SyncSettings {
        sync_assets: false,
        sync_inventory: false,
        sync_purchase_orders: false,
        ..Default::default()
    });
    let tenant_id = config.tenant_id;

    for i in 0..5 {
        h.records
            .create(NewRecord {
                tenant_id,
                entity_type: EntityType::WorkOrders,
                external_id: None,
                data: json!({"title": format!("WO-{}", i)}),
            })
            .await
            .unwrap();
    }

    let connector = MockConnector {
        push_fail_titles: vec!["WO-1".to_string(), "WO-3".to_string()],
        ..Default::default()
    };
    let id = seed(&h, config, connector).await;

    let stats = h.orchestrator.run_sync(id).await.unwrap();

    let work_orders = stats.get(EntityType::WorkOrders).unwrap();
    assert_eq!(work_orders.created, 3);
    assert_eq!(work_orders.errors, 2);

    let stored = h.integrations.get(id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Partial);
    let last_error = stored.last_error.unwrap();
    assert!(last_error.contains("WO-1"));
    assert!(last_error.contains("WO-3"));

    // Succeeded records got their assigned external ids linked back.
    let linked = h
        .records
        .list(tenant_id, EntityType::WorkOrders)
        .await
        .unwrap()
        .iter()
        .filter(|r| r.external_id.is_some())
        .count();
    assert_eq!(linked, 3);
}

#[tokio::test]
async fn rejected_push_items_land_in_the_retry_queue() {
    let h = harness();
    let config = test_config(SyncSettings {
        sync_assets: false,
        sync_inventory: false,
        sync_purchase_orders: false,
        ..Default::default()
    });
    let tenant_id = config.tenant_id;

    for title in ["WO-ok", "WO-bad"] {
        h.records
            .create(NewRecord {
                tenant_id,
                entity_type: EntityType::WorkOrders,
                external_id: None,
                data: json!({"title": title}),
            })
            .await
            .unwrap();
    }

    let connector = MockConnector {
        push_fail_titles: vec!["WO-bad".to_string()],
        ..Default::default()
    };
    let id = seed(&h, config, connector).await;

    h.orchestrator.run_sync(id).await.unwrap();

    // Only the rejected record is queued, pending with a fresh retry budget.
    let pending = h.queue.fetch_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    let item = &pending[0];
    assert_eq!(item.integration_id, id);
    assert_eq!(item.status, QueueStatus::Pending);
    assert_eq!(item.operation, SyncOperation::Create);
    assert_eq!(item.entity_type, EntityType::WorkOrders);
    assert_eq!(item.retry_count, 0);
    assert_eq!(item.payload["title"], "WO-bad");

    // The queued entity id points at the internal record.
    let failed = h
        .records
        .list(tenant_id, EntityType::WorkOrders)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.data["title"] == "WO-bad")
        .unwrap();
    assert_eq!(item.entity_id, failed.id.to_string());
    assert!(failed.external_id.is_none());
}

#[tokio::test]
async fn second_pull_updates_instead_of_duplicating() {
    let h = harness();
    let config = test_config(SyncSettings {
        sync_work_orders: false,
        sync_purchase_orders: false,
        sync_inventory: false,
        ..Default::default()
    });
    let connector = MockConnector::with_assets(vec![asset("A1", "Pump"), asset("A2", "Belt")]);
    let id = seed(&h, config, connector).await;

    let first = h.orchestrator.run_sync(id).await.unwrap();
    assert_eq!(first.get(EntityType::Assets).unwrap().created, 2);

    let second = h.orchestrator.run_sync(id).await.unwrap();
    assert_eq!(second.get(EntityType::Assets).unwrap().created, 0);
    assert_eq!(second.get(EntityType::Assets).unwrap().updated, 2);
    assert_eq!(h.records.count(), 2);
}

#[tokio::test]
async fn subset_run_overrides_enabled_entity_types() {
    let h = harness();
    // Work orders are disabled in the settings but requested explicitly.
    let config = test_config(SyncSettings {
        sync_work_orders: false,
        ..Default::default()
    });
    let tenant_id = config.tenant_id;

    h.records
        .create(NewRecord {
            tenant_id,
            entity_type: EntityType::WorkOrders,
            external_id: None,
            data: json!({"title": "WO-0"}),
        })
        .await
        .unwrap();

    let connector = MockConnector::with_assets(vec![asset("A1", "Pump")]);
    let id = seed(&h, config, connector).await;

    let stats = h
        .orchestrator
        .run_sync_subset(id, &[EntityType::WorkOrders])
        .await
        .unwrap();

    assert_eq!(stats.get(EntityType::WorkOrders).unwrap().created, 1);
    assert!(stats.get(EntityType::Assets).is_none());

    // Only the requested entity type was attempted.
    let entries = h.logs.all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_type, EntityType::WorkOrders);
}

#[tokio::test]
async fn concurrent_run_is_rejected_while_first_is_in_flight() {
    let h = harness();
    let config = test_config(SyncSettings {
        sync_inventory: false,
        sync_work_orders: false,
        sync_purchase_orders: false,
        ..Default::default()
    });

    let gate = Arc::new(Notify::new());
    let connector = MockConnector {
        assets: vec![asset("A1", "Pump").as_object().unwrap().clone()],
        pull_gate: Some(gate.clone()),
        ..Default::default()
    };
    let id = seed(&h, config, connector).await;

    let orchestrator = h.orchestrator.clone();
    let first = tokio::spawn(async move { orchestrator.run_sync(id).await });

    // Wait until the first run holds the slot.
    while !h.orchestrator.is_running(id) {
        tokio::task::yield_now().await;
    }

    match h.orchestrator.run_sync(id).await {
        Err(OrchestratorError::AlreadyRunning) => {}
        other => panic!("expected already-running, got {:?}", other.map(|_| ())),
    }

    gate.notify_one();
    let stats = first.await.unwrap().unwrap();
    assert_eq!(stats.get(EntityType::Assets).unwrap().created, 1);

    // Slot released; a fresh run is admitted.
    assert!(!h.orchestrator.is_running(id));
    gate.notify_one();
    assert!(h.orchestrator.run_sync(id).await.is_ok());
}

#[tokio::test]
async fn unknown_integration_and_inactive_integration_fail_fast() {
    let h = harness();

    match h.orchestrator.run_sync(Uuid::new_v4()).await {
        Err(OrchestratorError::NotFound) => {}
        other => panic!("expected not-found, got {:?}", other.map(|_| ())),
    }

    let mut config = test_config(SyncSettings::default());
    config.active = false;
    let id = seed(&h, config, MockConnector::default()).await;

    match h.orchestrator.run_sync(id).await {
        Err(OrchestratorError::Inactive) => {}
        other => panic!("expected inactive, got {:?}", other.map(|_| ())),
    }
}
